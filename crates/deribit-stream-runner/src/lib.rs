/*
[INPUT]:  Public API exports for deribit-stream-runner crate
[OUTPUT]: Module declarations and public re-exports
[POS]:    Crate root - library entry point
[UPDATE]: When adding new modules or public exports
*/

pub mod config;
pub mod session;

// Re-export main types for convenience
pub use config::{FeedChannel, RunnerConfig};
pub use session::StreamSession;
