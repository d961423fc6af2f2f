/*
[INPUT]:  Client credentials and `public/auth` results
[OUTPUT]: Auth request params and a shared access token store
[POS]:    Auth layer - handles Deribit API authentication state
[UPDATE]: When auth flow or token handling changes
*/

pub mod credentials;
pub mod token;

pub use credentials::{AuthParams, ClientCredentials};
pub use token::{AuthResult, TokenData, TokenStore};
