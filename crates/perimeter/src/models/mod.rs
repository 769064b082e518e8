pub mod access_token;
pub mod access_token_use;
