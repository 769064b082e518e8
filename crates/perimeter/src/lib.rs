//! Site-wide access gate backed by shared-secret tokens.
//!
//! Visitors are redirected to a token entry endpoint until they submit a
//! valid [`AccessToken`](models::access_token::Model). The accepted token is
//! kept in their session and re-checked on each request.
//!
//! ```rust,ignore
//! let config = Config::from_env()?;
//! let db = db::connect(&config).await?;
//! db::migrate(&db).await?;
//! let store = TokenStore::new(db, CacheService::in_memory(), &config);
//! let gate = Gate::new(config, store);
//! let app = middleware::protect(routes, gate);
//! ```

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod gate;
pub mod logging;
pub mod middleware;
pub mod migrations;
pub mod models;
pub mod recorder;
pub mod session;
pub mod store;
pub mod testing;
pub mod validator;

pub use cache::CacheService;
pub use config::Config;
pub use error::PerimeterError;
pub use gate::{Gate, GateState, Redemption};
pub use session::{MemorySession, Session, SharedSession};
pub use store::{NewAccessToken, TokenStore};
pub use validator::TokenLookup;
