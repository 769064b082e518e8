use axum::{Extension, Router};
use sea_orm::DatabaseConnection;

use crate::cache::CacheService;
use crate::config::Config;
use crate::db;
use crate::gate::Gate;
use crate::middleware;
use crate::session::SharedSession;
use crate::store::TokenStore;

/// Config for tests: gate enabled, in-memory SQLite, no cache TTL.
pub fn test_config() -> Config {
    Config {
        enabled: true,
        database_url: "sqlite::memory:".to_string(),
        cache_ttl_secs: 0,
        environment: "test".to_string(),
        ..Config::default()
    }
}

/// A migrated in-memory gate for integration testing.
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_redeem() {
///     let app = TestGate::new().await;
///     let token = app.store.create_access_token(NewAccessToken::default()).await.unwrap();
///     assert!(app.store.get_access_token(&token.token).await.unwrap().is_valid());
/// }
/// ```
pub struct TestGate {
    pub gate: Gate,
    pub store: TokenStore,
    pub cache: CacheService,
    pub db: DatabaseConnection,
    pub config: Config,
}

impl TestGate {
    /// Enabled gate over a fresh in-memory database.
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    /// Gate over a fresh database using `config`.
    pub async fn with_config(config: Config) -> Self {
        let db = db::connect(&config)
            .await
            .expect("Failed to connect test database");
        db::migrate(&db).await.expect("Failed to run migrations");

        let cache = CacheService::in_memory();
        let store = TokenStore::new(db.clone(), cache.clone(), &config);
        let gate = Gate::new(config.clone(), store.clone());

        TestGate {
            gate,
            store,
            cache,
            db,
            config,
        }
    }

    /// `routes` behind the gate, with `session` attached to every request.
    pub fn router(&self, routes: Router, session: SharedSession) -> Router {
        middleware::protect(routes, self.gate.clone()).layer(Extension(session))
    }
}
