//! The per-visitor session the gate reads and writes.
//!
//! Session storage belongs to the host application. It exposes the visitor's
//! session to the gate by inserting a [`SharedSession`] into the request
//! extensions before the perimeter layer runs:
//!
//! ```rust,ignore
//! async fn attach_session(mut req: Request, next: Next) -> Response {
//!     let session: SharedSession = Arc::new(MySessionAdapter::load(&req).await);
//!     req.extensions_mut().insert(session);
//!     next.run(req).await
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::PerimeterError;

/// String key/value storage scoped to one visitor and kept across requests.
#[async_trait::async_trait]
pub trait Session: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, PerimeterError>;

    async fn insert(&self, key: &str, value: &str) -> Result<(), PerimeterError>;

    async fn remove(&self, key: &str) -> Result<(), PerimeterError>;
}

/// Request-extension handle to the visitor's session.
pub type SharedSession = Arc<dyn Session>;

/// In-process session, handy for tests and single-visitor tools.
#[derive(Clone, Default)]
pub struct MemorySession {
    values: Arc<RwLock<HashMap<String, String>>>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedSession {
        Arc::new(self)
    }
}

#[async_trait::async_trait]
impl Session for MemorySession {
    async fn get(&self, key: &str) -> Result<Option<String>, PerimeterError> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn insert(&self, key: &str, value: &str) -> Result<(), PerimeterError> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), PerimeterError> {
        self.values.write().await.remove(key);
        Ok(())
    }
}
