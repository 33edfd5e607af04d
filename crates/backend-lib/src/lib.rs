// ============================
// classroom-backend-lib/src/lib.rs
// ============================
//! Core functionality of the classroom login proxy.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod router;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::auth::{LoginBroker, LoginService};
use crate::config::{ConfigError, Settings};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Upstream login service
    pub login: Arc<dyn LoginService>,
    /// Resolved settings
    pub settings: Arc<Settings>,
    /// Cancelled on server shutdown; every login search runs on a child token
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Create a new application state backed by a [`LoginBroker`]
    pub fn new(settings: Settings) -> Result<Self, ConfigError> {
        let settings = Arc::new(settings);
        let login = Arc::new(LoginBroker::new(Arc::clone(&settings))?);
        Ok(Self::with_service(settings, login))
    }

    /// Create a state around any login service
    pub fn with_service(settings: Arc<Settings>, login: Arc<dyn LoginService>) -> Self {
        Self {
            login,
            settings,
            shutdown: CancellationToken::new(),
        }
    }
}
