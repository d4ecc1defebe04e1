//! Login, logout and password reset

use crate::state::{NavigationStore, Route};
use crate::AppError;
use app_net::Dispatcher;
use app_proto::{endpoint, Empty, LoginRequest, ResetPasswordRequest};
use std::sync::Arc;

pub struct Session {
    dispatcher: Arc<Dispatcher>,
    store: Arc<NavigationStore>,
}

impl Session {
    pub fn new(dispatcher: Arc<Dispatcher>, store: Arc<NavigationStore>) -> Self {
        Self { dispatcher, store }
    }

    pub fn route(&self) -> Route {
        self.store.route()
    }

    /// Returns the server's success flag; on success the file view is back
    pub async fn login(&self, name: &str, password: &str) -> Result<bool, AppError> {
        let request = LoginRequest {
            name: name.to_string(),
            password: password.to_string(),
        };
        let envelope = self.dispatcher.call(endpoint::LOGIN, &request).await?;
        if envelope.is_success() {
            tracing::info!("Logged in as '{}'", name);
            self.store.set_route(Route::Files);
        } else {
            tracing::warn!("Login refused: {}", envelope.message);
        }
        Ok(envelope.is_success())
    }

    pub async fn logout(&self) -> Result<bool, AppError> {
        let envelope = self.dispatcher.call(endpoint::LOGOUT, &Empty::default()).await?;
        if envelope.is_success() {
            tracing::info!("Logged out");
            self.store.set_route(Route::Login);
        }
        Ok(envelope.is_success())
    }

    pub async fn reset_password(&self, old_password: &str, new_password: &str) -> Result<bool, AppError> {
        let request = ResetPasswordRequest {
            old_password: old_password.to_string(),
            new_password: new_password.to_string(),
        };
        let envelope = self.dispatcher.call(endpoint::RESET_PASSWORD, &request).await?;
        if !envelope.is_success() {
            tracing::warn!("Password reset refused: {}", envelope.message);
        }
        Ok(envelope.is_success())
    }
}
