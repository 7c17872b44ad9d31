//! Application state shared by all handlers

use std::sync::Arc;

use tandem_shared::ChatStore;

use crate::{
    auth::JwtManager,
    config::Config,
    websocket::{Backbone, Collaborators, GatewaySettings, WebSocketState},
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn ChatStore>,
    pub jwt: JwtManager,
    pub ws_state: WebSocketState,
}

impl AppState {
    /// Build the state around one store. Starts the gateway's fan-out task, so
    /// this must run inside a tokio runtime.
    pub fn new<S>(config: Config, store: Arc<S>, backbone: Arc<dyn Backbone>) -> Self
    where
        S: ChatStore + 'static,
    {
        let jwt = JwtManager::new(&config.jwt_secret, config.jwt_expiry_hours);
        let ws_state = WebSocketState::new(
            Collaborators::from_store(Arc::clone(&store)),
            backbone,
            jwt.clone(),
            GatewaySettings::from(&config),
        );

        Self {
            config: Arc::new(config),
            store,
            jwt,
            ws_state,
        }
    }
}
