//! Web server setup and startup.
//!
//! [`WebServer`] composes the Axum router, registers all routes, and
//! starts the HTTP listener.

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderValue, Method};
use axum::routing::{delete, get, post, put};
use tower_http::cors::CorsLayer;

use crate::api;
use crate::auth;
use crate::state::AppState;

/// Bind configuration for the web server.
#[derive(Debug, Clone)]
pub struct WebConfig {
    /// Interface to bind, e.g. `127.0.0.1`.
    pub bind_addr: String,
    /// TCP port.
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// The FlowTalk web server.
pub struct WebServer {
    config: WebConfig,
    state: Arc<AppState>,
}

impl WebServer {
    /// Create a new web server over shared application state.
    pub fn new(config: WebConfig, state: Arc<AppState>) -> Self {
        Self { config, state }
    }

    /// Return the `host:port` string this server will bind to.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.config.bind_addr, self.config.port)
    }

    /// Build the Axum router with all routes registered.
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin("*".parse::<HeaderValue>().expect("static origin"))
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers(tower_http::cors::Any);

        Router::new()
            .route("/healthz", get(api::healthz))
            // Auth.
            .route("/auth/register", post(auth::register))
            .route("/auth/login", post(auth::login))
            .route("/auth/logout", post(auth::logout))
            .route("/auth/me", get(auth::me))
            .route("/auth/profile", put(auth::update_profile))
            // Messages.
            .route("/messages", get(api::get_messages))
            .route("/messages", post(api::post_message))
            .route("/messages", delete(api::delete_messages))
            .route("/messages/reactions", post(api::add_reaction))
            .route("/messages/reactions", delete(api::remove_reaction))
            // Communities.
            .route("/communities", get(api::list_communities))
            .route("/communities", post(api::create_community))
            .route("/communities/discover", get(api::discover_communities))
            .route("/communities/{id}/join", post(api::join_community))
            .route("/communities/{id}/glossary", get(api::list_glossary))
            .route("/communities/{id}/glossary", post(api::add_glossary_term))
            .route(
                "/communities/{id}/glossary/{term_id}",
                delete(api::remove_glossary_term),
            )
            // Channels.
            .route("/channels", post(api::create_channel))
            // Conversations.
            .route("/conversations", get(api::list_conversations))
            .route("/conversations", post(api::create_conversation))
            // Users.
            .route("/users/{id}", get(api::get_user))
            .layer(cors)
            .with_state(Arc::clone(&self.state))
    }

    /// Start the server and block until the listener shuts down.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP listener cannot be bound.
    pub async fn start(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = self.addr();
        let router = self.router();

        tracing::info!(addr = %addr, "starting web server");

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("shutdown signal received");
            })
            .await?;

        Ok(())
    }
}
