//! HTTP server.
//!
//! This module contains the HTTP server of vcc-httpd, which is a web server
//! implemented using [`axum`]. It exposes the operations of the VCC through a
//! RESTful JSON API.

use crate::app::AppState;
use anyhow::Result;
use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

mod vcc;
mod version;

/// HTTP server.
#[derive(Debug)]
pub struct Server {
    server: axum::serve::Serve<Router, Router>,
}

impl Server {
    /// Creates a new HTTP server.
    ///
    /// The `address` parameter gives the address in which the server will
    /// listen. The `state` gives the server shared access to the VCC.
    ///
    /// After calling this function, the server needs to be run by calling
    /// [`Server::run`].
    pub async fn new(address: &std::net::SocketAddr, state: AppState) -> Result<Server> {
        let app = router(state);
        tracing::info!(%address, "starting HTTP server");
        let listener = tokio::net::TcpListener::bind(address).await?;
        let server = axum::serve(listener, app.layer(TraceLayer::new_for_http()));
        Ok(Server { server })
    }

    /// Runs the HTTP server.
    ///
    /// This only returns if there is a fatal error.
    pub async fn run(self) -> Result<()> {
        Ok(self.server.await?)
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/vcc", get(vcc::get_vcc))
        .route("/api/vcc/status", get(vcc::get_status))
        .route("/api/vcc/config", put(vcc::put_config))
        .route("/api/vcc/deconfigure", put(vcc::put_deconfigure))
        .route("/api/vcc/gains", put(vcc::put_gains))
        .route("/api/vcc/recover", post(vcc::post_recover))
        .route("/api/vcc/start", post(vcc::post_start))
        .route("/api/vcc/stop", post(vcc::post_stop))
        .route(
            "/api/vcc/register/:address",
            get(vcc::get_register).put(vcc::put_register),
        )
        .route("/api/versions", get(version::get_versions))
        .with_state(state)
}

mod json_error {
    use crate::error::VccError;
    use anyhow::Error;
    use axum::{
        http::StatusCode,
        response::{IntoResponse, Response},
    };
    use serde::Serialize;

    #[derive(Serialize, Debug, Clone, Eq, PartialEq)]
    pub struct JsonError {
        http_status_code: u16,
        error_description: String,
    }

    impl JsonError {
        pub fn from_error(status_code: StatusCode, error: Error) -> JsonError {
            JsonError {
                http_status_code: status_code.as_u16(),
                error_description: format!("{error:#}"),
            }
        }

        pub fn client_error(error: Error) -> JsonError {
            JsonError::from_error(StatusCode::BAD_REQUEST, error)
        }

        pub fn server_error(error: Error) -> JsonError {
            JsonError::from_error(StatusCode::INTERNAL_SERVER_ERROR, error)
        }

        // Invalid arguments are the fault of the client; anything else comes
        // from the device.
        pub fn vcc_error(error: VccError) -> JsonError {
            if error.is_invalid_argument() {
                JsonError::client_error(error.into())
            } else {
                JsonError::server_error(error.into())
            }
        }

        #[cfg(test)]
        pub fn status_code(&self) -> u16 {
            self.http_status_code
        }
    }

    impl IntoResponse for JsonError {
        fn into_response(self) -> Response {
            let status_code = StatusCode::from_u16(self.http_status_code)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            match serde_json::to_string(&self) {
                Ok(json) => (status_code, json).into_response(),
                Err(_) => status_code.into_response(),
            }
        }
    }
}
