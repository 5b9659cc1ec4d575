//! Web server implementation using axum

use anyhow::{Context, Result};
use axum::http::{HeaderValue, Method};
use axum::{routing::get, Router};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use claude_monitor_core::usage::FetchCoordinator;

use crate::config::ServerSettings;

use super::api::{self, ApiState};
use super::static_files;

/// Build the full application router
pub fn build_router(coordinator: FetchCoordinator, settings: &ServerSettings) -> Result<Router> {
    let cache_control = HeaderValue::from_str(&settings.cache_control())
        .context("Invalid Cache-Control value")?;
    let api_state = Arc::new(ApiState {
        coordinator,
        cache_control,
    });

    // Read-only public data; any origin may poll it
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET]);

    let api_routes = Router::new()
        .route("/usage", get(api::get_usage))
        .with_state(api_state);

    let static_routes = Router::new()
        .route("/", get(static_files::index))
        .route("/{*path}", get(static_files::asset));

    Ok(Router::new()
        .nest("/api", api_routes)
        .merge(static_routes)
        .layer(cors))
}

/// Web server for the usage API
pub struct WebServer {
    settings: ServerSettings,
    coordinator: FetchCoordinator,
}

impl WebServer {
    /// Create a new web server
    pub fn new(settings: ServerSettings, coordinator: FetchCoordinator) -> Self {
        Self {
            settings,
            coordinator,
        }
    }

    /// Run the web server until Ctrl+C
    pub async fn run(self) -> Result<()> {
        let ip: IpAddr = self
            .settings
            .bind
            .parse()
            .with_context(|| format!("Invalid bind address: {}", self.settings.bind))?;
        let addr = SocketAddr::new(ip, self.settings.port);

        let app = build_router(self.coordinator, &self.settings)?;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        tracing::info!("Claude Monitor running on http://{}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Web server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use claude_monitor_core::credential::StaticCredential;
    use claude_monitor_core::usage::{
        CoordinatorConfig, FetchError, Organization, RawUsage, UsageSource,
    };
    use http::{header, Request, StatusCode};
    use tower::ServiceExt;

    struct Unreachable;

    impl UsageSource for Unreachable {
        fn organizations(&self, _: &str) -> Result<Vec<Organization>, FetchError> {
            Err(FetchError::Transport("offline".to_string()))
        }

        fn usage(&self, _: &str, _: &str) -> Result<RawUsage, FetchError> {
            Err(FetchError::Transport("offline".to_string()))
        }
    }

    fn test_app() -> Router {
        let coordinator = FetchCoordinator::new(
            Arc::new(Unreachable),
            Arc::new(StaticCredential(Some("cookie".to_string()))),
            CoordinatorConfig::default(),
        );
        build_router(coordinator, &ServerSettings::default()).unwrap()
    }

    #[tokio::test]
    async fn test_usage_route_is_mounted_under_api() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/api/usage")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_cors_header_present() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/api/usage")
                    .header(header::ORIGIN, "http://example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "*"
        );
    }

    #[tokio::test]
    async fn test_index_served() {
        let response = test_app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response
            .headers()
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/html"));
    }

    #[tokio::test]
    async fn test_missing_asset_is_404() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/nope.js")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
