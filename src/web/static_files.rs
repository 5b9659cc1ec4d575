//! Static file serving using rust-embed

use axum::{
    extract::Path,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use rust_embed::RustEmbed;

/// Embedded dashboard assets from src/web/assets/
#[derive(RustEmbed)]
#[folder = "src/web/assets/"]
pub struct Assets;

/// Serve an embedded asset, `index.html` for the root
pub async fn serve_static(path: &str) -> Response {
    let path = if path.is_empty() || path == "/" {
        "index.html"
    } else {
        path.trim_start_matches('/')
    };

    match Assets::get(path) {
        Some(content) => {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            (
                [(header::CONTENT_TYPE, mime.as_ref().to_string())],
                content.data.into_owned(),
            )
                .into_response()
        }
        None => (StatusCode::NOT_FOUND, "Not Found").into_response(),
    }
}

/// Handler for root path
pub async fn index() -> Response {
    serve_static("index.html").await
}

/// Handler for static assets
pub async fn asset(Path(path): Path<String>) -> Response {
    serve_static(&path).await
}
