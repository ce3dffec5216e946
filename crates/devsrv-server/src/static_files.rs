//! Static file serving.
//!
//! Files under the root are served by [`ServeDir`], which handles path
//! decoding, traversal rejection, directory redirects, `index.html` lookup,
//! content types and HEAD requests. When live reload is enabled, HTML
//! responses pass through [`inject_client_script`] on their way out.

use std::path::Path;
use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::Request;
use axum::http::{Method, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use tower_http::services::ServeDir;

use crate::live_reload;
use crate::state::AppState;

/// Create router for static file serving.
///
/// # Arguments
///
/// * `root` - Directory to serve
/// * `inject` - Whether HTML pages get the live reload client
pub(crate) fn static_router(root: &Path, inject: bool) -> Router<Arc<AppState>> {
    let router =
        Router::new().fallback_service(ServeDir::new(root).append_index_html_on_directories(true));

    if inject {
        router.layer(middleware::from_fn(inject_client_script))
    } else {
        router
    }
}

/// Insert the live reload client into full HTML responses.
async fn inject_client_script(request: Request, next: Next) -> Response {
    // HEAD bodies are empty and partial content cannot be rewritten
    let is_get = request.method() == Method::GET;
    let response = next.run(request).await;
    if !is_get || response.status() != StatusCode::OK || !is_html(&response) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read HTML response body");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let body = match std::str::from_utf8(&bytes) {
        Ok(html) => Body::from(live_reload::inject_client(html)),
        Err(_) => Body::from(bytes),
    };
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, body)
}

fn is_html(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("text/html"))
}
