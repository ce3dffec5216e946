//! Browser client script and HTML injection.

use axum::http::header;
use axum::response::IntoResponse;

/// Route serving the client script.
pub(crate) const SCRIPT_PATH: &str = "/__livereload.js";

/// Route accepting the reload WebSocket.
pub(crate) const SOCKET_PATH: &str = "/__livereload";

/// Client script source.
const CLIENT_JS: &str = include_str!("../../assets/livereload.js");

/// Tag injected into served HTML pages.
const SNIPPET: &str = "<script src=\"/__livereload.js\"></script>";

/// Handle GET /__livereload.js.
pub(crate) async fn client_script() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/javascript; charset=utf-8")],
        CLIENT_JS,
    )
}

/// Insert the client script tag into an HTML document.
///
/// Goes before the last `</body>`, else before the last `</html>`, else at
/// the end. Tag matching is case-insensitive.
pub(crate) fn inject_client(html: &str) -> String {
    // ASCII lowercasing keeps byte offsets valid for the original string
    let lower = html.to_ascii_lowercase();
    let index = lower
        .rfind("</body>")
        .or_else(|| lower.rfind("</html>"))
        .unwrap_or(html.len());

    let mut out = String::with_capacity(html.len() + SNIPPET.len());
    out.push_str(&html[..index]);
    out.push_str(SNIPPET);
    out.push_str(&html[index..]);
    out
}
