//! Fallback document served to navigations when both cache and network miss.

use http::{header, HeaderValue, StatusCode};
use idscan_net::Response;
use url::Url;

/// Escape text for use in HTML element content.
fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render the offline page for `app_name`.
pub fn offline_page(app_name: &str) -> String {
    let app_name = escape_html(app_name);
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <title>{app_name} - Offline</title>
  <style>
    body {{ font-family: 'Century Gothic', sans-serif; text-align: center; padding: 2em; }}
    h1 {{ color: #FFD700; }}
  </style>
</head>
<body>
  <h1>{app_name}</h1>
  <p>You're currently offline. Please check your internet connection and try again.</p>
  <button onclick="location.reload()">Retry</button>
</body>
</html>"#
    )
}

/// Offline page as a `text/html` response for `url`.
pub fn offline_response(url: &Url, app_name: &str) -> Response {
    Response::new(url.clone(), StatusCode::OK)
        .with_header(header::CONTENT_TYPE, HeaderValue::from_static("text/html"))
        .with_body(offline_page(app_name))
}
