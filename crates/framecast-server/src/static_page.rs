//! The single static page served at `/`.

use bytes::Bytes;
use http::{header, HeaderValue, Method, Response, StatusCode};
use http_body_util::Full;

/// Page compiled into the binary.
pub const DEFAULT_INDEX_HTML: &[u8] = include_bytes!("../assets/index.html");

/// Type alias for the HTTP response.
pub type HttpResponse = Response<Full<Bytes>>;

/// An in-memory HTML page.
#[derive(Debug, Clone)]
pub struct StaticPage {
    body: Bytes,
}

impl StaticPage {
    /// Serve `body` instead of the built-in page.
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self { body: body.into() }
    }

    /// The page body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Respond to a request for the page.
    ///
    /// Only `GET` is allowed; other methods get `405` with an `Allow` header.
    pub fn respond(&self, method: &Method) -> HttpResponse {
        if method != Method::GET {
            return method_not_allowed(&[Method::GET]);
        }

        let mut response = Response::new(Full::new(self.body.clone()));
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/html"),
        );
        response
    }
}

impl Default for StaticPage {
    fn default() -> Self {
        Self::new(Bytes::from_static(DEFAULT_INDEX_HTML))
    }
}

/// `405 Method Not Allowed` listing the allowed methods.
pub fn method_not_allowed(allowed: &[Method]) -> HttpResponse {
    let allow = allowed
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(", ");

    let mut response = Response::new(Full::new(Bytes::from_static(b"Method Not Allowed")));
    *response.status_mut() = StatusCode::METHOD_NOT_ALLOWED;
    if let Ok(value) = HeaderValue::from_str(&allow) {
        response.headers_mut().insert(header::ALLOW, value);
    }
    response
}

/// `404 Not Found`.
pub fn not_found() -> HttpResponse {
    let mut response = Response::new(Full::new(Bytes::from_static(b"Not Found")));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}
