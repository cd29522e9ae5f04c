//! Read-only view of an inbound HTTP request

use crate::metadata::header_text;
use cookie::Cookie;
use http::{header, HeaderMap, Method, Request, Uri};

/// The parts of an HTTP request the metadata extractor reads.
///
/// Implemented for [`http::Request`] and [`http::request::Parts`], so the
/// extractor can run before or after the body has been split off.
pub trait RequestView {
    fn headers(&self) -> &HeaderMap;

    fn method(&self) -> &Method;

    fn uri(&self) -> &Uri;

    /// Request target as received
    fn request_uri(&self) -> String {
        self.uri().to_string()
    }

    /// Authority of an absolute-form target, else the `Host` header
    fn host(&self) -> String {
        if let Some(authority) = self.uri().authority() {
            return authority.as_str().to_string();
        }
        self.headers()
            .get(header::HOST)
            .map(header_text)
            .unwrap_or_default()
    }

    /// `User-Agent` header, or an empty string
    fn user_agent(&self) -> String {
        self.headers()
            .get(header::USER_AGENT)
            .map(header_text)
            .unwrap_or_default()
    }

    /// Cookies sent with the request, in header order
    fn cookies(&self) -> Vec<(String, String)> {
        parse_cookies(self.headers())
    }
}

impl<B> RequestView for Request<B> {
    fn headers(&self) -> &HeaderMap {
        Request::headers(self)
    }

    fn method(&self) -> &Method {
        Request::method(self)
    }

    fn uri(&self) -> &Uri {
        Request::uri(self)
    }
}

impl RequestView for http::request::Parts {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn method(&self) -> &Method {
        &self.method
    }

    fn uri(&self) -> &Uri {
        &self.uri
    }
}

/// Parse every `Cookie` header into (name, value) pairs.
///
/// Each `;`-separated entry is decoded on its own, so a malformed or
/// non-UTF-8 entry only drops itself. Surrounding double quotes are removed
/// from values.
pub fn parse_cookies(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .flat_map(|value| value.as_bytes().split(|b| *b == b';'))
        .filter_map(|part| std::str::from_utf8(part).ok())
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .filter_map(|part| Cookie::parse(part).ok())
        .map(|cookie| (cookie.name().to_string(), cookie.value_trimmed().to_string()))
        .collect()
}
