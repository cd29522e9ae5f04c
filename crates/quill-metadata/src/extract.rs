//! Request metadata extraction
//!
//! Translates an inbound HTTP request into the [`MetadataPairs`] sent with the
//! outbound RPC call:
//! 1. Headers accepted by the [`MetadataPolicy`], every value of each
//! 2. Request fields (method, endpoint, host, user agent)
//! 3. Cookies, as `http-request-cookie-<name>`

use crate::context::CallContext;
use crate::metadata::{header_text, MetadataPairs};
use crate::policy::{canonical_header_key, MetadataPolicy};
use crate::request::RequestView;
use std::sync::OnceLock;
use tracing::{debug, trace};

pub const REQUEST_METHOD_KEY: &str = "http-request-method";
pub const REQUEST_ENDPOINT_KEY: &str = "http-request-endpoint";
pub const REQUEST_HOST_KEY: &str = "http-request-host";
pub const USER_AGENT_KEY: &str = "http-userAgent";
pub const COOKIE_KEY_PREFIX: &str = "http-request-cookie-";

/// Context key for request metadata
struct IncomingMetadata(MetadataPairs);

fn default_policy() -> &'static MetadataPolicy {
    static POLICY: OnceLock<MetadataPolicy> = OnceLock::new();
    POLICY.get_or_init(MetadataPolicy::default)
}

/// Annotate `ctx` with metadata from `req` using the standard policy.
///
/// Returns `ctx` itself when there is nothing to attach.
pub fn annotate_context<R>(ctx: &CallContext, req: &R) -> CallContext
where
    R: RequestView + ?Sized,
{
    default_policy().annotate(ctx, req)
}

impl MetadataPolicy {
    /// Build the metadata pairs for `req`
    pub fn extract<R>(&self, req: &R) -> MetadataPairs
    where
        R: RequestView + ?Sized,
    {
        let mut pairs = MetadataPairs::with_capacity(req.headers().len() + 4);

        for (name, value) in req.headers() {
            let canonical = canonical_header_key(name.as_str());
            match self.match_header(&canonical) {
                Some(key) => {
                    if !pairs.push(key, header_text(value)) {
                        trace!(header = %canonical, "header maps to an empty metadata key");
                    }
                }
                None => trace!(header = %canonical, "header not forwarded"),
            }
        }

        if self.includes_request_fields() {
            pairs.push(REQUEST_METHOD_KEY, req.method().as_str());
            pairs.push(REQUEST_ENDPOINT_KEY, req.request_uri());
            pairs.push(REQUEST_HOST_KEY, req.host());
            pairs.push(USER_AGENT_KEY, req.user_agent());
        }

        for (name, value) in req.cookies() {
            pairs.push(format!("{}{}", COOKIE_KEY_PREFIX, name), value);
        }

        pairs
    }

    /// Derive a context carrying the metadata for `req`.
    ///
    /// If no pairs were produced the original context is returned, so callers
    /// can detect the no-op with [`CallContext::same_as`].
    pub fn annotate<R>(&self, ctx: &CallContext, req: &R) -> CallContext
    where
        R: RequestView + ?Sized,
    {
        let pairs = self.extract(req);
        if pairs.is_empty() {
            trace!("no request metadata to attach");
            return ctx.clone();
        }

        debug!(
            method = %req.method(),
            pairs = pairs.len(),
            "Annotated call context with request metadata"
        );
        ctx.with_value(IncomingMetadata(pairs))
    }
}

impl CallContext {
    /// Metadata attached by [`annotate_context`], if any
    pub fn incoming_metadata(&self) -> Option<&MetadataPairs> {
        self.value::<IncomingMetadata>().map(|md| &md.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, Request};
    use std::thread;

    fn request() -> http::request::Builder {
        Request::builder()
            .method(Method::GET)
            .uri("/v1/users/42?verbose=true")
            .header("host", "api.example.com")
            .header("user-agent", "quill-test/1.0")
    }

    fn metadata(req: &Request<()>) -> MetadataPairs {
        annotate_context(&CallContext::new(), req)
            .incoming_metadata()
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_authorization_forwarded() {
        let req = request()
            .header("authorization", "Bearer xyz")
            .body(())
            .unwrap();
        let md = metadata(&req);

        let auth: Vec<_> = md.iter().filter(|(k, _)| *k == "Authorization").collect();
        assert_eq!(auth, vec![("Authorization", "Bearer xyz")]);
    }

    #[test]
    fn test_grpc_metadata_prefix_stripped() {
        let req = request()
            .header("Grpc-Metadata-Trace-Id", "abc123")
            .body(())
            .unwrap();
        let md = metadata(&req);

        assert!(md.iter().any(|pair| pair == ("Trace-Id", "abc123")));
        assert!(!md.iter().any(|(k, _)| k.starts_with("Grpc-Metadata")));
    }

    #[test]
    fn test_grpc_metadata_prefix_alone_is_dropped() {
        let req = request()
            .header("grpc-metadata-", "orphan")
            .body(())
            .unwrap();
        let md = metadata(&req);

        assert!(!md.iter().any(|(_, v)| v == "orphan"));
    }

    #[test]
    fn test_csrf_header_forwarded() {
        let req = request()
            .header("X-PHABRICATOR-CSRF", "token-1")
            .body(())
            .unwrap();
        let md = metadata(&req);

        assert_eq!(md.get("X-Phabricator-Csrf"), Some("token-1"));
    }

    #[test]
    fn test_cors_headers_follow_policy() {
        let req = request()
            .header("access-control-request-method", "PUT")
            .header("access-control-", "bare")
            .body(())
            .unwrap();

        let md = metadata(&req);
        assert_eq!(md.get("Access-Control-"), Some("bare"));
        assert!(!md.contains_key("Access-Control-Request-Method"));

        let md = MetadataPolicy::new().forward_cors_headers().extract(&req);
        assert_eq!(md.get("Access-Control-Request-Method"), Some("PUT"));
    }

    #[test]
    fn test_unrelated_headers_dropped() {
        let req = request()
            .header("x-unrelated", "foo")
            .header("content-type", "application/json")
            .body(())
            .unwrap();
        let md = metadata(&req);

        assert!(!md.iter().any(|(_, v)| v == "foo"));
        assert!(!md.contains_key("X-Unrelated"));
        assert!(!md.contains_key("Content-Type"));
    }

    #[test]
    fn test_multi_valued_header_keeps_every_value() {
        let req = request()
            .header("grpc-metadata-tag", "a")
            .header("grpc-metadata-tag", "b")
            .body(())
            .unwrap();
        let md = metadata(&req);

        assert_eq!(md.get_all("Tag").collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_request_fields_appended() {
        let req = request().body(()).unwrap();
        let md = metadata(&req);

        let pairs: Vec<_> = md.iter().collect();
        assert_eq!(
            pairs,
            vec![
                (REQUEST_METHOD_KEY, "GET"),
                (REQUEST_ENDPOINT_KEY, "/v1/users/42?verbose=true"),
                (REQUEST_HOST_KEY, "api.example.com"),
                (USER_AGENT_KEY, "quill-test/1.0"),
            ]
        );
    }

    #[test]
    fn test_request_fields_follow_headers() {
        let req = request()
            .header("authorization", "Bearer xyz")
            .header("cookie", "session=abc")
            .body(())
            .unwrap();
        let md = metadata(&req);

        let keys: Vec<_> = md.iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            vec![
                "Authorization",
                REQUEST_METHOD_KEY,
                REQUEST_ENDPOINT_KEY,
                REQUEST_HOST_KEY,
                USER_AGENT_KEY,
                "http-request-cookie-session",
            ]
        );
    }

    #[test]
    fn test_cookies_appended() {
        let req = request()
            .header("cookie", "session=abc; theme=dark")
            .body(())
            .unwrap();
        let md = metadata(&req);

        assert_eq!(md.get("http-request-cookie-session"), Some("abc"));
        assert_eq!(md.get("http-request-cookie-theme"), Some("dark"));
        assert!(!md.contains_key("Cookie"));
    }

    #[test]
    fn test_non_utf8_value_copied_lossily() {
        let value = http::HeaderValue::from_bytes(b"Bearer \xff").unwrap();
        let req = request().header("authorization", value).body(()).unwrap();
        let md = metadata(&req);

        assert_eq!(md.get("Authorization"), Some("Bearer \u{fffd}"));
    }

    #[test]
    fn test_no_matching_headers_still_derives_context() {
        let base = CallContext::new();
        let req = Request::builder().uri("/").body(()).unwrap();

        let ctx = annotate_context(&base, &req);
        assert!(!ctx.same_as(&base));
        assert_eq!(ctx.incoming_metadata().map(MetadataPairs::len), Some(4));
    }

    #[test]
    fn test_empty_metadata_returns_same_context() {
        let base = CallContext::new().with_value(7u32);
        let req = request()
            .header("x-unrelated", "foo")
            .body(())
            .unwrap();

        let policy = MetadataPolicy::new().include_request_fields(false);
        let ctx = policy.annotate(&base, &req);

        assert!(ctx.same_as(&base));
        assert!(ctx.incoming_metadata().is_none());
    }

    #[test]
    fn test_annotate_preserves_parent_values() {
        let base = CallContext::new().with_value("request-1");
        let req = request().body(()).unwrap();

        let ctx = annotate_context(&base, &req);
        assert_eq!(ctx.value::<&str>(), Some(&"request-1"));
        assert!(base.incoming_metadata().is_none());
    }

    #[test]
    fn test_stored_pairs_do_not_shadow_incoming_metadata() {
        let req = request()
            .header("authorization", "Bearer xyz")
            .body(())
            .unwrap();
        let outgoing: MetadataPairs = vec![("x-outgoing", "1")].into_iter().collect();

        let ctx = annotate_context(&CallContext::new(), &req).with_value(outgoing.clone());

        let md = ctx.incoming_metadata().unwrap();
        assert_eq!(md.get("Authorization"), Some("Bearer xyz"));
        assert!(!md.contains_key("x-outgoing"));
        assert_eq!(ctx.value::<MetadataPairs>(), Some(&outgoing));
    }

    #[test]
    fn test_shared_default_policy() {
        assert!(std::ptr::eq(default_policy(), default_policy()));
        assert_eq!(default_policy(), &MetadataPolicy::new());
    }

    #[test]
    fn test_annotate_from_parts() {
        let (parts, _) = request()
            .header("authorization", "Bearer xyz")
            .body(())
            .unwrap()
            .into_parts();

        let ctx = annotate_context(&CallContext::new(), &parts);
        let md = ctx.incoming_metadata().unwrap();
        assert_eq!(md.get("Authorization"), Some("Bearer xyz"));
    }

    #[test]
    fn test_concurrent_requests_are_isolated() {
        let base = CallContext::new();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let base = base.clone();
                thread::spawn(move || {
                    let req = Request::builder()
                        .uri(format!("/v1/items/{}", i))
                        .header("grpc-metadata-request-id", i.to_string())
                        .body(())
                        .unwrap();
                    let ctx = annotate_context(&base, &req);
                    let md = ctx.incoming_metadata().unwrap();
                    (i, md.get("Request-Id").map(str::to_string))
                })
            })
            .collect();

        for handle in handles {
            let (i, seen) = handle.join().unwrap();
            assert_eq!(seen, Some(i.to_string()));
        }
        assert!(base.incoming_metadata().is_none());
    }
}
