use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use http::header::{AUTHORIZATION, HeaderMap, HeaderValue};

use crate::error::Error;
use crate::request::HttpRequest;

/// Transforms a request right before it goes on the wire.
///
/// Filters run on every attempt, including retries and redirects, so they
/// must give the same result when applied to a request they already touched.
pub trait HttpRequestFilter: Send + Sync {
    fn filter(&self, request: HttpRequest) -> crate::Result<HttpRequest>;
}

impl<F> HttpRequestFilter for F
where
    F: Fn(HttpRequest) -> crate::Result<HttpRequest> + Send + Sync,
{
    fn filter(&self, request: HttpRequest) -> crate::Result<HttpRequest> {
        self(request)
    }
}

/// Applies each of the request's filters in order.
pub(crate) fn apply_filters(request: HttpRequest) -> crate::Result<HttpRequest> {
    let filters = request.filters().to_vec();
    filters
        .iter()
        .try_fold(request, |request, filter| filter.filter(request))
}

/// Sets `Authorization: Basic ...`, replacing any previous value.
#[derive(Clone)]
pub struct BasicAuthentication {
    header: HeaderValue,
}

impl BasicAuthentication {
    pub fn new(user: &str, password: &str) -> crate::Result<Self> {
        let encoded = STANDARD.encode(format!("{user}:{password}"));
        let mut header = HeaderValue::from_str(&format!("Basic {encoded}")).map_err(|source| {
            Error::InvalidHeaderValue {
                name: AUTHORIZATION.to_string(),
                source: Arc::new(source),
            }
        })?;
        header.set_sensitive(true);
        Ok(Self { header })
    }
}

impl std::fmt::Debug for BasicAuthentication {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("BasicAuthentication")
            .field("header", &"<redacted>")
            .finish()
    }
}

impl HttpRequestFilter for BasicAuthentication {
    fn filter(&self, request: HttpRequest) -> crate::Result<HttpRequest> {
        Ok(request.with_header(AUTHORIZATION, self.header.clone()))
    }
}

/// Replaces the listed headers on every request.
#[derive(Clone, Debug, Default)]
pub struct AddHeaders {
    headers: HeaderMap,
}

impl AddHeaders {
    pub fn new(headers: HeaderMap) -> Self {
        Self { headers }
    }
}

impl HttpRequestFilter for AddHeaders {
    fn filter(&self, mut request: HttpRequest) -> crate::Result<HttpRequest> {
        let target = request.headers_mut();
        for name in self.headers.keys() {
            target.remove(name);
            for value in self.headers.get_all(name) {
                target.append(name.clone(), value.clone());
            }
        }
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use http::header::{HeaderMap, HeaderValue};

    use super::{AddHeaders, BasicAuthentication, apply_filters};
    use crate::message::HttpMessage;
    use crate::request::HttpRequest;

    #[test]
    fn basic_authentication_is_idempotent() {
        let filter = Arc::new(BasicAuthentication::new("Aladdin", "open sesame").expect("filter"));
        let request = HttpRequest::builder()
            .method("GET")
            .endpoint("https://vcloud.example.com/api/login")
            .filter(filter)
            .build()
            .expect("build");

        let once = apply_filters(request).expect("first pass");
        let twice = apply_filters(once.clone()).expect("second pass");
        assert_eq!(
            twice.header_values("authorization"),
            ["Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ=="]
        );
        assert_eq!(once, twice);
    }

    #[test]
    fn filters_apply_in_order() {
        let mut first = HeaderMap::new();
        first.insert("x-order", HeaderValue::from_static("first"));
        let mut second = HeaderMap::new();
        second.insert("x-order", HeaderValue::from_static("second"));

        let request = HttpRequest::builder()
            .method("GET")
            .endpoint("https://elb.example.com/")
            .filter(Arc::new(AddHeaders::new(first)))
            .filter(Arc::new(AddHeaders::new(second)))
            .build()
            .expect("build");
        let filtered = apply_filters(request).expect("filters");
        assert_eq!(filtered.first_header_or_none("x-order"), Some("second"));
    }

    #[test]
    fn closures_can_be_filters() {
        let stamp = |request: HttpRequest| -> crate::Result<HttpRequest> {
            Ok(request.with_header(
                http::header::HeaderName::from_static("x-stamp"),
                HeaderValue::from_static("1"),
            ))
        };
        let request = HttpRequest::builder()
            .method("GET")
            .endpoint("https://elb.example.com/")
            .filter(Arc::new(stamp))
            .build()
            .expect("build");
        let filtered = apply_filters(request).expect("filters");
        assert_eq!(filtered.first_header_or_none("x-stamp"), Some("1"));
    }
}
