use std::fmt;
use std::sync::Arc;

use http::header::{HeaderMap, HeaderName, HeaderValue, TRANSFER_ENCODING};
use http::Method;
use url::Url;

use crate::error::Error;
use crate::filter::HttpRequestFilter;
use crate::message::HttpMessage;
use crate::payload::{Payload, is_content_header};
use crate::uris::QueryParams;
use crate::util::{parse_header_name, parse_header_value};

pub(crate) const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// An immutable HTTP request: method, absolute endpoint, headers and an optional payload.
///
/// Endpoints always have a host; construction fails otherwise. Changes go
/// through [`HttpRequest::to_builder`] and produce a new value.
#[derive(Clone)]
pub struct HttpRequest {
    method: Method,
    endpoint: Url,
    headers: HeaderMap,
    payload: Option<Payload>,
    skips: Vec<char>,
    filters: Vec<Arc<dyn HttpRequestFilter>>,
}

impl HttpRequest {
    pub fn builder() -> HttpRequestBuilder {
        HttpRequestBuilder::default()
    }

    pub fn get(endpoint: &str) -> crate::Result<Self> {
        Self::builder().method("GET").endpoint(endpoint).build()
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Characters left unescaped when query or form parameters are encoded.
    pub fn skips(&self) -> &[char] {
        &self.skips
    }

    pub fn filters(&self) -> &[Arc<dyn HttpRequestFilter>] {
        &self.filters
    }

    /// `METHOD uri HTTP/1.1`, for logs only.
    pub fn request_line(&self) -> String {
        format!("{} {} HTTP/1.1", self.method, self.endpoint)
    }

    pub fn to_builder(&self) -> HttpRequestBuilder {
        HttpRequestBuilder {
            method: Some(self.method.as_str().to_owned()),
            endpoint: Some(self.endpoint.to_string()),
            headers: self.headers.clone(),
            payload: self.payload.clone(),
            skips: self.skips.clone(),
            filters: self.filters.clone(),
            error: None,
        }
    }

    /// Same request with another endpoint; the host invariant is checked again.
    pub fn with_endpoint(&self, endpoint: Url) -> crate::Result<Self> {
        check_host(&endpoint)?;
        let mut next = self.clone();
        next.endpoint = endpoint;
        Ok(next)
    }

    /// Sets `name` to `value`, dropping earlier values. Meant for filters.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub(crate) fn with_method(&self, method: Method) -> Self {
        let mut next = self.clone();
        next.method = method;
        next
    }

    pub(crate) fn without_payload(&self) -> Self {
        let mut next = self.clone();
        next.payload = None;
        next
    }

    pub(crate) fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Body content headers must be carried by the payload metadata, and a
    /// payload must either declare its length or go out chunked.
    pub fn check_required_properties(&self) -> crate::Result<()> {
        let Some(payload) = &self.payload else {
            return Ok(());
        };
        if let Some(name) = self.headers.keys().find(|name| is_content_header(name)) {
            return Err(Error::RequestBuild {
                message: format!(
                    "{name} must be set on the payload metadata, not as a header: {}",
                    self.request_line()
                ),
            });
        }
        let chunked = self
            .first_header_or_none(TRANSFER_ENCODING.as_str())
            .is_some_and(|value| value.eq_ignore_ascii_case("chunked"));
        if payload.metadata().content_length().is_none() && !chunked {
            return Err(Error::RequestBuild {
                message: format!(
                    "either chunked encoding must be set or content length set on the payload: {}",
                    self.request_line()
                ),
            });
        }
        Ok(())
    }
}

impl HttpMessage for HttpRequest {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }
}

impl PartialEq for HttpRequest {
    fn eq(&self, other: &Self) -> bool {
        self.method == other.method
            && self.endpoint == other.endpoint
            && self.headers == other.headers
            && self.payload == other.payload
            && self.skips == other.skips
            && self.filters.len() == other.filters.len()
            && self
                .filters
                .iter()
                .zip(&other.filters)
                .all(|(left, right)| Arc::ptr_eq(left, right))
    }
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("endpoint", &self.endpoint.as_str())
            .field("headers", &self.headers)
            .field("payload", &self.payload)
            .field("skips", &self.skips)
            .field("filters", &self.filters.len())
            .finish()
    }
}

impl fmt::Display for HttpRequest {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.request_line())
    }
}

fn check_host(endpoint: &Url) -> crate::Result<()> {
    match endpoint.host_str() {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err(Error::MissingHost {
            uri: endpoint.to_string(),
        }),
    }
}

struct EndpointParts<'a> {
    base: &'a str,
    path: &'a str,
    query: Option<&'a str>,
    fragment: Option<&'a str>,
}

fn split_endpoint(endpoint: &str) -> EndpointParts<'_> {
    let (rest, fragment) = match endpoint.split_once('#') {
        Some((rest, fragment)) => (rest, Some(fragment)),
        None => (endpoint, None),
    };
    let (rest, query) = match rest.split_once('?') {
        Some((rest, query)) => (rest, Some(query)),
        None => (rest, None),
    };
    let authority_start = rest.find("://").map_or(0, |index| index + 3);
    let path_start = rest[authority_start..]
        .find('/')
        .map_or(rest.len(), |index| authority_start + index);
    EndpointParts {
        base: &rest[..path_start],
        path: &rest[path_start..],
        query,
        fragment,
    }
}

fn join_endpoint(base: &str, path: &str, query: Option<&str>, fragment: Option<&str>) -> String {
    let mut endpoint = format!("{base}{path}");
    if let Some(query) = query.filter(|query| !query.is_empty()) {
        endpoint.push('?');
        endpoint.push_str(query);
    }
    if let Some(fragment) = fragment {
        endpoint.push('#');
        endpoint.push_str(fragment);
    }
    endpoint
}

/// Incremental construction of an [`HttpRequest`]. Validation happens in [`build`](Self::build).
#[derive(Clone, Default)]
pub struct HttpRequestBuilder {
    method: Option<String>,
    endpoint: Option<String>,
    headers: HeaderMap,
    payload: Option<Payload>,
    skips: Vec<char>,
    filters: Vec<Arc<dyn HttpRequestFilter>>,
    error: Option<String>,
}

impl HttpRequestBuilder {
    /// Any token is accepted, including non-standard verbs.
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn endpoint_url(self, endpoint: &Url) -> Self {
        self.endpoint(endpoint.to_string())
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn try_header(self, name: &str, value: &str) -> crate::Result<Self> {
        let name = parse_header_name(name)?;
        let value = parse_header_value(name.as_str(), value)?;
        Ok(self.header(name, value))
    }

    pub fn replace_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn remove_header(mut self, name: &str) -> Self {
        self.headers.remove(name);
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn payload(mut self, payload: impl Into<Payload>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn clear_payload(mut self) -> Self {
        self.payload = None;
        self
    }

    pub fn skips(mut self, skips: impl IntoIterator<Item = char>) -> Self {
        self.skips = skips.into_iter().collect();
        self
    }

    pub fn filter(mut self, filter: Arc<dyn HttpRequestFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn filters(mut self, filters: Vec<Arc<dyn HttpRequestFilter>>) -> Self {
        self.filters = filters;
        self
    }

    fn map_query(mut self, update: impl FnOnce(&mut QueryParams)) -> Self {
        let Some(endpoint) = self.endpoint.as_deref() else {
            self.error
                .get_or_insert_with(|| "endpoint must be set before query parameters".to_owned());
            return self;
        };
        let parts = split_endpoint(endpoint);
        let mut query = parts.query.map(QueryParams::parse).unwrap_or_default();
        update(&mut query);
        let encoded = query.encode(&self.skips);
        let rebuilt = join_endpoint(parts.base, parts.path, Some(&encoded), parts.fragment);
        self.endpoint = Some(rebuilt);
        self
    }

    /// Appends a value; existing values of `name` are kept.
    pub fn add_query_param(self, name: &str, value: &str) -> Self {
        self.map_query(|query| query.add(name, value))
    }

    /// Replaces all values of `name` with `value`.
    pub fn replace_query_param(self, name: &str, value: &str) -> Self {
        self.map_query(|query| query.replace(name, [value]))
    }

    pub fn replace_query_params<I, K, V>(self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.map_query(|query| {
            for (name, value) in params {
                query.replace(name, [value.into()]);
            }
        })
    }

    pub fn remove_query_param(self, name: &str) -> Self {
        self.map_query(|query| query.remove(name))
    }

    /// Swaps the endpoint path, keeping scheme, authority and query.
    pub fn replace_path(mut self, path: &str) -> Self {
        let Some(endpoint) = self.endpoint.as_deref() else {
            self.error
                .get_or_insert_with(|| "endpoint must be set before the path".to_owned());
            return self;
        };
        let parts = split_endpoint(endpoint);
        let path = if path.starts_with('/') || path.is_empty() {
            path.to_owned()
        } else {
            format!("/{path}")
        };
        let rebuilt = join_endpoint(parts.base, &path, parts.query, parts.fragment);
        self.endpoint = Some(rebuilt);
        self
    }

    fn map_form(mut self, update: impl FnOnce(&mut QueryParams)) -> Self {
        let mut form = match &self.payload {
            Some(payload) => match payload.to_bytes() {
                Ok(body) => QueryParams::parse(&String::from_utf8_lossy(&body)),
                Err(error) => {
                    self.error
                        .get_or_insert_with(|| format!("cannot read form payload: {error}"));
                    return self;
                }
            },
            None => QueryParams::new(),
        };
        update(&mut form);
        let payload = Payload::from_string(form.encode(&self.skips)).with_content_type(FORM_CONTENT_TYPE);
        self.payload = Some(payload);
        self
    }

    /// Appends a form parameter to the url-encoded payload, creating it if needed.
    pub fn add_form_param(self, name: &str, value: &str) -> Self {
        self.map_form(|form| form.add(name, value))
    }

    pub fn replace_form_param(self, name: &str, value: &str) -> Self {
        self.map_form(|form| form.replace(name, [value]))
    }

    pub fn replace_form_params<I, K, V>(self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.map_form(|form| {
            for (name, value) in params {
                form.replace(name, [value.into()]);
            }
        })
    }

    pub fn build(self) -> crate::Result<HttpRequest> {
        if let Some(message) = self.error {
            return Err(Error::RequestBuild { message });
        }
        let Some(method) = self.method else {
            return Err(Error::RequestBuild {
                message: "method is required".to_owned(),
            });
        };
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|_| Error::InvalidMethod { method })?;
        let Some(endpoint) = self.endpoint else {
            return Err(Error::RequestBuild {
                message: "endpoint is required".to_owned(),
            });
        };
        let endpoint = Url::parse(&endpoint).map_err(|_| Error::InvalidUri { uri: endpoint })?;
        check_host(&endpoint)?;

        Ok(HttpRequest {
            method,
            endpoint,
            headers: self.headers,
            payload: self.payload,
            skips: self.skips,
            filters: self.filters,
        })
    }
}

impl fmt::Debug for HttpRequestBuilder {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("HttpRequestBuilder")
            .field("method", &self.method)
            .field("endpoint", &self.endpoint)
            .field("headers", &self.headers)
            .field("payload", &self.payload)
            .field("skips", &self.skips)
            .field("filters", &self.filters.len())
            .field("error", &self.error)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use http::header::{CONTENT_TYPE, HeaderValue, TRANSFER_ENCODING};

    use super::HttpRequest;
    use crate::error::Error;
    use crate::message::HttpMessage;
    use crate::payload::Payload;
    use crate::uris::QueryParams;

    fn base() -> super::HttpRequestBuilder {
        HttpRequest::builder()
            .method("GET")
            .endpoint("https://vcloud.example.com/api/org?x=1")
    }

    #[test]
    fn building_twice_yields_equal_requests() {
        let builder = base()
            .try_header("x-vcloud-authorization", "token")
            .expect("valid header")
            .payload("<Org/>");
        let first = builder.clone().build().expect("first build");
        let second = builder.build().expect("second build");
        assert_eq!(first, second);
    }

    #[test]
    fn add_query_param_does_not_double_encode() {
        let request = HttpRequest::builder()
            .method("GET")
            .endpoint("https://h.example.com/p?x=1")
            .add_query_param("y", "2")
            .build()
            .expect("build");
        let query = QueryParams::parse(request.endpoint().query().unwrap_or_default());
        assert_eq!(query.get("x"), ["1"]);
        assert_eq!(query.get("y"), ["2"]);

        let spaced = HttpRequest::builder()
            .method("GET")
            .endpoint("https://h.example.com/p?name=a%20b")
            .add_query_param("y", "c d")
            .build()
            .expect("build");
        assert_eq!(spaced.endpoint().query(), Some("name=a%20b&y=c%20d"));
    }

    #[test]
    fn replace_query_param_is_last_writer_wins() {
        let request = base()
            .add_query_param("x", "2")
            .replace_query_param("x", "3")
            .build()
            .expect("build");
        assert_eq!(request.endpoint().query(), Some("x=3"));
    }

    #[test]
    fn skips_leave_characters_unescaped_in_query() {
        let request = base()
            .skips([':'])
            .replace_query_param("id", "urn:vcloud:vm:1")
            .build()
            .expect("build");
        assert_eq!(request.endpoint().query(), Some("x=1&id=urn:vcloud:vm:1"));
    }

    #[test]
    fn replace_path_keeps_query() {
        let request = base().replace_path("/api/vdc/7").build().expect("build");
        assert_eq!(
            request.endpoint().as_str(),
            "https://vcloud.example.com/api/vdc/7?x=1"
        );
    }

    #[test]
    fn form_params_merge_into_payload() {
        let request = HttpRequest::builder()
            .method("POST")
            .endpoint("https://elb.example.com/")
            .add_form_param("Action", "DescribeLoadBalancers")
            .add_form_param("LoadBalancerNames.member.1", "web")
            .replace_form_param("Action", "CreateLoadBalancer")
            .build()
            .expect("build");
        let payload = request.payload().expect("form payload");
        assert_eq!(
            payload.to_bytes().expect("read"),
            "Action=CreateLoadBalancer&LoadBalancerNames.member.1=web"
        );
        assert_eq!(
            payload.metadata().content_type(),
            Some("application/x-www-form-urlencoded")
        );
    }

    #[test]
    fn custom_methods_are_allowed() {
        let request = HttpRequest::builder()
            .method("PROPFIND")
            .endpoint("https://dav.example.com/")
            .build()
            .expect("custom verb");
        assert_eq!(request.method().as_str(), "PROPFIND");
        assert_eq!(
            request.request_line(),
            "PROPFIND https://dav.example.com/ HTTP/1.1"
        );
    }

    #[test]
    fn endpoints_without_host_are_rejected() {
        for endpoint in ["mailto:ops@example.com", "file:///tmp/x", "/relative", "no-scheme", ""] {
            let error = HttpRequest::builder()
                .method("GET")
                .endpoint(endpoint)
                .build()
                .expect_err("endpoint without host must fail");
            assert!(
                matches!(error, Error::MissingHost { .. } | Error::InvalidUri { .. }),
                "unexpected error for {endpoint}: {error}"
            );
        }
    }

    #[test]
    fn missing_method_or_endpoint_fails() {
        let no_method = HttpRequest::builder()
            .endpoint("https://x.example.com/")
            .build();
        assert!(matches!(no_method, Err(Error::RequestBuild { .. })));

        let no_endpoint = HttpRequest::builder().method("GET").build();
        assert!(matches!(no_endpoint, Err(Error::RequestBuild { .. })));

        let bad_method = HttpRequest::builder()
            .method("GE T")
            .endpoint("https://x.example.com/")
            .build();
        assert!(matches!(bad_method, Err(Error::InvalidMethod { .. })));
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let request = base()
            .try_header("X-Custom-Header", "one")
            .expect("header")
            .build()
            .expect("build");
        assert_eq!(request.first_header_or_none("x-custom-header"), Some("one"));
        assert_eq!(request.first_header_or_none("X-CUSTOM-HEADER"), Some("one"));
        assert_eq!(request.first_header_or_none("missing"), None);
    }

    #[test]
    fn required_properties_reject_content_headers_and_unknown_length() {
        let with_header = HttpRequest::builder()
            .method("PUT")
            .endpoint("https://x.example.com/blob")
            .payload("body")
            .replace_header(CONTENT_TYPE, HeaderValue::from_static("text/plain"))
            .build()
            .expect("build");
        assert!(with_header.check_required_properties().is_err());

        let unknown_length = HttpRequest::builder()
            .method("PUT")
            .endpoint("https://x.example.com/blob")
            .payload(Payload::from_reader(Cursor::new(b"body".to_vec())))
            .build()
            .expect("build");
        assert!(unknown_length.check_required_properties().is_err());

        let chunked = unknown_length
            .to_builder()
            .replace_header(TRANSFER_ENCODING, HeaderValue::from_static("chunked"))
            .build()
            .expect("build");
        assert!(chunked.check_required_properties().is_ok());
    }
}
