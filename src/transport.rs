use std::future::Future;
use std::sync::Arc;

use crate::request::HttpRequest;
use crate::response::HttpResponse;

/// Performs one HTTP exchange.
///
/// Given a fully built request it yields the response (status, message,
/// headers, payload) or a transport failure. Redirects, retries and status
/// handling belong to the executor, never to the transport.
pub trait HttpTransport: Send + Sync + 'static {
    fn execute(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = crate::Result<HttpResponse>> + Send;
}

impl<T> HttpTransport for Arc<T>
where
    T: HttpTransport,
{
    fn execute(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = crate::Result<HttpResponse>> + Send {
        (**self).execute(request)
    }
}

#[cfg(feature = "hyper-transport")]
pub use self::hyper_transport::HyperTransport;

#[cfg(feature = "hyper-transport")]
mod hyper_transport {
    use std::convert::Infallible;
    use std::error::Error as StdError;
    use std::sync::Arc;

    use bytes::Bytes;
    use http::header::{HeaderMap, TRANSFER_ENCODING};
    use http::{Method, Request, StatusCode, Uri};
    use http_body_util::combinators::BoxBody;
    use http_body_util::{BodyExt, Full};
    use hyper_rustls::HttpsConnectorBuilder;
    use hyper_util::client::legacy::Client;
    use hyper_util::client::legacy::connect::HttpConnector;
    use hyper_util::rt::TokioExecutor;
    use tracing::debug;

    use super::HttpTransport;
    use crate::config::HttpConfig;
    use crate::error::{Error, TimeoutPhase, TransportErrorKind};
    use crate::limiters::ConnectionLimiters;
    use crate::message::HttpMessage;
    use crate::payload::{ContentMetadata, Payload, is_content_header};
    use crate::request::HttpRequest;
    use crate::response::HttpResponse;
    use crate::tls::{TlsVerification, client_config};
    use crate::util::redact_uri_for_logs;

    type BoxBodyError = Box<dyn StdError + Send + Sync>;
    type ReqBody = BoxBody<Bytes, BoxBodyError>;
    type TransportClient = Client<hyper_rustls::HttpsConnector<HttpConnector>, ReqBody>;

    fn map_infallible_to_box_error(never: Infallible) -> BoxBodyError {
        match never {}
    }

    fn buffered_req_body(body: Bytes) -> ReqBody {
        Full::new(body).map_err(map_infallible_to_box_error).boxed()
    }

    /// hyper + rustls transport with pooled connections and connection limits.
    #[derive(Clone)]
    pub struct HyperTransport {
        client: TransportClient,
        limiters: ConnectionLimiters,
        connect_timeout: std::time::Duration,
    }

    impl std::fmt::Debug for HyperTransport {
        fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            formatter
                .debug_struct("HyperTransport")
                .field("connect_timeout", &self.connect_timeout)
                .finish_non_exhaustive()
        }
    }

    impl HyperTransport {
        pub fn new(config: &HttpConfig) -> crate::Result<Self> {
            let verification =
                TlsVerification::from_flags(config.relax_hostname(), config.trust_all_certs());
            let tls = client_config(verification)?;

            let mut http = HttpConnector::new();
            http.enforce_http(false);
            http.set_connect_timeout(Some(config.connect_timeout()));

            let https = HttpsConnectorBuilder::new()
                .with_tls_config(tls)
                .https_or_http()
                .enable_http1()
                .enable_http2()
                .wrap_connector(http);
            let mut builder = Client::builder(TokioExecutor::new());
            if config.max_connections_per_host() > 0 {
                builder.pool_max_idle_per_host(config.max_connections_per_host());
            }
            let client = builder.build(https);

            Ok(Self {
                client,
                limiters: ConnectionLimiters::new(
                    config.max_connections(),
                    config.max_connections_per_host(),
                ),
                connect_timeout: config.connect_timeout(),
            })
        }

        fn transport_error(
            &self,
            source: hyper_util::client::legacy::Error,
            method: &Method,
            uri: &str,
        ) -> Error {
            let kind = classify_transport_error(&source);
            if kind == TransportErrorKind::Connect && is_timeout(&source) {
                return Error::Timeout {
                    phase: TimeoutPhase::Connect,
                    timeout_ms: self.connect_timeout.as_millis(),
                    method: method.clone(),
                    uri: uri.to_owned(),
                };
            }
            Error::Transport {
                kind,
                method: method.clone(),
                uri: uri.to_owned(),
                source: Arc::new(source),
            }
        }
    }

    impl HttpTransport for HyperTransport {
        async fn execute(&self, request: HttpRequest) -> crate::Result<HttpResponse> {
            let method = request.method().clone();
            let endpoint = request.endpoint();
            let redacted_uri = redact_uri_for_logs(endpoint.as_str());
            let uri: Uri = endpoint.as_str().parse().map_err(|_| Error::InvalidUri {
                uri: redacted_uri.clone(),
            })?;
            let host_key = format!(
                "{}:{}",
                endpoint.host_str().unwrap_or_default(),
                endpoint.port_or_known_default().unwrap_or_default()
            );

            let mut headers = request.headers().clone();
            headers.remove(TRANSFER_ENCODING);
            let body = match request.payload() {
                Some(payload) => {
                    for (name, value) in payload.metadata().to_headers() {
                        headers.insert(name, value);
                    }
                    read_payload(payload.clone()).await?
                }
                None => Bytes::new(),
            };

            let _permits = self
                .limiters
                .acquire(&host_key)
                .await
                .map_err(|source| Error::Transport {
                    kind: TransportErrorKind::Other,
                    method: method.clone(),
                    uri: redacted_uri.clone(),
                    source: Arc::new(source),
                })?;

            let mut wire_request = Request::builder().method(method.clone()).uri(uri);
            if let Some(target) = wire_request.headers_mut() {
                *target = headers;
            }
            let wire_request = wire_request
                .body(buffered_req_body(body))
                .map_err(|source| Error::RequestBuild {
                    message: source.to_string(),
                })?;

            let response = self
                .client
                .request(wire_request)
                .await
                .map_err(|source| self.transport_error(source, &method, &redacted_uri))?;
            let (parts, incoming) = response.into_parts();
            let body = incoming
                .collect()
                .await
                .map_err(|source| Error::Transport {
                    kind: TransportErrorKind::Read,
                    method: method.clone(),
                    uri: redacted_uri.clone(),
                    source: Arc::new(source),
                })?
                .to_bytes();
            debug!(status = parts.status.as_u16(), bytes = body.len(), "exchange completed");

            Ok(into_response(parts.status, parts.headers, body))
        }
    }

    async fn read_payload(payload: Payload) -> crate::Result<Bytes> {
        tokio::task::spawn_blocking(move || payload.to_bytes())
            .await
            .map_err(|source| Error::TaskJoin {
                source: Arc::new(source),
            })?
    }

    /// Content headers move from the header map into the payload metadata.
    fn into_response(status: StatusCode, mut headers: HeaderMap, body: Bytes) -> HttpResponse {
        let mut metadata = ContentMetadata::from_headers(&headers);
        let has_content_headers = headers.keys().any(is_content_header);
        let content_headers: Vec<_> = headers
            .keys()
            .filter(|name| is_content_header(name))
            .cloned()
            .collect();
        for name in content_headers {
            headers.remove(name);
        }

        let mut builder = HttpResponse::builder()
            .status(status.as_u16())
            .message(status.canonical_reason().unwrap_or_default())
            .headers(headers);
        if !body.is_empty() || has_content_headers {
            if metadata.content_length().is_none() {
                metadata.set_content_length(Some(body.len() as u64));
            }
            builder = builder.payload(Payload::from_bytes(body).with_metadata(metadata));
        }
        builder.build()
    }

    fn is_timeout(error: &hyper_util::client::legacy::Error) -> bool {
        let mut source = error.source();
        while let Some(cause) = source {
            if let Some(io) = cause.downcast_ref::<std::io::Error>()
                && io.kind() == std::io::ErrorKind::TimedOut
            {
                return true;
            }
            source = cause.source();
        }
        error.to_string().to_ascii_lowercase().contains("timed out")
    }

    fn classify_transport_error(error: &hyper_util::client::legacy::Error) -> TransportErrorKind {
        let text = error_chain_text(error);
        if error.is_connect() {
            if text.contains("dns")
                || text.contains("name or service not known")
                || text.contains("failed to lookup address")
            {
                return TransportErrorKind::Dns;
            }
            if text.contains("tls") || text.contains("certificate") || text.contains("handshake") {
                return TransportErrorKind::Tls;
            }
            return TransportErrorKind::Connect;
        }

        if text.contains("read")
            || text.contains("connection reset")
            || text.contains("connection closed")
            || text.contains("broken pipe")
            || text.contains("unexpected eof")
        {
            return TransportErrorKind::Read;
        }

        TransportErrorKind::Other
    }

    fn error_chain_text(error: &(dyn StdError + 'static)) -> String {
        let mut text = error.to_string().to_ascii_lowercase();
        let mut source = error.source();
        while let Some(cause) = source {
            text.push_str(": ");
            text.push_str(&cause.to_string().to_ascii_lowercase());
            source = cause.source();
        }
        text
    }

    #[cfg(test)]
    mod tests {
        use bytes::Bytes;
        use http::header::{CONTENT_TYPE, ETAG, HeaderMap, HeaderValue};
        use http::StatusCode;

        use super::into_response;
        use crate::message::HttpMessage;

        #[test]
        fn content_headers_move_into_payload_metadata() {
            let mut headers = HeaderMap::new();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            headers.insert(ETAG, HeaderValue::from_static("\"v1\""));
            let response = into_response(StatusCode::OK, headers, Bytes::from_static(b"{}"));

            assert_eq!(response.first_header_or_none("content-type"), None);
            assert_eq!(response.first_header_or_none("etag"), Some("\"v1\""));
            let payload = response.payload().expect("payload");
            assert_eq!(payload.metadata().content_type(), Some("application/json"));
            assert_eq!(payload.metadata().content_length(), Some(2));
            assert_eq!(response.message(), "OK");
        }

        #[test]
        fn empty_body_without_content_headers_has_no_payload() {
            let response = into_response(StatusCode::NO_CONTENT, HeaderMap::new(), Bytes::new());
            assert!(response.payload().is_none());
            assert_eq!(response.status(), 204);
        }
    }
}
