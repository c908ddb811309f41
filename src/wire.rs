//! HTTP/1.1-style wire logging at `debug` on the `cloudhttp::wire` target.

use http::HeaderMap;
use http::header::{AUTHORIZATION, COOKIE, HeaderName, PROXY_AUTHORIZATION, SET_COOKIE};
use tracing::{Level, debug, enabled};

use crate::message::HttpMessage;
use crate::payload::Payload;
use crate::request::HttpRequest;
use crate::response::HttpResponse;

const WIRE_TARGET: &str = "cloudhttp::wire";
const REDACTED: &str = "<redacted>";

fn is_sensitive(name: &HeaderName) -> bool {
    *name == AUTHORIZATION || *name == PROXY_AUTHORIZATION || *name == COOKIE || *name == SET_COOKIE
}

pub(crate) fn render_headers(headers: &HeaderMap, payload: Option<&Payload>) -> Vec<String> {
    let mut lines: Vec<String> = headers
        .iter()
        .map(|(name, value)| {
            let value = if is_sensitive(name) || value.is_sensitive() {
                REDACTED
            } else {
                value.to_str().unwrap_or("<binary>")
            };
            format!("{name}: {value}")
        })
        .collect();
    if let Some(payload) = payload {
        for (name, value) in payload.metadata().to_headers() {
            lines.push(format!("{name}: {}", value.to_str().unwrap_or("<binary>")));
        }
    }
    lines
}

pub(crate) fn log_request(request: &HttpRequest) {
    if !enabled!(target: WIRE_TARGET, Level::DEBUG) {
        return;
    }
    debug!(target: WIRE_TARGET, ">> {}", request.request_line());
    for line in render_headers(request.headers(), request.payload()) {
        debug!(target: WIRE_TARGET, ">> {line}");
    }
}

pub(crate) fn log_response(response: &HttpResponse) {
    if !enabled!(target: WIRE_TARGET, Level::DEBUG) {
        return;
    }
    debug!(target: WIRE_TARGET, "<< {}", response.status_line());
    for line in render_headers(response.headers(), response.payload()) {
        debug!(target: WIRE_TARGET, "<< {line}");
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    use http::HeaderMap;
    use http::header::{AUTHORIZATION, COOKIE, HeaderValue, SET_COOKIE};

    use super::{log_request, log_response, render_headers};
    use crate::payload::Payload;
    use crate::request::HttpRequest;
    use crate::response::HttpResponse;
    use crate::util::lock_unpoisoned;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&lock_unpoisoned(&self.0)).into_owned()
        }
    }

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            lock_unpoisoned(&self.0).extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn capture_wire<F>(emit: F) -> String
    where
        F: FnOnce(),
    {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, emit);
        captured.text()
    }

    #[test]
    fn credentials_are_redacted_and_content_headers_appended() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        headers.insert(COOKIE, HeaderValue::from_static("vcloud-token=1"));
        headers.insert("x-request-id", HeaderValue::from_static("42"));
        let payload = Payload::from("<Org/>").with_content_type("application/xml");

        let lines = render_headers(&headers, Some(&payload));
        assert!(lines.contains(&"authorization: <redacted>".to_owned()));
        assert!(lines.contains(&"cookie: <redacted>".to_owned()));
        assert!(lines.contains(&"x-request-id: 42".to_owned()));
        assert!(lines.contains(&"content-type: application/xml".to_owned()));
        assert!(lines.contains(&"content-length: 6".to_owned()));
    }

    #[test]
    fn request_log_redacts_credentials() {
        let request = HttpRequest::builder()
            .method("PUT")
            .endpoint("https://vcloud.example.com/api/vApp/1")
            .header(AUTHORIZATION, HeaderValue::from_static("Basic YWRtaW46c2VjcmV0"))
            .header(COOKIE, HeaderValue::from_static("vcloud-token=abc"))
            .payload(Payload::from("<VApp/>").with_content_type("application/xml"))
            .build()
            .expect("request");

        let output = capture_wire(|| log_request(&request));

        assert!(output.contains(">> PUT https://vcloud.example.com/api/vApp/1"));
        assert!(output.contains(">> authorization: <redacted>"));
        assert!(output.contains(">> cookie: <redacted>"));
        assert!(output.contains(">> content-type: application/xml"));
        assert!(!output.contains("YWRtaW46c2VjcmV0"));
        assert!(!output.contains("vcloud-token=abc"));
    }

    #[test]
    fn response_log_redacts_cookies() {
        let response = HttpResponse::builder()
            .status(200)
            .header(SET_COOKIE, HeaderValue::from_static("vcloud-token=def; Secure"))
            .payload("<Session/>")
            .build();

        let output = capture_wire(|| log_response(&response));

        assert!(output.contains("<< HTTP/1.1 200 OK"));
        assert!(output.contains("<< set-cookie: <redacted>"));
        assert!(!output.contains("vcloud-token=def"));
    }
}
