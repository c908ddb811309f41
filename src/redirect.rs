use http::header::{AUTHORIZATION, COOKIE, HOST, LOCATION, PROXY_AUTHORIZATION};
use http::{HeaderMap, Method, StatusCode};
use url::Url;

use crate::command::HttpCommand;
use crate::error::Error;
use crate::message::HttpMessage;
use crate::response::HttpResponse;
use crate::util::redact_uri_for_logs;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RedirectPolicy {
    enabled: bool,
    max_redirects: usize,
}

impl RedirectPolicy {
    pub const fn none() -> Self {
        Self {
            enabled: false,
            max_redirects: 0,
        }
    }

    pub const fn limited(max_redirects: usize) -> Self {
        Self {
            enabled: true,
            max_redirects,
        }
    }

    pub const fn enabled(self) -> bool {
        self.enabled
    }

    pub const fn max_redirects(self) -> usize {
        if self.enabled { self.max_redirects } else { 0 }
    }
}

impl Default for RedirectPolicy {
    fn default() -> Self {
        Self::limited(5)
    }
}

pub(crate) fn redirect_method(method: &Method, status: u16) -> Method {
    match StatusCode::from_u16(status) {
        Ok(StatusCode::SEE_OTHER) => Method::GET,
        Ok(StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND) if *method == Method::POST => {
            Method::GET
        }
        _ => method.clone(),
    }
}

pub(crate) fn same_origin(left: &Url, right: &Url) -> bool {
    left.scheme().eq_ignore_ascii_case(right.scheme())
        && left
            .host_str()
            .unwrap_or_default()
            .eq_ignore_ascii_case(right.host_str().unwrap_or_default())
        && left.port_or_known_default() == right.port_or_known_default()
}

fn strip_credentials(headers: &mut HeaderMap) {
    headers.remove(AUTHORIZATION);
    headers.remove(PROXY_AUTHORIZATION);
    headers.remove(COOKIE);
}

/// Where a 3xx response points: `Location` resolved against the current
/// endpoint, else the response's `Host` header with the current path.
pub(crate) fn redirect_target(
    method: &Method,
    current: &Url,
    response: &HttpResponse,
) -> crate::Result<Url> {
    let invalid = |location: &str| Error::InvalidRedirectLocation {
        location: location.to_owned(),
        method: method.clone(),
        uri: redact_uri_for_logs(current.as_str()),
    };

    if let Some(location) = response.first_header_or_none(LOCATION.as_str()) {
        let target = current
            .join(location.trim())
            .map_err(|_| invalid(location))?;
        return match target.host_str() {
            Some(host) if !host.is_empty() => Ok(target),
            _ => Err(invalid(location)),
        };
    }

    if let Some(host) = response.first_header_or_none(HOST.as_str()) {
        let (name, port) = match host.rsplit_once(':') {
            Some((name, port)) if !port.is_empty() && port.chars().all(|ch| ch.is_ascii_digit()) => {
                (name, Some(port.parse::<u16>().map_err(|_| invalid(host))?))
            }
            _ => (host, current.port()),
        };
        let mut target = current.clone();
        target.set_host(Some(name)).map_err(|_| invalid(host))?;
        target.set_port(port).map_err(|()| invalid(host))?;
        return Ok(target);
    }

    Err(Error::MissingRedirectLocation {
        status: response.status(),
        method: method.clone(),
        uri: redact_uri_for_logs(current.as_str()),
    })
}

/// Rewrites the command's current request to follow `response`.
///
/// The method becomes GET for 303, and for 301/302 answering a POST. A
/// cross-origin target loses credential headers.
pub(crate) fn follow_redirect(
    command: &mut HttpCommand,
    response: &HttpResponse,
) -> crate::Result<()> {
    let current = command.current_request().endpoint().clone();
    let method = command.current_request().method().clone();
    let target = redirect_target(&method, &current, response)?;

    if redirect_method(&method, response.status()) == Method::GET && method != Method::GET {
        command.change_to_get_request();
    }

    if !same_origin(&current, &target) {
        let mut request = command.current_request().clone();
        strip_credentials(request.headers_mut());
        command.set_current_request(request);
    }
    command.change_endpoint_to(target)
}

#[cfg(test)]
mod tests {
    use http::Method;
    use url::Url;

    use super::{follow_redirect, redirect_method, redirect_target, same_origin};
    use crate::command::HttpCommand;
    use crate::error::Error;
    use crate::message::HttpMessage;
    use crate::request::HttpRequest;
    use crate::response::HttpResponse;

    fn redirect(location: &str) -> HttpResponse {
        HttpResponse::builder()
            .status(302)
            .try_header("Location", location)
            .expect("header")
            .build()
    }

    #[test]
    fn relative_location_resolves_against_current_endpoint() {
        let current = Url::parse("https://vcloud.example.com/api/vApp/1?x=1").expect("url");
        let target = redirect_target(&Method::GET, &current, &redirect("/api/vApp/2")).expect("target");
        assert_eq!(target.as_str(), "https://vcloud.example.com/api/vApp/2");
    }

    #[test]
    fn host_header_is_used_without_location() {
        let current = Url::parse("https://s3.example.com/bucket/key").expect("url");
        let response = HttpResponse::builder()
            .status(307)
            .try_header("Host", "bucket.s3-eu.example.com")
            .expect("header")
            .build();
        let target = redirect_target(&Method::GET, &current, &response).expect("target");
        assert_eq!(target.as_str(), "https://bucket.s3-eu.example.com/bucket/key");
    }

    #[test]
    fn missing_location_and_host_fails() {
        let current = Url::parse("https://s3.example.com/").expect("url");
        let response = HttpResponse::builder().status(301).build();
        let error = redirect_target(&Method::GET, &current, &response).expect_err("no target");
        assert!(matches!(error, Error::MissingRedirectLocation { status: 301, .. }));
    }

    #[test]
    fn location_without_host_is_invalid() {
        let current = Url::parse("https://s3.example.com/").expect("url");
        let error = redirect_target(&Method::GET, &current, &redirect("mailto:ops@example.com"))
            .expect_err("no host");
        assert!(matches!(error, Error::InvalidRedirectLocation { .. }));
    }

    #[test]
    fn see_other_switches_to_get() {
        assert_eq!(redirect_method(&Method::PUT, 303), Method::GET);
        assert_eq!(redirect_method(&Method::POST, 302), Method::GET);
        assert_eq!(redirect_method(&Method::PUT, 302), Method::PUT);
        assert_eq!(redirect_method(&Method::POST, 307), Method::POST);
    }

    #[test]
    fn cross_origin_redirect_drops_credentials() {
        let request = HttpRequest::builder()
            .method("GET")
            .endpoint("https://vcloud.example.com/api/org")
            .try_header("Authorization", "Basic abc")
            .expect("header")
            .try_header("x-vcloud-authorization", "token")
            .expect("header")
            .build()
            .expect("request");
        let mut command = HttpCommand::new(request);
        follow_redirect(&mut command, &redirect("http://other.example.com:8080/api/org?page=2"))
            .expect("redirect");

        let current = command.current_request();
        assert_eq!(
            current.endpoint().as_str(),
            "http://other.example.com:8080/api/org?page=2"
        );
        assert_eq!(current.first_header_or_none("authorization"), None);
        assert_eq!(
            current.first_header_or_none("x-vcloud-authorization"),
            Some("token")
        );
    }

    #[test]
    fn same_origin_compares_default_ports() {
        let left = Url::parse("https://h.example.com/a").expect("url");
        let right = Url::parse("https://H.example.com:443/b").expect("url");
        assert!(same_origin(&left, &right));
        let other = Url::parse("http://h.example.com/a").expect("url");
        assert!(!same_origin(&left, &other));
    }
}
