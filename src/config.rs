use std::str::FromStr;
use std::time::Duration;

use crate::error::Error;
use crate::redirect::RedirectPolicy;

pub const PROPERTY_MAX_RETRIES: &str = "cloudhttp.max-retries";
pub const PROPERTY_MAX_REDIRECTS: &str = "cloudhttp.max-redirects";
pub const PROPERTY_REQUEST_TIMEOUT: &str = "cloudhttp.request-timeout";
pub const PROPERTY_CONNECT_TIMEOUT: &str = "cloudhttp.connect-timeout";
pub const PROPERTY_RELAX_HOSTNAME: &str = "cloudhttp.relax-hostname";
pub const PROPERTY_TRUST_ALL_CERTS: &str = "cloudhttp.trust-all-certs";
pub const PROPERTY_MAX_CONNECTIONS: &str = "cloudhttp.max-connections";
pub const PROPERTY_MAX_CONNECTIONS_PER_HOST: &str = "cloudhttp.max-connections-per-host";
pub const PROPERTY_RETRY_DELAY_START: &str = "cloudhttp.retry-delay-start";
pub const PROPERTY_MAX_RETRY_DELAY: &str = "cloudhttp.max-retry-delay";

/// Values the pipeline compares against or hands to the transport.
/// Nothing here is computed by the pipeline itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpConfig {
    max_retries: usize,
    max_redirects: usize,
    request_timeout: Duration,
    connect_timeout: Duration,
    relax_hostname: bool,
    trust_all_certs: bool,
    max_connections: usize,
    max_connections_per_host: usize,
    retry_delay_start: Duration,
    max_retry_delay: Duration,
    max_error_body_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            max_redirects: 5,
            request_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(60),
            relax_hostname: false,
            trust_all_certs: false,
            max_connections: 20,
            max_connections_per_host: 0,
            retry_delay_start: Duration::from_millis(50),
            max_retry_delay: Duration::from_secs(5),
            max_error_body_bytes: 2048,
        }
    }
}

impl HttpConfig {
    /// Defaults overridden by `cloudhttp.*` properties. Durations are in
    /// milliseconds; unknown keys are ignored.
    pub fn from_properties<I, K, V>(properties: I) -> crate::Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        for (key, value) in properties {
            let key = key.as_ref();
            let value = value.as_ref().trim();
            match key {
                PROPERTY_MAX_RETRIES => config.max_retries = parse_property(key, value)?,
                PROPERTY_MAX_REDIRECTS => config.max_redirects = parse_property(key, value)?,
                PROPERTY_REQUEST_TIMEOUT => config.request_timeout = parse_millis(key, value)?,
                PROPERTY_CONNECT_TIMEOUT => config.connect_timeout = parse_millis(key, value)?,
                PROPERTY_RELAX_HOSTNAME => config.relax_hostname = parse_property(key, value)?,
                PROPERTY_TRUST_ALL_CERTS => config.trust_all_certs = parse_property(key, value)?,
                PROPERTY_MAX_CONNECTIONS => config.max_connections = parse_property(key, value)?,
                PROPERTY_MAX_CONNECTIONS_PER_HOST => {
                    config.max_connections_per_host = parse_property(key, value)?
                }
                PROPERTY_RETRY_DELAY_START => {
                    config.retry_delay_start = parse_millis(key, value)?
                }
                PROPERTY_MAX_RETRY_DELAY => config.max_retry_delay = parse_millis(key, value)?,
                _ => {}
            }
        }
        Ok(config)
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_relax_hostname(mut self, relax_hostname: bool) -> Self {
        self.relax_hostname = relax_hostname;
        self
    }

    pub fn with_trust_all_certs(mut self, trust_all_certs: bool) -> Self {
        self.trust_all_certs = trust_all_certs;
        self
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_max_connections_per_host(mut self, max_connections_per_host: usize) -> Self {
        self.max_connections_per_host = max_connections_per_host;
        self
    }

    pub fn with_retry_delay_start(mut self, retry_delay_start: Duration) -> Self {
        self.retry_delay_start = retry_delay_start;
        self
    }

    pub fn with_max_retry_delay(mut self, max_retry_delay: Duration) -> Self {
        self.max_retry_delay = max_retry_delay;
        self
    }

    pub fn with_max_error_body_bytes(mut self, max_error_body_bytes: usize) -> Self {
        self.max_error_body_bytes = max_error_body_bytes;
        self
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    pub fn max_redirects(&self) -> usize {
        self.max_redirects
    }

    pub fn redirect_policy(&self) -> RedirectPolicy {
        RedirectPolicy::limited(self.max_redirects)
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn relax_hostname(&self) -> bool {
        self.relax_hostname
    }

    pub fn trust_all_certs(&self) -> bool {
        self.trust_all_certs
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Zero means no per-host bound.
    pub fn max_connections_per_host(&self) -> usize {
        self.max_connections_per_host
    }

    pub fn retry_delay_start(&self) -> Duration {
        self.retry_delay_start
    }

    pub fn max_retry_delay(&self) -> Duration {
        self.max_retry_delay
    }

    pub fn max_error_body_bytes(&self) -> usize {
        self.max_error_body_bytes
    }
}

fn parse_property<T: FromStr>(key: &str, value: &str) -> crate::Result<T> {
    value.parse().map_err(|_| Error::InvalidProperty {
        key: key.to_owned(),
        value: value.to_owned(),
    })
}

fn parse_millis(key: &str, value: &str) -> crate::Result<Duration> {
    parse_property::<u64>(key, value).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::HttpConfig;
    use crate::error::Error;

    #[test]
    fn properties_override_defaults() {
        let config = HttpConfig::from_properties([
            ("cloudhttp.max-retries", "2"),
            ("cloudhttp.request-timeout", "1500"),
            ("cloudhttp.relax-hostname", "true"),
            ("cloudhttp.max-connections-per-host", " 4 "),
            ("jclouds.unrelated", "x"),
        ])
        .expect("valid properties");

        assert_eq!(config.max_retries(), 2);
        assert_eq!(config.request_timeout(), Duration::from_millis(1500));
        assert!(config.relax_hostname());
        assert_eq!(config.max_connections_per_host(), 4);
        assert_eq!(config.max_redirects(), 5);
    }

    #[test]
    fn unparsable_property_is_rejected() {
        let error = HttpConfig::from_properties([("cloudhttp.max-redirects", "many")])
            .expect_err("not a number");
        assert!(matches!(
            error,
            Error::InvalidProperty { ref key, ref value }
                if key == "cloudhttp.max-redirects" && value == "many"
        ));
    }

    #[test]
    fn setters_chain() {
        let config = HttpConfig::default()
            .with_max_retries(0)
            .with_max_redirects(1)
            .with_trust_all_certs(true);
        assert_eq!(config.max_retries(), 0);
        assert_eq!(config.redirect_policy().max_redirects(), 1);
        assert!(config.trust_all_certs());
    }
}
