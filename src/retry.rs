use std::time::{Duration, SystemTime};

use rand::RngExt;

use crate::command::HttpCommand;
use crate::config::HttpConfig;
use crate::error::{Error, TransportErrorKind};
use crate::message::HttpMessage;
use crate::response::HttpResponse;
use crate::util::parse_retry_after;

/// Decides whether a failed attempt is resubmitted.
///
/// `should_retry_request` is only consulted for responses with status >= 500.
/// A handler that says yes is expected to bump the command's failure count;
/// the executor does it for handlers that don't, and enforces the retry
/// maximum on its own either way.
pub trait HttpRetryHandler: Send + Sync {
    fn should_retry_request(&self, command: &mut HttpCommand, response: &HttpResponse) -> bool;

    fn should_retry_transport_error(&self, command: &mut HttpCommand, error: &Error) -> bool {
        let _ = (command, error);
        false
    }

    /// Pause before the next attempt.
    fn retry_delay(&self, command: &HttpCommand, response: Option<&HttpResponse>) -> Duration {
        let _ = (command, response);
        Duration::ZERO
    }
}

impl<H> HttpRetryHandler for std::sync::Arc<H>
where
    H: HttpRetryHandler + ?Sized,
{
    fn should_retry_request(&self, command: &mut HttpCommand, response: &HttpResponse) -> bool {
        (**self).should_retry_request(command, response)
    }

    fn should_retry_transport_error(&self, command: &mut HttpCommand, error: &Error) -> bool {
        (**self).should_retry_transport_error(command, error)
    }

    fn retry_delay(&self, command: &HttpCommand, response: Option<&HttpResponse>) -> Duration {
        (**self).retry_delay(command, response)
    }
}

/// Retries every server error. Only the executor's retry maximum stops it.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysRetry;

impl HttpRetryHandler for AlwaysRetry {
    fn should_retry_request(&self, command: &mut HttpCommand, _response: &HttpResponse) -> bool {
        command.increment_failure_count();
        true
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NeverRetry;

impl HttpRetryHandler for NeverRetry {
    fn should_retry_request(&self, _command: &mut HttpCommand, _response: &HttpResponse) -> bool {
        false
    }
}

/// Retries replayable commands up to `max_retries` times with exponential
/// backoff and jitter, honoring `Retry-After`.
#[derive(Clone, Debug)]
pub struct BackoffLimitedRetryHandler {
    max_retries: usize,
    delay_start: Duration,
    max_delay: Duration,
    jitter_ratio: f64,
    retryable_transport_error_kinds: Vec<TransportErrorKind>,
}

impl Default for BackoffLimitedRetryHandler {
    fn default() -> Self {
        Self::from_config(&HttpConfig::default())
    }
}

impl BackoffLimitedRetryHandler {
    pub fn from_config(config: &HttpConfig) -> Self {
        Self {
            max_retries: config.max_retries(),
            delay_start: config.retry_delay_start(),
            max_delay: config.max_retry_delay(),
            jitter_ratio: 0.2,
            retryable_transport_error_kinds: vec![
                TransportErrorKind::Dns,
                TransportErrorKind::Connect,
                TransportErrorKind::Read,
            ],
        }
    }

    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn delay_start(mut self, delay_start: Duration) -> Self {
        self.delay_start = delay_start;
        if self.max_delay < self.delay_start {
            self.max_delay = self.delay_start;
        }
        self
    }

    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay.max(self.delay_start);
        self
    }

    pub fn jitter_ratio(mut self, jitter_ratio: f64) -> Self {
        self.jitter_ratio = jitter_ratio.clamp(0.0, 1.0);
        self
    }

    pub fn retryable_transport_error_kinds(
        mut self,
        kinds: impl IntoIterator<Item = TransportErrorKind>,
    ) -> Self {
        self.retryable_transport_error_kinds = kinds.into_iter().collect();
        self
    }

    fn authorize(&self, command: &mut HttpCommand) -> bool {
        if !command.is_replayable() || command.failure_count() >= self.max_retries {
            return false;
        }
        command.increment_failure_count();
        true
    }

    /// `start * 2^(failures - 1)`, capped at the max delay, then jittered.
    pub(crate) fn backoff_for_failure(&self, failure_count: usize) -> Duration {
        let capped_exponent = failure_count.saturating_sub(1).min(31) as u32;
        let multiplier = 1_u128 << capped_exponent;
        let base_ms = self.delay_start.as_millis();
        let max_ms = self.max_delay.as_millis().max(base_ms);
        let delay_ms = base_ms
            .saturating_mul(multiplier)
            .min(max_ms)
            .min(u64::MAX as u128) as u64;
        self.apply_jitter(Duration::from_millis(delay_ms))
    }

    fn apply_jitter(&self, backoff: Duration) -> Duration {
        if self.jitter_ratio <= f64::EPSILON {
            return backoff;
        }

        let backoff_ms = backoff.as_millis().min(u64::MAX as u128) as u64;
        if backoff_ms <= 1 {
            return backoff;
        }
        let max_delay_ms = self.max_delay.as_millis().min(u64::MAX as u128) as u64;

        let jitter_span = ((backoff_ms as f64) * self.jitter_ratio).round().max(1.0) as u64;
        let low = backoff_ms.saturating_sub(jitter_span);
        let high = backoff_ms.saturating_add(jitter_span).max(low);
        let mut rng = rand::rng();
        let sampled_ms = rng.random_range(low..=high).min(max_delay_ms.max(1));
        Duration::from_millis(sampled_ms)
    }
}

impl HttpRetryHandler for BackoffLimitedRetryHandler {
    fn should_retry_request(&self, command: &mut HttpCommand, _response: &HttpResponse) -> bool {
        self.authorize(command)
    }

    fn should_retry_transport_error(&self, command: &mut HttpCommand, error: &Error) -> bool {
        let Error::Transport { kind, .. } = error else {
            return false;
        };
        self.retryable_transport_error_kinds.contains(kind) && self.authorize(command)
    }

    fn retry_delay(&self, command: &HttpCommand, response: Option<&HttpResponse>) -> Duration {
        if let Some(retry_after) =
            response.and_then(|response| parse_retry_after(response.headers(), SystemTime::now()))
        {
            return retry_after.min(self.max_delay);
        }
        self.backoff_for_failure(command.failure_count())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::time::Duration;

    use super::{AlwaysRetry, BackoffLimitedRetryHandler, HttpRetryHandler, NeverRetry};
    use crate::command::HttpCommand;
    use crate::error::{Error, TransportErrorKind, shared_error};
    use crate::payload::Payload;
    use crate::request::HttpRequest;
    use crate::response::HttpResponse;

    fn command() -> HttpCommand {
        HttpCommand::new(HttpRequest::get("https://elb.example.com/").expect("request"))
    }

    fn server_error() -> HttpResponse {
        HttpResponse::builder().status(503).build()
    }

    #[test]
    fn backoff_handler_stops_at_max_retries() {
        let handler = BackoffLimitedRetryHandler::default().max_retries(2);
        let mut command = command();
        assert!(handler.should_retry_request(&mut command, &server_error()));
        assert!(handler.should_retry_request(&mut command, &server_error()));
        assert!(!handler.should_retry_request(&mut command, &server_error()));
        assert_eq!(command.failure_count(), 2);
    }

    #[test]
    fn backoff_handler_refuses_non_replayable_commands() {
        let request = HttpRequest::builder()
            .method("PUT")
            .endpoint("https://blob.example.com/c/o")
            .payload(Payload::from_reader(Cursor::new(b"data".to_vec())))
            .build()
            .expect("request");
        let mut command = HttpCommand::new(request);
        let handler = BackoffLimitedRetryHandler::default();
        assert!(!handler.should_retry_request(&mut command, &server_error()));
        assert_eq!(command.failure_count(), 0);
    }

    #[test]
    fn jittered_backoff_never_exceeds_max_delay() {
        let handler = BackoffLimitedRetryHandler::default()
            .delay_start(Duration::from_millis(100))
            .max_delay(Duration::from_millis(120))
            .jitter_ratio(1.0);
        for _ in 0..256 {
            assert!(handler.backoff_for_failure(3) <= Duration::from_millis(120));
        }
    }

    #[test]
    fn backoff_doubles_without_jitter() {
        let handler = BackoffLimitedRetryHandler::default()
            .delay_start(Duration::from_millis(50))
            .max_delay(Duration::from_secs(5))
            .jitter_ratio(0.0);
        assert_eq!(handler.backoff_for_failure(1), Duration::from_millis(50));
        assert_eq!(handler.backoff_for_failure(2), Duration::from_millis(100));
        assert_eq!(handler.backoff_for_failure(4), Duration::from_millis(400));
    }

    #[test]
    fn retry_after_overrides_backoff() {
        let handler = BackoffLimitedRetryHandler::default().max_delay(Duration::from_secs(10));
        let response = HttpResponse::builder()
            .status(503)
            .try_header("Retry-After", "2")
            .expect("header")
            .build();
        assert_eq!(
            handler.retry_delay(&command(), Some(&response)),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn transport_errors_retry_by_kind() {
        let handler = BackoffLimitedRetryHandler::default();
        let mut command = command();
        let connect = Error::Transport {
            kind: TransportErrorKind::Connect,
            method: http::Method::GET,
            uri: "https://elb.example.com/".to_owned(),
            source: shared_error("connection refused"),
        };
        let tls = Error::Transport {
            kind: TransportErrorKind::Tls,
            method: http::Method::GET,
            uri: "https://elb.example.com/".to_owned(),
            source: shared_error("bad certificate"),
        };
        assert!(handler.should_retry_transport_error(&mut command, &connect));
        assert!(!handler.should_retry_transport_error(&mut command, &tls));
        assert!(!handler.should_retry_transport_error(&mut command, &Error::Cancelled));
    }

    #[test]
    fn stock_handlers() {
        let mut command = command();
        assert!(AlwaysRetry.should_retry_request(&mut command, &server_error()));
        assert_eq!(command.failure_count(), 1);
        assert!(!NeverRetry.should_retry_request(&mut command, &server_error()));
    }
}
