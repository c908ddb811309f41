use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span, warn};

use crate::command::{CommandState, HttpCommand};
use crate::config::HttpConfig;
use crate::dispatch::{HttpErrorHandler, ResponseClass, StatusErrorHandler};
use crate::error::{Error, TimeoutPhase};
use crate::filter::apply_filters;
use crate::message::HttpMessage;
use crate::redirect::{RedirectPolicy, follow_redirect};
use crate::request::HttpRequest;
use crate::response::HttpResponse;
use crate::retry::{BackoffLimitedRetryHandler, HttpRetryHandler};
use crate::transport::HttpTransport;
use crate::util::redact_uri_for_logs;
use crate::wire;

/// Drives a command through the transport until it succeeds or fails for good.
///
/// Retries and redirects happen inside one call, strictly one attempt after
/// another. Each attempt reapplies the request filters and is a fresh
/// submission to the transport.
pub struct HttpCommandExecutorService<T> {
    transport: Arc<T>,
    config: HttpConfig,
    retry_handler: Arc<dyn HttpRetryHandler>,
    error_handler: Arc<dyn HttpErrorHandler>,
    redirect_policy: RedirectPolicy,
}

impl<T> Clone for HttpCommandExecutorService<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            config: self.config.clone(),
            retry_handler: Arc::clone(&self.retry_handler),
            error_handler: Arc::clone(&self.error_handler),
            redirect_policy: self.redirect_policy,
        }
    }
}

impl<T> std::fmt::Debug for HttpCommandExecutorService<T> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpCommandExecutorService")
            .field("config", &self.config)
            .field("redirect_policy", &self.redirect_policy)
            .finish_non_exhaustive()
    }
}

impl<T> HttpCommandExecutorService<T>
where
    T: HttpTransport,
{
    pub fn new(transport: T, config: HttpConfig) -> Self {
        Self {
            transport: Arc::new(transport),
            retry_handler: Arc::new(BackoffLimitedRetryHandler::from_config(&config)),
            error_handler: Arc::new(StatusErrorHandler::new(config.max_error_body_bytes())),
            redirect_policy: config.redirect_policy(),
            config,
        }
    }

    pub fn with_retry_handler<H>(mut self, retry_handler: H) -> Self
    where
        H: HttpRetryHandler + 'static,
    {
        self.retry_handler = Arc::new(retry_handler);
        self
    }

    pub fn with_error_handler<H>(mut self, error_handler: H) -> Self
    where
        H: HttpErrorHandler + 'static,
    {
        self.error_handler = Arc::new(error_handler);
        self
    }

    pub fn with_redirect_policy(mut self, redirect_policy: RedirectPolicy) -> Self {
        self.redirect_policy = redirect_policy;
        self
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Runs `request` as a fresh command and returns the final successful response.
    pub async fn submit(&self, request: HttpRequest) -> crate::Result<HttpResponse> {
        let mut command = HttpCommand::new(request);
        self.execute(&mut command, &CancellationToken::new()).await
    }

    /// Runs `command` to completion. A command that already carries an error
    /// is not submitted again; that error is returned instead. A failed
    /// command keeps its error.
    pub async fn execute(
        &self,
        command: &mut HttpCommand,
        cancellation: &CancellationToken,
    ) -> crate::Result<HttpResponse> {
        if let Some(error) = command.exception() {
            return Err(error.clone());
        }
        if command.state().is_terminal() {
            return Err(Error::RequestBuild {
                message: format!("command is already {}", command.state()),
            });
        }

        match self.run(command, cancellation).await {
            Ok(response) => {
                command.transition(CommandState::Succeeded);
                Ok(response)
            }
            Err(error) => {
                command.set_exception(error.clone());
                Err(command.exception().cloned().unwrap_or(error))
            }
        }
    }

    async fn run(
        &self,
        command: &mut HttpCommand,
        cancellation: &CancellationToken,
    ) -> crate::Result<HttpResponse> {
        command.current_request().check_required_properties()?;
        let max_retries = self.config.max_retries();
        let max_redirects = self.redirect_policy.max_redirects();
        let request_timeout = self.config.request_timeout();
        let mut attempt = 0_usize;

        loop {
            if cancellation.is_cancelled() {
                return Err(Error::Cancelled);
            }
            attempt += 1;
            let method = command.current_request().method().clone();
            let redacted_uri = redact_uri_for_logs(command.current_request().endpoint().as_str());
            if attempt > 1 && !command.is_replayable() {
                return Err(Error::NotReplayable {
                    method,
                    uri: redacted_uri,
                });
            }
            command.transition(CommandState::Submitted);

            let span = info_span!(
                "cloudhttp.request",
                method = %method,
                uri = %redacted_uri,
                attempt = attempt,
                redirects = command.redirect_count(),
                failures = command.failure_count()
            );
            let request = apply_filters(command.current_request().clone())?;
            span.in_scope(|| {
                wire::log_request(&request);
                debug!("sending request");
            });

            let started_at = Instant::now();
            let exchange = tokio::time::timeout(request_timeout, self.transport.execute(request))
                .instrument(span.clone());
            let outcome = tokio::select! {
                biased;
                _ = cancellation.cancelled() => return Err(Error::Cancelled),
                outcome = exchange => outcome,
            };
            let outcome = outcome.unwrap_or_else(|_| {
                Err(Error::Timeout {
                    phase: TimeoutPhase::Request,
                    timeout_ms: request_timeout.as_millis(),
                    method: method.clone(),
                    uri: redacted_uri.clone(),
                })
            });

            let response = match outcome {
                Ok(response) => response,
                Err(error) => {
                    if !self.retry_transport_error(command, &error, max_retries) {
                        return Err(error);
                    }
                    let delay = self.retry_handler.retry_delay(command, None);
                    span.in_scope(|| {
                        warn!(
                            delay_ms = delay.as_millis() as u64,
                            error = %error,
                            "retrying request after transport error"
                        );
                    });
                    command.transition(CommandState::Retried);
                    pause(delay, cancellation).await?;
                    continue;
                }
            };
            span.in_scope(|| {
                debug!(
                    status = response.status(),
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    "request completed"
                );
                wire::log_response(&response);
            });

            match ResponseClass::of(response.status()) {
                ResponseClass::Success => return Ok(response),
                ResponseClass::ClientError => return Err(self.fail_with(command, &response)),
                ResponseClass::ServerError => {
                    if !self.retry_server_error(command, &response, max_retries) {
                        return Err(self.fail_with(command, &response));
                    }
                    let delay = self.retry_handler.retry_delay(command, Some(&response));
                    response.release_payload();
                    span.in_scope(|| {
                        warn!(
                            delay_ms = delay.as_millis() as u64,
                            status = response.status(),
                            "retrying request after server error"
                        );
                    });
                    command.transition(CommandState::Retried);
                    pause(delay, cancellation).await?;
                }
                ResponseClass::Redirect => {
                    if !self.redirect_policy.enabled() {
                        return Err(self.fail_with(command, &response));
                    }
                    if command.redirect_count() >= max_redirects {
                        response.release_payload();
                        return Err(Error::RedirectLimitExceeded {
                            max_redirects,
                            method,
                            uri: redacted_uri,
                        });
                    }
                    let followed = follow_redirect(command, &response);
                    response.release_payload();
                    followed?;
                    command.increment_redirect_count();
                    command.transition(CommandState::Redirected);
                    span.in_scope(|| {
                        debug!(
                            status = response.status(),
                            location = %redact_uri_for_logs(command.current_request().endpoint().as_str()),
                            "following redirect"
                        );
                    });
                }
            }
        }
    }

    /// The handler decides; the executor caps the count and makes sure each
    /// authorized retry is counted once.
    fn retry_server_error(
        &self,
        command: &mut HttpCommand,
        response: &HttpResponse,
        max_retries: usize,
    ) -> bool {
        let before = command.failure_count();
        if before >= max_retries || !self.retry_handler.should_retry_request(command, response) {
            return false;
        }
        if command.failure_count() == before {
            command.increment_failure_count();
        }
        true
    }

    fn retry_transport_error(
        &self,
        command: &mut HttpCommand,
        error: &Error,
        max_retries: usize,
    ) -> bool {
        let before = command.failure_count();
        if before >= max_retries
            || !self
                .retry_handler
                .should_retry_transport_error(command, error)
        {
            return false;
        }
        if command.failure_count() == before {
            command.increment_failure_count();
        }
        true
    }

    fn fail_with(&self, command: &mut HttpCommand, response: &HttpResponse) -> Error {
        self.error_handler.handle(command, response);
        let error = match command.exception() {
            Some(error) => error.clone(),
            None => StatusErrorHandler::new(self.config.max_error_body_bytes())
                .error_for(command, response),
        };
        response.release_payload();
        error
    }
}

async fn pause(delay: Duration, cancellation: &CancellationToken) -> crate::Result<()> {
    if delay.is_zero() {
        return Ok(());
    }
    tokio::select! {
        biased;
        _ = cancellation.cancelled() => Err(Error::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}
