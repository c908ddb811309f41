use std::fmt;

use http::Method;
use url::Url;

use crate::error::Error;
use crate::message::HttpMessage;
use crate::request::HttpRequest;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandState {
    Created,
    Submitted,
    Succeeded,
    Redirected,
    Retried,
    Failed,
    Cancelled,
}

impl CommandState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Submitted => "submitted",
            Self::Succeeded => "succeeded",
            Self::Redirected => "redirected",
            Self::Retried => "retried",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for CommandState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Mutable state of one logical HTTP operation across all of its attempts.
///
/// A command is owned by a single executor task and never shared; the
/// current request is replaced, not mutated, when a redirect rewrites it.
#[derive(Debug)]
pub struct HttpCommand {
    current_request: HttpRequest,
    redirect_count: usize,
    failure_count: usize,
    state: CommandState,
    exception: Option<Error>,
}

impl HttpCommand {
    pub fn new(request: HttpRequest) -> Self {
        Self {
            current_request: request,
            redirect_count: 0,
            failure_count: 0,
            state: CommandState::Created,
            exception: None,
        }
    }

    pub fn current_request(&self) -> &HttpRequest {
        &self.current_request
    }

    pub fn set_current_request(&mut self, request: HttpRequest) {
        self.current_request = request;
    }

    pub fn redirect_count(&self) -> usize {
        self.redirect_count
    }

    pub fn increment_redirect_count(&mut self) -> usize {
        self.redirect_count += 1;
        self.redirect_count
    }

    pub fn failure_count(&self) -> usize {
        self.failure_count
    }

    pub fn increment_failure_count(&mut self) -> usize {
        self.failure_count += 1;
        self.failure_count
    }

    pub fn state(&self) -> CommandState {
        self.state
    }

    pub(crate) fn transition(&mut self, state: CommandState) {
        if !self.state.is_terminal() {
            self.state = state;
        }
    }

    /// Replayable when the request has no payload or a repeatable one.
    pub fn is_replayable(&self) -> bool {
        self.current_request
            .payload()
            .is_none_or(|payload| payload.is_repeatable())
    }

    /// Marks the command failed. A pending error is never overwritten and a
    /// terminal state never changes.
    pub fn set_exception(&mut self, error: Error) {
        if self.exception.is_some() {
            return;
        }
        if !self.state.is_terminal() {
            self.state = match error {
                Error::Cancelled => CommandState::Cancelled,
                _ => CommandState::Failed,
            };
        }
        self.exception = Some(error);
    }

    pub fn exception(&self) -> Option<&Error> {
        self.exception.as_ref()
    }

    pub fn take_exception(&mut self) -> Option<Error> {
        self.exception.take()
    }

    /// Points the current request at another scheme, host and port, keeping
    /// path, query, headers and payload.
    pub fn change_scheme_host_and_port_to(
        &mut self,
        scheme: &str,
        host: &str,
        port: Option<u16>,
    ) -> crate::Result<()> {
        let mut endpoint = self.current_request.endpoint().clone();
        let invalid = || Error::InvalidUri {
            uri: format!("{scheme}://{host}"),
        };
        endpoint.set_scheme(scheme).map_err(|()| invalid())?;
        endpoint.set_host(Some(host)).map_err(|_| invalid())?;
        endpoint.set_port(port).map_err(|()| invalid())?;
        self.current_request = self.current_request.with_endpoint(endpoint)?;
        Ok(())
    }

    /// Switches to GET and drops the payload; a GET carries no body.
    pub fn change_to_get_request(&mut self) {
        if let Some(payload) = self.current_request.payload() {
            payload.release();
        }
        self.current_request = self
            .current_request
            .with_method(Method::GET)
            .without_payload();
    }

    /// Replaces the path. A `?` in `path` also replaces the query.
    pub fn change_path_to(&mut self, path: &str) -> crate::Result<()> {
        let mut endpoint = self.current_request.endpoint().clone();
        match path.split_once('?') {
            Some((path, query)) => {
                endpoint.set_path(path);
                endpoint.set_query(Some(query));
            }
            None => endpoint.set_path(path),
        }
        self.current_request = self.current_request.with_endpoint(endpoint)?;
        Ok(())
    }

    /// Moves the current request to an absolute redirect target.
    pub(crate) fn change_endpoint_to(&mut self, endpoint: Url) -> crate::Result<()> {
        self.current_request = self.current_request.with_endpoint(endpoint)?;
        Ok(())
    }
}
