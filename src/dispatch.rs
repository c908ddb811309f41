use crate::command::HttpCommand;
use crate::error::Error;
use crate::message::HttpMessage;
use crate::response::HttpResponse;
use crate::util::{redact_uri_for_logs, truncate_body};

/// Routing bucket for a completed response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseClass {
    Success,
    Redirect,
    ClientError,
    ServerError,
}

impl ResponseClass {
    /// 304 Not Modified carries no target and is handed to the transformer.
    pub fn of(status: u16) -> Self {
        match status {
            500.. => Self::ServerError,
            400..=499 => Self::ClientError,
            304 => Self::Success,
            300..=399 => Self::Redirect,
            _ => Self::Success,
        }
    }
}

/// Turns a final failed response into the command's terminal error.
pub trait HttpErrorHandler: Send + Sync {
    fn handle(&self, command: &mut HttpCommand, response: &HttpResponse);
}

/// Records `Error::HttpStatus` with status, headers and a truncated body.
#[derive(Clone, Copy, Debug)]
pub struct StatusErrorHandler {
    max_body_bytes: usize,
}

impl StatusErrorHandler {
    pub fn new(max_body_bytes: usize) -> Self {
        Self { max_body_bytes }
    }

    pub fn error_for(&self, command: &HttpCommand, response: &HttpResponse) -> Error {
        let request = command.current_request();
        let body = match response.bytes() {
            Ok(body) => truncate_body(&body, self.max_body_bytes),
            Err(_) => String::new(),
        };
        Error::HttpStatus {
            status: response.status(),
            message: response.message().to_owned(),
            method: request.method().clone(),
            uri: redact_uri_for_logs(request.endpoint().as_str()),
            headers: Box::new(response.headers().clone()),
            body,
        }
    }
}

impl Default for StatusErrorHandler {
    fn default() -> Self {
        Self::new(2048)
    }
}

impl HttpErrorHandler for StatusErrorHandler {
    fn handle(&self, command: &mut HttpCommand, response: &HttpResponse) {
        let error = self.error_for(command, response);
        command.set_exception(error);
    }
}
