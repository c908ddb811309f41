//! Classified results and the not-found fallbacks built on them.
//!
//! The pipeline keeps the status and body of every failed response; what a
//! 404 means is decided here, per operation, instead of inside the pipeline.

use crate::error::Error;

/// A command result split by failure class.
#[derive(Debug)]
pub enum Outcome<T> {
    Success(T),
    NotFound,
    ClientError { status: u16, body: String },
    ServerError { status: u16, body: String },
    /// Anything that is not a 4xx/5xx response: transport, timeout,
    /// cancellation, redirect exhaustion, transform failures.
    TransportError(Error),
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    pub fn ok(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn map<U>(self, map: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Success(value) => Outcome::Success(map(value)),
            Self::NotFound => Outcome::NotFound,
            Self::ClientError { status, body } => Outcome::ClientError { status, body },
            Self::ServerError { status, body } => Outcome::ServerError { status, body },
            Self::TransportError(error) => Outcome::TransportError(error),
        }
    }

    /// `NotFound` becomes `None`; other failures stay errors.
    pub fn not_found_as_none(self) -> Result<Option<T>, OutcomeError> {
        match self {
            Self::Success(value) => Ok(Some(value)),
            Self::NotFound => Ok(None),
            other => Err(OutcomeError(other.map(|_| ()))),
        }
    }
}

impl<T> From<crate::Result<T>> for Outcome<T> {
    fn from(result: crate::Result<T>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(Error::HttpStatus { status: 404, .. }) => Self::NotFound,
            Err(Error::HttpStatus { status, body, .. }) if (400..500).contains(&status) => {
                Self::ClientError { status, body }
            }
            Err(Error::HttpStatus { status, body, .. }) if status >= 500 => {
                Self::ServerError { status, body }
            }
            Err(error) => Self::TransportError(error),
        }
    }
}

/// A non-success [`Outcome`] surfaced as an error.
#[derive(Debug, thiserror::Error)]
#[error("{}", describe(.0))]
pub struct OutcomeError(pub Outcome<()>);

fn describe(outcome: &Outcome<()>) -> String {
    match outcome {
        Outcome::Success(()) => "success".to_owned(),
        Outcome::NotFound => "not found".to_owned(),
        Outcome::ClientError { status, body } => format!("client error {status}: {body}"),
        Outcome::ServerError { status, body } => format!("server error {status}: {body}"),
        Outcome::TransportError(error) => error.to_string(),
    }
}

fn status_of(error: &Error) -> Option<u16> {
    match error {
        Error::HttpStatus { status, .. } => Some(*status),
        _ => None,
    }
}

/// `value` when the failure's status is in `codes`.
pub fn value_on_codes<T>(result: crate::Result<T>, codes: &[u16], value: T) -> crate::Result<T> {
    match result {
        Err(error) if status_of(&error).is_some_and(|status| codes.contains(&status)) => Ok(value),
        other => other,
    }
}

pub fn none_on_not_found<T>(result: crate::Result<T>) -> crate::Result<Option<T>> {
    value_on_codes(result.map(Some), &[404], None)
}

pub fn false_on_not_found(result: crate::Result<bool>) -> crate::Result<bool> {
    value_on_codes(result, &[404], false)
}

/// The type's default (empty collection, empty string) on 404.
pub fn empty_on_not_found<T: Default>(result: crate::Result<T>) -> crate::Result<T> {
    value_on_codes(result, &[404], T::default())
}

pub fn void_on_not_found(result: crate::Result<()>) -> crate::Result<()> {
    value_on_codes(result, &[404], ())
}
