use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use serde::de::DeserializeOwned;

use crate::error::Error;
use crate::message::HttpMessage;
use crate::payload::Payload;
use crate::util::{parse_header_name, parse_header_value, truncate_body};

const DESERIALIZE_BODY_LIMIT: usize = 4096;

/// One HTTP exchange's result as produced by a transport.
#[derive(Clone, PartialEq)]
pub struct HttpResponse {
    status: u16,
    message: String,
    headers: HeaderMap,
    payload: Option<Payload>,
}

impl HttpResponse {
    pub fn builder() -> HttpResponseBuilder {
        HttpResponseBuilder::default()
    }

    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            headers: HeaderMap::new(),
            payload: None,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn status_code(&self) -> Option<StatusCode> {
        StatusCode::from_u16(self.status).ok()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// `HTTP/1.1 code message`, for logs only.
    pub fn status_line(&self) -> String {
        if self.message.is_empty() {
            format!("HTTP/1.1 {}", self.status)
        } else {
            format!("HTTP/1.1 {} {}", self.status, self.message)
        }
    }

    pub fn to_builder(&self) -> HttpResponseBuilder {
        HttpResponseBuilder {
            status: self.status,
            message: Some(self.message.clone()),
            headers: self.headers.clone(),
            payload: self.payload.clone(),
        }
    }

    pub fn into_payload(self) -> Option<Payload> {
        self.payload
    }

    /// Reads the body into memory and swaps the payload for a repeatable copy
    /// with the same metadata. An absent payload yields empty bytes.
    pub fn buffer_payload(&mut self) -> crate::Result<Bytes> {
        let Some(payload) = &self.payload else {
            return Ok(Bytes::new());
        };
        let buffered = payload.buffered()?;
        payload.release();
        let body = buffered.to_bytes()?;
        self.payload = Some(buffered);
        Ok(body)
    }

    pub fn bytes(&self) -> crate::Result<Bytes> {
        match &self.payload {
            Some(payload) => payload.to_bytes(),
            None => Ok(Bytes::new()),
        }
    }

    pub fn text(&self) -> crate::Result<String> {
        let body = self.bytes()?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    pub fn json<T>(&self) -> crate::Result<T>
    where
        T: DeserializeOwned,
    {
        let body = self.bytes()?;
        serde_json::from_slice(&body).map_err(|source| Error::Deserialize {
            source: Arc::new(source),
            body: truncate_body(&body, DESERIALIZE_BODY_LIMIT),
        })
    }
}

impl HttpMessage for HttpResponse {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("message", &self.message)
            .field("headers", &self.headers)
            .field("payload", &self.payload)
            .finish()
    }
}

impl fmt::Display for HttpResponse {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.status_line())
    }
}

#[derive(Clone, Debug)]
pub struct HttpResponseBuilder {
    status: u16,
    message: Option<String>,
    headers: HeaderMap,
    payload: Option<Payload>,
}

impl Default for HttpResponseBuilder {
    fn default() -> Self {
        Self {
            status: 200,
            message: None,
            headers: HeaderMap::new(),
            payload: None,
        }
    }
}

impl HttpResponseBuilder {
    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
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

    /// Without an explicit message the canonical reason phrase is used, if any.
    pub fn build(self) -> HttpResponse {
        let message = self.message.unwrap_or_else(|| {
            StatusCode::from_u16(self.status)
                .ok()
                .and_then(|status| status.canonical_reason())
                .unwrap_or_default()
                .to_owned()
        });
        HttpResponse {
            status: self.status,
            message,
            headers: self.headers,
            payload: self.payload,
        }
    }
}
