//! Request and response bodies.
//!
//! A [`Payload`] is either repeatable (bytes, strings, files) or one-shot
//! (an arbitrary reader). Clones share the underlying source, so a one-shot
//! payload stays one-shot no matter how many requests reference it.

use std::fmt;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::{Buf, Bytes};
use http::header::{
    CONTENT_DISPOSITION, CONTENT_ENCODING, CONTENT_LANGUAGE, CONTENT_LENGTH, CONTENT_TYPE, EXPIRES,
    HeaderMap, HeaderName, HeaderValue,
};

use crate::error::Error;
use crate::util::lock_unpoisoned;

pub(crate) const CONTENT_MD5: HeaderName = HeaderName::from_static("content-md5");

/// Headers that describe a body and therefore live in [`ContentMetadata`]
/// rather than in a message's header map.
pub const CONTENT_HEADERS: [HeaderName; 7] = [
    CONTENT_TYPE,
    CONTENT_LENGTH,
    CONTENT_MD5,
    CONTENT_DISPOSITION,
    CONTENT_ENCODING,
    CONTENT_LANGUAGE,
    EXPIRES,
];

pub fn is_content_header(name: &HeaderName) -> bool {
    CONTENT_HEADERS.contains(name)
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContentMetadata {
    content_length: Option<u64>,
    content_type: Option<String>,
    content_md5: Option<Bytes>,
    content_encoding: Option<String>,
    content_disposition: Option<String>,
    content_language: Option<String>,
    expires: Option<SystemTime>,
}

impl ContentMetadata {
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn content_md5(&self) -> Option<&[u8]> {
        self.content_md5.as_deref()
    }

    pub fn content_encoding(&self) -> Option<&str> {
        self.content_encoding.as_deref()
    }

    pub fn content_disposition(&self) -> Option<&str> {
        self.content_disposition.as_deref()
    }

    pub fn content_language(&self) -> Option<&str> {
        self.content_language.as_deref()
    }

    pub fn expires(&self) -> Option<SystemTime> {
        self.expires
    }

    pub fn set_content_length(&mut self, content_length: Option<u64>) {
        self.content_length = content_length;
    }

    pub fn set_content_type(&mut self, content_type: Option<String>) {
        self.content_type = content_type;
    }

    pub fn set_content_md5(&mut self, content_md5: Option<Bytes>) {
        self.content_md5 = content_md5;
    }

    pub fn set_content_encoding(&mut self, content_encoding: Option<String>) {
        self.content_encoding = content_encoding;
    }

    pub fn set_content_disposition(&mut self, content_disposition: Option<String>) {
        self.content_disposition = content_disposition;
    }

    pub fn set_content_language(&mut self, content_language: Option<String>) {
        self.content_language = content_language;
    }

    pub fn set_expires(&mut self, expires: Option<SystemTime>) {
        self.expires = expires;
    }

    /// Reads content metadata out of a header map. Unparsable values are skipped.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let text = |name: &HeaderName| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(ToOwned::to_owned)
        };
        Self {
            content_length: text(&CONTENT_LENGTH).and_then(|value| value.trim().parse().ok()),
            content_type: text(&CONTENT_TYPE),
            content_md5: text(&CONTENT_MD5)
                .and_then(|value| BASE64.decode(value.trim()).ok())
                .map(Bytes::from),
            content_encoding: text(&CONTENT_ENCODING),
            content_disposition: text(&CONTENT_DISPOSITION),
            content_language: text(&CONTENT_LANGUAGE),
            expires: text(&EXPIRES).and_then(|value| httpdate::parse_http_date(&value).ok()),
        }
    }

    /// Renders the metadata as wire headers, in [`CONTENT_HEADERS`] order.
    pub fn to_headers(&self) -> Vec<(HeaderName, HeaderValue)> {
        let mut headers = Vec::new();
        let mut push = |name: HeaderName, value: Option<String>| {
            if let Some(value) = value
                && let Ok(value) = HeaderValue::from_str(&value)
            {
                headers.push((name, value));
            }
        };
        push(CONTENT_TYPE, self.content_type.clone());
        push(
            CONTENT_LENGTH,
            self.content_length.map(|length| length.to_string()),
        );
        push(
            CONTENT_MD5,
            self.content_md5.as_ref().map(|md5| BASE64.encode(md5)),
        );
        push(CONTENT_DISPOSITION, self.content_disposition.clone());
        push(CONTENT_ENCODING, self.content_encoding.clone());
        push(CONTENT_LANGUAGE, self.content_language.clone());
        push(EXPIRES, self.expires.map(httpdate::fmt_http_date));
        headers
    }
}

enum StreamState {
    Ready(Box<dyn Read + Send>),
    Consumed,
    Released,
}

enum PayloadSource {
    Bytes(Bytes),
    File(PathBuf),
    Stream(Mutex<StreamState>),
}

#[derive(Clone)]
pub struct Payload {
    source: Arc<PayloadSource>,
    metadata: ContentMetadata,
}

impl Payload {
    pub fn from_bytes(body: impl Into<Bytes>) -> Self {
        let body = body.into();
        let mut metadata = ContentMetadata::default();
        metadata.set_content_length(Some(body.len() as u64));
        Self {
            source: Arc::new(PayloadSource::Bytes(body)),
            metadata,
        }
    }

    pub fn from_string(body: impl Into<String>) -> Self {
        Self::from_bytes(Bytes::from(body.into()))
    }

    /// A repeatable payload backed by a file. The file is opened anew on each read.
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let length = std::fs::metadata(&path)
            .map_err(|source| Error::PayloadIo {
                source: Arc::new(source),
            })?
            .len();
        let mut metadata = ContentMetadata::default();
        metadata.set_content_length(Some(length));
        Ok(Self {
            source: Arc::new(PayloadSource::File(path)),
            metadata,
        })
    }

    /// A one-shot payload. Its length is unknown unless set on the metadata.
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: Read + Send + 'static,
    {
        Self {
            source: Arc::new(PayloadSource::Stream(Mutex::new(StreamState::Ready(
                Box::new(reader),
            )))),
            metadata: ContentMetadata::default(),
        }
    }

    pub fn metadata(&self) -> &ContentMetadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut ContentMetadata {
        &mut self.metadata
    }

    pub fn with_metadata(mut self, metadata: ContentMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.metadata.set_content_type(Some(content_type.into()));
        self
    }

    pub fn with_content_length(mut self, content_length: u64) -> Self {
        self.metadata.set_content_length(Some(content_length));
        self
    }

    pub fn is_repeatable(&self) -> bool {
        !matches!(*self.source, PayloadSource::Stream(_))
    }

    /// A fresh reader for repeatable payloads; the single reader for one-shot ones.
    pub fn input(&self) -> crate::Result<Box<dyn Read + Send>> {
        match &*self.source {
            PayloadSource::Bytes(body) => Ok(Box::new(body.clone().reader())),
            PayloadSource::File(path) => {
                let file = std::fs::File::open(path).map_err(|source| Error::PayloadIo {
                    source: Arc::new(source),
                })?;
                Ok(Box::new(file))
            }
            PayloadSource::Stream(state) => {
                let mut guard = lock_unpoisoned(state);
                match std::mem::replace(&mut *guard, StreamState::Consumed) {
                    StreamState::Ready(reader) => Ok(reader),
                    StreamState::Consumed => Err(Error::PayloadConsumed),
                    StreamState::Released => {
                        *guard = StreamState::Released;
                        Err(Error::PayloadConsumed)
                    }
                }
            }
        }
    }

    /// Streams the content into `sink`, returning the number of bytes written.
    pub fn write_to(&self, sink: &mut dyn Write) -> crate::Result<u64> {
        let mut input = self.input()?;
        io::copy(&mut input, sink).map_err(|source| Error::PayloadIo {
            source: Arc::new(source),
        })
    }

    /// Reads the whole payload. Consumes one-shot payloads.
    pub fn to_bytes(&self) -> crate::Result<Bytes> {
        if let PayloadSource::Bytes(body) = &*self.source {
            return Ok(body.clone());
        }
        let mut buffer = Vec::new();
        self.write_to(&mut buffer)?;
        Ok(Bytes::from(buffer))
    }

    /// Best-effort byte length; `None` when it cannot be known up front.
    pub fn calculate_size(&self) -> Option<u64> {
        match &*self.source {
            PayloadSource::Bytes(body) => Some(body.len() as u64),
            PayloadSource::File(path) => std::fs::metadata(path)
                .ok()
                .map(|metadata| metadata.len()),
            PayloadSource::Stream(_) => self.metadata.content_length(),
        }
    }

    /// Frees the underlying source. Safe to call any number of times.
    pub fn release(&self) {
        if let PayloadSource::Stream(state) = &*self.source {
            *lock_unpoisoned(state) = StreamState::Released;
        }
    }

    pub fn is_released(&self) -> bool {
        match &*self.source {
            PayloadSource::Stream(state) => {
                matches!(*lock_unpoisoned(state), StreamState::Released)
            }
            _ => false,
        }
    }

    /// Converts a one-shot payload into a repeatable one, keeping metadata.
    pub fn buffered(&self) -> crate::Result<Self> {
        if self.is_repeatable() {
            return Ok(self.clone());
        }
        let body = self.to_bytes()?;
        let mut metadata = self.metadata.clone();
        if metadata.content_length().is_none() {
            metadata.set_content_length(Some(body.len() as u64));
        }
        Ok(Self {
            source: Arc::new(PayloadSource::Bytes(body)),
            metadata,
        })
    }
}

impl PartialEq for Payload {
    fn eq(&self, other: &Self) -> bool {
        if self.metadata != other.metadata {
            return false;
        }
        match (&*self.source, &*other.source) {
            (PayloadSource::Bytes(left), PayloadSource::Bytes(right)) => left == right,
            (PayloadSource::File(left), PayloadSource::File(right)) => left == right,
            _ => Arc::ptr_eq(&self.source, &other.source),
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &*self.source {
            PayloadSource::Bytes(_) => "bytes",
            PayloadSource::File(_) => "file",
            PayloadSource::Stream(_) => "stream",
        };
        formatter
            .debug_struct("Payload")
            .field("kind", &kind)
            .field("repeatable", &self.is_repeatable())
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl From<Bytes> for Payload {
    fn from(body: Bytes) -> Self {
        Self::from_bytes(body)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(body: Vec<u8>) -> Self {
        Self::from_bytes(body)
    }
}

impl From<String> for Payload {
    fn from(body: String) -> Self {
        Self::from_string(body)
    }
}

impl From<&'static str> for Payload {
    fn from(body: &'static str) -> Self {
        Self::from_bytes(Bytes::from_static(body.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use http::HeaderMap;
    use http::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderValue};

    use super::{CONTENT_MD5, ContentMetadata, Payload};
    use crate::error::Error;

    #[test]
    fn repeatable_payload_writes_identical_bytes_twice() {
        let payload = Payload::from_string("<CatalogItem/>");
        let mut first = Vec::new();
        let mut second = Vec::new();
        payload.write_to(&mut first).expect("first write");
        payload.write_to(&mut second).expect("second write");
        assert_eq!(first, second);
        assert_eq!(first, b"<CatalogItem/>");
        assert_eq!(payload.calculate_size(), Some(14));
    }

    #[test]
    fn one_shot_payload_fails_on_second_write() {
        let payload = Payload::from_reader(Cursor::new(b"stream".to_vec()));
        assert!(!payload.is_repeatable());
        assert_eq!(payload.calculate_size(), None);

        let mut sink = Vec::new();
        payload.write_to(&mut sink).expect("first write");
        assert_eq!(sink, b"stream");

        let error = payload
            .write_to(&mut Vec::new())
            .expect_err("second write must fail");
        assert!(matches!(error, Error::PayloadConsumed));
    }

    #[test]
    fn clones_share_one_shot_source() {
        let payload = Payload::from_reader(Cursor::new(b"once".to_vec()));
        let clone = payload.clone();
        payload.to_bytes().expect("first read");
        assert!(matches!(clone.input(), Err(Error::PayloadConsumed)));
    }

    #[test]
    fn release_is_idempotent() {
        let payload = Payload::from_reader(Cursor::new(b"abc".to_vec()));
        payload.release();
        payload.release();
        assert!(payload.is_released());
        assert!(matches!(payload.input(), Err(Error::PayloadConsumed)));

        let bytes = Payload::from_string("abc");
        bytes.release();
        assert_eq!(bytes.to_bytes().expect("bytes survive release"), "abc");
    }

    #[test]
    fn buffered_keeps_metadata_and_becomes_repeatable() {
        let payload = Payload::from_reader(Cursor::new(b"<Task/>".to_vec()))
            .with_content_type("application/vnd.vmware.vcloud.task+xml");
        let buffered = payload.buffered().expect("buffer");
        assert!(buffered.is_repeatable());
        assert_eq!(
            buffered.metadata().content_type(),
            Some("application/vnd.vmware.vcloud.task+xml")
        );
        assert_eq!(buffered.metadata().content_length(), Some(7));
        assert_eq!(buffered.to_bytes().expect("read"), "<Task/>");
        assert_eq!(buffered.to_bytes().expect("read again"), "<Task/>");
    }

    #[test]
    fn file_payload_is_repeatable() {
        let path = std::env::temp_dir().join(format!("cloudhttp-payload-{}", std::process::id()));
        std::fs::File::create(&path)
            .and_then(|mut file| file.write_all(b"file-body"))
            .expect("write temp file");

        let payload = Payload::from_file(&path).expect("file payload");
        assert!(payload.is_repeatable());
        assert_eq!(payload.metadata().content_length(), Some(9));
        assert_eq!(payload.to_bytes().expect("first"), "file-body");
        assert_eq!(payload.to_bytes().expect("second"), "file-body");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn metadata_round_trips_through_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/xml"));
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("42"));
        headers.insert(CONTENT_MD5, HeaderValue::from_static("AQID"));

        let metadata = ContentMetadata::from_headers(&headers);
        assert_eq!(metadata.content_type(), Some("text/xml"));
        assert_eq!(metadata.content_length(), Some(42));
        assert_eq!(metadata.content_md5(), Some(&[1_u8, 2, 3][..]));

        let rendered = metadata.to_headers();
        assert!(
            rendered
                .iter()
                .any(|(name, value)| *name == CONTENT_MD5 && value == "AQID")
        );
    }
}
