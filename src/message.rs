use http::HeaderMap;
use http::header::CONTENT_RANGE;

use crate::payload::Payload;

/// Behavior shared by requests and responses: a header multimap plus an optional payload.
pub trait HttpMessage {
    fn headers(&self) -> &HeaderMap;

    fn payload(&self) -> Option<&Payload>;

    /// First value of `name`, matched case-insensitively. Values that are not
    /// visible ASCII are skipped.
    fn first_header_or_none(&self, name: &str) -> Option<&str> {
        self.headers()
            .get_all(name)
            .iter()
            .find_map(|value| value.to_str().ok())
    }

    fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers()
            .get_all(name)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect()
    }

    /// Total entity size from `Content-Range` (`bytes 0-9/100` yields 100), else
    /// the payload's declared length.
    fn size_from_headers(&self) -> Option<u64> {
        if let Some(range) = self.first_header_or_none(CONTENT_RANGE.as_str()) {
            let (_, total) = range.rsplit_once('/')?;
            return total.trim().parse().ok();
        }
        self.payload()
            .and_then(|payload| payload.metadata().content_length())
    }

    fn release_payload(&self) {
        if let Some(payload) = self.payload() {
            payload.release();
        }
    }
}
