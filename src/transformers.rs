//! Stock response transformers.

use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;

use crate::message::HttpMessage;
use crate::response::HttpResponse;
use crate::transforming::ResponseTransformer;

/// Body as text.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReturnStringIf2xx;

impl ResponseTransformer<String> for ReturnStringIf2xx {
    fn transform(&self, response: HttpResponse) -> crate::Result<String> {
        let text = response.text();
        response.release_payload();
        text
    }
}

/// `true`; the body is discarded.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReturnTrueIf2xx;

impl ResponseTransformer<bool> for ReturnTrueIf2xx {
    fn transform(&self, response: HttpResponse) -> crate::Result<bool> {
        response.release_payload();
        Ok(true)
    }
}

/// Unit; the body is discarded.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReleasePayloadAndReturn;

impl ResponseTransformer<()> for ReleasePayloadAndReturn {
    fn transform(&self, response: HttpResponse) -> crate::Result<()> {
        response.release_payload();
        Ok(())
    }
}

/// Body decoded as JSON into `T`.
pub struct ParseJson<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> ParseJson<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for ParseJson<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for ParseJson<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for ParseJson<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("ParseJson")
    }
}

impl<T> ResponseTransformer<T> for ParseJson<T>
where
    T: DeserializeOwned + 'static,
{
    fn transform(&self, response: HttpResponse) -> crate::Result<T> {
        let value = response.json();
        response.release_payload();
        value
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::{ParseJson, ReleasePayloadAndReturn, ReturnStringIf2xx, ReturnTrueIf2xx};
    use crate::response::HttpResponse;
    use crate::transforming::ResponseTransformer;

    #[derive(Debug, Deserialize, PartialEq)]
    struct LoadBalancer {
        name: String,
        instances: Vec<String>,
    }

    #[test]
    fn stock_transformers() {
        let response = HttpResponse::builder().payload("<ok/>").build();
        assert_eq!(
            ReturnStringIf2xx.transform(response.clone()).expect("text"),
            "<ok/>"
        );
        assert!(ReturnTrueIf2xx.transform(response.clone()).expect("bool"));
        ReleasePayloadAndReturn.transform(response).expect("unit");
    }

    #[test]
    fn parse_json_decodes_body() {
        let response = HttpResponse::builder()
            .payload(r#"{"name":"web","instances":["i-1","i-2"]}"#)
            .build();
        let parsed = ParseJson::<LoadBalancer>::new()
            .transform(response)
            .expect("json");
        assert_eq!(
            parsed,
            LoadBalancer {
                name: "web".to_owned(),
                instances: vec!["i-1".to_owned(), "i-2".to_owned()],
            }
        );
    }
}
