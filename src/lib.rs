//! `cloudhttp` is the HTTP command pipeline behind cloud control-plane API clients.
//!
//! A request is wrapped in an [`HttpCommand`] and driven by an
//! [`HttpCommandExecutorService`] through a pluggable [`HttpTransport`]:
//! filters are applied before every attempt, 5xx responses and transport
//! failures go to an [`HttpRetryHandler`], 3xx responses are followed within
//! a redirect budget, and 4xx responses become the command's terminal error.
//! [`TransformingHttpCommandExecutorService`] runs commands on their own task
//! and maps the final success response to a typed value.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use cloudhttp::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = HttpConfig::default().with_max_retries(3);
//!     let transport = HyperTransport::new(&config)?;
//!     let service = TransformingHttpCommandExecutorService::new(
//!         HttpCommandExecutorService::new(transport, config),
//!     );
//!
//!     let request = HttpRequest::builder()
//!         .method("GET")
//!         .endpoint("https://vcloud.example.com/api/vApp/vapp-1")
//!         .filter(Arc::new(BasicAuthentication::new("admin", "secret")?))
//!         .build()?;
//!
//!     let body = none_on_not_found(service.submit(request, ReturnStringIf2xx).await)?;
//!     println!("vApp: {body:?}");
//!     Ok(())
//! }
//! ```

mod blocking;
mod command;
mod config;
mod dispatch;
mod error;
mod executor;
mod filter;
#[cfg(feature = "hyper-transport")]
mod limiters;
mod message;
mod outcome;
mod payload;
mod redirect;
mod request;
mod response;
mod retry;
#[cfg(feature = "hyper-transport")]
mod tls;
mod transformers;
mod transforming;
mod transport;
pub mod uris;
mod util;
mod wire;

pub use crate::blocking::BlockingExecutor;
pub use crate::command::{CommandState, HttpCommand};
pub use crate::config::{
    HttpConfig, PROPERTY_CONNECT_TIMEOUT, PROPERTY_MAX_CONNECTIONS,
    PROPERTY_MAX_CONNECTIONS_PER_HOST, PROPERTY_MAX_REDIRECTS, PROPERTY_MAX_RETRIES,
    PROPERTY_MAX_RETRY_DELAY, PROPERTY_RELAX_HOSTNAME, PROPERTY_REQUEST_TIMEOUT,
    PROPERTY_RETRY_DELAY_START, PROPERTY_TRUST_ALL_CERTS,
};
pub use crate::dispatch::{HttpErrorHandler, ResponseClass, StatusErrorHandler};
pub use crate::error::{Error, ErrorCode, SharedError, TimeoutPhase, TransportErrorKind};
pub use crate::executor::HttpCommandExecutorService;
pub use crate::filter::{AddHeaders, BasicAuthentication, HttpRequestFilter};
pub use crate::message::HttpMessage;
pub use crate::outcome::{
    Outcome, OutcomeError, empty_on_not_found, false_on_not_found, none_on_not_found,
    value_on_codes, void_on_not_found,
};
pub use crate::payload::{ContentMetadata, Payload, is_content_header};
pub use crate::redirect::RedirectPolicy;
pub use crate::request::{HttpRequest, HttpRequestBuilder};
pub use crate::response::{HttpResponse, HttpResponseBuilder};
pub use crate::retry::{AlwaysRetry, BackoffLimitedRetryHandler, HttpRetryHandler, NeverRetry};
pub use crate::transformers::{
    ParseJson, ReleasePayloadAndReturn, ReturnStringIf2xx, ReturnTrueIf2xx,
};
pub use crate::transforming::{
    CommandFuture, ResponseTransformer, TransformingHttpCommandExecutorService,
};
#[cfg(feature = "hyper-transport")]
pub use crate::transport::HyperTransport;
pub use crate::transport::HttpTransport;
pub use crate::uris::UriBuilder;

pub type Result<T> = std::result::Result<T, Error>;

pub mod prelude {
    #[cfg(feature = "hyper-transport")]
    pub use crate::HyperTransport;
    pub use crate::{
        BasicAuthentication, BlockingExecutor, CommandFuture, Error, HttpCommand,
        HttpCommandExecutorService, HttpConfig, HttpMessage, HttpRequest, HttpResponse,
        HttpRetryHandler, HttpTransport, Outcome, ParseJson, RedirectPolicy,
        ReturnStringIf2xx, ReturnTrueIf2xx, TransformingHttpCommandExecutorService, UriBuilder,
        none_on_not_found,
    };
}
