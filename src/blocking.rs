use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::{Builder, Runtime};

use crate::error::{Error, TimeoutPhase};
use crate::request::HttpRequest;
use crate::transforming::{ResponseTransformer, TransformingHttpCommandExecutorService};
use crate::transport::HttpTransport;
use crate::util::redact_uri_for_logs;

/// Synchronous front for [`TransformingHttpCommandExecutorService`].
///
/// Owns a small multi-threaded runtime and blocks the calling thread on each
/// submission. The whole call, retries and redirects included, is bounded by
/// `call_timeout`; when it elapses the command is cancelled.
pub struct BlockingExecutor<T> {
    runtime: Runtime,
    service: TransformingHttpCommandExecutorService<T>,
    call_timeout: Duration,
}

impl<T> std::fmt::Debug for BlockingExecutor<T> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("BlockingExecutor")
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

impl<T> BlockingExecutor<T>
where
    T: HttpTransport,
{
    /// Must not be called from inside an async context.
    pub fn new(service: TransformingHttpCommandExecutorService<T>) -> crate::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("cloudhttp-blocking")
            .enable_all()
            .build()
            .map_err(|source| Error::Runtime {
                source: Arc::new(source),
            })?;
        let call_timeout = service.executor().config().request_timeout();
        Ok(Self {
            runtime,
            service,
            call_timeout,
        })
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    pub fn service(&self) -> &TransformingHttpCommandExecutorService<T> {
        &self.service
    }

    /// Blocks the calling thread until the command and its transformer finish
    /// or the call timeout elapses. Must not be called from inside an async
    /// context.
    pub fn submit<R, X>(&self, request: HttpRequest, transformer: X) -> crate::Result<R>
    where
        R: Send + 'static,
        X: ResponseTransformer<R>,
    {
        let method = request.method().clone();
        let uri = redact_uri_for_logs(request.endpoint().as_str());
        let call_timeout = self.call_timeout;

        let _guard = self.runtime.enter();
        let future = self.service.submit(request, transformer);
        self.runtime.block_on(async move {
            match tokio::time::timeout(call_timeout, future).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout {
                    phase: TimeoutPhase::Request,
                    timeout_ms: call_timeout.as_millis(),
                    method,
                    uri,
                }),
            }
        })
    }
}

#[cfg(feature = "hyper-transport")]
impl BlockingExecutor<crate::transport::HyperTransport> {
    /// Blocking executor over a [`crate::transport::HyperTransport`] built from `config`.
    pub fn from_config(config: crate::config::HttpConfig) -> crate::Result<Self> {
        let transport = crate::transport::HyperTransport::new(&config)?;
        let executor = crate::executor::HttpCommandExecutorService::new(transport, config);
        Self::new(TransformingHttpCommandExecutorService::new(executor))
    }
}
