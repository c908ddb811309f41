use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::command::HttpCommand;
use crate::error::Error;
use crate::executor::HttpCommandExecutorService;
use crate::message::HttpMessage;
use crate::request::HttpRequest;
use crate::response::HttpResponse;
use crate::transport::HttpTransport;

/// Maps a successful response to the value an operation promises.
pub trait ResponseTransformer<T>: Send + Sync + 'static {
    fn transform(&self, response: HttpResponse) -> crate::Result<T>;
}

impl<T, F> ResponseTransformer<T> for F
where
    F: Fn(HttpResponse) -> crate::Result<T> + Send + Sync + 'static,
{
    fn transform(&self, response: HttpResponse) -> crate::Result<T> {
        self(response)
    }
}

/// Submits commands and turns their successful responses into typed values.
///
/// Each submission runs on its own task. The transformer runs on the
/// blocking pool so slow parsing never stalls request dispatch, and only
/// after a success response; failures skip it entirely.
pub struct TransformingHttpCommandExecutorService<T> {
    executor: HttpCommandExecutorService<T>,
}

impl<T> Clone for TransformingHttpCommandExecutorService<T> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
        }
    }
}

impl<T> std::fmt::Debug for TransformingHttpCommandExecutorService<T> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("TransformingHttpCommandExecutorService")
            .field("executor", &self.executor)
            .finish()
    }
}

impl<T> TransformingHttpCommandExecutorService<T>
where
    T: HttpTransport,
{
    pub fn new(executor: HttpCommandExecutorService<T>) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &HttpCommandExecutorService<T> {
        &self.executor
    }

    /// Must be called from within a tokio runtime.
    pub fn submit<R, X>(&self, request: HttpRequest, transformer: X) -> CommandFuture<R>
    where
        R: Send + 'static,
        X: ResponseTransformer<R>,
    {
        self.submit_command(HttpCommand::new(request), transformer)
    }

    pub fn submit_command<R, X>(&self, mut command: HttpCommand, transformer: X) -> CommandFuture<R>
    where
        R: Send + 'static,
        X: ResponseTransformer<R>,
    {
        let executor = self.executor.clone();
        let cancellation = CancellationToken::new();
        let task_cancellation = cancellation.clone();
        let handle = tokio::spawn(async move {
            let response = executor.execute(&mut command, &task_cancellation).await?;
            if task_cancellation.is_cancelled() {
                response.release_payload();
                return Err(Error::Cancelled);
            }
            tokio::task::spawn_blocking(move || transformer.transform(response))
                .await
                .map_err(|source| Error::TaskJoin {
                    source: Arc::new(source),
                })?
        });
        CommandFuture {
            handle,
            cancellation,
        }
    }
}

/// The caller-visible result of one submitted command.
///
/// Resolves once, to the transformed value or to the command's terminal
/// error. Cancelling (or dropping) it aborts the in-flight exchange and
/// prevents further retries or redirects.
#[must_use = "futures do nothing unless polled; dropping cancels the command"]
#[derive(Debug)]
pub struct CommandFuture<R> {
    handle: JoinHandle<crate::Result<R>>,
    cancellation: CancellationToken,
}

impl<R> CommandFuture<R> {
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl<R> Future for CommandFuture<R> {
    type Output = crate::Result<R>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.handle).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(source)) if source.is_cancelled() => Poll::Ready(Err(Error::Cancelled)),
            Poll::Ready(Err(source)) => Poll::Ready(Err(Error::TaskJoin {
                source: Arc::new(source),
            })),
        }
    }
}

impl<R> Drop for CommandFuture<R> {
    fn drop(&mut self) {
        self.cancellation.cancel();
    }
}
