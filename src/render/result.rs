//! The value returned by [`RenderContext::render`](crate::render::RenderContext::render).

use crate::element::ChunkStream;
use crate::error::Result;
use futures::future::BoxFuture;
use futures::stream::{Stream, StreamExt};
use futures::FutureExt;
use std::future::IntoFuture;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A lazily produced render.
///
/// Iterate it as a [`Stream`] of chunks, or `.await` it for the concatenated text. Both
/// views drain the same underlying stream, so a partially iterated result awaits to
/// the remainder only. The stream ends after the first error.
pub struct RenderResult {
    stream: ChunkStream,
    failed: bool,
}

impl RenderResult {
    pub(crate) fn new(stream: ChunkStream) -> Self {
        Self {
            stream,
            failed: false,
        }
    }

    /// Drain the remaining chunks into one string.
    pub async fn text(mut self) -> Result<String> {
        let mut accum = String::new();
        while let Some(chunk) = self.next().await {
            accum.push_str(&chunk?);
        }
        Ok(accum)
    }
}

impl Stream for RenderResult {
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.failed {
            return Poll::Ready(None);
        }
        match this.stream.poll_next_unpin(cx) {
            Poll::Ready(Some(Err(err))) => {
                this.failed = true;
                Poll::Ready(Some(Err(err)))
            }
            other => other,
        }
    }
}

impl IntoFuture for RenderResult {
    type Output = Result<String>;
    type IntoFuture = BoxFuture<'static, Result<String>>;

    fn into_future(self) -> Self::IntoFuture {
        self.text().boxed()
    }
}
