//! Per-element stream wrapper tracking a context node's lifecycle.

use crate::element::ChunkStream;
use crate::error::Result;
use crate::render::RenderContext;
use futures::stream::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeState {
    Created,
    Rendering,
    Completed,
    Failed,
}

impl NodeState {
    fn is_terminal(self) -> bool {
        matches!(self, NodeState::Completed | NodeState::Failed)
    }
}

/// Output of one element: reports the first failure through the node's logger, then ends.
pub(crate) struct ElementStream {
    ctx: RenderContext,
    inner: ChunkStream,
    state: NodeState,
}

impl ElementStream {
    pub(crate) fn new(ctx: RenderContext, inner: ChunkStream) -> Self {
        Self {
            ctx,
            inner,
            state: NodeState::Created,
        }
    }

    fn transition(&mut self, next: NodeState) {
        if self.state == next {
            return;
        }
        log::trace!(
            target: "airender::render",
            "<{}> id={} {:?} -> {:?}",
            self.ctx.element().component_name(),
            self.ctx.render_id(),
            self.state,
            next
        );
        self.state = next;
    }
}

impl Stream for ElementStream {
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.state.is_terminal() {
            return Poll::Ready(None);
        }
        this.transition(NodeState::Rendering);

        match this.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(chunk))) => Poll::Ready(Some(Ok(chunk))),
            Poll::Ready(Some(Err(err))) => {
                this.transition(NodeState::Failed);
                this.ctx.logger().log_exception(&err);
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                this.transition(NodeState::Completed);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
