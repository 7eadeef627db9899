//! Render contexts and the tree evaluator.
//!
//! A [`RenderContext`] is one node of the implicit tree built while rendering: it knows
//! its parent, the element it was created for, a unique render id, and the context
//! values visible at that point. Rendering a [`Renderable`] under a context yields an
//! ordered stream of text chunks:
//!
//! - literals emit their textual form
//! - elements enter a child context and render whatever their component returns
//! - lists render every non-falsy item concurrently and emit in declared order
//! - futures are awaited and their value rendered under the same context
//! - streams are passed through untouched

pub mod coalesce;
mod node;
pub mod result;

pub use coalesce::coalesce_parallel_streams;
pub use result::RenderResult;

use crate::context::{ContextSlot, ContextValues};
use crate::element::{ChunkStream, Children, Element, Renderable};
use crate::error::{RenderError, Result};
use crate::logging::{logger_context, BoundLogger, ExceptionLedger, LogImplementation};
use futures::stream::{self, StreamExt};
use futures::{future, FutureExt};
use node::ElementStream;
use std::fmt;
use std::sync::Arc;

/// Opaque, unique identifier of a context node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderId(Arc<str>);

impl RenderId {
    pub fn generate() -> Self {
        Self(Arc::from(ulid::Ulid::new().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RenderId {
    fn from(id: String) -> Self {
        Self(Arc::from(id))
    }
}

impl From<&str> for RenderId {
    fn from(id: &str) -> Self {
        Self(Arc::from(id))
    }
}

impl fmt::Display for RenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Options for [`create_render_context`].
#[derive(Clone, Default)]
pub struct RenderOptions {
    pub logger: Option<Arc<dyn LogImplementation>>,
    pub root_id: Option<String>,
}

impl RenderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_logger(mut self, logger: Arc<dyn LogImplementation>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_root_id(mut self, root_id: impl Into<String>) -> Self {
        self.root_id = Some(root_id.into());
        self
    }
}

/// State shared by every node of one render invocation.
#[derive(Default)]
struct RenderSession {
    exceptions: ExceptionLedger,
}

struct ContextNode {
    parent: Option<RenderContext>,
    element: Element,
    render_id: RenderId,
    values: ContextValues,
    session: Arc<RenderSession>,
}

/// One node of the render tree. Cheap to clone; never mutated after creation.
#[derive(Clone)]
pub struct RenderContext {
    node: Arc<ContextNode>,
}

fn root(_props: &Children, _ctx: &RenderContext) -> Result<Renderable> {
    Ok(Renderable::null())
}

/// Create the root context of a render tree.
pub fn create_render_context(options: RenderOptions) -> RenderContext {
    let logger = options
        .logger
        .unwrap_or_else(|| logger_context().default_value());
    let render_id = options
        .root_id
        .map(RenderId::from)
        .unwrap_or_else(RenderId::generate);

    RenderContext {
        node: Arc::new(ContextNode {
            parent: None,
            element: Element::new(root, Children::default()),
            render_id,
            values: ContextValues::new().with(logger_context(), logger),
            session: Arc::new(RenderSession::default()),
        }),
    }
}

/// Render `renderable` under `ctx`.
pub fn render(ctx: &RenderContext, renderable: impl Into<Renderable>) -> RenderResult {
    ctx.render(renderable)
}

impl RenderContext {
    pub fn parent(&self) -> Option<&RenderContext> {
        self.node.parent.as_ref()
    }

    pub fn element(&self) -> &Element {
        &self.node.element
    }

    pub fn render_id(&self) -> &RenderId {
        &self.node.render_id
    }

    pub fn context_values(&self) -> &ContextValues {
        &self.node.values
    }

    /// Value bound to `slot` here, or the slot's default.
    pub fn get_context<T: Clone + Send + Sync + 'static>(&self, slot: &ContextSlot<T>) -> T {
        self.node
            .values
            .get(slot)
            .unwrap_or_else(|| slot.default_value())
    }

    pub fn logger(&self) -> BoundLogger {
        BoundLogger::new(self.get_context(logger_context()), self.clone())
    }

    /// Whether two handles refer to the same context node.
    pub fn same_node(a: &RenderContext, b: &RenderContext) -> bool {
        Arc::ptr_eq(&a.node, &b.node)
    }

    /// Render `renderable` under this context.
    ///
    /// Rendering from the root starts a new session, so error de-duplication is scoped
    /// to that call. Renders started by a component share the session of the render
    /// that is evaluating it.
    pub fn render(&self, renderable: impl Into<Renderable>) -> RenderResult {
        let session = if self.node.parent.is_none() {
            Arc::new(RenderSession::default())
        } else {
            Arc::clone(&self.node.session)
        };
        RenderResult::new(self.render_stream(renderable.into(), &session))
    }

    pub(crate) fn exception_ledger(&self) -> &ExceptionLedger {
        &self.node.session.exceptions
    }

    /// Child node for `element`: parent values shallow-merged with the element's overlay.
    fn enter(&self, element: &Element, session: &Arc<RenderSession>) -> RenderContext {
        let values = match element.overlay() {
            Some(overlay) => self.node.values.merged(overlay),
            None => self.node.values.clone(),
        };
        RenderContext {
            node: Arc::new(ContextNode {
                parent: Some(self.clone()),
                element: element.clone(),
                render_id: RenderId::generate(),
                values,
                session: Arc::clone(session),
            }),
        }
    }

    fn render_stream(&self, renderable: Renderable, session: &Arc<RenderSession>) -> ChunkStream {
        match renderable {
            Renderable::Literal(literal) => single(Ok(literal.render())),
            Renderable::Element(element) => self.render_element(element, session),
            Renderable::List(items) => self.render_list(items, session),
            Renderable::Stream(pending) => match pending.take() {
                Some(stream) => stream,
                None => single(Err(RenderError::unexpected_renderable(
                    "stream that was already consumed by an earlier render",
                ))),
            },
            Renderable::Future(pending) => {
                let ctx = self.clone();
                let session = Arc::clone(session);
                pending
                    .resolution()
                    .map(move |resolved| match resolved {
                        Ok(next) => ctx.render_stream(next, &session),
                        Err(err) => single(Err(err)),
                    })
                    .flatten_stream()
                    .boxed()
            }
        }
    }

    fn render_element(&self, element: Element, session: &Arc<RenderSession>) -> ChunkStream {
        let child = self.enter(&element, session);
        let body_ctx = child.clone();
        let session = Arc::clone(session);
        // The component runs on first poll, not when the stream is built.
        let body = stream::once(async move {
            match element.render(&body_ctx) {
                Ok(next) => body_ctx.render_stream(next, &session),
                Err(err) => single(Err(err)),
            }
        })
        .flatten();

        ElementStream::new(child, body.boxed()).boxed()
    }

    fn render_list(&self, items: Vec<Renderable>, session: &Arc<RenderSession>) -> ChunkStream {
        if items.iter().all(Renderable::is_literal) {
            let text: String = items
                .iter()
                .filter_map(|item| match item {
                    Renderable::Literal(literal) => Some(literal.render()),
                    _ => None,
                })
                .collect();
            return single(Ok(text));
        }

        let streams: Vec<ChunkStream> = items
            .into_iter()
            .filter(|item| !item.is_falsy())
            .map(|item| self.render_stream(item, session))
            .collect();
        coalesce_parallel_streams(streams)
    }
}

impl fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderContext")
            .field("element", &self.node.element.component_name())
            .field("render_id", &self.node.render_id)
            .field(
                "parent",
                &self.node.parent.as_ref().map(|parent| parent.render_id().clone()),
            )
            .finish()
    }
}

fn single(item: Result<String>) -> ChunkStream {
    stream::once(future::ready(item)).boxed()
}
