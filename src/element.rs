//! Element model and the `Renderable` union.
//!
//! Everything the evaluator knows how to flatten to text is a [`Renderable`]: literals,
//! elements (component + props), ordered lists, single-resolution futures, and
//! already-ordered streams of text chunks. Elements are inert data; the only behavior
//! they carry is the render thunk that invokes their component with a context.

use crate::context::ContextValues;
use crate::error::{RenderError, Result};
use crate::render::RenderContext;
use futures::future::{BoxFuture, Shared};
use futures::stream::{BoxStream, Stream, StreamExt};
use futures::{Future, FutureExt};
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// Ordered stream of text chunks produced by rendering.
pub type ChunkStream = BoxStream<'static, Result<String>>;

/// Scalar values. Text and numbers render to their textual form, booleans and
/// null render to nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Text(String),
    Number(f64),
    Bool(bool),
    Null,
}

impl Literal {
    /// Textual form of the literal.
    pub fn render(&self) -> String {
        match self {
            Literal::Text(text) => text.clone(),
            Literal::Number(number) => format_number(*number),
            Literal::Bool(_) | Literal::Null => String::new(),
        }
    }

    /// `null` and `false` mean "nothing to render" inside a list.
    pub fn is_falsy(&self) -> bool {
        matches!(self, Literal::Null | Literal::Bool(false))
    }
}

// Integral values print without a fractional part so `1` renders as "1", not "1.0".
fn format_number(number: f64) -> String {
    if number.is_nan() {
        "NaN".to_string()
    } else if number.is_infinite() {
        let sign = if number > 0.0 { "" } else { "-" };
        format!("{sign}Infinity")
    } else if number == 0.0 {
        "0".to_string()
    } else if number.abs() >= 1e21 || number.abs() < 1e-6 {
        // Exponent form with an explicit sign, e.g. "1e+21" and "1.5e-7".
        let exp = format!("{number:e}");
        match exp.split_once('e') {
            Some((mantissa, power)) if !power.starts_with('-') => format!("{mantissa}e+{power}"),
            _ => exp,
        }
    } else if number.fract() == 0.0 {
        format!("{number:.0}")
    } else {
        number.to_string()
    }
}

/// Future that resolves to another renderable.
///
/// The future runs once; every render that reaches it, including clones, sees the same
/// resolution.
#[derive(Clone)]
pub struct PendingRenderable {
    future: Shared<BoxFuture<'static, Result<Renderable>>>,
}

impl PendingRenderable {
    pub(crate) fn resolution(&self) -> Shared<BoxFuture<'static, Result<Renderable>>> {
        self.future.clone()
    }
}

/// Already-ordered stream of text chunks. Consumed by the first render that reaches it.
#[derive(Clone)]
pub struct PendingStream {
    slot: Arc<Mutex<Option<ChunkStream>>>,
}

impl PendingStream {
    pub(crate) fn take(&self) -> Option<ChunkStream> {
        self.slot.lock().take()
    }
}

/// The closed set of values the render engine can flatten to text.
#[derive(Clone)]
pub enum Renderable {
    Literal(Literal),
    Element(Element),
    List(Vec<Renderable>),
    Future(PendingRenderable),
    Stream(PendingStream),
}

impl Renderable {
    pub fn null() -> Self {
        Renderable::Literal(Literal::Null)
    }

    pub fn text(text: impl Into<String>) -> Self {
        Renderable::Literal(Literal::Text(text.into()))
    }

    pub fn list(items: impl IntoIterator<Item = Renderable>) -> Self {
        Renderable::List(items.into_iter().collect())
    }

    /// A renderable that resolves later, e.g. the body of an async component.
    pub fn future<F>(future: F) -> Self
    where
        F: Future<Output = Result<Renderable>> + Send + 'static,
    {
        Renderable::Future(PendingRenderable {
            future: future.boxed().shared(),
        })
    }

    /// A fallible stream of text chunks, passed through verbatim by the evaluator.
    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<String>> + Send + 'static,
    {
        Renderable::Stream(PendingStream {
            slot: Arc::new(Mutex::new(Some(stream.boxed()))),
        })
    }

    /// An infallible stream of text chunks.
    pub fn text_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = String> + Send + 'static,
    {
        Self::stream(stream.map(Ok))
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Renderable::Literal(_))
    }

    pub fn is_falsy(&self) -> bool {
        matches!(self, Renderable::Literal(literal) if literal.is_falsy())
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Renderable::Element(element) => Some(element),
            _ => None,
        }
    }

    /// Convert a dynamically typed value into a renderable.
    ///
    /// This is the entry point for authoring layers that only hold type-erased values.
    /// Values of an unrecognized type fail with [`ErrorKind::UnexpectedRenderable`]
    /// naming the offending type.
    ///
    /// [`ErrorKind::UnexpectedRenderable`]: crate::error::ErrorKind::UnexpectedRenderable
    pub fn try_from_any<T: Any + Send>(value: T) -> Result<Renderable> {
        let type_name = std::any::type_name::<T>();
        let boxed: Box<dyn Any + Send> = Box::new(value);

        macro_rules! convert {
            ($boxed:ident, $($ty:ty),+) => {
                $(
                    let $boxed = match $boxed.downcast::<$ty>() {
                        Ok(value) => return Ok(Renderable::from(*value)),
                        Err(other) => other,
                    };
                )+
            };
        }

        convert!(
            boxed,
            Renderable,
            Element,
            Literal,
            Vec<Renderable>,
            String,
            &'static str,
            bool,
            (),
            i32,
            i64,
            u32,
            u64,
            usize,
            f32,
            f64
        );
        drop(boxed);

        Err(RenderError::unexpected_renderable(format!(
            "value of type `{type_name}`"
        )))
    }
}

impl Default for Renderable {
    fn default() -> Self {
        Renderable::null()
    }
}

impl fmt::Debug for Renderable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Renderable::Literal(literal) => f.debug_tuple("Literal").field(literal).finish(),
            Renderable::Element(element) => f.debug_tuple("Element").field(element).finish(),
            Renderable::List(items) => f.debug_tuple("List").field(items).finish(),
            Renderable::Future(_) => f.write_str("Future(..)"),
            Renderable::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<Literal> for Renderable {
    fn from(literal: Literal) -> Self {
        Renderable::Literal(literal)
    }
}

impl From<Element> for Renderable {
    fn from(element: Element) -> Self {
        Renderable::Element(element)
    }
}

impl<T: Into<Renderable>> From<Vec<T>> for Renderable {
    fn from(items: Vec<T>) -> Self {
        Renderable::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Renderable>> From<Option<T>> for Renderable {
    fn from(value: Option<T>) -> Self {
        value.map_or_else(Renderable::null, Into::into)
    }
}

impl From<&str> for Renderable {
    fn from(text: &str) -> Self {
        Renderable::text(text)
    }
}

impl From<String> for Renderable {
    fn from(text: String) -> Self {
        Renderable::text(text)
    }
}

impl From<bool> for Renderable {
    fn from(value: bool) -> Self {
        Renderable::Literal(Literal::Bool(value))
    }
}

impl From<()> for Renderable {
    fn from(_: ()) -> Self {
        Renderable::null()
    }
}

macro_rules! impl_from_number {
    ($($ty:ty),+) => {
        $(
            impl From<$ty> for Renderable {
                fn from(value: $ty) -> Self {
                    Renderable::Literal(Literal::Number(value as f64))
                }
            }
        )+
    };
}

impl_from_number!(i32, i64, u32, u64, usize, f64);

// Widening keeps the binary error of the f32 (0.1 would print as 0.10000000149011612),
// so go through the shortest decimal form of the f32 instead.
impl From<f32> for Renderable {
    fn from(value: f32) -> Self {
        let widened = value.to_string().parse::<f64>().unwrap_or(value as f64);
        Renderable::Literal(Literal::Number(widened))
    }
}

type RenderThunk = dyn Fn(&RenderContext) -> Result<Renderable> + Send + Sync;

#[derive(Clone, Copy)]
struct ComponentRef {
    name: &'static str,
    type_id: TypeId,
}

/// A component paired with its props, plus an optional context overlay.
#[derive(Clone)]
pub struct Element {
    component: ComponentRef,
    props: Arc<dyn Any + Send + Sync>,
    render: Arc<RenderThunk>,
    overlay: Option<ContextValues>,
}

impl Element {
    /// Build an element directly from a component and its props.
    pub fn new<P, C>(component: C, props: P) -> Self
    where
        P: Send + Sync + 'static,
        C: Fn(&P, &RenderContext) -> Result<Renderable> + Send + Sync + 'static,
    {
        let props = Arc::new(props);
        let render_props = Arc::clone(&props);
        Self {
            component: ComponentRef {
                name: short_type_name(std::any::type_name::<C>()),
                type_id: TypeId::of::<C>(),
            },
            props,
            render: Arc::new(move |ctx: &RenderContext| component(&render_props, ctx)),
            overlay: None,
        }
    }

    /// Invoke the component with the given context.
    pub fn render(&self, ctx: &RenderContext) -> Result<Renderable> {
        (self.render)(ctx)
    }

    /// Short name of the component function, used in log lines.
    pub fn component_name(&self) -> &'static str {
        self.component.name
    }

    /// Whether this element was built from `component`.
    pub fn is_component<C: 'static>(&self, _component: C) -> bool {
        self.component.type_id == TypeId::of::<C>()
    }

    pub fn props<P: 'static>(&self) -> Option<&P> {
        self.props.downcast_ref::<P>()
    }

    pub fn overlay(&self) -> Option<&ContextValues> {
        self.overlay.as_ref()
    }

    pub(crate) fn set_overlay(&mut self, overlay: ContextValues) {
        self.overlay = Some(overlay);
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("component", &self.component.name)
            .field("has_overlay", &self.overlay.is_some())
            .finish()
    }
}

// `crate::chat::user_message` -> `user_message`; closures keep their enclosing fn name.
fn short_type_name(full: &'static str) -> &'static str {
    let without_generics = full.split('<').next().unwrap_or(full);
    without_generics
        .rsplit("::")
        .find(|segment| !segment.is_empty() && !segment.starts_with("{{"))
        .unwrap_or(without_generics)
}

/// Props that can receive children from [`create_element`].
pub trait Props: Default + Send + Sync + 'static {
    fn set_children(&mut self, children: Renderable);
}

/// Props for components whose only input is their children.
#[derive(Debug, Clone, Default)]
pub struct Children {
    pub children: Renderable,
}

impl Props for Children {
    fn set_children(&mut self, children: Renderable) {
        self.children = children;
    }
}

/// Single construction funnel for element trees.
///
/// `None` props means empty props. A single child is passed unwrapped, several
/// children become an ordered list, and no children leaves the props untouched.
pub fn create_element<P, C>(component: C, props: Option<P>, mut children: Vec<Renderable>) -> Element
where
    P: Props,
    C: Fn(&P, &RenderContext) -> Result<Renderable> + Send + Sync + 'static,
{
    let mut props = props.unwrap_or_default();
    if children.len() == 1 {
        if let Some(only) = children.pop() {
            props.set_children(only);
        }
    } else if !children.is_empty() {
        props.set_children(Renderable::List(children));
    }
    Element::new(component, props)
}

/// Component that renders its children unchanged.
pub fn passthrough(props: &Children, _ctx: &RenderContext) -> Result<Renderable> {
    Ok(props.children.clone())
}

/// Group several renderables under one element.
pub fn fragment(children: impl Into<Renderable>) -> Element {
    Element::new(
        passthrough,
        Children {
            children: children.into(),
        },
    )
}
