//! Context slots and scoped configuration.
//!
//! A [`ContextSlot`] is a globally allocated key with a default value. Values bound to a
//! slot live in immutable [`ContextValues`] maps carried by each render context node, so
//! a lookup never touches global mutable state. A Provider overrides a slot for its
//! subtree by attaching an overlay to the element that wraps that subtree.

use crate::element::{Children, Element, Renderable};
use crate::error::Result;
use crate::render::RenderContext;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_SLOT_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque handle identifying a context slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(u64);

impl SlotId {
    fn next() -> Self {
        Self(NEXT_SLOT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A typed context key with a default value.
pub struct ContextSlot<T> {
    id: SlotId,
    default_value: Arc<T>,
}

impl<T> Clone for ContextSlot<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            default_value: Arc::clone(&self.default_value),
        }
    }
}

impl<T> fmt::Debug for ContextSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextSlot").field("id", &self.id).finish()
    }
}

impl<T: Clone + Send + Sync + 'static> ContextSlot<T> {
    pub fn new(default_value: T) -> Self {
        Self {
            id: SlotId::next(),
            default_value: Arc::new(default_value),
        }
    }

    pub fn id(&self) -> SlotId {
        self.id
    }

    pub fn default_value(&self) -> T {
        (*self.default_value).clone()
    }

    /// Provider for this slot: binds `value` for everything rendered inside `children`.
    pub fn provider(&self, value: T, children: impl Into<Renderable>) -> Element {
        let overlay = ContextValues::new().with(self, value);
        let inner = Element::new(
            context_value_provider,
            Children {
                children: children.into(),
            },
        );
        attach_overlay(inner, overlay)
    }

    /// Value of this slot as seen from `ctx`.
    pub fn get(&self, ctx: &RenderContext) -> T {
        ctx.get_context(self)
    }
}

/// Allocate a new context slot.
pub fn create_context<T: Clone + Send + Sync + 'static>(default_value: T) -> ContextSlot<T> {
    ContextSlot::new(default_value)
}

type SlotValue = Arc<dyn Any + Send + Sync>;

/// Immutable mapping from slot to bound value.
///
/// Cloning is cheap; `with` and `merged` copy on write and never modify a map that
/// another context node may already share.
#[derive(Clone, Default)]
pub struct ContextValues {
    values: Arc<HashMap<SlotId, SlotValue>>,
}

impl ContextValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of this map with `slot` bound to `value`.
    pub fn with<T: Send + Sync + 'static>(mut self, slot: &ContextSlot<T>, value: T) -> Self {
        Arc::make_mut(&mut self.values).insert(slot.id, Arc::new(value));
        self
    }

    /// Copy of this map shallow-merged with `overlay`; overlay entries win.
    pub fn merged(&self, overlay: &ContextValues) -> ContextValues {
        if overlay.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return overlay.clone();
        }
        let mut values = (*self.values).clone();
        values.extend(
            overlay
                .values
                .iter()
                .map(|(id, value)| (*id, Arc::clone(value))),
        );
        Self {
            values: Arc::new(values),
        }
    }

    pub fn get<T: Clone + 'static>(&self, slot: &ContextSlot<T>) -> Option<T> {
        self.values
            .get(&slot.id)
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }

    pub fn contains(&self, id: SlotId) -> bool {
        self.values.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for ContextValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut slots: Vec<_> = self.values.keys().collect();
        slots.sort();
        f.debug_struct("ContextValues")
            .field("slots", &slots)
            .finish()
    }
}

fn context_value_provider(props: &Children, _ctx: &RenderContext) -> Result<Renderable> {
    Ok(props.children.clone())
}

fn bound_context_values(props: &Children, _ctx: &RenderContext) -> Result<Renderable> {
    Ok(props.children.clone())
}

// First writer wins: an element that already carries an overlay keeps it.
fn attach_overlay(mut element: Element, overlay: ContextValues) -> Element {
    if element.overlay().is_none() {
        element.set_overlay(overlay);
    }
    element
}

/// Bind `overlay` to a renderable so it applies while rendering that renderable.
///
/// Literals are returned unchanged, lists get the overlay on each item, elements get it
/// unless they already carry one, and futures or streams are wrapped in a transparent
/// element first so the overlay has somewhere to live.
pub fn with_context_values(renderable: Renderable, overlay: &ContextValues) -> Renderable {
    match renderable {
        Renderable::Literal(_) => renderable,
        Renderable::List(items) => Renderable::List(
            items
                .into_iter()
                .map(|item| with_context_values(item, overlay))
                .collect(),
        ),
        Renderable::Element(element) => {
            Renderable::Element(attach_overlay(element, overlay.clone()))
        }
        other @ (Renderable::Future(_) | Renderable::Stream(_)) => {
            let wrapper = Element::new(bound_context_values, Children { children: other });
            Renderable::Element(attach_overlay(wrapper, overlay.clone()))
        }
    }
}
