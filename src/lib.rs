//! # airender - Streaming Component-Tree Renderer
//!
//! Compose large-language-model prompts and streamed completions out of nested, reusable
//! components, and render the whole tree into one lazily produced, ordered stream of text.
//!
//! ## Features
//!
//! - **Heterogeneous children**: literals, elements, lists, futures and text streams mix freely
//! - **Ordered concurrency**: sibling subtrees run concurrently but emit in declared order
//! - **Scoped configuration**: context slots overridden per subtree by Provider elements
//! - **Two result views**: await the full text or iterate chunks as they arrive
//!
//! ## Architecture
//!
//! - [`error`] - Centralized error types and handling
//! - [`element`] - Literals, elements and the `Renderable` union
//! - [`context`] - Context slots, overlays and providers
//! - [`events`] - Typed publish-subscribe used by the stream coalescer
//! - [`render`] - Render contexts, the tree evaluator and the parallel stream coalescer
//! - [`logging`] - Logger boundary and built-in log implementations
//! - [`chat`] - Conversation messages and the completion-provider boundary

// Core modules
pub mod error;
pub mod events;

// Tree model
pub mod context;
pub mod element;

// Evaluation
pub mod logging;
pub mod render;

// Collaborator boundary
pub mod chat;

// Re-export commonly used types for convenience
pub use error::{ErrorKind, RenderError, Result};

// Public API surface for external usage
pub use context::{create_context, with_context_values, ContextSlot, ContextValues};
pub use element::{create_element, fragment, Children, Element, Literal, Props, Renderable};
pub use logging::{LogImplementation, LogLevel, NoopLogImplementation, StandardLogger};
pub use render::{create_render_context, render, RenderContext, RenderOptions, RenderResult};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
