//! Error types and handling infrastructure for airender.
//!
//! This module provides a centralized error handling system using `thiserror` for
//! the error variants and `anyhow` for component-level failures with context.
//!
//! ## Design Principles
//!
//! - **Identity**: every [`RenderError`] is reference counted, so the engine can tell
//!   whether a propagating error was already reported by an inner element
//! - **Context preservation**: provider failures keep the request that caused them
//! - **Consistency**: Standardized Result type across all modules

use crate::chat::ChatCompletionRequest;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Every failure the render engine can report.
#[derive(Error, Debug)]
pub enum ErrorKind {
    /// A value reached the evaluator that is none of the recognized renderable shapes
    #[error("Unexpected renderable type: {description}")]
    UnexpectedRenderable { description: String },

    /// A component failed, synchronously or through a future/stream it returned
    #[error("Component <{component}> failed: {source}")]
    Component {
        component: String,
        #[source]
        source: anyhow::Error,
    },

    /// A completion provider failed; carries the request that was being served
    #[error("Chat completion failed: {message}")]
    ChatCompletion {
        message: String,
        request: Box<ChatCompletionRequest>,
    },

    /// A conversation contained an element that is not a chat message
    #[error("Unknown message type: <{component}>")]
    UnknownMessageType { component: String },

    /// A component needed a context value that nothing provided
    #[error("Missing context value: {message}")]
    MissingContext { message: String },

    /// Generic error for cases not covered by specific variants
    #[error("Render failed: {message}")]
    Other { message: String },
}

/// Cheaply clonable error handle used throughout the engine.
///
/// Clones share the same underlying [`ErrorKind`]; [`RenderError::same`] compares that
/// identity rather than the message.
#[derive(Clone)]
pub struct RenderError {
    kind: Arc<ErrorKind>,
}

/// Standard Result type for airender operations.
pub type Result<T> = std::result::Result<T, RenderError>;

impl RenderError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind: Arc::new(kind),
        }
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Whether two handles refer to the same error instance.
    pub fn same(a: &RenderError, b: &RenderError) -> bool {
        Arc::ptr_eq(&a.kind, &b.kind)
    }

    // Address of the shared kind; stable for as long as any clone is alive.
    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.kind) as *const () as usize
    }

    /// Create an UnexpectedRenderable error describing the offending value
    pub fn unexpected_renderable(description: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnexpectedRenderable {
            description: description.into(),
        })
    }

    /// Wrap an arbitrary failure raised by a component
    pub fn component(component: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::new(ErrorKind::Component {
            component: component.into(),
            source: source.into(),
        })
    }

    /// Create a ChatCompletion error carrying the request metadata
    pub fn chat_completion(message: impl Into<String>, request: ChatCompletionRequest) -> Self {
        Self::new(ErrorKind::ChatCompletion {
            message: message.into(),
            request: Box::new(request),
        })
    }

    pub fn unknown_message_type(component: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownMessageType {
            component: component.into(),
        })
    }

    pub fn missing_context(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MissingContext {
            message: message.into(),
        })
    }

    /// Create a generic Other error with a descriptive message
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Other {
            message: message.into(),
        })
    }
}

impl fmt::Debug for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.kind, f)
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.kind, f)
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.kind.source()
    }
}

impl From<ErrorKind> for RenderError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

// Components written with `anyhow` can use `?` directly; a RenderError that was
// wrapped into anyhow on the way up keeps its identity.
impl From<anyhow::Error> for RenderError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<RenderError>() {
            Ok(render_error) => render_error,
            Err(err) => Self::new(ErrorKind::Other {
                message: format!("{err:#}"),
            }),
        }
    }
}
