//! Logger boundary of the render engine.
//!
//! The engine reports through a [`LogImplementation`] stored in a context slot, so a
//! Provider can swap loggers for a subtree. Components reach it through
//! [`RenderContext::logger`], which binds the implementation to the calling node.

use crate::chat::{ChatCompletionRequest, ChatCompletionResponse};
use crate::context::ContextSlot;
use crate::error::RenderError;
use crate::render::RenderContext;
use parking_lot::Mutex;
use std::collections::hash_map::{Entry, HashMap};
use std::fmt;
use std::sync::{Arc, OnceLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<LogLevel> for log::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
        }
    }
}

/// Sink for everything the engine and its components log.
pub trait LogImplementation: Send + Sync {
    /// Write one message on behalf of the node `ctx`.
    fn log(&self, ctx: &RenderContext, level: LogLevel, message: &str);

    /// Report an error raised while rendering the element of `ctx`.
    fn log_exception(&self, ctx: &RenderContext, error: &RenderError) {
        let message = format!(
            "Rendering element <{}> failed with exception: {}",
            ctx.element().component_name(),
            error
        );
        self.log(ctx, LogLevel::Error, &message);
    }

    fn chat_completion_request(
        &self,
        _ctx: &RenderContext,
        _provider: &str,
        _request: &ChatCompletionRequest,
    ) {
    }

    fn chat_completion_response(
        &self,
        _ctx: &RenderContext,
        _provider: &str,
        _response: &ChatCompletionResponse,
    ) {
    }
}

/// Discards everything. The default when no logger is supplied.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogImplementation;

impl LogImplementation for NoopLogImplementation {
    fn log(&self, _ctx: &RenderContext, _level: LogLevel, _message: &str) {}
}

/// Forwards to the `log` facade, tagged with the element name and render id.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardLogger;

impl LogImplementation for StandardLogger {
    fn log(&self, ctx: &RenderContext, level: LogLevel, message: &str) {
        log::log!(
            target: "airender",
            log::Level::from(level),
            "<{}> id={} {}",
            ctx.element().component_name(),
            ctx.render_id(),
            message
        );
    }

    fn chat_completion_request(
        &self,
        ctx: &RenderContext,
        provider: &str,
        request: &ChatCompletionRequest,
    ) {
        log::info!(
            target: "airender",
            "<{}> id={} chat completion request provider={} model={} messages={}",
            ctx.element().component_name(),
            ctx.render_id(),
            provider,
            request.model,
            request.input_messages.len()
        );
    }

    fn chat_completion_response(
        &self,
        ctx: &RenderContext,
        provider: &str,
        response: &ChatCompletionResponse,
    ) {
        log::info!(
            target: "airender",
            "<{}> id={} chat completion response provider={} model={} latency={:?} finish_reason={} tokens={}",
            ctx.element().component_name(),
            ctx.render_id(),
            provider,
            response.request.model,
            response.latency,
            response.finish_reason.as_deref().unwrap_or("unknown"),
            response.tokens_used.total
        );
    }
}

/// Fans every call out to several implementations, in order.
#[derive(Clone, Default)]
pub struct CombinedLogger {
    loggers: Vec<Arc<dyn LogImplementation>>,
}

impl CombinedLogger {
    pub fn new(loggers: Vec<Arc<dyn LogImplementation>>) -> Self {
        Self { loggers }
    }
}

impl LogImplementation for CombinedLogger {
    fn log(&self, ctx: &RenderContext, level: LogLevel, message: &str) {
        for logger in &self.loggers {
            logger.log(ctx, level, message);
        }
    }

    fn log_exception(&self, ctx: &RenderContext, error: &RenderError) {
        for logger in &self.loggers {
            logger.log_exception(ctx, error);
        }
    }

    fn chat_completion_request(
        &self,
        ctx: &RenderContext,
        provider: &str,
        request: &ChatCompletionRequest,
    ) {
        for logger in &self.loggers {
            logger.chat_completion_request(ctx, provider, request);
        }
    }

    fn chat_completion_response(
        &self,
        ctx: &RenderContext,
        provider: &str,
        response: &ChatCompletionResponse,
    ) {
        for logger in &self.loggers {
            logger.chat_completion_response(ctx, provider, response);
        }
    }
}

/// Context slot holding the active log implementation.
pub fn logger_context() -> &'static ContextSlot<Arc<dyn LogImplementation>> {
    static LOGGER_CONTEXT: OnceLock<ContextSlot<Arc<dyn LogImplementation>>> = OnceLock::new();
    LOGGER_CONTEXT.get_or_init(|| {
        let noop: Arc<dyn LogImplementation> = Arc::new(NoopLogImplementation);
        ContextSlot::new(noop)
    })
}

/// Errors already reported during one render invocation, keyed by error identity.
///
/// Entries hold a clone of the error so an identity cannot be reused while the
/// ledger is alive.
#[derive(Default)]
pub(crate) struct ExceptionLedger {
    reported: Mutex<HashMap<usize, RenderError>>,
}

impl ExceptionLedger {
    /// Record `error`; returns false if this exact error was recorded before.
    pub(crate) fn first_report(&self, error: &RenderError) -> bool {
        match self.reported.lock().entry(error.identity()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(error.clone());
                true
            }
        }
    }
}

/// A log implementation bound to one render context node.
#[derive(Clone)]
pub struct BoundLogger {
    implementation: Arc<dyn LogImplementation>,
    ctx: RenderContext,
}

impl BoundLogger {
    pub(crate) fn new(implementation: Arc<dyn LogImplementation>, ctx: RenderContext) -> Self {
        Self {
            implementation,
            ctx,
        }
    }

    pub fn error(&self, message: impl fmt::Display) {
        self.log(LogLevel::Error, message);
    }

    pub fn warn(&self, message: impl fmt::Display) {
        self.log(LogLevel::Warn, message);
    }

    pub fn info(&self, message: impl fmt::Display) {
        self.log(LogLevel::Info, message);
    }

    pub fn debug(&self, message: impl fmt::Display) {
        self.log(LogLevel::Debug, message);
    }

    pub fn log(&self, level: LogLevel, message: impl fmt::Display) {
        self.implementation
            .log(&self.ctx, level, &message.to_string());
    }

    /// Report `error` unless it was already reported during this render.
    pub fn log_exception(&self, error: &RenderError) {
        if self.ctx.exception_ledger().first_report(error) {
            self.implementation.log_exception(&self.ctx, error);
        }
    }

    pub fn chat_completion_request(&self, provider: &str, request: &ChatCompletionRequest) {
        self.implementation
            .chat_completion_request(&self.ctx, provider, request);
    }

    pub fn chat_completion_response(&self, provider: &str, response: &ChatCompletionResponse) {
        self.implementation
            .chat_completion_response(&self.ctx, provider, response);
    }
}
