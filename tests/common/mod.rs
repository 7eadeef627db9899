#![allow(dead_code)]

use airender::chat::{ChatCompletionRequest, ChatCompletionResponse};
use airender::{LogImplementation, LogLevel, RenderContext, RenderError};
use parking_lot::Mutex;
use std::sync::Arc;

/// Everything a [`RecordingLogger`] was asked to write.
#[derive(Debug, Clone)]
pub enum Record {
    Line {
        element: &'static str,
        level: LogLevel,
        message: String,
    },
    Exception {
        element: &'static str,
        error: RenderError,
    },
    Request {
        provider: String,
        request: ChatCompletionRequest,
    },
    Response {
        provider: String,
        response: ChatCompletionResponse,
    },
}

#[derive(Default)]
pub struct RecordingLogger {
    records: Mutex<Vec<Record>>,
}

impl RecordingLogger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn records(&self) -> Vec<Record> {
        self.records.lock().clone()
    }

    pub fn exceptions(&self) -> Vec<(&'static str, RenderError)> {
        self.records()
            .into_iter()
            .filter_map(|record| match record {
                Record::Exception { element, error } => Some((element, error)),
                _ => None,
            })
            .collect()
    }

    pub fn lines(&self) -> Vec<(LogLevel, String)> {
        self.records()
            .into_iter()
            .filter_map(|record| match record {
                Record::Line { level, message, .. } => Some((level, message)),
                _ => None,
            })
            .collect()
    }
}

impl LogImplementation for RecordingLogger {
    fn log(&self, ctx: &RenderContext, level: LogLevel, message: &str) {
        self.records.lock().push(Record::Line {
            element: ctx.element().component_name(),
            level,
            message: message.to_string(),
        });
    }

    fn log_exception(&self, ctx: &RenderContext, error: &RenderError) {
        self.records.lock().push(Record::Exception {
            element: ctx.element().component_name(),
            error: error.clone(),
        });
    }

    fn chat_completion_request(
        &self,
        _ctx: &RenderContext,
        provider: &str,
        request: &ChatCompletionRequest,
    ) {
        self.records.lock().push(Record::Request {
            provider: provider.to_string(),
            request: request.clone(),
        });
    }

    fn chat_completion_response(
        &self,
        _ctx: &RenderContext,
        provider: &str,
        response: &ChatCompletionResponse,
    ) {
        self.records.lock().push(Record::Response {
            provider: provider.to_string(),
            response: response.clone(),
        });
    }
}
