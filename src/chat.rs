//! Chat conversation building blocks and the completion-provider boundary.
//!
//! Message components are transparent wrappers whose identity tells a completion
//! component which role their rendered text plays. [`chat_completion`] flattens each
//! message sub-tree to text, hands the conversation to a [`CompletionProvider`], and
//! streams the provider's output as its own.

use crate::context::ContextSlot;
use crate::element::{create_element, Children, Element, Props, Renderable};
use crate::error::{RenderError, Result};
use crate::render::RenderContext;
use async_trait::async_trait;
use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant, SystemTime};

pub fn system_message(props: &Children, _ctx: &RenderContext) -> Result<Renderable> {
    Ok(props.children.clone())
}

pub fn user_message(props: &Children, _ctx: &RenderContext) -> Result<Renderable> {
    Ok(props.children.clone())
}

pub fn assistant_message(props: &Children, _ctx: &RenderContext) -> Result<Renderable> {
    Ok(props.children.clone())
}

pub fn system(children: impl Into<Renderable>) -> Element {
    create_element(system_message, None::<Children>, vec![children.into()])
}

pub fn user(children: impl Into<Renderable>) -> Element {
    create_element(user_message, None::<Children>, vec![children.into()])
}

pub fn assistant(children: impl Into<Renderable>) -> Element {
    create_element(assistant_message, None::<Children>, vec![children.into()])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    fn of(element: &Element) -> Option<Role> {
        if element.is_component(system_message) {
            Some(Role::System)
        } else if element.is_component(user_message) {
            Some(Role::User)
        } else if element.is_component(assistant_message) {
            Some(Role::Assistant)
        } else {
            None
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ConversationMessage {
    pub role: Role,
    pub element: Element,
}

/// Interpret completion children (one message element or a list of them) as a conversation.
pub fn children_to_conversation_messages(children: &Renderable) -> Result<Vec<ConversationMessage>> {
    let items: Vec<&Renderable> = match children {
        Renderable::List(items) => items.iter().filter(|item| !item.is_falsy()).collect(),
        single => vec![single],
    };

    items
        .into_iter()
        .map(|item| match item {
            Renderable::Element(element) => match Role::of(element) {
                Some(role) => Ok(ConversationMessage {
                    role,
                    element: element.clone(),
                }),
                None => Err(RenderError::unknown_message_type(element.component_name())),
            },
            other => Err(RenderError::unknown_message_type(format!("{other:?}"))),
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct RenderedConversationMessage {
    pub role: Role,
    pub element: Element,
    pub content: String,
    pub tokens: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt: usize,
    pub completion: usize,
    pub total: usize,
}

/// Prompt tokens are user and system messages; completion tokens are assistant messages.
pub fn compute_usage(messages: &[RenderedConversationMessage]) -> TokenUsage {
    let prompt = messages
        .iter()
        .filter(|m| matches!(m.role, Role::User | Role::System))
        .map(|m| m.tokens)
        .sum();
    let completion = messages
        .iter()
        .filter(|m| m.role == Role::Assistant)
        .map(|m| m.tokens)
        .sum();

    TokenUsage {
        prompt,
        completion,
        total: prompt + completion,
    }
}

/// Everything a provider needs to serve one completion; also the payload of request logs.
#[derive(Debug, Clone)]
pub struct ChatCompletionRequest {
    pub start_time: SystemTime,
    pub model: String,
    pub provider: Option<String>,
    pub provider_region: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub input_messages: Vec<RenderedConversationMessage>,
}

#[derive(Debug, Clone)]
pub struct ChatCompletionResponse {
    pub request: ChatCompletionRequest,
    pub latency: Duration,
    pub output_message: RenderedConversationMessage,
    pub finish_reason: Option<String>,
    pub tokens_used: TokenUsage,
}

/// One streamed piece of a completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionChunk {
    pub content: String,
    pub finish_reason: Option<String>,
}

pub type CompletionStream = BoxStream<'static, anyhow::Result<CompletionChunk>>;

/// A chat-completion backend.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Name used in logs, e.g. "openai".
    fn name(&self) -> &str;

    fn count_tokens(&self, content: &str) -> usize {
        content.split_whitespace().count()
    }

    async fn stream_completion(&self, request: &ChatCompletionRequest) -> anyhow::Result<CompletionStream>;
}

/// Context slot supplying a provider to completions that do not name one.
pub fn completion_provider_context() -> &'static ContextSlot<Option<Arc<dyn CompletionProvider>>> {
    static PROVIDER_CONTEXT: OnceLock<ContextSlot<Option<Arc<dyn CompletionProvider>>>> =
        OnceLock::new();
    PROVIDER_CONTEXT.get_or_init(|| ContextSlot::new(None))
}

#[derive(Clone, Default)]
pub struct ChatCompletionProps {
    pub provider: Option<Arc<dyn CompletionProvider>>,
    pub model: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Tracking tags copied into the request log.
    pub provider_tag: Option<String>,
    pub provider_region: Option<String>,
    pub children: Renderable,
}

impl ChatCompletionProps {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn CompletionProvider>) -> Self {
        self.provider = Some(provider);
        self
    }
}

impl Props for ChatCompletionProps {
    fn set_children(&mut self, children: Renderable) {
        self.children = children;
    }
}

/// Streaming completion component.
pub fn chat_completion(props: &ChatCompletionProps, ctx: &RenderContext) -> Result<Renderable> {
    let messages = children_to_conversation_messages(&props.children)?;
    let provider = props
        .provider
        .clone()
        .or_else(|| ctx.get_context(completion_provider_context()))
        .ok_or_else(|| {
            RenderError::missing_context("chat_completion requires a completion provider")
        })?;

    let props = props.clone();
    let ctx = ctx.clone();
    let output = stream::once(async move {
        match open_completion(props, ctx, provider, messages).await {
            Ok(stream) => stream,
            Err(err) => stream::once(future::ready(Err(err))).boxed(),
        }
    })
    .flatten();

    Ok(Renderable::stream(output))
}

async fn open_completion(
    props: ChatCompletionProps,
    ctx: RenderContext,
    provider: Arc<dyn CompletionProvider>,
    messages: Vec<ConversationMessage>,
) -> Result<BoxStream<'static, Result<String>>> {
    let started = Instant::now();
    let start_time = SystemTime::now();

    let input_messages = future::try_join_all(messages.into_iter().map(|message| {
        let ctx = ctx.clone();
        let provider = Arc::clone(&provider);
        async move {
            let content = ctx.render(message.element.clone()).await?;
            let tokens = provider.count_tokens(&content);
            Ok::<_, RenderError>(RenderedConversationMessage {
                role: message.role,
                element: message.element,
                content,
                tokens,
            })
        }
    }))
    .await?;

    let request = ChatCompletionRequest {
        start_time,
        model: props.model,
        provider: props.provider_tag,
        provider_region: props.provider_region,
        max_tokens: props.max_tokens,
        temperature: props.temperature,
        input_messages,
    };
    ctx.logger()
        .chat_completion_request(provider.name(), &request);

    let chunks = provider
        .stream_completion(&request)
        .await
        .map_err(|err| {
            RenderError::chat_completion(format!("{}: {err:#}", provider.name()), request.clone())
        })?;

    let state = CompletionState {
        ctx,
        provider,
        request,
        chunks,
        started,
        content: String::new(),
        finish_reason: None,
        done: false,
    };
    Ok(stream::unfold(state, |mut state| async move {
        state.next_chunk().await.map(|chunk| (chunk, state))
    })
    .boxed())
}

struct CompletionState {
    ctx: RenderContext,
    provider: Arc<dyn CompletionProvider>,
    request: ChatCompletionRequest,
    chunks: CompletionStream,
    started: Instant,
    content: String,
    finish_reason: Option<String>,
    done: bool,
}

impl CompletionState {
    async fn next_chunk(&mut self) -> Option<Result<String>> {
        while !self.done {
            match self.chunks.next().await {
                Some(Ok(chunk)) => {
                    if chunk.finish_reason.is_some() {
                        self.finish_reason = chunk.finish_reason;
                    }
                    if chunk.content.is_empty() {
                        continue;
                    }
                    self.content.push_str(&chunk.content);
                    return Some(Ok(chunk.content));
                }
                Some(Err(err)) => {
                    self.done = true;
                    return Some(Err(RenderError::chat_completion(
                        format!("{}: {err:#}", self.provider.name()),
                        self.request.clone(),
                    )));
                }
                None => {
                    self.done = true;
                    self.log_response();
                }
            }
        }
        None
    }

    fn log_response(&self) {
        let content = self.content.clone();
        let output_message = RenderedConversationMessage {
            role: Role::Assistant,
            element: assistant(content.clone()),
            tokens: self.provider.count_tokens(&content),
            content,
        };
        let mut conversation = self.request.input_messages.clone();
        conversation.push(output_message.clone());

        let response = ChatCompletionResponse {
            request: self.request.clone(),
            latency: self.started.elapsed(),
            output_message,
            finish_reason: self.finish_reason.clone(),
            tokens_used: compute_usage(&conversation),
        };
        self.ctx
            .logger()
            .chat_completion_response(self.provider.name(), &response);
    }
}
