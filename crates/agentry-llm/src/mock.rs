use agentry_core::{
    ChatMessage, FinishReason, LLMChunk, LLMError, LLMProvider, LLMRequest, LLMResponse,
    LLMStream, TokenUsage, ToolCallDelta,
};
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Mock LLM provider for testing
#[derive(Clone)]
pub struct MockLLMProvider {
    inner: Arc<RwLock<MockLLMProviderInner>>,
    active_streams: Arc<AtomicUsize>,
}

struct MockLLMProviderInner {
    name: String,
    responses: Vec<LLMResponse>,
    response_index: usize,
    cycle_responses: bool,
    call_history: Vec<MockCall>,
    queued_errors: VecDeque<LLMError>,
    error: Option<LLMError>,
    latency_ms: u64,
    chunk_delay_ms: u64,
}

#[derive(Debug, Clone)]
pub struct MockCall {
    pub request: LLMRequest,
    pub streaming: bool,
    pub timestamp: std::time::Instant,
}

/// Decrements the live-stream counter when the stream is dropped.
struct StreamGuard(Arc<AtomicUsize>);

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockLLMProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(MockLLMProviderInner {
                name: name.into(),
                responses: Vec::new(),
                response_index: 0,
                cycle_responses: false,
                call_history: Vec::new(),
                queued_errors: VecDeque::new(),
                error: None,
                latency_ms: 0,
                chunk_delay_ms: 0,
            })),
            active_streams: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn add_response(&self, response: LLMResponse) {
        self.inner.write().responses.push(response);
    }

    pub fn set_response(&self, response: impl Into<String>) {
        self.set_responses(vec![response.into()], false);
    }

    pub fn set_responses(&self, responses: Vec<String>, cycle: bool) {
        let mut inner = self.inner.write();
        inner.responses = responses
            .into_iter()
            .map(|content| LLMResponse::new(content, FinishReason::Stop))
            .collect();
        inner.response_index = 0;
        inner.cycle_responses = cycle;
    }

    /// Scripted responses; with `cycle` the script restarts after the last one,
    /// otherwise the last one repeats.
    pub fn set_scripted(&self, responses: Vec<LLMResponse>, cycle: bool) {
        let mut inner = self.inner.write();
        inner.responses = responses;
        inner.response_index = 0;
        inner.cycle_responses = cycle;
    }

    /// Every call fails with `error` until [`clear_error`](Self::clear_error).
    pub fn set_error(&self, error: LLMError) {
        self.inner.write().error = Some(error);
    }

    pub fn clear_error(&self) {
        self.inner.write().error = None;
    }

    /// The next call fails with `error`; queued errors are used before responses.
    pub fn queue_error(&self, error: LLMError) {
        self.inner.write().queued_errors.push_back(error);
    }

    pub fn set_latency(&self, latency_ms: u64) {
        self.inner.write().latency_ms = latency_ms;
    }

    /// Delay before each streamed chunk after the first.
    pub fn set_chunk_delay(&self, delay_ms: u64) {
        self.inner.write().chunk_delay_ms = delay_ms;
    }

    pub fn call_count(&self) -> usize {
        self.inner.read().call_history.len()
    }

    pub fn call_history(&self) -> Vec<MockCall> {
        self.inner.read().call_history.clone()
    }

    pub fn last_call(&self) -> Option<MockCall> {
        self.inner.read().call_history.last().cloned()
    }

    pub fn clear_history(&self) {
        self.inner.write().call_history.clear();
    }

    /// Streams handed out and not yet dropped.
    pub fn active_streams(&self) -> usize {
        self.active_streams.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        let mut inner = self.inner.write();
        inner.responses.clear();
        inner.response_index = 0;
        inner.cycle_responses = false;
        inner.call_history.clear();
        inner.queued_errors.clear();
        inner.error = None;
        inner.latency_ms = 0;
        inner.chunk_delay_ms = 0;
    }

    fn get_next_response(&self) -> LLMResponse {
        let mut inner = self.inner.write();

        if inner.responses.is_empty() {
            return LLMResponse::new("Mock response", FinishReason::Stop).with_model("mock-model");
        }

        let response = inner.responses[inner.response_index].clone();
        if inner.cycle_responses {
            inner.response_index = (inner.response_index + 1) % inner.responses.len();
        } else if inner.response_index < inner.responses.len() - 1 {
            inner.response_index += 1;
        }
        response
    }

    fn record_call(&self, request: &LLMRequest, streaming: bool) {
        self.inner.write().call_history.push(MockCall {
            request: request.clone(),
            streaming,
            timestamp: std::time::Instant::now(),
        });
    }

    fn take_error(&self) -> Option<LLMError> {
        let mut inner = self.inner.write();
        inner
            .queued_errors
            .pop_front()
            .or_else(|| inner.error.clone())
    }

    /// Simulate latency if configured
    async fn simulate_latency(&self) {
        let latency_ms = self.inner.read().latency_ms;
        if latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(latency_ms)).await;
        }
    }

    fn estimate_tokens(messages: &[ChatMessage]) -> u32 {
        let total_chars: usize = messages.iter().map(|m| m.content.len()).sum();
        (total_chars / 4) as u32
    }

    fn with_usage(response: &mut LLMResponse, messages: &[ChatMessage]) {
        if response.usage.is_none() {
            let prompt_tokens = Self::estimate_tokens(messages);
            let completion_tokens = (response.content.len() / 4) as u32;
            response.usage = Some(TokenUsage::new(prompt_tokens, completion_tokens));
        }
    }

    fn chunks(response: LLMResponse) -> Vec<LLMChunk> {
        let mut chunks: Vec<LLMChunk> = response
            .content
            .split_whitespace()
            .enumerate()
            .map(|(i, word)| {
                let delta = if i == 0 {
                    word.to_string()
                } else {
                    format!(" {}", word)
                };
                LLMChunk::content(delta)
            })
            .collect();

        chunks.extend(response.tool_calls.iter().enumerate().map(|(index, call)| {
            LLMChunk::tool_call(ToolCallDelta {
                index,
                id: Some(call.id.clone()),
                name: Some(call.name.clone()),
                arguments: call.arguments.clone(),
            })
        }));

        match chunks.pop() {
            Some(last) => chunks.push(last.with_finish_reason(response.finish_reason, response.usage)),
            None => chunks.push(
                LLMChunk::content("").with_finish_reason(response.finish_reason, response.usage),
            ),
        }
        chunks
    }
}

impl Default for MockLLMProvider {
    fn default() -> Self {
        Self::new("default")
    }
}

#[async_trait]
impl LLMProvider for MockLLMProvider {
    async fn complete(&self, request: &LLMRequest) -> Result<LLMResponse, LLMError> {
        self.record_call(request, false);
        self.simulate_latency().await;

        if let Some(error) = self.take_error() {
            return Err(error);
        }

        let mut response = self.get_next_response();
        Self::with_usage(&mut response, &request.messages);
        Ok(response)
    }

    async fn complete_stream(&self, request: &LLMRequest) -> Result<LLMStream, LLMError> {
        self.record_call(request, true);
        self.simulate_latency().await;

        if let Some(error) = self.take_error() {
            return Err(error);
        }

        let mut response = self.get_next_response();
        Self::with_usage(&mut response, &request.messages);
        let chunks = Self::chunks(response);
        let delay = Duration::from_millis(self.inner.read().chunk_delay_ms);

        self.active_streams.fetch_add(1, Ordering::SeqCst);
        let guard = StreamGuard(self.active_streams.clone());

        Ok(async_stream::stream! {
            let _guard = guard;
            for (i, chunk) in chunks.into_iter().enumerate() {
                if i > 0 && !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                yield Ok::<LLMChunk, LLMError>(chunk);
            }
        }
        .boxed())
    }

    fn provider_name(&self) -> &str {
        "mock"
    }
}

impl std::fmt::Debug for MockLLMProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLLMProvider")
            .field("name", &self.inner.read().name)
            .finish_non_exhaustive()
    }
}
