//! Prompt assembly and request preparation

use std::sync::Arc;

use agentry_core::{
    ChatMessage, Example, LLMRequest, Memory, Result, Role, TokenCounter, ToolDefinition,
};
use agentry_llm::ModelCatalog;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::budget::{BudgetPolicy, RunConfig};
use crate::examples::ExampleManager;
use crate::tokens::EstimatingCounter;

/// Keeps the last `window` messages, widened backwards so that tool results
/// never lose the assistant message that requested them.
fn recent_turns(mut history: Vec<ChatMessage>, window: usize) -> Vec<ChatMessage> {
    let mut start = history.len().saturating_sub(window);
    while start > 0 && history[start].role == Role::Tool {
        start -= 1;
    }
    if start > 0 {
        debug!(dropped = start, "memory window applied");
    }
    history.split_off(start)
}

/// Serializable prompt settings, as found under `prompt:` in an agent file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    #[serde(default)]
    pub system_role: String,

    #[serde(default)]
    pub formatting_instruction: Option<String>,

    #[serde(default = "default_time_aware")]
    pub time_aware: bool,

    /// Most recent memory messages to include. All when unset.
    #[serde(default)]
    pub memory_window: Option<usize>,

    #[serde(default)]
    pub examples: Vec<Example>,

    #[serde(default = "default_example_k")]
    pub example_k: usize,

    #[serde(default)]
    pub budget: BudgetPolicy,

    #[serde(default)]
    pub catalog: ModelCatalog,
}

fn default_time_aware() -> bool {
    true
}

fn default_example_k() -> usize {
    3
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system_role: String::new(),
            formatting_instruction: None,
            time_aware: default_time_aware(),
            memory_window: None,
            examples: Vec::new(),
            example_k: default_example_k(),
            budget: BudgetPolicy::default(),
            catalog: ModelCatalog::default(),
        }
    }
}

/// Per-request options for [`PromptManager::prepare_request`].
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Falls back to the catalog's default model.
    pub model: Option<String>,
    pub temperature: f32,
    /// Falls back to the budget policy's multiplier.
    pub completion_multiplier: Option<f64>,
    pub tools: Vec<ToolDefinition>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_completion_multiplier(mut self, multiplier: f64) -> Self {
        self.completion_multiplier = Some(multiplier);
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }
}

/// Builds the message sequence for each turn and picks the model and
/// completion budget that fit it.
pub struct PromptManager {
    system_role: String,
    memory: Option<Arc<dyn Memory>>,
    memory_window: Option<usize>,
    example_manager: Option<ExampleManager>,
    formatting_instruction: Option<String>,
    time_aware: bool,
    catalog: ModelCatalog,
    budget: BudgetPolicy,
    counter: Arc<dyn TokenCounter>,
}

impl PromptManager {
    pub fn new(system_role: impl Into<String>) -> Self {
        Self {
            system_role: system_role.into(),
            memory: None,
            memory_window: None,
            example_manager: None,
            formatting_instruction: None,
            time_aware: true,
            catalog: ModelCatalog::default(),
            budget: BudgetPolicy::default(),
            counter: Arc::new(EstimatingCounter),
        }
    }

    pub fn from_config(config: PromptConfig) -> Self {
        let mut manager = Self::new(config.system_role)
            .with_time_awareness(config.time_aware)
            .with_catalog(config.catalog)
            .with_budget(config.budget);
        manager.memory_window = config.memory_window;
        manager.formatting_instruction = config.formatting_instruction;
        if !config.examples.is_empty() {
            manager.example_manager =
                Some(ExampleManager::new(config.examples).with_k(config.example_k));
        }
        manager
    }

    pub fn with_memory(mut self, memory: Arc<dyn Memory>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_memory_window(mut self, window: usize) -> Self {
        self.memory_window = Some(window);
        self
    }

    pub fn with_examples(mut self, manager: ExampleManager) -> Self {
        self.example_manager = Some(manager);
        self
    }

    pub fn with_formatting_instruction(mut self, instruction: impl Into<String>) -> Self {
        let instruction = instruction.into();
        self.formatting_instruction = Some(instruction.trim().to_string());
        self
    }

    pub fn with_time_awareness(mut self, enabled: bool) -> Self {
        self.time_aware = enabled;
        self
    }

    pub fn with_catalog(mut self, catalog: ModelCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_budget(mut self, budget: BudgetPolicy) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.counter = counter;
        self
    }

    pub fn memory(&self) -> Option<&Arc<dyn Memory>> {
        self.memory.as_ref()
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn budget(&self) -> &BudgetPolicy {
        &self.budget
    }

    fn system_message(&self) -> ChatMessage {
        if !self.time_aware {
            return ChatMessage::system(self.system_role.clone());
        }
        ChatMessage::system(format!(
            "{}\n\n\n<Current time: {}>",
            self.system_role,
            Utc::now().format("%Y-%m-%d %H:%M:%S")
        ))
    }

    /// `[system] + memory + examples + [formatting instruction] + [message]`.
    pub async fn format_messages(&self, message: &ChatMessage) -> Result<Vec<ChatMessage>> {
        let mut messages = vec![self.system_message()];

        if let Some(memory) = &self.memory {
            let history = memory.get_messages(None).await?;
            messages.extend(match self.memory_window {
                Some(window) => recent_turns(history, window),
                None => history,
            });
        }

        if let Some(examples) = &self.example_manager {
            let from_user = message.role == Role::User;
            messages.extend(examples.messages(&message.content, from_user).await?);
        }

        if let Some(instruction) = &self.formatting_instruction {
            messages.push(ChatMessage::user(instruction.clone()));
        }

        messages.push(message.clone());
        Ok(messages)
    }

    pub fn run_config(&self, model: &str, input_tokens: u32, multiplier: f64) -> RunConfig {
        self.budget
            .run_config(&self.catalog, model, input_tokens, multiplier)
    }

    pub async fn prepare_request(
        &self,
        message: &ChatMessage,
        options: &CallOptions,
    ) -> Result<LLMRequest> {
        let messages = self.format_messages(message).await?;
        let input_tokens = self.counter.count(&messages);

        let model = options
            .model
            .as_deref()
            .unwrap_or(self.catalog.default_model.as_str());
        let multiplier = options
            .completion_multiplier
            .unwrap_or(self.budget.completion_multiplier);
        let run = self.run_config(model, input_tokens, multiplier);

        debug!(
            model = %run.model,
            input_tokens,
            max_tokens = run.max_tokens,
            messages = messages.len(),
            "prepared request"
        );

        Ok(LLMRequest::new(run.model, messages)
            .with_temperature(options.temperature)
            .with_max_tokens(run.max_tokens)
            .with_tools(options.tools.clone()))
    }

    /// No-op without memory.
    pub async fn add_memory(&self, message: ChatMessage) -> Result<()> {
        if let Some(memory) = &self.memory {
            memory.add_message(message).await?;
        }
        Ok(())
    }

    /// Tokens the fixed part of the prompt costs, measured with an empty user turn.
    pub async fn size(&self) -> Result<u32> {
        let messages = self.format_messages(&ChatMessage::user("")).await?;
        Ok(self.counter.count(&messages))
    }
}

impl std::fmt::Debug for PromptManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptManager")
            .field("system_role", &self.system_role)
            .field("memory", &self.memory.as_ref().map(|m| m.len()))
            .field("example_manager", &self.example_manager)
            .field("formatting_instruction", &self.formatting_instruction)
            .field("time_aware", &self.time_aware)
            .field("budget", &self.budget)
            .finish()
    }
}
