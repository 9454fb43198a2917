use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use agentry_core::{AgentError, ExecutionState, Result};

use crate::transitions::is_allowed;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionTransition {
    pub from: ExecutionState,
    pub to: ExecutionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateMachineSnapshot {
    pub current_state: ExecutionState,
    pub history: Vec<ExecutionTransition>,
}

impl StateMachineSnapshot {
    /// Every state visited, starting with INIT.
    pub fn states(&self) -> Vec<ExecutionState> {
        let mut states = vec![ExecutionState::Init];
        states.extend(self.history.iter().map(|t| t.to));
        states
    }
}

/// Lifecycle state of one call, owned by that call. Identity is kept for diagnostics.
pub struct ExecutionStateMachine {
    owner: String,
    owner_id: String,
    current: RwLock<ExecutionState>,
    history: RwLock<Vec<ExecutionTransition>>,
}

impl ExecutionStateMachine {
    pub fn new(owner: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            owner_id: owner_id.into(),
            current: RwLock::new(ExecutionState::Init),
            history: RwLock::new(Vec::new()),
        }
    }

    pub fn current(&self) -> ExecutionState {
        *self.current.read()
    }

    pub fn is_terminal(&self) -> bool {
        self.current().is_terminal()
    }

    pub fn transition(&self, to: ExecutionState) -> Result<()> {
        self.transition_with_reason(to, None)
    }

    pub fn transition_with_reason(&self, to: ExecutionState, reason: Option<&str>) -> Result<()> {
        let from = {
            let mut current = self.current.write();
            let from = *current;
            if !is_allowed(from, to) {
                return Err(AgentError::InvalidStateTransition {
                    function: self.owner.clone(),
                    function_id: self.owner_id.clone(),
                    from,
                    to,
                });
            }
            *current = to;
            from
        };

        let suffix = reason.map(|r| format!(" ({})", r)).unwrap_or_default();
        if to == ExecutionState::Failed {
            error!("[{}] transition from {} to: {}{}", self.owner, from, to, suffix);
        } else {
            debug!("[{}] transition to: {}{}", self.owner, to, suffix);
        }

        self.history.write().push(ExecutionTransition {
            from,
            to,
            reason: reason.map(str::to_string),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    pub fn history(&self) -> Vec<ExecutionTransition> {
        self.history.read().clone()
    }

    pub fn snapshot(&self) -> StateMachineSnapshot {
        StateMachineSnapshot {
            current_state: self.current(),
            history: self.history(),
        }
    }
}
