use agentry_core::ExecutionState;

use ExecutionState::*;

/// The only path a successful call may take.
pub const SUCCESS_PATH: [ExecutionState; 7] = [
    Init,
    InputValidation,
    Running,
    OutputValidation,
    ProcessingOutput,
    ProcessedOutputValidation,
    Complete,
];

/// Adjacency table. Every non-terminal state may fail; terminal states have no exits.
pub fn allowed_transitions(from: ExecutionState) -> &'static [ExecutionState] {
    match from {
        Init => &[InputValidation, Failed],
        InputValidation => &[Running, Failed],
        Running => &[OutputValidation, Failed],
        OutputValidation => &[ProcessingOutput, Failed],
        ProcessingOutput => &[ProcessedOutputValidation, Failed],
        ProcessedOutputValidation => &[Complete, Failed],
        Complete | Failed => &[],
    }
}

pub fn is_allowed(from: ExecutionState, to: ExecutionState) -> bool {
    allowed_transitions(from).contains(&to)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_path_is_allowed() {
        for pair in SUCCESS_PATH.windows(2) {
            assert!(is_allowed(pair[0], pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_every_non_terminal_state_can_fail() {
        for state in ExecutionState::ALL {
            assert_eq!(is_allowed(state, Failed), !state.is_terminal(), "{}", state);
        }
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        assert!(allowed_transitions(Complete).is_empty());
        assert!(allowed_transitions(Failed).is_empty());
    }

    #[test]
    fn test_no_skips_or_self_loops() {
        assert!(!is_allowed(Init, Running));
        assert!(!is_allowed(Running, ProcessingOutput));
        assert!(!is_allowed(ProcessingOutput, Complete));
        for state in ExecutionState::ALL {
            assert!(!is_allowed(state, state));
            assert!(!is_allowed(state, Init));
        }
    }

    #[test]
    fn test_forward_progress_only() {
        for from in ExecutionState::ALL {
            for to in allowed_transitions(from) {
                assert!(*to > from, "{} -> {} goes backwards", from, to);
            }
        }
    }
}
