use serde::{Deserialize, Serialize};

/// Explicit state of the think/act/observe loop.
///
/// The runner owns exactly one of these at a time and every change goes
/// through [`LoopState::can_transition_to`], so the loop's shape is
/// enforced rather than implied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    /// Waiting for the model to propose tool calls or a final answer.
    AwaitingModel,
    /// Dispatching the model's proposed tool calls through the bridge.
    ExecutingTool,
    /// The model produced a final answer.
    Done,
    /// A terminal error ended the run.
    Failed,
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopState::Done | LoopState::Failed)
    }

    /// Whether moving to `next` is a legal transition. Failure is reachable
    /// from any live state; terminal states go nowhere.
    pub fn can_transition_to(&self, next: LoopState) -> bool {
        match (self, next) {
            (LoopState::AwaitingModel, LoopState::ExecutingTool) => true,
            (LoopState::AwaitingModel, LoopState::Done) => true,
            (LoopState::ExecutingTool, LoopState::AwaitingModel) => true,
            (from, LoopState::Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LoopState::AwaitingModel => "awaiting_model",
            LoopState::ExecutingTool => "executing_tool",
            LoopState::Done => "done",
            LoopState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        assert!(LoopState::AwaitingModel.can_transition_to(LoopState::ExecutingTool));
        assert!(LoopState::AwaitingModel.can_transition_to(LoopState::Done));
        assert!(LoopState::ExecutingTool.can_transition_to(LoopState::AwaitingModel));
        assert!(LoopState::AwaitingModel.can_transition_to(LoopState::Failed));
        assert!(LoopState::ExecutingTool.can_transition_to(LoopState::Failed));
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!LoopState::ExecutingTool.can_transition_to(LoopState::Done));
        assert!(!LoopState::ExecutingTool.can_transition_to(LoopState::ExecutingTool));
        assert!(!LoopState::AwaitingModel.can_transition_to(LoopState::AwaitingModel));
        assert!(!LoopState::Done.can_transition_to(LoopState::AwaitingModel));
        assert!(!LoopState::Done.can_transition_to(LoopState::Failed));
        assert!(!LoopState::Failed.can_transition_to(LoopState::AwaitingModel));
        assert!(!LoopState::Failed.can_transition_to(LoopState::Failed));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!LoopState::AwaitingModel.is_terminal());
        assert!(!LoopState::ExecutingTool.is_terminal());
        assert!(LoopState::Done.is_terminal());
        assert!(LoopState::Failed.is_terminal());
    }

    #[test]
    fn test_display_matches_serde_names() {
        assert_eq!(LoopState::AwaitingModel.to_string(), "awaiting_model");
        assert_eq!(
            serde_json::to_value(LoopState::ExecutingTool).unwrap(),
            serde_json::json!("executing_tool")
        );
    }
}
