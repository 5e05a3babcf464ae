use crate::core::steps::AgentStep;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Result of an agent execution run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// Final output from the agent
    pub output: String,
    /// All reasoning steps taken during execution
    pub steps: Vec<AgentStep>,
    /// Total tokens used (if available from API)
    pub tokens: Option<TokenUsage>,
    /// Total execution duration
    pub duration: Duration,
    /// Number of model rounds used
    pub steps_used: usize,
}

/// Token usage information from the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    /// Parse the `usage` object from a chat-completions response.
    pub fn from_response(response: &Value) -> Option<Self> {
        let usage = response.get("usage")?;
        let field = |name: &str| usage.get(name).and_then(Value::as_u64).unwrap_or(0) as u32;
        Some(Self {
            prompt_tokens: field("prompt_tokens"),
            completion_tokens: field("completion_tokens"),
            total_tokens: field("total_tokens"),
        })
    }

    /// Accumulate usage across model rounds.
    pub fn merge(self, other: Self) -> Self {
        Self {
            prompt_tokens: self.prompt_tokens + other.prompt_tokens,
            completion_tokens: self.completion_tokens + other.completion_tokens,
            total_tokens: self.total_tokens + other.total_tokens,
        }
    }
}

impl RunResult {
    /// Create a new RunResult
    pub fn new(
        output: String,
        steps: Vec<AgentStep>,
        tokens: Option<TokenUsage>,
        duration: Duration,
        steps_used: usize,
    ) -> Self {
        Self {
            output,
            steps,
            tokens,
            duration,
            steps_used,
        }
    }

    /// Generate a human-readable replay of the execution
    pub fn replay(&self) -> String {
        let mut lines = Vec::new();

        lines.push("=== Agent Execution Trace ===".to_string());
        lines.push(format!("Duration: {:.2}s", self.duration.as_secs_f64()));
        lines.push(format!("Steps used: {}", self.steps_used));

        if let Some(tokens) = &self.tokens {
            lines.push(format!(
                "Tokens: {} prompt + {} completion = {} total",
                tokens.prompt_tokens, tokens.completion_tokens, tokens.total_tokens
            ));
        }

        lines.push(String::new());
        lines.push("--- Steps ---".to_string());

        for (idx, step) in self.steps.iter().enumerate() {
            lines.push(format!("{}. {}", idx + 1, step.describe()));
        }

        lines.push(String::new());
        lines.push("--- Final Output ---".to_string());
        lines.push(self.output.clone());

        lines.join("\n")
    }

    /// Generate a detailed explanation with full step data
    pub fn explain(&self) -> String {
        let mut lines = Vec::new();

        lines.push("=== Agent Execution Explanation ===".to_string());
        lines.push(format!("Duration: {:.2}s", self.duration.as_secs_f64()));
        lines.push(format!("Steps used: {}", self.steps_used));

        if let Some(tokens) = &self.tokens {
            lines.push(format!(
                "Tokens: {} prompt + {} completion = {} total",
                tokens.prompt_tokens, tokens.completion_tokens, tokens.total_tokens
            ));
        }

        lines.push(String::new());
        lines.push("--- Detailed Steps ---".to_string());

        for (idx, step) in self.steps.iter().enumerate() {
            lines.push(format!("\n{}. {}", idx + 1, step.describe()));

            match step {
                AgentStep::Task { content } => {
                    lines.push(format!("   Content: {}", content));
                }
                AgentStep::Action {
                    tool_name,
                    tool_call_id,
                    arguments,
                } => {
                    lines.push(format!("   Tool: {}", tool_name));
                    lines.push(format!("   Call ID: {}", tool_call_id));
                    lines.push(format!("   Arguments: {}", arguments));
                }
                AgentStep::Observation {
                    tool_call_id,
                    result,
                    is_error,
                } => {
                    lines.push(format!("   Call ID: {}", tool_call_id));
                    lines.push(format!("   Error: {}", is_error));
                    lines.push(format!("   Result: {}", result));
                }
                AgentStep::FinalAnswer { answer } => {
                    lines.push(format!("   Answer: {}", answer));
                }
            }
        }

        lines.push(String::new());
        lines.push("--- Final Output ---".to_string());
        lines.push(self.output.clone());

        lines.join("\n")
    }

    /// Get count of actions (tool calls) executed
    pub fn action_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s, AgentStep::Action { .. }))
            .count()
    }

    /// Get count of observations (tool results)
    pub fn observation_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s, AgentStep::Observation { .. }))
            .count()
    }

    /// Check if execution completed successfully (has final answer)
    pub fn is_success(&self) -> bool {
        self.steps
            .iter()
            .any(|s| matches!(s, AgentStep::FinalAnswer { .. }))
    }

    /// Get all error observations
    pub fn errors(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter_map(|s| match s {
                AgentStep::Observation {
                    result, is_error, ..
                } if *is_error => Some(result.as_str()),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_run_result_creation() {
        let steps = vec![
            AgentStep::Task {
                content: "Test task".to_string(),
            },
            AgentStep::FinalAnswer {
                answer: "Test answer".to_string(),
            },
        ];

        let result = RunResult::new(
            "Test answer".to_string(),
            steps,
            None,
            Duration::from_secs(1),
            1,
        );

        assert_eq!(result.output, "Test answer");
        assert_eq!(result.steps_used, 1);
        assert!(result.is_success());
    }

    #[test]
    fn test_action_count() {
        let steps = vec![
            AgentStep::Action {
                tool_name: "tool1".to_string(),
                tool_call_id: "1".to_string(),
                arguments: json!({}),
            },
            AgentStep::Action {
                tool_name: "tool2".to_string(),
                tool_call_id: "2".to_string(),
                arguments: json!({}),
            },
        ];

        let result = RunResult::new("output".to_string(), steps, None, Duration::from_secs(1), 1);

        assert_eq!(result.action_count(), 2);
    }

    #[test]
    fn test_replay_format() {
        let steps = vec![
            AgentStep::Task {
                content: "Test".to_string(),
            },
            AgentStep::FinalAnswer {
                answer: "Done".to_string(),
            },
        ];

        let result = RunResult::new(
            "Done".to_string(),
            steps,
            Some(TokenUsage {
                prompt_tokens: 100,
                completion_tokens: 50,
                total_tokens: 150,
            }),
            Duration::from_secs(2),
            1,
        );

        let replay = result.replay();
        assert!(replay.contains("Duration"));
        assert!(replay.contains("Tokens"));
        assert!(replay.contains("Task"));
        assert!(replay.contains("Final Answer"));
    }

    #[test]
    fn test_error_tracking() {
        let steps = vec![
            AgentStep::Observation {
                tool_call_id: "1".to_string(),
                result: "Error occurred".to_string(),
                is_error: true,
            },
            AgentStep::Observation {
                tool_call_id: "2".to_string(),
                result: "Success".to_string(),
                is_error: false,
            },
        ];

        let result = RunResult::new("output".to_string(), steps, None, Duration::from_secs(1), 1);

        let errors = result.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0], "Error occurred");
    }

    #[test]
    fn test_token_usage_parsing_and_merge() {
        let response = json!({
            "choices": [],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        });
        let usage = TokenUsage::from_response(&response).unwrap();
        assert_eq!(usage.prompt_tokens, 10);
        assert_eq!(usage.total_tokens, 15);

        let merged = usage.merge(TokenUsage {
            prompt_tokens: 20,
            completion_tokens: 10,
            total_tokens: 30,
        });
        assert_eq!(merged.prompt_tokens, 30);
        assert_eq!(merged.total_tokens, 45);

        assert!(TokenUsage::from_response(&json!({"choices": []})).is_none());
    }
}
