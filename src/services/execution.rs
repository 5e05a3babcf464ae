use std::time::Instant;

use serde_json::{json, Value};
use tokio::time::timeout;
use tracing::{debug, warn};

use super::model_client::ChatCompletionRequest;
use super::tool_call_utils::{
    arguments_or_empty, extract_arguments_str, extract_function_info, extract_tool_call_id,
};
use crate::core::agent::Agent;
use crate::core::memory::AgentMemory;
use crate::core::state::LoopState;
use crate::core::steps::AgentStep;
use crate::error::{AgentError, Result};
use crate::types::result::{RunResult, TokenUsage};

impl Agent {
    /// Run one prompt through the think/act/observe loop.
    ///
    /// Each step is one model round: the model either proposes tool calls,
    /// which are dispatched through the bridge with their results appended
    /// as observations, or answers in plain text, which ends the run.
    /// Malformed proposals and argument-validation failures become error
    /// observations the model can recover from; fatal bridge errors and the
    /// step limit end the run as failures.
    pub async fn run(&self, prompt: &str) -> Result<RunResult> {
        let started = Instant::now();
        let mut memory = AgentMemory::with_default_system();
        memory.add_step(AgentStep::Task {
            content: prompt.to_string(),
        });

        let mut state = LoopState::AwaitingModel;
        let mut tokens: Option<TokenUsage> = None;
        let mut steps_used = 0;

        match self
            .drive(&mut memory, &mut state, &mut tokens, &mut steps_used)
            .await
        {
            Ok(output) => {
                debug!(
                    target: "crm_agent::loop",
                    "run complete: {} action(s), {} observation(s) in {} step(s)",
                    memory.count_actions(),
                    memory.count_observations(),
                    steps_used
                );
                Ok(RunResult::new(
                    output,
                    memory.steps().to_vec(),
                    tokens,
                    started.elapsed(),
                    steps_used,
                ))
            }
            Err(e) => {
                let failed = transition(state, LoopState::Failed);
                warn!(target: "crm_agent::loop", "run ended in state {}: {}", failed, e);
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        memory: &mut AgentMemory,
        state: &mut LoopState,
        tokens: &mut Option<TokenUsage>,
        steps_used: &mut usize,
    ) -> Result<String> {
        let model_tools = self.bridge().to_model_tools();

        while *steps_used < self.max_steps() {
            *steps_used += 1;
            debug!(
                target: "crm_agent::loop",
                "model round {}/{}",
                steps_used,
                self.max_steps()
            );

            let response = self.model_round(memory, &model_tools).await?;
            if let Some(usage) = TokenUsage::from_response(&response) {
                *tokens = Some(match tokens.take() {
                    Some(total) => total.merge(usage),
                    None => usage,
                });
            }
            let message = extract_message(&response)?;

            let tool_calls = message
                .get("tool_calls")
                .and_then(|calls| calls.as_array())
                .filter(|calls| !calls.is_empty())
                .cloned();

            match tool_calls {
                Some(calls) => {
                    *state = transition(*state, LoopState::ExecutingTool);
                    self.execute_tool_calls(memory, &calls).await?;
                    *state = transition(*state, LoopState::AwaitingModel);
                }
                None => {
                    let answer = extract_content(&message);
                    if answer.is_empty() {
                        warn!("model returned neither tool calls nor content");
                    }
                    memory.add_step(AgentStep::FinalAnswer {
                        answer: answer.clone(),
                    });
                    *state = transition(*state, LoopState::Done);
                    return Ok(answer);
                }
            }
        }

        Err(AgentError::StepLimitExceeded(self.max_steps()))
    }

    async fn model_round(&self, memory: &AgentMemory, model_tools: &[Value]) -> Result<Value> {
        let mut request = ChatCompletionRequest::new(self.model().to_owned(), memory.as_messages())
            .with_max_tokens(self.max_tokens());
        if !model_tools.is_empty() {
            request = request
                .with_tools(model_tools.to_vec())
                .with_tool_choice(json!("auto"));
        }
        let body = request.into_value();

        timeout(self.timeout(), self.make_raw_request(&body))
            .await
            .map_err(|_| {
                AgentError::Timeout(format!(
                    "model request timed out after {}s",
                    self.timeout().as_secs()
                ))
            })?
    }

    /// Dispatch the model's proposed calls in order. Recoverable problems
    /// are fed back as error observations; a fatal bridge error aborts the
    /// run.
    async fn execute_tool_calls(
        &self,
        memory: &mut AgentMemory,
        tool_calls: &[Value],
    ) -> Result<()> {
        for tool_call in tool_calls {
            let call_id = extract_tool_call_id(tool_call).to_string();

            let (function, function_name) = match extract_function_info(tool_call) {
                Some(info) => info,
                None => {
                    observe_error(
                        memory,
                        call_id,
                        &AgentError::InvalidToolCall(
                            "tool call has no function object".to_string(),
                        ),
                    );
                    continue;
                }
            };
            let tool_name = match function_name {
                Some(name) if !name.is_empty() => name,
                _ => {
                    observe_error(
                        memory,
                        call_id,
                        &AgentError::InvalidToolCall("tool call has no function name".to_string()),
                    );
                    continue;
                }
            };

            let arguments = match arguments_or_empty(extract_arguments_str(&function), &tool_name)
            {
                Ok(arguments) => arguments,
                Err(e) => {
                    observe_error(memory, call_id, &e);
                    continue;
                }
            };

            memory.add_step(AgentStep::Action {
                tool_name: tool_name.clone(),
                tool_call_id: call_id.clone(),
                arguments: arguments.clone(),
            });

            match self.bridge().invoke(&tool_name, arguments).await {
                Ok(result) => {
                    memory.add_step(AgentStep::Observation {
                        tool_call_id: call_id,
                        result: result.observation_value().to_string(),
                        is_error: result.errored(),
                    });
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => observe_error(memory, call_id, &e),
            }
        }
        Ok(())
    }
}

fn transition(current: LoopState, next: LoopState) -> LoopState {
    debug_assert!(
        current.can_transition_to(next),
        "illegal loop transition {current} -> {next}"
    );
    debug!(target: "crm_agent::loop", "{} -> {}", current, next);
    next
}

fn observe_error(memory: &mut AgentMemory, tool_call_id: String, error: &AgentError) {
    memory.add_step(AgentStep::Observation {
        tool_call_id,
        result: error.to_error_payload().to_string(),
        is_error: true,
    });
}

fn extract_message(response: &Value) -> Result<Value> {
    response
        .get("choices")
        .and_then(|choices| choices.as_array())
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .cloned()
        .ok_or_else(|| AgentError::Model("completion response contained no choices".to_string()))
}

fn extract_content(message: &Value) -> String {
    message
        .get("content")
        .and_then(|content| content.as_str())
        .unwrap_or("")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_message_requires_choices() {
        let err = extract_message(&json!({"usage": {}})).unwrap_err();
        assert_eq!(err.error_code(), "MODEL_ERROR");

        let message = extract_message(&json!({
            "choices": [{"message": {"role": "assistant", "content": "hi"}}]
        }))
        .unwrap();
        assert_eq!(message["content"], "hi");
    }

    #[test]
    fn test_extract_content_handles_absent_and_padded() {
        assert_eq!(extract_content(&json!({"role": "assistant"})), "");
        assert_eq!(extract_content(&json!({"content": "  done  "})), "done");
        assert_eq!(extract_content(&json!({"content": null})), "");
    }

    #[test]
    fn test_transition_returns_next_state() {
        let state = transition(LoopState::AwaitingModel, LoopState::ExecutingTool);
        assert_eq!(state, LoopState::ExecutingTool);
    }
}
