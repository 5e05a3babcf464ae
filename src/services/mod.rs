pub mod execution;
pub mod model_client;
pub(crate) mod tool_call_utils;

pub use model_client::{ChatCompletionRequest, ModelClient};
