pub mod agent;
pub mod memory;
pub mod state;
pub mod steps;

pub use crate::types::result::{RunResult, TokenUsage};
pub use agent::Agent;
pub use memory::AgentMemory;
pub use state::LoopState;
pub use steps::AgentStep;
