pub mod action;
pub mod agent;
pub mod claude;
pub mod config;
pub mod conversation;
pub mod executor;
pub mod helper;
pub mod parser;

pub use action::ActionSpec;
pub use agent::{Agent, AgentConfig, AgentError, RunReport, RunStatus};
pub use claude::{ClaudeClient, ClaudeConfig};
pub use config::Settings;
pub use helper::{HelperBackend, HelperConfig};
pub use parser::{parse_action, ActionParser};
