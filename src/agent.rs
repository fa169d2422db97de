use async_trait::async_trait;
use nanoid::nanoid;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::action::{ActionSpec, MouseButton};
use crate::conversation::Conversation;
use crate::executor::{preview, ActionExecutor};
use crate::parser::ActionParser;

pub const SYSTEM_PROMPT: &str = r#"You are a computer use agent controlling a macOS computer. You can see screenshots and must decide what action to take to accomplish the user's task.

IMPORTANT: Always respond with a JSON action block. Available actions:

1. Click: {"action": "click", "x": 500, "y": 300, "button": "left"}
2. Type text: {"action": "type", "text": "hello world"}
3. Press key: {"action": "key", "key": "return"} or {"action": "key", "key": "cmd+s"}
4. Scroll: {"action": "scroll", "x": 500, "y": 400, "direction": "down", "amount": 3}
5. Wait: {"action": "wait", "ms": 1000}
6. Done: {"action": "done", "reason": "Task completed successfully"}

Screen coordinates: The screenshot shows the full screen. Identify the pixel coordinates of UI elements you need to interact with.

Guidelines:
- Look carefully at the screenshot to identify clickable elements
- Click on buttons, text fields, links by their visual position
- After clicking a text field, use "type" to enter text
- Use "key" for keyboard shortcuts (cmd+s, return, tab, etc.)
- Report "done" when the task is complete or impossible

Respond with ONLY the JSON action, no explanation needed unless reporting done."#;

pub fn step_instruction(task: &str) -> String {
    format!("Task: {task}\n\nWhat action should I take? Respond with JSON action.")
}

// ========================= Core Types =========================

#[derive(Debug, Error, Clone, Serialize, Deserialize)]
pub enum AgentError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("input helper not found at {0}")]
    HelperMissing(String),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("model error: {0}")]
    Model(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The model reported the task done.
    Done,
    /// The step budget ran out before the model reported done.
    Exhausted,
    /// A model or backend call failed.
    Failed,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepResult {
    pub step: usize,
    pub action: ActionSpec,
    pub executed: bool,
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub task: String,
    pub status: RunStatus,
    pub steps: Vec<StepResult>,
    pub model_calls: usize,
    pub reason: Option<String>,
    pub error: Option<String>,
}

// ========================= Pluggable Subsystems =========================

/// Screen capture and input injection.
#[async_trait]
pub trait Computer: Send + Sync {
    /// PNG bytes of the current screen.
    async fn screenshot(&self) -> Result<Vec<u8>, AgentError>;
    async fn click(&self, x: i64, y: i64, button: MouseButton) -> Result<(), AgentError>;
    async fn type_text(&self, text: &str) -> Result<(), AgentError>;
    async fn key(&self, combo: &str) -> Result<(), AgentError>;
    async fn scroll(&self, x: i64, y: i64, delta: i64) -> Result<(), AgentError>;
}

/// A vision-language model that answers a transcript with free-form text.
#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn complete(&self, conversation: &Conversation, system: &str) -> Result<String, AgentError>;
}

// ========================= Agent Core =========================

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub max_steps: usize,
    pub debug: bool,
    /// Pause after each non-terminal action so the UI can settle before the next screenshot.
    pub settle_delay: Duration,
    pub double_click_delay: Duration,
    pub screen: (u32, u32),
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 15,
            debug: false,
            settle_delay: Duration::from_millis(500),
            double_click_delay: Duration::from_millis(100),
            screen: (2560, 1080),
        }
    }
}

enum StepOutcome {
    Continue,
    Done(String),
}

pub struct Agent<C, M>
where
    C: Computer,
    M: VisionModel,
{
    computer: C,
    model: M,
    parser: ActionParser,
    cfg: AgentConfig,
}

impl<C, M> Agent<C, M>
where
    C: Computer,
    M: VisionModel,
{
    pub fn new(computer: C, model: M, cfg: AgentConfig) -> Self {
        Self {
            computer,
            model,
            parser: ActionParser::new(cfg.screen),
            cfg,
        }
    }

    /// Drives the capture → decide → act loop until the model reports done,
    /// the step budget runs out, or a model/backend call fails.
    pub async fn run(&self, task: &str) -> RunReport {
        let run_id = nanoid!();
        let mut conversation = Conversation::new();
        let mut report = RunReport {
            run_id: run_id.clone(),
            task: task.to_string(),
            status: RunStatus::Exhausted,
            steps: Vec::new(),
            model_calls: 0,
            reason: None,
            error: None,
        };
        info!(%run_id, %task, max_steps = self.cfg.max_steps, "agent run started");

        for i in 0..self.cfg.max_steps {
            info!(%run_id, step = i + 1, max_steps = self.cfg.max_steps, "agent step");
            match self.step(task, i, &mut conversation, &mut report).await {
                Ok(StepOutcome::Done(reason)) => {
                    report.status = RunStatus::Done;
                    report.reason = Some(reason);
                    break;
                }
                Ok(StepOutcome::Continue) => {
                    if i + 1 < self.cfg.max_steps {
                        sleep(self.cfg.settle_delay).await;
                    }
                }
                Err(err) => {
                    warn!(%run_id, step = i + 1, "step {} failed: {}", i + 1, err);
                    report.status = RunStatus::Failed;
                    report.error = Some(err.to_string());
                    break;
                }
            }
        }

        if report.status == RunStatus::Exhausted {
            warn!(%run_id, steps = report.steps.len(), "step budget exhausted");
        }
        info!(%run_id, status = ?report.status, model_calls = report.model_calls, "agent run finished");
        report
    }

    async fn step(
        &self,
        task: &str,
        i: usize,
        conversation: &mut Conversation,
        report: &mut RunReport,
    ) -> Result<StepOutcome, AgentError> {
        let png = self.computer.screenshot().await?;
        conversation.push_user(&png, step_instruction(task));

        report.model_calls += 1;
        let reply = self.model.complete(conversation, SYSTEM_PROMPT).await?;
        if self.cfg.debug {
            info!(step = i + 1, turns = conversation.len(), %reply, "model reply");
        } else {
            info!(step = i + 1, reply = %preview(&reply, 200), "model reply");
        }
        conversation.push_assistant(reply.as_str());

        let action = self.parser.parse(&reply);
        info!(step = i + 1, action = ?action, "parsed action");

        let executor = ActionExecutor::new(&self.computer, self.cfg.double_click_delay);
        match executor.execute(&action).await {
            Ok(keep_going) => {
                let outcome = match &action {
                    _ if keep_going => StepOutcome::Continue,
                    ActionSpec::Done { reason } => StepOutcome::Done(reason.clone()),
                    _ => StepOutcome::Done(String::new()),
                };
                report.steps.push(StepResult { step: i + 1, action, executed: true, error: None });
                Ok(outcome)
            }
            Err(err) => {
                report.steps.push(StepResult {
                    step: i + 1,
                    action,
                    executed: false,
                    error: Some(err.to_string()),
                });
                Err(err)
            }
        }
    }
}
