use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::action::ActionSpec;
use crate::agent::{AgentError, Computer};

/// Dispatches one [`ActionSpec`] to a [`Computer`].
///
/// Returns `Ok(true)` when the loop should keep going, `Ok(false)` once the
/// model reports the task done. Backend failures are returned as errors.
pub struct ActionExecutor<'a, C: Computer + ?Sized> {
    computer: &'a C,
    double_click_delay: Duration,
}

impl<'a, C: Computer + ?Sized> ActionExecutor<'a, C> {
    pub fn new(computer: &'a C, double_click_delay: Duration) -> Self {
        Self { computer, double_click_delay }
    }

    pub async fn execute(&self, action: &ActionSpec) -> Result<bool, AgentError> {
        match action {
            ActionSpec::Done { reason } => {
                info!(%reason, "task complete");
                return Ok(false);
            }
            ActionSpec::Click { x, y, button, double } => {
                info!(x, y, %button, double, "click");
                self.computer.click(*x, *y, *button).await?;
                // no native double-click in the helper
                if *double {
                    sleep(self.double_click_delay).await;
                    self.computer.click(*x, *y, *button).await?;
                }
            }
            ActionSpec::Type { text } => {
                info!(text = %preview(text, 50), "type");
                self.computer.type_text(text).await?;
            }
            ActionSpec::Key { combo } => {
                info!(%combo, "key");
                self.computer.key(combo).await?;
            }
            ActionSpec::Scroll { x, y, direction, amount } => {
                let delta = direction.delta(*amount);
                info!(x, y, %direction, delta, "scroll");
                self.computer.scroll(*x, *y, delta).await?;
            }
            ActionSpec::Wait { ms } => {
                info!(ms, "wait");
                sleep(Duration::from_millis(*ms)).await;
            }
            ActionSpec::Unknown { raw } => {
                warn!(raw = %preview(raw, 200), "unrecognized action, skipping");
            }
        }
        Ok(true)
    }
}

/// First `max` characters of `s`, with an ellipsis when truncated.
pub fn preview(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{MouseButton, ScrollDirection};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::time::Instant;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        clicked_at: Mutex<Vec<Instant>>,
        fail_clicks: bool,
    }

    impl Recorder {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Computer for Recorder {
        async fn screenshot(&self) -> Result<Vec<u8>, AgentError> {
            self.calls.lock().unwrap().push("screenshot".into());
            Ok(Vec::new())
        }

        async fn click(&self, x: i64, y: i64, button: MouseButton) -> Result<(), AgentError> {
            self.calls.lock().unwrap().push(format!("click {x} {y} {button}"));
            self.clicked_at.lock().unwrap().push(Instant::now());
            if self.fail_clicks {
                return Err(AgentError::Backend("click failed".into()));
            }
            Ok(())
        }

        async fn type_text(&self, text: &str) -> Result<(), AgentError> {
            self.calls.lock().unwrap().push(format!("type {text}"));
            Ok(())
        }

        async fn key(&self, combo: &str) -> Result<(), AgentError> {
            self.calls.lock().unwrap().push(format!("key {combo}"));
            Ok(())
        }

        async fn scroll(&self, x: i64, y: i64, delta: i64) -> Result<(), AgentError> {
            self.calls.lock().unwrap().push(format!("scroll {x} {y} {delta}"));
            Ok(())
        }
    }

    fn executor(rec: &Recorder) -> ActionExecutor<'_, Recorder> {
        ActionExecutor::new(rec, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn done_stops_without_backend_calls() {
        let rec = Recorder::default();
        let cont = executor(&rec)
            .execute(&ActionSpec::Done { reason: "ok".into() })
            .await
            .unwrap();
        assert!(!cont);
        assert!(rec.calls().is_empty());
    }

    #[tokio::test]
    async fn double_click_issues_two_clicks() {
        let rec = Recorder::default();
        let action = ActionSpec::Click { x: 3, y: 4, button: MouseButton::Right, double: true };
        assert!(executor(&rec).execute(&action).await.unwrap());
        assert_eq!(rec.calls(), vec!["click 3 4 right", "click 3 4 right"]);
    }

    #[tokio::test(start_paused = true)]
    async fn double_click_waits_between_clicks() {
        let rec = Recorder::default();
        let exec = ActionExecutor::new(&rec, Duration::from_millis(100));
        let action = ActionSpec::Click { x: 3, y: 4, button: MouseButton::Left, double: true };
        exec.execute(&action).await.unwrap();

        let stamps = rec.clicked_at.lock().unwrap().clone();
        assert_eq!(stamps.len(), 2);
        let gap = stamps[1] - stamps[0];
        assert!(gap >= Duration::from_millis(100), "{gap:?}");
        assert!(gap < Duration::from_millis(200), "{gap:?}");
    }

    #[tokio::test]
    async fn scroll_sends_signed_delta() {
        let rec = Recorder::default();
        let exec = executor(&rec);
        let down = ActionSpec::Scroll { x: 1, y: 2, direction: ScrollDirection::Down, amount: 3 };
        let up = ActionSpec::Scroll { x: 1, y: 2, direction: ScrollDirection::Up, amount: 3 };
        exec.execute(&down).await.unwrap();
        exec.execute(&up).await.unwrap();
        assert_eq!(rec.calls(), vec!["scroll 1 2 -3", "scroll 1 2 3"]);
    }

    #[tokio::test]
    async fn key_and_type_pass_through_unchanged() {
        let rec = Recorder::default();
        let exec = executor(&rec);
        exec.execute(&ActionSpec::Key { combo: "Cmd+S".into() }).await.unwrap();
        exec.execute(&ActionSpec::Type { text: "  Hi ".into() }).await.unwrap();
        assert_eq!(rec.calls(), vec!["key Cmd+S", "type   Hi "]);
    }

    #[tokio::test]
    async fn wait_and_unknown_continue_without_backend() {
        let rec = Recorder::default();
        let exec = executor(&rec);
        assert!(exec.execute(&ActionSpec::Wait { ms: 1 }).await.unwrap());
        assert!(exec.execute(&ActionSpec::unknown("???")).await.unwrap());
        assert!(rec.calls().is_empty());
    }

    #[tokio::test]
    async fn failed_click_propagates_and_skips_second_click() {
        let rec = Recorder { fail_clicks: true, ..Default::default() };
        let action = ActionSpec::Click { x: 1, y: 1, button: MouseButton::Left, double: true };
        let err = executor(&rec).execute(&action).await.unwrap_err();
        assert!(matches!(err, AgentError::Backend(_)));
        assert_eq!(rec.calls().len(), 1);
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        assert_eq!(preview("héllo", 2), "hé...");
        assert_eq!(preview("hi", 50), "hi");
    }
}
