use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::action::{normalize_key_combo, MouseButton};
use crate::agent::{AgentError, Computer};

#[derive(Clone, Debug)]
pub struct HelperConfig {
    pub path: PathBuf,
    pub screenshot_path: PathBuf,
    pub timeout: Duration,
}

/// What one helper invocation reported.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HelperOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Input injection through an external helper executable, invoked as
/// `helper <action> <args...>` once per primitive.
#[derive(Clone, Debug)]
pub struct HelperBackend {
    cfg: HelperConfig,
}

impl HelperBackend {
    /// Fails up front when the helper executable does not exist.
    pub fn new(cfg: HelperConfig) -> Result<Self, AgentError> {
        if !cfg.path.is_file() {
            return Err(AgentError::HelperMissing(cfg.path.display().to_string()));
        }
        Ok(Self { cfg })
    }

    /// Runs the helper; spawn errors and timeouts come back as an unsuccessful output.
    pub async fn invoke(&self, action: &str, args: &[String]) -> HelperOutput {
        debug!(action, ?args, "invoking helper");
        let run = Command::new(&self.cfg.path)
            .arg(action)
            .args(args)
            .kill_on_drop(true)
            .output();
        match timeout(self.cfg.timeout, run).await {
            Ok(Ok(out)) => HelperOutput {
                success: out.status.success(),
                stdout: String::from_utf8_lossy(&out.stdout).trim().to_string(),
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            },
            Ok(Err(e)) => HelperOutput {
                success: false,
                stdout: String::new(),
                stderr: format!("failed to execute {}: {}", self.cfg.path.display(), e),
            },
            Err(_) => HelperOutput {
                success: false,
                stdout: String::new(),
                stderr: format!("{} timed out after {}s", action, self.cfg.timeout.as_secs()),
            },
        }
    }

    async fn run(&self, action: &str, args: &[String]) -> Result<HelperOutput> {
        let out = self.invoke(action, args).await;
        if !out.success {
            bail!("{} failed: {}", action, out.stderr);
        }
        Ok(out)
    }

    pub async fn capture(&self, path: &Path) -> Result<Vec<u8>> {
        self.run("screenshot", &[path.display().to_string()]).await?;
        tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read screenshot {}", path.display()))
    }

    pub async fn click_at(&self, x: i64, y: i64, button: MouseButton) -> Result<HelperOutput> {
        self.run("click", &[x.to_string(), y.to_string(), button.to_string()]).await
    }

    pub async fn type_literal(&self, text: &str) -> Result<HelperOutput> {
        self.run("type", &[text.to_string()]).await
    }

    pub async fn press(&self, combo: &str) -> Result<HelperOutput> {
        self.run("key", &[normalize_key_combo(combo)]).await
    }

    pub async fn scroll_by(&self, x: i64, y: i64, delta: i64) -> Result<HelperOutput> {
        self.run("scroll", &[x.to_string(), y.to_string(), delta.to_string()]).await
    }
}

#[async_trait]
impl Computer for HelperBackend {
    async fn screenshot(&self) -> Result<Vec<u8>, AgentError> {
        self.capture(&self.cfg.screenshot_path)
            .await
            .map_err(|e| AgentError::Backend(e.to_string()))
    }

    async fn click(&self, x: i64, y: i64, button: MouseButton) -> Result<(), AgentError> {
        self.click_at(x, y, button)
            .await
            .map(|_| ())
            .map_err(|e| AgentError::Backend(e.to_string()))
    }

    async fn type_text(&self, text: &str) -> Result<(), AgentError> {
        self.type_literal(text)
            .await
            .map(|_| ())
            .map_err(|e| AgentError::Backend(e.to_string()))
    }

    async fn key(&self, combo: &str) -> Result<(), AgentError> {
        self.press(combo)
            .await
            .map(|_| ())
            .map_err(|e| AgentError::Backend(e.to_string()))
    }

    async fn scroll(&self, x: i64, y: i64, delta: i64) -> Result<(), AgentError> {
        self.scroll_by(x, y, delta)
            .await
            .map(|_| ())
            .map_err(|e| AgentError::Backend(e.to_string()))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    // Logs its arguments, fails on "click 0 0", writes a fake PNG for screenshots.
    const FAKE_HELPER: &str = r#"#!/bin/sh
echo "$@" >> "$(dirname "$0")/calls.log"
case "$1" in
  screenshot) printf 'PNG' > "$2" ;;
  click) if [ "$2" = "0" ]; then echo "no accessibility" >&2; exit 1; fi ;;
  sleep) sleep 5 ;;
esac
echo ok
"#;

    fn fake_backend(dir: &tempfile::TempDir, timeout: Duration) -> HelperBackend {
        let path = dir.path().join("cua-helper");
        std::fs::write(&path, FAKE_HELPER).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        HelperBackend::new(HelperConfig {
            path,
            screenshot_path: dir.path().join("screen.png"),
            timeout,
        })
        .unwrap()
    }

    fn calls(dir: &tempfile::TempDir) -> Vec<String> {
        std::fs::read_to_string(dir.path().join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn missing_helper_is_a_precondition_error() {
        let err = HelperBackend::new(HelperConfig {
            path: PathBuf::from("/definitely/not/here/cua-helper"),
            screenshot_path: PathBuf::from("/tmp/x.png"),
            timeout: Duration::from_secs(1),
        })
        .unwrap_err();
        assert!(matches!(err, AgentError::HelperMissing(_)));
    }

    #[tokio::test]
    async fn primitives_map_to_helper_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let backend = fake_backend(&dir, Duration::from_secs(5));

        let png = backend.screenshot().await.unwrap();
        assert_eq!(png, b"PNG");
        backend.click(10, 20, MouseButton::Right).await.unwrap();
        backend.type_text("hello world").await.unwrap();
        backend.key("Cmd+Esc").await.unwrap();
        backend.scroll(5, 6, -3).await.unwrap();

        let shot = dir.path().join("screen.png").display().to_string();
        assert_eq!(
            calls(&dir),
            vec![
                format!("screenshot {shot}"),
                "click 10 20 right".to_string(),
                "type hello world".to_string(),
                "key command+escape".to_string(),
                "scroll 5 6 -3".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn failing_helper_surfaces_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let backend = fake_backend(&dir, Duration::from_secs(5));
        let err = backend.click(0, 0, MouseButton::Left).await.unwrap_err();
        match err {
            AgentError::Backend(msg) => assert!(msg.contains("no accessibility"), "{msg}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn invoke_reports_success_triple() {
        let dir = tempfile::tempdir().unwrap();
        let backend = fake_backend(&dir, Duration::from_secs(5));
        let out = backend.invoke("move", &["1".into(), "2".into()]).await;
        assert_eq!(out, HelperOutput { success: true, stdout: "ok".into(), stderr: String::new() });
    }

    #[tokio::test]
    async fn slow_helper_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let backend = fake_backend(&dir, Duration::from_millis(200));
        let out = backend.invoke("sleep", &[]).await;
        assert!(!out.success);
        assert!(out.stderr.contains("timed out"));
    }
}
