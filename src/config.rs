//! One-shot configuration resolution.
//!
//! Everything the agent needs from the environment is read here, once, at
//! startup. The resulting [`Settings`] value is immutable and handed to the
//! model client, the helper backend and the loop.
//!
//! The API key comes from `ANTHROPIC_API_KEY`, or else from the first dotenv
//! file among the candidates that defines it. Dotenv files are read, never
//! loaded into the process environment.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use tracing::debug;

use crate::agent::{AgentConfig, AgentError};
use crate::claude::ClaudeConfig;
use crate::helper::HelperConfig;

pub const API_KEY_VAR: &str = "ANTHROPIC_API_KEY";
const DEFAULT_HELPER: &str = "Applications/CUAHelper.app/Contents/MacOS/cua-helper";

#[derive(Clone, Debug)]
pub struct Settings {
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    pub max_tokens: u32,
    pub request_timeout: Duration,
    pub helper_path: PathBuf,
    pub screenshot_path: PathBuf,
    pub helper_timeout: Duration,
    pub screen: (u32, u32),
    pub settle_delay: Duration,
    pub double_click_delay: Duration,
    /// Dotenv files that were searched for the API key.
    pub env_files: Vec<PathBuf>,
}

impl Settings {
    /// Resolves from the process environment and the default dotenv candidates.
    pub fn resolve() -> Result<Self, AgentError> {
        let lookup = |name: &str| std::env::var(name).ok();
        let candidates = default_env_files(&lookup);
        Self::resolve_with(lookup, &candidates)
    }

    pub fn resolve_with<F>(lookup: F, env_files: &[PathBuf]) -> Result<Self, AgentError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_key = var(API_KEY_VAR).or_else(|| key_from_env_files(env_files));

        let helper_path = match var("CUA_HELPER") {
            Some(p) => PathBuf::from(p),
            None => dirs::home_dir()
                .map(|home| home.join(DEFAULT_HELPER))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_HELPER)),
        };

        Ok(Self {
            api_key,
            api_base: var("ANTHROPIC_BASE_URL").unwrap_or_else(|| "https://api.anthropic.com".into()),
            model: var("ANTHROPIC_MODEL").unwrap_or_else(|| "claude-sonnet-4-20250514".into()),
            max_tokens: number(&var, "ANTHROPIC_MAX_TOKENS", 4096)?,
            request_timeout: Duration::from_secs(number(&var, "ANTHROPIC_TIMEOUT_SECS", 60)?),
            helper_path,
            screenshot_path: var("CUA_SCREENSHOT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| std::env::temp_dir().join("cua_screen.png")),
            helper_timeout: Duration::from_secs(number(&var, "CUA_HELPER_TIMEOUT_SECS", 10)?),
            screen: (
                number(&var, "CUA_SCREEN_WIDTH", 2560)?,
                number(&var, "CUA_SCREEN_HEIGHT", 1080)?,
            ),
            settle_delay: Duration::from_millis(number(&var, "CUA_SETTLE_MS", 500)?),
            double_click_delay: Duration::from_millis(number(&var, "CUA_DOUBLE_CLICK_MS", 100)?),
            env_files: env_files.to_vec(),
        })
    }

    /// Model client settings; the API key is a precondition for any run.
    pub fn claude(&self) -> Result<ClaudeConfig, AgentError> {
        let api_key = self.api_key.clone().ok_or_else(|| {
            AgentError::Config(format!(
                "{} not found in environment or in {}",
                API_KEY_VAR,
                self.env_files
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })?;
        Ok(ClaudeConfig {
            api_base: self.api_base.clone(),
            api_key,
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            timeout: self.request_timeout,
        })
    }

    pub fn helper(&self) -> HelperConfig {
        HelperConfig {
            path: self.helper_path.clone(),
            screenshot_path: self.screenshot_path.clone(),
            timeout: self.helper_timeout,
        }
    }

    pub fn agent(&self, max_steps: usize, debug: bool) -> AgentConfig {
        AgentConfig {
            max_steps,
            debug,
            settle_delay: self.settle_delay,
            double_click_delay: self.double_click_delay,
            screen: self.screen,
        }
    }
}

/// `$CUA_ENV_FILE`, then `~/.openclaw/.env`, then `./.env`.
pub fn default_env_files(lookup: &dyn Fn(&str) -> Option<String>) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if let Some(p) = lookup("CUA_ENV_FILE").filter(|p| !p.trim().is_empty()) {
        files.push(PathBuf::from(p));
    }
    if let Some(home) = dirs::home_dir() {
        files.push(home.join(".openclaw").join(".env"));
    }
    if let Ok(cwd) = std::env::current_dir() {
        files.push(cwd.join(".env"));
    }
    files
}

fn key_from_env_files(files: &[PathBuf]) -> Option<String> {
    files.iter().find_map(|path| key_from_env_file(path))
}

fn key_from_env_file(path: &Path) -> Option<String> {
    let iter = dotenvy::from_path_iter(path).ok()?;
    let key = iter
        .filter_map(|item| item.ok())
        .find(|(name, value)| name == API_KEY_VAR && !value.trim().is_empty())
        .map(|(_, value)| value.trim().to_string());
    if key.is_some() {
        debug!(path = %path.display(), "loaded api key from env file");
    }
    key
}

fn number<T, F>(var: &F, name: &str, default: T) -> Result<T, AgentError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => raw
            .parse()
            .map_err(|e| AgentError::Config(format!("{name}={raw:?}: {e}"))),
        None => Ok(default),
    }
}
