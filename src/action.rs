use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_SCROLL_AMOUNT: u32 = 3;
pub const DEFAULT_WAIT_MS: u64 = 1000;

// ========================= Core Types =========================

/// One discrete UI action decided by the model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionSpec {
    Click { x: i64, y: i64, button: MouseButton, double: bool },
    Type { text: String },
    Key { combo: String },
    Scroll { x: i64, y: i64, direction: ScrollDirection, amount: u32 },
    Wait { ms: u64 },
    Done { reason: String },
    Unknown { raw: String },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    #[default]
    Down,
    Left,
    Right,
}

impl ActionSpec {
    pub fn click(x: i64, y: i64) -> Self {
        ActionSpec::Click { x, y, button: MouseButton::Left, double: false }
    }

    pub fn unknown(raw: impl Into<String>) -> Self {
        ActionSpec::Unknown { raw: raw.into() }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ActionSpec::Click { .. } => "click",
            ActionSpec::Type { .. } => "type",
            ActionSpec::Key { .. } => "key",
            ActionSpec::Scroll { .. } => "scroll",
            ActionSpec::Wait { .. } => "wait",
            ActionSpec::Done { .. } => "done",
            ActionSpec::Unknown { .. } => "unknown",
        }
    }
}

impl MouseButton {
    pub fn as_str(&self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Right => "right",
            MouseButton::Middle => "middle",
        }
    }

    /// Lenient lookup; anything unrecognized is `None` so callers can apply the default.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Some(MouseButton::Left),
            "right" => Some(MouseButton::Right),
            "middle" => Some(MouseButton::Middle),
            _ => None,
        }
    }
}

impl fmt::Display for MouseButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ScrollDirection {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" => Some(ScrollDirection::Up),
            "down" => Some(ScrollDirection::Down),
            "left" => Some(ScrollDirection::Left),
            "right" => Some(ScrollDirection::Right),
            _ => None,
        }
    }

    /// Signed wheel delta: down/right scroll by a negative amount, up/left positive.
    pub fn delta(&self, amount: u32) -> i64 {
        let magnitude = i64::from(amount);
        match self {
            ScrollDirection::Down | ScrollDirection::Right => -magnitude,
            ScrollDirection::Up | ScrollDirection::Left => magnitude,
        }
    }
}

impl fmt::Display for ScrollDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
            ScrollDirection::Left => "left",
            ScrollDirection::Right => "right",
        };
        f.write_str(s)
    }
}

// ========================= Key combos =========================

const KEY_ALIASES: &[(&str, &str)] = &[
    ("esc", "escape"),
    ("cmd", "command"),
    ("option", "alt"),
    ("return", "enter"),
    ("delete", "backspace"),
];

/// Lower-cases a combo such as `Cmd+S` and rewrites each `+`-separated token
/// through the alias table, giving `command+s`.
pub fn normalize_key_combo(combo: &str) -> String {
    combo
        .trim()
        .to_lowercase()
        .split('+')
        .map(|token| {
            let token = token.trim();
            KEY_ALIASES
                .iter()
                .find(|(alias, _)| *alias == token)
                .map(|(_, canonical)| *canonical)
                .unwrap_or(token)
        })
        .collect::<Vec<_>>()
        .join("+")
}
