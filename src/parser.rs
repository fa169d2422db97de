//! Turns free-form model replies into an [`ActionSpec`].
//!
//! Vision models do not reliably answer with clean JSON, so parsing never
//! fails: a structured JSON object is preferred, then a fixed chain of text
//! heuristics is tried, and anything left over becomes `ActionSpec::Unknown`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::action::{ActionSpec, MouseButton, ScrollDirection, DEFAULT_SCROLL_AMOUNT, DEFAULT_WAIT_MS};

static CLICK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"click.*?([0-9]+)[,\s]+([0-9]+)").unwrap());
static TYPE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"type[:\s]+"([^"]+)""#).unwrap());
static PRESS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"press[:\s]+([a-z+]+)").unwrap());

type Matcher = fn(&ActionParser, &str) -> Option<ActionSpec>;

/// Tried in order; the first matcher returning `Some` wins.
const MATCHERS: &[(&str, Matcher)] = &[
    ("structured", ActionParser::match_structured),
    ("completion", ActionParser::match_completion),
    ("click", ActionParser::match_click),
    ("type", ActionParser::match_type),
    ("press", ActionParser::match_press),
];

#[derive(Clone, Debug)]
pub struct ActionParser {
    /// Used to centre structured scrolls that omit coordinates.
    screen: (u32, u32),
}

impl Default for ActionParser {
    fn default() -> Self {
        Self { screen: (2560, 1080) }
    }
}

impl ActionParser {
    pub fn new(screen: (u32, u32)) -> Self {
        Self { screen }
    }

    pub fn parse(&self, reply: &str) -> ActionSpec {
        for (name, matcher) in MATCHERS {
            if let Some(action) = matcher(self, reply) {
                debug!(matcher = *name, kind = action.kind(), "parsed model reply");
                return action;
            }
        }
        debug!("no matcher accepted model reply");
        ActionSpec::unknown(reply)
    }

    fn match_structured(&self, reply: &str) -> Option<ActionSpec> {
        json_candidates(reply)
            .filter(|candidate| candidate.contains("\"action\""))
            .filter_map(|candidate| serde_json::from_str::<Value>(candidate).ok())
            .find_map(|value| match value {
                Value::Object(obj) => self.decode_object(&obj, reply),
                _ => None,
            })
    }

    fn decode_object(&self, obj: &Map<String, Value>, reply: &str) -> Option<ActionSpec> {
        let kind = obj.get("action")?.as_str()?.trim().to_lowercase();
        let action = match kind.as_str() {
            "click" => ActionSpec::Click {
                x: int_field(obj, "x")?,
                y: int_field(obj, "y")?,
                button: obj
                    .get("button")
                    .and_then(|b| b.as_str())
                    .and_then(MouseButton::parse)
                    .unwrap_or_default(),
                double: obj.get("double").and_then(|d| d.as_bool()).unwrap_or(false),
            },
            "type" => ActionSpec::Type {
                text: obj.get("text")?.as_str()?.to_string(),
            },
            "key" => ActionSpec::Key {
                combo: obj
                    .get("key")
                    .or_else(|| obj.get("combo"))?
                    .as_str()?
                    .to_string(),
            },
            "scroll" => ActionSpec::Scroll {
                x: int_field(obj, "x").unwrap_or(i64::from(self.screen.0 / 2)),
                y: int_field(obj, "y").unwrap_or(i64::from(self.screen.1 / 2)),
                direction: obj
                    .get("direction")
                    .and_then(|d| d.as_str())
                    .and_then(ScrollDirection::parse)
                    .unwrap_or_default(),
                amount: int_field(obj, "amount")
                    .map(|a| u32::try_from(a.unsigned_abs()).unwrap_or(u32::MAX))
                    .unwrap_or(DEFAULT_SCROLL_AMOUNT),
            },
            "wait" => ActionSpec::Wait {
                ms: int_field(obj, "ms")
                    .map(|ms| ms.max(0) as u64)
                    .unwrap_or(DEFAULT_WAIT_MS),
            },
            "done" => ActionSpec::Done {
                reason: obj
                    .get("reason")
                    .and_then(|r| r.as_str())
                    .unwrap_or("Done")
                    .to_string(),
            },
            _ => ActionSpec::unknown(reply),
        };
        Some(action)
    }

    // Grouping is deliberate: "task complete" always wins, "done" only without "click".
    fn match_completion(&self, reply: &str) -> Option<ActionSpec> {
        let lower = reply.to_lowercase();
        if lower.contains("task complete") || (lower.contains("done") && !lower.contains("click")) {
            return Some(ActionSpec::Done { reason: reply.to_string() });
        }
        None
    }

    fn match_click(&self, reply: &str) -> Option<ActionSpec> {
        let lower = reply.to_lowercase();
        let caps = CLICK_RE.captures(&lower)?;
        let x = caps.get(1)?.as_str().parse().ok()?;
        let y = caps.get(2)?.as_str().parse().ok()?;
        Some(ActionSpec::click(x, y))
    }

    fn match_type(&self, reply: &str) -> Option<ActionSpec> {
        let caps = TYPE_RE.captures(reply)?;
        Some(ActionSpec::Type { text: caps.get(1)?.as_str().to_string() })
    }

    fn match_press(&self, reply: &str) -> Option<ActionSpec> {
        let lower = reply.to_lowercase();
        let caps = PRESS_RE.captures(&lower)?;
        Some(ActionSpec::Key { combo: caps.get(1)?.as_str().to_string() })
    }
}

/// Parses with the default screen geometry.
pub fn parse_action(reply: &str) -> ActionSpec {
    ActionParser::default().parse(reply)
}

fn int_field(obj: &Map<String, Value>, name: &str) -> Option<i64> {
    let v = obj.get(name)?;
    v.as_i64()
        .or_else(|| v.as_f64().map(|f| f.round() as i64))
        .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
}

/// Every balanced `{...}` span in `text`, in order of its opening brace.
/// Braces inside JSON string literals are ignored.
fn json_candidates(text: &str) -> impl Iterator<Item = &str> {
    let bytes = text.as_bytes();
    bytes
        .iter()
        .enumerate()
        .filter(|(_, b)| **b == b'{')
        .filter_map(move |(start, _)| {
            let mut depth = 0usize;
            let mut in_string = false;
            let mut escaped = false;
            for (offset, &b) in bytes[start..].iter().enumerate() {
                if in_string {
                    match b {
                        _ if escaped => escaped = false,
                        b'\\' => escaped = true,
                        b'"' => in_string = false,
                        _ => {}
                    }
                    continue;
                }
                match b {
                    b'"' => in_string = true,
                    b'{' => depth += 1,
                    b'}' => {
                        depth -= 1;
                        if depth == 0 {
                            return Some(&text[start..=start + offset]);
                        }
                    }
                    _ => {}
                }
            }
            None
        })
}
