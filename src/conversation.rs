use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use serde::Serialize;

/// One message of the transcript.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Turn {
    User { image_base64: String, text: String },
    Assistant { text: String },
}

/// Append-only transcript of a single task, resent to the model every step.
#[derive(Clone, Debug, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a screenshot turn; the PNG is base64-encoded once here.
    pub fn push_user(&mut self, png: &[u8], text: impl Into<String>) {
        self.turns.push(Turn::User {
            image_base64: B64.encode(png),
            text: text.into(),
        });
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::Assistant { text: text.into() });
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turns_accumulate_in_order() {
        let mut conv = Conversation::new();
        assert!(conv.is_empty());
        conv.push_user(b"png", "Task: x");
        conv.push_assistant("{\"action\":\"done\"}");
        assert_eq!(conv.len(), 2);
        assert_eq!(
            conv.turns()[0],
            Turn::User { image_base64: "cG5n".into(), text: "Task: x".into() }
        );
        assert_eq!(conv.turns().last(), Some(&Turn::Assistant { text: "{\"action\":\"done\"}".into() }));
    }
}
