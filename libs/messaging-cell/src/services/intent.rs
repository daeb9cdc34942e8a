// libs/messaging-cell/src/services/intent.rs
use tracing::debug;

use crate::models::{InboundMessage, Intent};

/// Keyword sets for the lexical classifier. Matching is case-insensitive
/// substring search; no stemming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentKeywords {
    pub confirm: Vec<String>,
    pub cancel: Vec<String>,
}

impl Default for IntentKeywords {
    fn default() -> Self {
        let words = |list: &[&str]| -> Vec<String> { list.iter().map(|word| word.to_string()).collect() };

        Self {
            confirm: words(&["sim", "confirmo", "confirmar", "confirmado", "ok", "👍", "pode ser"]),
            cancel: words(&["não", "nao", "cancelar", "desmarcar", "remarcar", "não vou", "não posso"]),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IntentClassifier {
    confirm: Vec<String>,
    cancel: Vec<String>,
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new(IntentKeywords::default())
    }
}

impl IntentClassifier {
    pub fn new(keywords: IntentKeywords) -> Self {
        let prepare = |words: Vec<String>| -> Vec<String> {
            words
                .into_iter()
                .map(|word| word.trim().to_lowercase())
                .filter(|word| !word.is_empty())
                .collect()
        };

        Self {
            confirm: prepare(keywords.confirm),
            cancel: prepare(keywords.cancel),
        }
    }

    /// Confirmation wins when both sets match.
    pub fn classify(&self, text: &str) -> Intent {
        let text = text.to_lowercase();

        let intent = if self.confirm.iter().any(|word| text.contains(word.as_str())) {
            Intent::Confirm
        } else if self.cancel.iter().any(|word| text.contains(word.as_str())) {
            Intent::Cancel
        } else {
            Intent::Unknown
        };

        debug!("Classified inbound text as {:?}", intent);
        intent
    }

    pub fn classify_message(&self, message: &InboundMessage) -> Intent {
        match message {
            InboundMessage::Text(text) => self.classify(text),
            InboundMessage::PollVote(options) => self.classify(&options.join(" ")),
            InboundMessage::Unrecognized => Intent::Unknown,
        }
    }
}
