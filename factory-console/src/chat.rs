//! Conversation avec l'assistant, gardée le temps de la session (jamais persistée)

use serde::{Deserialize, Serialize};

pub const GREETING: &str = "Hello! I am your Factory AI Copilot. I can help you monitor machine status, analyze anomalies, or suggest optimizations.";
pub const THINKING: &str = "Thinking...";
pub const UNREACHABLE: &str = "Sorry, I can't reach the backend server right now.";

const EXECUTE_OPEN: &str = "[[EXECUTE:";
const EXECUTE_CLOSE: &str = "]]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<String>,
    #[serde(default)]
    pub is_loading: bool,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            actions: Vec::new(),
            is_loading: false,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            actions: Vec::new(),
            is_loading: false,
        }
    }

    /// Texte tel qu'il doit être affiché
    pub fn display_text(&self) -> String {
        display_text(&self.content)
    }
}

/// Liste de messages en ajout seul, initialisée avec le message d'accueil
#[derive(Debug, Clone)]
pub struct ChatLog {
    messages: Vec<ChatMessage>,
}

impl Default for ChatLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatLog {
    pub fn new() -> Self {
        let mut greeting = ChatMessage::assistant(GREETING);
        greeting.actions = vec!["Check System Health".into(), "Show Alerts".into()];
        Self {
            messages: vec![greeting],
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Texte utilisateur suivi du placeholder de chargement
    pub fn begin_exchange(&mut self, text: &str) {
        self.push(ChatMessage::user(text));
        let mut placeholder = ChatMessage::assistant(THINKING);
        placeholder.is_loading = true;
        self.push(placeholder);
    }

    /// Retire les placeholders de chargement et ajoute la réponse finale
    pub fn complete_exchange(&mut self, reply: impl Into<String>) {
        self.messages.retain(|m| !m.is_loading);
        self.push(ChatMessage::assistant(reply));
    }

    pub fn is_waiting(&self) -> bool {
        self.messages.iter().any(|m| m.is_loading)
    }
}

/// Déballe un JSON `{"response": ...}` accidentel et retire les tags `[[EXECUTE:...]]`
pub fn display_text(content: &str) -> String {
    let mut text = content.to_string();
    if text.trim_start().starts_with('{') {
        if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&text) {
            if let Some(inner) = parsed.get("response").and_then(|v| v.as_str()) {
                text = inner.to_string();
            }
        }
    }

    let stripped = strip_execute_tags(&text);
    let trimmed = stripped.trim();
    if trimmed.is_empty() {
        "...".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Retire chaque tag `[[EXECUTE:...]]` complet ; un tag non fermé est laissé tel quel
pub fn strip_execute_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(EXECUTE_OPEN) {
        let after_open = &rest[start + EXECUTE_OPEN.len()..];
        match after_open.find(EXECUTE_CLOSE) {
            Some(end) => {
                out.push_str(&rest[..start]);
                rest = &after_open[end + EXECUTE_CLOSE.len()..];
            }
            None => break,
        }
    }
    out.push_str(rest);
    out
}
