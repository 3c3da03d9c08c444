//! Conversation state for one chat session
//!
//! Two parallel sequences are kept: the role-tagged history that conditions
//! the model (seeded with the persona as a system turn) and the display log
//! shown in the page (user and assistant turns only).

mod generator;

pub use generator::{GenerateError, ResponseGenerator};

use serde::{Deserialize, Serialize};

/// Author of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One role-tagged message. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Model conditioning context, insertion order significant
pub type ConversationHistory = Vec<Turn>;

/// Display-only projection; never contains the system turn
pub type DisplayLog = Vec<Turn>;

/// Owner of both sequences for a single session
#[derive(Debug, Clone)]
pub struct ConversationStore {
    persona: String,
    history: ConversationHistory,
    log: DisplayLog,
}

impl ConversationStore {
    pub fn new(persona: impl Into<String>) -> Self {
        let persona = persona.into();
        let (history, log) = Self::initialize(&persona);
        Self {
            persona,
            history,
            log,
        }
    }

    /// Fresh session state: the persona as the only history turn, empty log
    pub fn initialize(persona: &str) -> (ConversationHistory, DisplayLog) {
        (vec![Turn::system(persona)], Vec::new())
    }

    pub fn append_user(&mut self, text: impl Into<String>) {
        let turn = Turn::user(text);
        self.history.push(turn.clone());
        self.log.push(turn);
    }

    pub fn append_assistant(&mut self, text: impl Into<String>) {
        let turn = Turn::assistant(text);
        self.history.push(turn.clone());
        self.log.push(turn);
    }

    /// Discard every turn and reseed. There is no undo.
    pub fn reset(&mut self) {
        let (history, log) = Self::initialize(&self.persona);
        self.history = history;
        self.log = log;
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn log(&self) -> &[Turn] {
        &self.log
    }

    #[cfg(test)]
    pub fn persona(&self) -> &str {
        &self.persona
    }
}
