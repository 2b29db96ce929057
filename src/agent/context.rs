//! Request assembly for the tool-calling loop
//!
//! Every model call sees the same prefix: optional system instructions, the
//! stored history, and the new user turn. Messages produced during the run
//! are appended after that prefix.

use crate::session::Message;

/// Builds the message list sent on each model call.
#[derive(Debug, Clone, Default)]
pub struct ContextBuilder {
    system_prompt: Option<String>,
}

impl ContextBuilder {
    /// Create a builder with no system instructions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set system instructions. Blank text is ignored.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        self.system_prompt = (!prompt.trim().is_empty()).then_some(prompt);
        self
    }

    /// The system instructions, if any.
    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    /// Assemble `system + history + user turn + run messages`.
    ///
    /// `run_messages` starts with the user turn itself, so `history` must not
    /// contain it.
    pub fn build_messages(&self, history: &[Message], run_messages: &[Message]) -> Vec<Message> {
        let mut messages = Vec::with_capacity(history.len() + run_messages.len() + 1);
        if let Some(prompt) = self.system_prompt.as_deref() {
            messages.push(Message::system(prompt));
        }
        messages.extend(history.iter().cloned());
        messages.extend(run_messages.iter().cloned());
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;

    #[test]
    fn test_build_without_system_prompt() {
        let builder = ContextBuilder::new();
        let history = vec![Message::user("hi"), Message::assistant("hello")];
        let run = vec![Message::user("again")];

        let messages = builder.build_messages(&history, &run);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[2].content, "again");
    }

    #[test]
    fn test_system_prompt_comes_first() {
        let builder = ContextBuilder::new().with_system_prompt("Be brief.");
        let messages = builder.build_messages(&[], &[Message::user("q")]);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, "Be brief.");
        assert_eq!(messages[1].role, Role::User);
    }

    #[test]
    fn test_blank_system_prompt_ignored() {
        let builder = ContextBuilder::new().with_system_prompt("   ");
        assert!(builder.system_prompt().is_none());
        assert_eq!(builder.build_messages(&[], &[Message::user("q")]).len(), 1);
    }
}
