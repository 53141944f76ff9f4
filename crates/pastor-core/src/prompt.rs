//! Persona prompt construction

use crate::state::{Message, Sender};

const PASTOR_PREAMBLE: &str = "Take on the teaching style of Jesus as a Pastor who loves Him and answer the user's questions as they explore how Jesus might respond.\n\
Act as a teacher of Jesus' words, telling one of his parables and relating it to modern times.\n\
Reference relevant gospel passages whenever possible. Please remember you are not Jesus, but a humble servant of Him.";

/// Fixed instruction text wrapped around the user's latest question.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    preamble: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            preamble: PASTOR_PREAMBLE.to_string(),
        }
    }
}

impl PromptTemplate {
    pub fn with_preamble(preamble: impl Into<String>) -> Self {
        Self {
            preamble: preamble.into(),
        }
    }

    pub fn preamble(&self) -> &str {
        &self.preamble
    }

    /// Build the single-turn prompt for `input`.
    pub fn render(&self, input: &str) -> String {
        self.render_with_history(&[], input)
    }

    /// Build the prompt, listing `history` (oldest first) before the query.
    pub fn render_with_history(&self, history: &[Message], input: &str) -> String {
        let mut prompt = String::new();

        prompt.push_str(&self.preamble);
        prompt.push_str("\n\n");

        if !history.is_empty() {
            prompt.push_str("Conversation so far:\n");
            for msg in history {
                match msg.sender() {
                    Sender::User => prompt.push_str(&format!("User: {}\n", msg.text())),
                    Sender::Assistant => prompt.push_str(&format!("Pastor: {}\n", msg.text())),
                }
            }
            prompt.push('\n');
        }

        prompt.push_str("User Query: ");
        prompt.push_str(input);

        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MessageId;

    #[test]
    fn test_render_places_query_after_persona() {
        let prompt = PromptTemplate::default().render("Why do bad things happen?");
        assert!(prompt.starts_with("Take on the teaching style of Jesus"));
        assert!(prompt.contains("parables"));
        assert!(prompt.contains("gospel passages"));
        assert!(prompt.ends_with("User Query: Why do bad things happen?"));
        assert!(!prompt.contains("Conversation so far"));
    }

    #[test]
    fn test_input_is_interpolated_verbatim() {
        let prompt = PromptTemplate::default().render("  spaced  {braces} ");
        assert!(prompt.ends_with("User Query:   spaced  {braces} "));
    }

    #[test]
    fn test_history_is_listed_in_order() {
        let history = vec![
            Message::new(MessageId::from_millis(1), Sender::User, "Who is my neighbor?"),
            Message::new(MessageId::from_millis(2), Sender::Assistant, "A man was going down to Jericho..."),
        ];
        let prompt = PromptTemplate::with_preamble("Be kind.").render_with_history(&history, "And then?");

        assert_eq!(
            prompt,
            "Be kind.\n\nConversation so far:\nUser: Who is my neighbor?\nPastor: A man was going down to Jericho...\n\nUser Query: And then?"
        );
    }
}
