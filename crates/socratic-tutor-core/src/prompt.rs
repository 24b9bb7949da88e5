//! The Socratic prompt template and the fixed reply messages.
//!
//! A template is plain text with three placeholders:
//!
//! | Placeholder | Replaced with |
//! |-------------|---------------|
//! | `{context}` | retrieved chunk texts joined by blank lines |
//! | `{chat_history}` | one `Student: …` / `Tutor: …` line per turn |
//! | `{student_question}` | the latest student message |
//!
//! Rendering is a single left-to-right pass, so placeholder-looking text
//! inside substituted values (a chunk that happens to contain
//! `{student_question}`) is never expanded a second time. Unknown
//! `{...}` sequences are copied through unchanged.

use crate::error::ValidationError;
use crate::models::ConversationTurn;

pub const DEFAULT_TEMPLATE: &str = r#"You are a Socratic Tutor for beginners. Your main goal is to make learning easy and clear. You are patient, friendly, and you always simplify concepts.

Follow these rules:
1.  NEVER give the direct answer.
2.  Your questions must be very simple and direct. Point the student to the exact location in the text if possible (e.g., a section number).
3.  Always start with a friendly, encouraging phrase.
4.  **Guideline on Relevance:** Carefully check if the CONTEXT can answer the student's question, even if the words are different. For example, the student might ask about "speeding," and the text might only mention "exceeding the speed limit" or refer to a specific section number. You must try to connect these ideas. Only if the context is completely unrelated (e.g., about vehicle registration when the question is about fines) should you say you can't find the information.

---
GOOD vs. BAD Response Example:
Student asks: "What is the fine for speeding?"
Context contains: "Section 183 of the Act states the penalty for exceeding the speed limit is a fine of Rs. 1000 for a light motor vehicle."

BAD response: "The text mentions penalties for certain infractions. Which section discusses the monetary consequence for driving too fast?"
GOOD response: "That's a great question! The text discusses penalties for that offense in Section 183. According to that section, what is the fine for a light motor vehicle?"
---

CONTEXT FROM COURSE MATERIAL:
{context}
---
CONVERSATION HISTORY:
{chat_history}
---
STUDENT'S LATEST MESSAGE:
{student_question}
---

Your Simple, Friendly, Guiding Question (like the GOOD example):
"#;

pub const DEFAULT_NO_CONTEXT_MESSAGE: &str = "I couldn't find specific information about that in the selected document. Perhaps try rephrasing your question or exploring a different topic?";

pub const DEFAULT_FALLBACK_MESSAGE: &str =
    "I'm sorry, I encountered an error while trying to formulate a response. Please try again.";

const PLACEHOLDERS: &[&str] = &["context", "chat_history", "student_question"];

/// The two fixed replies that bypass generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyMessages {
    /// Returned when retrieval finds nothing for the question.
    pub no_context: String,
    /// Returned when embedding or generation fails.
    pub fallback: String,
}

impl Default for ReplyMessages {
    fn default() -> Self {
        Self {
            no_context: DEFAULT_NO_CONTEXT_MESSAGE.to_string(),
            fallback: DEFAULT_FALLBACK_MESSAGE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    text: String,
}

impl PromptTemplate {
    /// Validate and wrap a template. `{context}` and `{student_question}`
    /// are required; `{chat_history}` is optional.
    pub fn new(text: impl Into<String>) -> Result<Self, ValidationError> {
        let text = text.into();
        for marker in ["{context}", "{student_question}"] {
            if !text.contains(marker) {
                return Err(ValidationError::MissingPlaceholder(marker));
            }
        }
        Ok(Self { text })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn render(&self, context: &str, history: &[ConversationTurn], question: &str) -> String {
        let chat_history = format_history(history);
        let mut out = String::with_capacity(
            self.text.len() + context.len() + chat_history.len() + question.len(),
        );
        let mut rest = self.text.as_str();

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let name = after.find('}').map(|close| &after[..close]);
            let value = match name {
                Some("context") => Some(context),
                Some("chat_history") => Some(chat_history.as_str()),
                Some("student_question") => Some(question),
                _ => None,
            };
            match (name, value) {
                (Some(name), Some(value)) => {
                    debug_assert!(PLACEHOLDERS.contains(&name));
                    out.push_str(value);
                    rest = &after[name.len() + 1..];
                }
                _ => {
                    out.push('{');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            text: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

/// One `"{Role}: {text}"` line per turn, newline-separated.
pub fn format_history(history: &[ConversationTurn]) -> String {
    history
        .iter()
        .map(|turn| format!("{}: {}", turn.role.label(), turn.text))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_template_has_all_placeholders() {
        let t = PromptTemplate::default();
        for p in PLACEHOLDERS {
            assert!(t.as_str().contains(&format!("{{{}}}", p)));
        }
        assert!(PromptTemplate::new(DEFAULT_TEMPLATE).is_ok());
    }

    #[test]
    fn render_substitutes_every_placeholder() {
        let t = PromptTemplate::new("C={context}|H={chat_history}|Q={student_question}").unwrap();
        let history = vec![
            ConversationTurn::student("hi"),
            ConversationTurn::tutor("hello, what do you see?"),
        ];
        let out = t.render("ctx", &history, "what is the fine");
        assert_eq!(
            out,
            "C=ctx|H=Student: hi\nTutor: hello, what do you see?|Q=what is the fine"
        );
    }

    #[test]
    fn substituted_values_are_not_expanded_again() {
        let t = PromptTemplate::new("{context} / {student_question}").unwrap();
        let out = t.render("see {student_question}", &[], "q");
        assert_eq!(out, "see {student_question} / q");
    }

    #[test]
    fn unknown_braces_pass_through() {
        let t = PromptTemplate::new("{x} {context} {student_question} {").unwrap();
        assert_eq!(t.render("c", &[], "q"), "{x} c q {");
    }

    #[test]
    fn missing_placeholders_are_rejected() {
        assert_eq!(
            PromptTemplate::new("only {student_question}"),
            Err(ValidationError::MissingPlaceholder("{context}"))
        );
        assert_eq!(
            PromptTemplate::new("only {context}"),
            Err(ValidationError::MissingPlaceholder("{student_question}"))
        );
    }

    #[test]
    fn empty_history_renders_empty() {
        assert_eq!(format_history(&[]), "");
    }
}
