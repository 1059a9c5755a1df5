//! Builds the ordered message list submitted to the completion
//! provider for one turn: policy, framing, retrieved context, then
//! the full conversation history.

use crate::corpus::Document;

use super::models::{Message, Role, Transcript};

pub const CONTEXT_LABEL: &str =
    "Here is relevant context to answer the next question:";

const BREVITY_SUFFIX: &str = "Answer briefly using this context:";

/// How retrieved context is injected into the prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextStyle {
    /// Retrieved content is carried as a pair of assistant turns, a
    /// fixed label followed by the document content verbatim. This is
    /// the primary form.
    SeparateTurn,
    /// Retrieved content and a brevity instruction are folded into
    /// the final user message instead.
    InlineSuffix,
}

/// Produces the prompt for one completion call. Always: one system
/// turn (policy), one assistant turn (framing), optional retrieved
/// context, then the entire history snapshot unchanged and in order.
///
/// History is resent in full on every call. No truncation or
/// summarization, so request size grows with conversation length.
pub fn build_prompt(
    policy: &str,
    framing: &str,
    retrieved: Option<&Document>,
    style: ContextStyle,
    history: &Transcript,
) -> Vec<Message> {
    let mut messages = vec![
        Message::new(Role::System, policy),
        Message::new(Role::Assistant, framing),
    ];

    match (retrieved, style) {
        (Some(doc), ContextStyle::SeparateTurn) => {
            messages.push(Message::new(Role::Assistant, CONTEXT_LABEL));
            messages.push(Message::new(Role::Assistant, &doc.content));
            messages.extend(history.iter().cloned());
        }
        (Some(doc), ContextStyle::InlineSuffix) => {
            messages.extend(history.iter().cloned());
            if let Some(last) = messages.last_mut() {
                if last.role == Role::User {
                    last.content = format!(
                        "{}\n\n{}\n{}",
                        last.content, BREVITY_SUFFIX, doc.content
                    );
                }
            }
        }
        (None, _) => {
            messages.extend(history.iter().cloned());
        }
    }

    messages
}
