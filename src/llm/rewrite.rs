use std::time::Duration;

use crate::error::PipelineError;
use crate::llm::prompt::{sanitize_for_prompt, REWRITE_SYSTEM_PROMPT};
use crate::llm::{generate_within, Generator};
use crate::models::{ChatMessage, RawHistoryEntry};

/// Turn `utterance` into a query that stands on its own without `history`.
///
/// With no history there is nothing to resolve, so the utterance is returned
/// verbatim and the generator is never called.
pub async fn rewrite(
    generator: &dyn Generator,
    history: &[RawHistoryEntry],
    utterance: &str,
    timeout: Duration,
) -> Result<String, PipelineError> {
    if history.is_empty() {
        return Ok(utterance.to_string());
    }

    let messages = build_rewrite_messages(history, utterance);
    let rewritten = generate_within(generator, &messages, timeout).await?;
    Ok(strip_wrapping_quotes(&rewritten).to_string())
}

fn build_rewrite_messages(history: &[RawHistoryEntry], utterance: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(REWRITE_SYSTEM_PROMPT));
    messages.extend(history.iter().map(|entry| {
        let mut message = ChatMessage::from(entry);
        message.content = sanitize_for_prompt(&message.content);
        message
    }));
    messages.push(ChatMessage::user(sanitize_for_prompt(utterance)));
    messages
}

/// Models like to echo the query back in quotes.
fn strip_wrapping_quotes(text: &str) -> &str {
    let text = text.trim();
    for (open, close) in [('"', '"'), ('\'', '\''), ('“', '”'), ('「', '」')] {
        if let Some(inner) = text
            .strip_prefix(open)
            .and_then(|rest| rest.strip_suffix(close))
        {
            if !inner.trim().is_empty() {
                return inner.trim();
            }
        }
    }
    text
}
