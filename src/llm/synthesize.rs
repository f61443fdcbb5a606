use std::time::Duration;

use crate::error::PipelineError;
use crate::llm::prompt::{build_context_block, sanitize_for_prompt, AnswerTemplate};
use crate::llm::{generate_within, Generator};
use crate::models::{ChatMessage, LlmResponse, Mode, PassageSet, Turn};

/// Produce the mode-specific answer for `utterance`, grounded in `passages`.
///
/// With no passages there is nothing to ground on: the fixed no-evidence
/// answer for the mode is returned and the generator is not called.
pub async fn synthesize(
    generator: &dyn Generator,
    mode: Mode,
    utterance: &str,
    history: &[Turn],
    passages: PassageSet,
    timeout: Duration,
) -> Result<LlmResponse, PipelineError> {
    let template = AnswerTemplate::for_mode(mode);

    let answer = if passages.is_empty() {
        tracing::debug!("No passages retrieved, answering without generation");
        template.no_evidence_answer().to_string()
    } else {
        let messages = build_messages(template, history, &passages, utterance);
        generate_within(generator, &messages, timeout).await?
    };

    Ok(LlmResponse {
        answer,
        context: passages,
        input: utterance.to_string(),
    })
}

fn build_messages(
    template: AnswerTemplate,
    history: &[Turn],
    passages: &PassageSet,
    utterance: &str,
) -> Vec<ChatMessage> {
    let system_prompt = template.render(&build_context_block(passages));

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system_prompt));
    messages.extend(history.iter().map(|turn| {
        let mut message = ChatMessage::from(turn);
        message.content = sanitize_for_prompt(&message.content);
        message
    }));
    messages.push(ChatMessage::user(sanitize_for_prompt(utterance)));
    messages
}
