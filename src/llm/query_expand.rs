use std::time::Duration;

use crate::error::PipelineError;
use crate::llm::prompt::sanitize_for_prompt;
use crate::llm::{generate_within, Generator};
use crate::models::ChatMessage;

/// Ask the generator for up to `fanout` alternative phrasings of `query`.
///
/// Unparsable output yields an empty list; only a failed generation call is
/// an error.
pub async fn expand_query(
    generator: &dyn Generator,
    query: &str,
    fanout: usize,
    timeout: Duration,
) -> Result<Vec<String>, PipelineError> {
    if fanout == 0 {
        return Ok(Vec::new());
    }

    let query = sanitize_for_prompt(query);
    let prompt = format!(
        "You are a document search query expander. Given a search query, generate exactly \
         {fanout} alternative phrasings that keep the same meaning but use different words, \
         so that documents the original wording would miss can still be found.\n\n\
         Original query: \"{query}\"\n\n\
         Respond with ONLY a JSON array of {fanout} strings. No explanation.\n\
         Example: [\"alternative phrasing 1\", \"alternative phrasing 2\"]"
    );

    let response = generate_within(generator, &[ChatMessage::user(prompt)], timeout).await?;
    Ok(parse_expanded_queries(&response, fanout))
}

fn parse_expanded_queries(content: &str, fanout: usize) -> Vec<String> {
    // Extract JSON array from response
    let json_str = match (content.find('['), content.rfind(']')) {
        (Some(start), Some(end)) if start < end => &content[start..=end],
        _ => content,
    };

    match serde_json::from_str::<Vec<String>>(json_str) {
        Ok(queries) => queries
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .take(fanout)
            .collect(),
        Err(e) => {
            tracing::warn!("Failed to parse expanded queries: {e}. Raw: {content}");
            Vec::new()
        }
    }
}
