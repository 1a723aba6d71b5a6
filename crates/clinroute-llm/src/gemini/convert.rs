//! Response conversion for the Gemini API

use crate::error::{Error, Result};
use crate::request::TokenUsage;
use crate::wire::GenerateContentResponse;

/// Concatenated text of the first candidate
pub(crate) fn candidate_text(response: &GenerateContentResponse) -> String {
    response
        .candidates
        .first()
        .and_then(|candidate| candidate.content.as_ref())
        .map(|content| {
            content
                .parts
                .iter()
                .filter_map(|part| part.text.as_deref())
                .collect::<String>()
        })
        .unwrap_or_default()
}

/// Extract the text and usage of a complete (non-streamed) response.
///
/// A blocked prompt, or a candidate stopped for safety without any text, is
/// an invalid response rather than an empty success.
pub(crate) fn into_completion(response: GenerateContentResponse) -> Result<(String, Option<TokenUsage>)> {
    if let Some(reason) = response
        .prompt_feedback
        .as_ref()
        .and_then(|feedback| feedback.block_reason.as_deref())
    {
        return Err(Error::InvalidResponse(format!("prompt blocked: {reason}")));
    }

    let Some(candidate) = response.candidates.first() else {
        return Err(Error::InvalidResponse(
            "response contained no candidates".to_string(),
        ));
    };

    let text = candidate_text(&response);
    if text.is_empty() {
        if let Some(reason) = candidate.finish_reason.as_deref() {
            if matches!(reason, "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT") {
                return Err(Error::InvalidResponse(format!(
                    "generation stopped: {reason}"
                )));
            }
        }
    }

    Ok((text, response.usage_metadata.map(Into::into)))
}
