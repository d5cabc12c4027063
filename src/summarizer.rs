//! # Summarizer
//!
//! Best-effort enrichment: each scraped page gets a single-paragraph,
//! roughly 50-word factual summary from the generative model. Input is
//! whitespace-collapsed and clipped to a bounded length before the call to
//! keep latency and cost flat regardless of page size.
//!
//! Summarization is never correctness-critical. When the model call fails —
//! timeout, transport error, empty choice — the fixed sentinel
//! [`SUMMARY_SENTINEL`] is substituted and the pipeline carries on.

use async_openai::{Client, config::OpenAIConfig};
use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

use crate::api::{CompletionParams, chat_completion};

/// Substituted whenever the model cannot produce a summary.
pub const SUMMARY_SENTINEL: &str = "Summary not available.";

/// Maximum characters of page text sent to the model.
pub const SUMMARY_INPUT_CHARS: usize = 2_000;

const SUMMARIZER_SYSTEM_PROMPT: &str = "You are an expert summarizer who creates precise, \
factual summaries while preserving all key information.";

/// Produces a short summary for one page's extracted text.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize `text`. Infallible by contract: implementations substitute
    /// a sentinel rather than propagate model failures.
    async fn summarize(&self, text: &str) -> String;
}

/// LLM-backed [`Summarizer`].
pub struct LlmSummarizer {
    client: Client<OpenAIConfig>,
    model: String,
    timeout: Duration,
}

impl LlmSummarizer {
    pub fn new(client: Client<OpenAIConfig>, model: String, timeout: Duration) -> Self {
        Self {
            client,
            model,
            timeout,
        }
    }

    fn build_prompt(text: &str) -> String {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let clipped = match collapsed.char_indices().nth(SUMMARY_INPUT_CHARS) {
            Some((byte_idx, _)) => &collapsed[..byte_idx],
            None => collapsed.as_str(),
        };

        format!(
            "Please provide a concise, accurate summary of the following text \
following these guidelines:\n\
\n\
1. Length: Approximately 50 words (strictly between 45-55 words)\n\
2. Style: Professional, factual, and neutral tone\n\
3. Content: Focus on key points, main ideas, and essential information\n\
4. Omit: Examples, anecdotes, and repetitive information\n\
5. Structure: Single coherent paragraph with complete sentences\n\
\n\
Text to summarize:\n\
{clipped}\n\
\n\
Summary:"
        )
    }

    /// Collapse whitespace and make sure the summary reads as a sentence.
    fn polish(raw: &str) -> String {
        let mut summary = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        if !summary.is_empty() && !summary.ends_with('.') {
            summary.push('.');
        }
        summary
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, text: &str) -> String {
        let params = CompletionParams {
            temperature: 0.3,
            max_tokens: 150,
            stop: vec!["\n\n".to_string()],
            timeout: self.timeout,
        };

        match chat_completion(
            &self.client,
            &self.model,
            SUMMARIZER_SYSTEM_PROMPT,
            &Self::build_prompt(text),
            &params,
        )
        .await
        {
            Ok(raw) => {
                let polished = Self::polish(&raw);
                if polished.is_empty() {
                    SUMMARY_SENTINEL.to_string()
                } else {
                    polished
                }
            }
            Err(e) => {
                warn!(error = %e, "summarization failed, substituting sentinel");
                SUMMARY_SENTINEL.to_string()
            }
        }
    }
}
