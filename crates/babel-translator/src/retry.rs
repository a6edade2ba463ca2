//! Retry-on-size-error orchestration.
//!
//! A provider call that fails because the input is too large is retried on
//! smaller pieces: the text is split, each chunk is translated (recursively,
//! with a halved split limit, so a chunk that is still too large splits
//! again), and the results are joined in order. Text rejected while already
//! under the split limit is split at half its own length. Only text that
//! cannot be cut at any sentence boundary gives up. Any other failure is returned
//! untouched. Partial results are never returned.

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tracing::{debug, info, warn};

use babel_core::client::LlmClient;
use babel_core::error::LlmError;

use crate::splitter::{split_text_with_limit, MAX_CHUNK_SIZE};

/// Builds the provider prompt for `(text, context)`.
pub trait PromptBuilder: Sync {
    fn build(&self, text: &str, context: &str) -> String;
}

impl<F> PromptBuilder for F
where
    F: Fn(&str, &str) -> String + Sync,
{
    fn build(&self, text: &str, context: &str) -> String {
        self(text, context)
    }
}

/// Context passed to the prompt of chunk `index` of `total`.
pub fn part_context(context: &str, index: usize, total: usize) -> String {
    if context.is_empty() {
        format!("(part {index}/{total})")
    } else {
        format!("{context} (part {index}/{total})")
    }
}

/// Translate `text`, splitting and retrying on size-class failures.
pub async fn translate_with_retry(
    client: &dyn LlmClient,
    text: &str,
    context: &str,
    prompts: &dyn PromptBuilder,
) -> Result<String, LlmError> {
    attempt(client, text, context.to_string(), prompts, MAX_CHUNK_SIZE).await
}

fn attempt<'a>(
    client: &'a dyn LlmClient,
    text: &'a str,
    context: String,
    prompts: &'a dyn PromptBuilder,
    limit: usize,
) -> BoxFuture<'a, Result<String, LlmError>> {
    async move {
        let prompt = prompts.build(text, &context);
        let err = match client.translate(text, &prompt).await {
            Ok(out) => return Ok(out),
            Err(e) if !e.is_size_error() => return Err(e),
            Err(e) => e,
        };

        warn!(
            provider = client.provider_name(),
            bytes = text.len(),
            limit,
            "Text too large, splitting into chunks"
        );

        let mut limit = limit;
        let mut chunks = split_text_with_limit(text, limit);
        if chunks.len() <= 1 && text.len() > 1 {
            // Rejected while already under the limit: halve the text itself.
            limit = (text.len() / 2).max(1);
            chunks = split_text_with_limit(text, limit);
        }
        if chunks.len() <= 1 {
            return Err(LlmError::SplitExhausted {
                bytes: text.len(),
                source: Box::new(err),
            });
        }

        let total = chunks.len();
        info!(chunks = total, "Translating chunks separately");

        let mut out = String::with_capacity(text.len());
        for (i, chunk) in chunks.iter().enumerate() {
            let index = i + 1;
            let chunk_context = part_context(&context, index, total);
            let translated = attempt(client, chunk, chunk_context, prompts, (limit / 2).max(1))
                .await
                .map_err(|e| LlmError::Chunk {
                    index,
                    total,
                    source: Box::new(e),
                })?;
            debug!(index, total, bytes = chunk.len(), "Chunk translated");
            out.push_str(&translated);
        }

        info!(chunks = total, "Successfully translated all chunks");
        Ok(out)
    }
    .boxed()
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use babel_core::error::ErrorKind;
    use std::sync::Mutex;

    /// Rejects inputs over `max_bytes` with a size error, echoes the rest
    /// upper-cased. Records every text it sees.
    struct SizeLimitedClient {
        max_bytes: usize,
        calls: Mutex<Vec<(String, String)>>,
        fail_on: Option<&'static str>,
    }

    impl SizeLimitedClient {
        fn new(max_bytes: usize) -> Self {
            Self {
                max_bytes,
                calls: Mutex::new(Vec::new()),
                fail_on: None,
            }
        }

        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LlmClient for SizeLimitedClient {
        async fn translate(&self, text: &str, prompt: &str) -> Result<String, LlmError> {
            self.calls
                .lock()
                .unwrap()
                .push((text.to_string(), prompt.to_string()));
            if text.len() > self.max_bytes {
                return Err(LlmError::Api {
                    provider: "mock".into(),
                    status: 400,
                    body: "maximum context length exceeded".into(),
                });
            }
            if let Some(marker) = self.fail_on {
                if text.contains(marker) {
                    return Err(LlmError::Transport {
                        provider: "mock".into(),
                        message: "connection reset".into(),
                    });
                }
            }
            Ok(text.to_uppercase())
        }

        fn provider_name(&self) -> &str {
            "mock"
        }
    }

    fn prompt(text: &str, context: &str) -> String {
        format!("[{context}] {text}")
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let client = SizeLimitedClient::new(1000);
        let out = translate_with_retry(&client, "hello", "ctx", &prompt)
            .await
            .unwrap();
        assert_eq!(out, "HELLO");
        assert_eq!(client.calls(), vec![("hello".into(), "[ctx] hello".into())]);
    }

    #[tokio::test]
    async fn test_non_size_error_not_retried() {
        let mut client = SizeLimitedClient::new(1000);
        client.fail_on = Some("boom");
        let err = translate_with_retry(&client, "boom", "", &prompt)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(client.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_single_chunk_is_exhausted() {
        let client = SizeLimitedClient::new(10);
        let err = translate_with_retry(&client, "short but rejected", "", &prompt)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::SplitExhausted { .. }));
        assert!(err.is_size_error());
        assert!(err.to_string().contains("even after splitting"));
        assert_eq!(client.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_split_and_join_in_order() {
        let sentence = "a quick sentence. ";
        let text = sentence.repeat(2000); // 36 KB
        let client = SizeLimitedClient::new(15_000);

        let out = translate_with_retry(&client, &text, "Book", &prompt)
            .await
            .unwrap();
        assert_eq!(out, text.to_uppercase());

        let calls = client.calls();
        assert!(calls.len() > 2);
        assert!(calls[1].1.starts_with("[Book (part 1/"));
    }

    #[tokio::test]
    async fn test_multi_level_split() {
        // First level yields ~20 KB chunks, still over the 6 KB ceiling.
        let text = "Sentence number one here. ".repeat(1600); // ~41.6 KB
        let client = SizeLimitedClient::new(6_000);
        let out = translate_with_retry(&client, &text, "", &prompt)
            .await
            .unwrap();
        assert_eq!(out, text.to_uppercase());
        let nested = client
            .calls()
            .iter()
            .filter(|(_, p)| p.contains(") (part "))
            .count();
        assert!(nested > 0);
    }

    #[tokio::test]
    async fn test_failing_chunk_fails_everything() {
        let mut text = "fine sentence. ".repeat(1500);
        text.push_str("boom sentence. ");
        text.push_str(&"more text here. ".repeat(1500));
        let mut client = SizeLimitedClient::new(25_000);
        client.fail_on = Some("boom");

        let err = translate_with_retry(&client, &text, "", &prompt)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Chunk { .. }));
        assert!(err.to_string().starts_with("failed to translate chunk"));
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[tokio::test]
    async fn test_under_threshold_multi_sentence_splits() {
        let text = "Short sentence here. ".repeat(600); // 12.6 KB, below the default limit
        let client = SizeLimitedClient::new(4_000);
        let out = translate_with_retry(&client, &text, "", &prompt)
            .await
            .unwrap();
        assert_eq!(out, text.to_uppercase());
        let calls = client.calls();
        assert!(calls.len() > 1);
        assert!(calls.iter().skip(1).all(|(t, _)| t.len() < text.len()));
    }

    #[test]
    fn test_part_context() {
        assert_eq!(part_context("", 1, 3), "(part 1/3)");
        assert_eq!(part_context("Chapter 2", 2, 3), "Chapter 2 (part 2/3)");
    }
}
