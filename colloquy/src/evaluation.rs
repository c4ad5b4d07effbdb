//! Post-deliberation quality scoring.
//!
//! One adapter call over the finished transcript, parsed fail-closed: a
//! reply that does not contain a well-formed report becomes a
//! [`AdapterError::Parse`], never a neutral default score.

use colloquy_types::{EvaluationReport, TranscriptEntry};

use crate::llm::{AdapterError, ChatMessage, GenerationAdapter, GenerationOptions};
use crate::prompts;

/// Catalog callsite for picking the scoring model.
pub const EVALUATION_CALLSITE: &str = "evaluation";

/// Run the scoring call and parse the resulting report.
pub async fn evaluate(
    adapter: &dyn GenerationAdapter,
    options: &GenerationOptions,
    topic: &str,
    transcript: &[TranscriptEntry],
    user_context: &str,
) -> Result<EvaluationReport, AdapterError> {
    let prompt = prompts::evaluation_prompt(topic, transcript, user_context);
    let reply = adapter
        .complete(&[ChatMessage::user(prompt)], options)
        .await?;
    parse_report(&reply)
}

/// Parse a scoring reply into a report, clamping scores to the 0-10
/// scale.
pub fn parse_report(reply: &str) -> Result<EvaluationReport, AdapterError> {
    let block = extract_json_block(reply);
    let mut report: EvaluationReport =
        serde_json::from_str(block).map_err(|e| AdapterError::Parse(e.to_string()))?;

    if report.dimensions.is_empty() {
        return Err(AdapterError::Parse(
            "report carries no dimension scores".to_string(),
        ));
    }

    report.overall = report.overall.clamp(0.0, 10.0);
    for dimension in &mut report.dimensions {
        dimension.score = dimension.score.clamp(0.0, 10.0);
    }
    Ok(report)
}

/// Pull the JSON payload out of a model reply: prefer a ```json fence,
/// fall back to the outermost brace pair, else the trimmed text.
pub fn extract_json_block(text: &str) -> &str {
    if let Some(fence_start) = text.find("```json") {
        let after = &text[fence_start + 7..];
        if let Some(fence_end) = after.find("```") {
            return after[..fence_end].trim();
        }
    }

    if let (Some(open), Some(close)) = (text.find('{'), text.rfind('}')) {
        if open < close {
            return text[open..=close].trim();
        }
    }

    text.trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actors::model_config::ProviderConfig;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tokio::sync::mpsc;

    struct FixedReplyAdapter {
        reply: String,
    }

    #[async_trait]
    impl GenerationAdapter for FixedReplyAdapter {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _options: &GenerationOptions,
        ) -> Result<String, AdapterError> {
            Ok(self.reply.clone())
        }

        async fn stream(
            &self,
            messages: &[ChatMessage],
            options: &GenerationOptions,
            _chunks: mpsc::UnboundedSender<String>,
        ) -> Result<String, AdapterError> {
            self.complete(messages, options).await
        }
    }

    fn test_options() -> GenerationOptions {
        GenerationOptions::new(ProviderConfig::AnthropicCompatible {
            base_url: "https://example.invalid".to_string(),
            api_key_env: "PATH".to_string(),
            model: "test-model".to_string(),
            headers: HashMap::new(),
        })
    }

    const REPORT_JSON: &str = r#"{"overall": 7.5, "dimensions": [
        {"name": "insight", "score": 8.0, "explanation": "sharp"},
        {"name": "rigor", "score": 7.0, "explanation": "sourced"}
    ]}"#;

    #[test]
    fn test_extract_prefers_json_fence() {
        let reply = format!("Here you go:\n```json\n{REPORT_JSON}\n```\nDone.");
        let block = extract_json_block(&reply);
        assert!(block.starts_with('{'));
        assert!(block.ends_with('}'));
        assert!(!block.contains("```"));
    }

    #[test]
    fn test_extract_falls_back_to_braces() {
        let reply = format!("Scores below.\n{REPORT_JSON}\nEnd of report.");
        let block = extract_json_block(&reply);
        assert!(block.starts_with('{'));
        assert!(block.ends_with('}'));
    }

    #[test]
    fn test_parse_report_happy_path() {
        let report = parse_report(REPORT_JSON).unwrap();
        assert_eq!(report.overall, 7.5);
        assert_eq!(report.dimensions.len(), 2);
        assert_eq!(report.dimensions[0].name, "insight");
    }

    #[test]
    fn test_parse_report_rejects_prose() {
        let err = parse_report("The panel did a fine job overall.").unwrap_err();
        assert_eq!(err.category(), "parse_error");
    }

    #[test]
    fn test_parse_report_rejects_empty_dimensions() {
        let err = parse_report(r#"{"overall": 5.0, "dimensions": []}"#).unwrap_err();
        assert_eq!(err.category(), "parse_error");
    }

    #[test]
    fn test_parse_report_clamps_scores() {
        let report = parse_report(
            r#"{"overall": 14.0, "dimensions": [
                {"name": "insight", "score": -2.0, "explanation": "x"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(report.overall, 10.0);
        assert_eq!(report.dimensions[0].score, 0.0);
    }

    #[tokio::test]
    async fn test_evaluate_round_trip() {
        let adapter = FixedReplyAdapter {
            reply: format!("```json\n{REPORT_JSON}\n```"),
        };
        let report = evaluate(&adapter, &test_options(), "test topic", &[], "none")
            .await
            .unwrap();
        assert_eq!(report.overall, 7.5);
    }

    #[tokio::test]
    async fn test_evaluate_propagates_parse_failure() {
        let adapter = FixedReplyAdapter {
            reply: "I would rate this deliberation highly.".to_string(),
        };
        let err = evaluate(&adapter, &test_options(), "test topic", &[], "none")
            .await
            .unwrap_err();
        assert_eq!(err.category(), "parse_error");
    }
}
