//! One-shot task submission from the command line.

use anyhow::{Context, Result};
use console::style;

use switchboard_types::dispatch::SubmitOutcome;
use switchboard_types::task::{RequestTask, TaskType};

use crate::cli::format_tokens;
use crate::state::AppState;

/// Submit a single task in-process and print the outcome.
///
/// The deferred queue lives in memory, so a task deferred here is dropped
/// when the command exits. Run `swbd serve` to keep deferred tasks alive.
pub async fn submit_task(
    state: &AppState,
    task_type: &str,
    tokens: u64,
    prompt: Option<String>,
    payload: Option<String>,
    json: bool,
) -> Result<()> {
    let task_type: TaskType = task_type.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let payload = build_payload(prompt, payload)?;
    let task = RequestTask::new(task_type, tokens, payload);

    let outcome = state.orchestrator.submit(task).await;

    if json {
        let value = match &outcome {
            SubmitOutcome::Dispatched(result) => serde_json::json!({
                "status": outcome.status(),
                "result": result,
            }),
            SubmitOutcome::Deferred {
                task_id,
                queue_position,
            } => serde_json::json!({
                "status": outcome.status(),
                "task_id": task_id,
                "queue_position": queue_position,
            }),
            SubmitOutcome::Rejected(error) => serde_json::json!({
                "status": outcome.status(),
                "code": error.code(),
                "message": error.to_string(),
            }),
        };
        println!("{}", serde_json::to_string_pretty(&value)?);
        if let SubmitOutcome::Rejected(error) = outcome {
            return Err(error.into());
        }
        return Ok(());
    }

    match outcome {
        SubmitOutcome::Dispatched(result) => {
            println!();
            println!(
                "  {} Dispatched to {} ({})",
                style("✓").green().bold(),
                style(&result.provider).cyan().bold(),
                style(&result.model).dim()
            );
            if !result.fallback_from.is_empty() {
                println!(
                    "  {} fell back from {}",
                    style("↳").yellow(),
                    result.fallback_from.join(", ")
                );
            }
            println!(
                "  Tokens:   {}   Attempts: {}   Latency: {}ms",
                style(format_tokens(result.tokens_consumed)).bold(),
                result.attempts,
                result.latency_ms
            );
            println!();
            match result.content.get("text").and_then(|t| t.as_str()) {
                Some(text) => println!("{text}"),
                None => println!("{}", serde_json::to_string_pretty(&result.content)?),
            }
            println!();
            Ok(())
        }
        SubmitOutcome::Deferred {
            task_id,
            queue_position,
        } => {
            println!();
            println!(
                "  {} No provider has capacity; task {} queued at position {}",
                style("⏸").yellow().bold(),
                style(task_id).dim(),
                style(queue_position).bold()
            );
            println!(
                "  {}",
                style("Deferred tasks are held in memory and are dropped when this command exits.")
                    .dim()
            );
            println!();
            Ok(())
        }
        SubmitOutcome::Rejected(error) => Err(error.into()),
    }
}

/// `--prompt` becomes `{"prompt": ...}`; `--payload` is parsed as JSON.
fn build_payload(prompt: Option<String>, payload: Option<String>) -> Result<serde_json::Value> {
    match (prompt, payload) {
        (Some(prompt), _) => Ok(serde_json::json!({ "prompt": prompt })),
        (None, Some(raw)) => serde_json::from_str(&raw).context("--payload is not valid JSON"),
        (None, None) => anyhow::bail!("provide --prompt or --payload"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_is_wrapped() {
        let payload = build_payload(Some("hello".into()), None).unwrap();
        assert_eq!(payload, serde_json::json!({ "prompt": "hello" }));
    }

    #[test]
    fn raw_payload_is_parsed() {
        let payload =
            build_payload(None, Some(r#"{"input": ["a", "b"]}"#.into())).unwrap();
        assert_eq!(payload["input"][1], "b");
    }

    #[test]
    fn invalid_payload_is_error() {
        assert!(build_payload(None, Some("{not json".into())).is_err());
    }

    #[test]
    fn missing_payload_is_error() {
        assert!(build_payload(None, None).is_err());
    }
}
