//! Quota and usage dashboards.

use anyhow::Result;
use chrono::{Duration, Utc};
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use console::style;

use switchboard_types::quota::QuotaSnapshot;

use crate::cli::format_tokens;
use crate::state::AppState;

/// Show daily and monthly quota usage plus the current request rate.
pub async fn show_quota(state: &AppState, json: bool) -> Result<()> {
    let statuses = state.orchestrator.quota_summary().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    if statuses.is_empty() {
        print_no_providers();
        return Ok(());
    }

    println!();
    println!("  {}", style("Provider Quota").bold());
    println!();

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Priority").fg(Color::White),
        Cell::new("Provider").fg(Color::White),
        Cell::new("Daily").fg(Color::White),
        Cell::new("Monthly").fg(Color::White),
        Cell::new("Req/min").fg(Color::White),
        Cell::new("Resets").fg(Color::White),
    ]);

    for status in &statuses {
        let name = if status.enabled {
            Cell::new(&status.provider).fg(Color::White)
        } else {
            Cell::new(format!("{} (disabled)", status.provider)).fg(Color::DarkGrey)
        };

        let rate_color = if status.requests_this_minute >= status.requests_per_minute_limit {
            Color::Red
        } else {
            Color::White
        };

        table.add_row(vec![
            Cell::new(status.priority).fg(Color::Cyan),
            name,
            window_cell(&status.daily),
            window_cell(&status.monthly),
            Cell::new(format!(
                "{}/{}",
                status.requests_this_minute, status.requests_per_minute_limit
            ))
            .fg(rate_color),
            Cell::new(status.daily.window_end.format("%Y-%m-%d %H:%M UTC")).fg(Color::DarkGrey),
        ]);
    }

    println!("{table}");
    println!();

    let pending = state.orchestrator.pending_tasks().len();
    if pending > 0 {
        println!(
            "  {} {} deferred task{} waiting",
            style("⏸").yellow(),
            style(pending).bold(),
            if pending == 1 { "" } else { "s" }
        );
        println!();
    }

    Ok(())
}

/// Show per-provider usage over the trailing `since_hours`.
pub async fn show_usage(state: &AppState, since_hours: u32, json: bool) -> Result<()> {
    if since_hours == 0 {
        anyhow::bail!("--since-hours must be at least 1");
    }
    let since = Utc::now() - Duration::hours(i64::from(since_hours));
    let summaries = state.orchestrator.usage_summary(since).await?;

    if json {
        let value = serde_json::json!({
            "since": since,
            "providers": summaries,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {}",
        style("Usage").bold(),
        style(format!("(last {since_hours}h)")).dim()
    );
    println!();

    if summaries.is_empty() {
        println!("  {}", style("No usage recorded in this window.").dim());
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Provider").fg(Color::White),
        Cell::new("Executions").fg(Color::White),
        Cell::new("Success").fg(Color::White),
        Cell::new("Failures").fg(Color::White),
        Cell::new("Queued").fg(Color::White),
        Cell::new("Tokens").fg(Color::White),
        Cell::new("Avg latency").fg(Color::White),
    ]);

    let mut total_tokens = 0;
    for summary in &summaries {
        total_tokens += summary.tokens_consumed;
        let rate = summary.success_rate() * 100.0;
        let rate_color = if summary.executions == 0 {
            Color::DarkGrey
        } else if rate >= 90.0 {
            Color::Green
        } else if rate >= 50.0 {
            Color::Yellow
        } else {
            Color::Red
        };

        table.add_row(vec![
            Cell::new(&summary.provider).fg(Color::White),
            Cell::new(summary.executions).fg(Color::White),
            Cell::new(format!("{rate:.0}%")).fg(rate_color),
            Cell::new(summary.failures).fg(Color::White),
            Cell::new(summary.queued).fg(Color::White),
            Cell::new(format_tokens(summary.tokens_consumed)).fg(Color::Cyan),
            Cell::new(format!("{:.0}ms", summary.avg_latency_ms)).fg(Color::DarkGrey),
        ]);
    }

    println!("{table}");
    println!();
    println!("  Total tokens: {}", style(format_tokens(total_tokens)).bold());
    println!();

    Ok(())
}

/// `used/limit (pct%)`, colored by how close the window is to its limit.
fn window_cell(window: &QuotaSnapshot) -> Cell {
    let pct = window.percent_used();
    let color = if pct >= 90.0 {
        Color::Red
    } else if pct >= 70.0 {
        Color::Yellow
    } else {
        Color::Green
    };
    Cell::new(format!(
        "{}/{} ({pct:.0}%)",
        format_tokens(window.used_tokens),
        format_tokens(window.limit_tokens)
    ))
    .fg(color)
}

pub(crate) fn print_no_providers() {
    println!();
    println!(
        "  {} No providers configured. Add a [[providers]] table to {}.",
        style("i").blue().bold(),
        style("switchboard.toml").cyan()
    );
    println!();
}
