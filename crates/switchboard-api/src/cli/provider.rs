//! `swbd providers`: the configured fallback chain.

use anyhow::Result;
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use console::style;

use crate::cli::format_tokens;
use crate::cli::quota::print_no_providers;
use crate::state::AppState;

/// List providers in priority order with their models and budgets.
pub async fn list_providers(state: &AppState, json: bool) -> Result<()> {
    let providers = state.orchestrator.providers();

    if json {
        println!("{}", serde_json::to_string_pretty(&providers)?);
        return Ok(());
    }

    if providers.is_empty() {
        print_no_providers();
        return Ok(());
    }

    println!();
    println!("  {}", style("Fallback Chain").bold());
    println!();

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Priority").fg(Color::White),
        Cell::new("Provider").fg(Color::White),
        Cell::new("Enabled").fg(Color::White),
        Cell::new("Models").fg(Color::White),
        Cell::new("Daily").fg(Color::White),
        Cell::new("Monthly").fg(Color::White),
        Cell::new("Req/min").fg(Color::White),
    ]);

    for spec in &providers {
        let enabled = if spec.enabled {
            Cell::new("yes").fg(Color::Green)
        } else {
            Cell::new("no").fg(Color::DarkGrey)
        };
        let models = spec
            .models
            .iter()
            .map(|(task_type, model)| format!("{task_type}: {model}"))
            .collect::<Vec<_>>()
            .join("\n");

        table.add_row(vec![
            Cell::new(spec.priority).fg(Color::Cyan),
            Cell::new(&spec.name).fg(Color::White),
            enabled,
            Cell::new(models).fg(Color::DarkGrey),
            Cell::new(format_tokens(spec.budget.daily_token_limit)).fg(Color::White),
            Cell::new(format_tokens(spec.budget.monthly_token_limit)).fg(Color::White),
            Cell::new(spec.budget.requests_per_minute_limit).fg(Color::White),
        ]);
    }

    println!("{table}");
    println!();
    println!(
        "  {} provider{}  {}",
        style(providers.len()).bold(),
        if providers.len() == 1 { "" } else { "s" },
        style(format!("from {}", state.config_path.display())).dim()
    );
    println!();

    Ok(())
}
