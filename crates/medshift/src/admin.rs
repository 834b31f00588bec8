// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator commands: pricing quotes, one-shot sweeps, credit accounts,
//! and config display.

use std::sync::Arc;

use colored::Colorize;
use medshift_bus::EventBus;
use medshift_config::model::MedshiftConfig;
use medshift_core::{MedshiftError, Urgency};
use medshift_cost::{LedgerSummary, PriceBreakdown, PricingTable};
use medshift_dispatch::{ExpirySweeper, RequestIntake};

use crate::serve::open_store;
use crate::CreditsCommand;

fn format_breakdown(urgency: Urgency, breakdown: &PriceBreakdown) -> String {
    let mut lines = vec![format!("  base            {:>4}", breakdown.base)];
    lines.push(format!("  {:<15} {:>4}", urgency.to_string(), breakdown.urgency));
    if breakdown.priority_boost > 0 {
        lines.push(format!("  priority boost  {:>4}", breakdown.priority_boost));
    }
    if breakdown.featured > 0 {
        lines.push(format!("  featured        {:>4}", breakdown.featured));
    }
    lines.push(format!("  total           {:>4}", breakdown.total()));
    lines.join("\n")
}

pub fn print_price(config: &MedshiftConfig, urgency: Urgency, boost: bool, featured: bool) {
    let breakdown = PricingTable::from(&config.pricing).breakdown(urgency, boost, featured);
    println!("{}", "Request price (credits)".bold());
    println!("{}", format_breakdown(urgency, &breakdown));
}

pub async fn run_sweep(config: &MedshiftConfig) -> Result<(), MedshiftError> {
    let store = open_store(config).await?;
    let sweeper = ExpirySweeper::new(store.clone(), Arc::new(EventBus::new()), &config.dispatch);
    let expired = sweeper.sweep_once().await?;
    if expired.is_empty() {
        println!("no overdue requests");
    } else {
        println!("expired {} request(s):", expired.len().to_string().yellow());
        for id in &expired {
            println!("  {id}");
        }
    }
    store.close().await
}

pub async fn run_credits(
    config: &MedshiftConfig,
    action: CreditsCommand,
) -> Result<(), MedshiftError> {
    let store = open_store(config).await?;
    let intake = RequestIntake::new(store.clone(), Arc::new(EventBus::new()), config);

    match action {
        CreditsCommand::Open {
            requester_id,
            balance,
        } => {
            let balance = intake.open_account(&requester_id, balance).await?;
            println!("opened account {requester_id} with {balance} credits");
        }
        CreditsCommand::Grant {
            requester_id,
            amount,
            reason,
        } => {
            let entry = intake.grant_credits(&requester_id, amount, &reason).await?;
            println!(
                "granted {} credits to {requester_id}, balance {}",
                amount.to_string().green(),
                entry.balance_after
            );
        }
        CreditsCommand::Balance { requester_id } => {
            let balance = intake.balance(&requester_id).await?;
            println!("{requester_id}: {balance} credits");
        }
        CreditsCommand::History { requester_id } => {
            let entries = intake.ledger_history(&requester_id).await?;
            for entry in &entries {
                let delta = if entry.delta < 0 {
                    entry.delta.to_string().red()
                } else {
                    format!("+{}", entry.delta).green()
                };
                println!(
                    "{}  {:>6}  {:>6}  {}",
                    entry.created_at.format("%Y-%m-%d %H:%M"),
                    delta,
                    entry.balance_after,
                    entry.reason
                );
            }
            let summary = LedgerSummary::from_entries(&entries);
            println!(
                "{} granted, {} spent across {} requests, balance {}",
                summary.total_granted,
                summary.total_spent,
                summary.requests_admitted,
                summary.current_balance
            );
        }
    }
    store.close().await
}

/// Effective config as TOML, with the realtime API key masked.
fn render_config(config: &MedshiftConfig) -> Result<String, MedshiftError> {
    let mut shown = config.clone();
    if shown.realtime.api_key.is_some() {
        shown.realtime.api_key = Some("********".to_string());
    }
    toml::to_string_pretty(&shown)
        .map_err(|e| MedshiftError::Internal(format!("failed to render config: {e}")))
}

pub fn print_config(config: &MedshiftConfig) -> Result<(), MedshiftError> {
    print!("{}", render_config(config)?);
    Ok(())
}
