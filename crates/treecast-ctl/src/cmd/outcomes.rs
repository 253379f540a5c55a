//! Outcome listing.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json};

#[derive(Deserialize)]
struct OutcomesResponse {
    total: usize,
    outcomes: Vec<Outcome>,
}

#[derive(Deserialize)]
struct Outcome {
    family: String,
    request: String,
    responder: String,
    success: bool,
    summary: String,
    at: String,
}

/// Print outcomes, optionally only those answering `request`.
pub async fn cmd_outcomes(port: u16, request: Option<&str>) -> Result<()> {
    let resp: OutcomesResponse = get_json(&format!("{}/outcomes", base_url(port))).await?;

    let shown: Vec<&Outcome> = resp
        .outcomes
        .iter()
        .filter(|o| request.is_none_or(|r| o.request == r))
        .collect();

    if shown.is_empty() {
        println!("No outcomes yet ({} recorded in total).", resp.total);
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Outcomes ({} of {})", shown.len(), resp.total);
    println!("═══════════════════════════════════════");

    for o in shown {
        let icon = if o.success { "✓" } else { "✗" };
        println!("  {} [{}] {} {}", icon, o.at, o.family, o.summary);
        println!("      request {} answered by {}", o.request, o.responder);
    }

    Ok(())
}
