//! Show load status and counts.

use anyhow::Result;

use sync_types::Snapshot;

use crate::config::Context;

/// Run the status command.
pub async fn run(ctx: &Context) -> Result<()> {
    println!("=== bidsync status ===");
    println!();

    if !ctx.is_initialized() {
        println!("Store: NOT INITIALIZED ({})", ctx.store_path().display());
        println!();
        println!("Run 'bidsync init' or 'bidsync init --demo' to create it.");
        return Ok(());
    }

    let controller = ctx.controller().await?;
    println!("Store:");
    println!("  Kind: {}", controller.backend().kind());
    println!("  Path: {}", ctx.store_path().display());
    if !ctx.local {
        println!("  User: {}", ctx.user);
    }
    println!();

    let config = controller.config();
    println!("Config:");
    println!(
        "  Bootstrap timeout:   {} ms ({} retries)",
        config.bootstrap.timeout_ms, config.bootstrap.retries
    );
    println!(
        "  Document sync:       {} s cooldown, {} s dedupe",
        config.external_sync.cooldown_secs, config.external_sync.dedupe_window_secs
    );
    println!();

    // A failed load is reported here, not returned as an error.
    let outcome = controller.bootstrap().await;
    print!("{}", summary(&controller.snapshot()));
    if let Err(e) = outcome {
        println!("  Error:      {e}");
    }
    println!("  Generation: {}", controller.generation());

    Ok(())
}

/// Counts and load flags as plain text.
pub fn summary(snapshot: &Snapshot) -> String {
    let data = &snapshot.data;
    let load = &snapshot.load;
    let categories: usize = data.details_by_id.values().map(|d| d.categories.len()).sum();
    let bids: usize = data.details_by_id.values().map(|d| d.bid_total()).sum();

    let mut out = String::from("Data:\n");
    out.push_str(&format!(
        "  Projects:   {} ({} loaded)\n",
        data.aggregates.len(),
        data.details_by_id.len()
    ));
    out.push_str(&format!("  Categories: {categories}\n"));
    out.push_str(&format!("  Bids:       {bids}\n"));
    out.push_str(&format!("  Contacts:   {}\n", data.contacts.len()));
    out.push_str(&format!("  Statuses:   {}\n", data.statuses.len()));
    out.push_str("\nLoad:\n");
    out.push_str(&format!(
        "  Progress:   {}% {}\n",
        load.bootstrap_progress.percent, load.bootstrap_progress.label
    ));
    if let Some(error) = &load.bootstrap_error {
        out.push_str(&format!("  Failed:     {error}\n"));
    }
    if let Some(warning) = &load.background_warning {
        out.push_str(&format!("  Warning:    {warning}\n"));
    }
    out
}
