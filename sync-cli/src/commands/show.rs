//! Load everything and print the board.

use anyhow::Result;

use sync_client::DataBackend;
use sync_types::{Aggregate, AggregateDetail, Dataset};

use super::{drain, load, print_notice, resolve_project};
use crate::config::Context;

/// Run the show command.
pub async fn run(ctx: &Context, priority: Option<&str>) -> Result<()> {
    let controller = ctx.controller().await?;
    let mut notices = controller.subscribe_notices();

    if let Some(reference) = priority {
        let listed: Vec<Aggregate> = controller
            .backend()
            .list_aggregates()
            .await?
            .into_iter()
            .map(|record| record.aggregate)
            .collect();
        controller.select_aggregate(Some(resolve_project(&listed, reference)?));
    }

    let report = load(&controller).await?;
    let snapshot = controller.snapshot();
    print!("{}", render(&snapshot.data));
    if priority.is_some() {
        let order: Vec<&str> = report.order.iter().map(|id| id.as_str()).collect();
        println!("Hydration order: {}", order.join(", "));
    }

    if !report.failed.is_empty() {
        println!();
        println!("Could not load {} project(s):", report.failed.len());
        for warning in &report.warnings {
            println!("  - {warning}");
        }
    }
    if report.orphan_bids > 0 {
        println!("Ignored {} bid(s) without a category", report.orphan_bids);
    }
    for notice in drain(&mut notices) {
        print_notice(&notice);
    }

    Ok(())
}

/// Render the board as plain text.
pub fn render(data: &Dataset) -> String {
    let mut out = String::new();
    out.push_str(&format!("Projects ({}):\n", data.aggregates.len()));

    for aggregate in &data.aggregates {
        out.push_str(&format!(
            "\n  {} - {}  [{}]  (id: {})\n",
            aggregate.name, aggregate.location, aggregate.status, aggregate.id
        ));
        match data.detail(&aggregate.id) {
            Some(detail) => render_detail(&mut out, detail),
            None => out.push_str("    (detail not loaded)\n"),
        }
    }

    out.push_str(&format!(
        "\nSubcontractors: {}   Statuses: {}\n",
        data.contacts.len(),
        data.statuses.len()
    ));
    out
}

fn render_detail(out: &mut String, detail: &AggregateDetail) {
    if detail.integration.is_ready() {
        let provider = detail.integration.provider.as_deref().unwrap_or("documents");
        out.push_str(&format!("    linked to {provider}\n"));
    }
    if detail.categories.is_empty() {
        out.push_str("    no categories\n");
    }
    for category in &detail.categories {
        out.push_str(&format!(
            "    {}  [{}]  bids: {}",
            category.title, category.status, category.bid_count
        ));
        if !category.budget_display.is_empty() {
            out.push_str(&format!("  budget: {}", category.budget_display));
        }
        out.push_str(&format!("  (id: {})\n", category.id));

        for bid in detail.bids.get(&category.id).into_iter().flatten() {
            out.push_str(&format!("      - {}  [{}]", bid.company_name, bid.status));
            if let Some(price) = &bid.price_display {
                out.push_str(&format!("  {price}"));
            }
            if bid.signed {
                out.push_str("  signed");
            }
            out.push_str(&format!("  (id: {})\n", bid.id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::init::demo_dataset;

    #[test]
    fn render_lists_projects_categories_and_bids() {
        let text = render(&demo_dataset());
        assert!(text.starts_with("Projects (2):"));
        assert!(text.contains("Polyfunkční dům - Brno  [realization]"));
        assert!(text.contains("Elektroinstalace  [negotiating]  bids: 2  budget: 1 250 000 Kč"));
        assert!(text.contains("- Elmont s.r.o.  [offer]  1 180 000 Kč  (id: demo-b1)"));
        assert!(text.contains("linked to gdrive"));
        assert!(text.contains("Subcontractors: 3   Statuses: 3"));
    }

    #[test]
    fn render_marks_unloaded_detail() {
        let mut data = demo_dataset();
        data.details_by_id.clear();
        assert!(render(&data).contains("(detail not loaded)"));
    }
}
