//! Add, edit or delete demand categories.

use anyhow::{Context as _, Result};
use clap::Subcommand;

use sync_types::{AggregateId, CategoryId, CategoryStatus, LineCategory};

use super::{finish, open_project};
use crate::config::{Context, Controller};

/// Category subcommands.
#[derive(Subcommand, Debug)]
pub enum CategoryAction {
    /// Add a category to a project
    Add {
        /// Project id or name
        project: String,
        /// Category title
        title: String,
        /// Category id (generated if omitted)
        #[arg(long)]
        id: Option<String>,
        /// Budget agreed in the investor contract
        #[arg(long)]
        budget: Option<f64>,
        /// Offer deadline (YYYY-MM-DD)
        #[arg(long)]
        deadline: Option<String>,
    },

    /// Change a category's fields
    Edit {
        /// Project id or name
        project: String,
        /// Category id
        category: String,
        /// New title
        #[arg(long)]
        title: Option<String>,
        /// New status (open, negotiating, closed, contracted)
        #[arg(long)]
        status: Option<String>,
        /// New contract budget
        #[arg(long)]
        budget: Option<f64>,
    },

    /// Delete a category and its bids
    Delete {
        /// Project id or name
        project: String,
        /// Category id
        category: String,
    },
}

impl CategoryAction {
    fn project(&self) -> &str {
        match self {
            Self::Add { project, .. } | Self::Edit { project, .. } | Self::Delete { project, .. } => {
                project
            }
        }
    }
}

/// Run a category subcommand.
pub async fn run(ctx: &Context, action: CategoryAction) -> Result<()> {
    let (controller, mut notices, project) = open_project(ctx, action.project()).await?;
    let result = apply(&controller, &project, action).await;
    finish(&controller, &mut notices).await;

    println!("{}", result?);
    Ok(())
}

async fn apply(
    controller: &Controller,
    project: &AggregateId,
    action: CategoryAction,
) -> Result<String> {
    match action {
        CategoryAction::Add {
            title,
            id,
            budget,
            deadline,
            ..
        } => {
            let id = id.map(CategoryId::from).unwrap_or_else(CategoryId::generate);
            let mut category = LineCategory::new(id.clone(), &title);
            if let Some(budget) = budget {
                category.contract_budget = budget;
                category.budget_display = format_budget(budget);
            }
            category.deadline = deadline;
            controller.add_category(project, category).await?;
            Ok(format!("Added category '{title}' (id: {id})"))
        }
        CategoryAction::Edit {
            category,
            title,
            status,
            budget,
            ..
        } => {
            let id = CategoryId::from(category);
            let mut current = controller
                .snapshot()
                .data
                .detail(project)
                .and_then(|d| d.category(&id))
                .cloned()
                .with_context(|| format!("No category {id} in project {project}"))?;
            if let Some(title) = title {
                current.title = title;
            }
            if let Some(status) = status {
                current.status = status.parse::<CategoryStatus>()?;
            }
            if let Some(budget) = budget {
                current.contract_budget = budget;
                current.budget_display = format_budget(budget);
            }
            controller.edit_category(project, current).await?;
            Ok(format!("Updated category {id}"))
        }
        CategoryAction::Delete { category, .. } => {
            let id = CategoryId::from(category);
            controller.delete_category(project, &id).await?;
            Ok(format!("Deleted category {id}"))
        }
    }
}

/// Whole crowns with space-separated thousands, e.g. `1 250 000 Kč`.
fn format_budget(amount: f64) -> String {
    let digits = format!("{:.0}", amount.abs());
    let mut grouped = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(c);
    }
    let sign = if amount < 0.0 { "-" } else { "" };
    format!("{sign}{grouped} Kč")
}
