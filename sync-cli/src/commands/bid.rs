//! Move bids through the pipeline.

use anyhow::Result;
use clap::Subcommand;

use sync_types::{AggregateId, BidId, BidStatus};

use super::{finish, open_project};
use crate::config::{Context, Controller};

/// Bid subcommands.
#[derive(Subcommand, Debug)]
pub enum BidAction {
    /// Set a bid's pipeline status
    Status {
        /// Project id or name
        project: String,
        /// Bid id
        bid: String,
        /// New status (sent, offer, shortlist, contracted, rejected)
        status: String,
    },

    /// Mark a bid's contract as signed
    Sign {
        /// Project id or name
        project: String,
        /// Bid id
        bid: String,
        /// Clear the signed flag instead
        #[arg(long)]
        unsign: bool,
    },
}

impl BidAction {
    fn project(&self) -> &str {
        match self {
            Self::Status { project, .. } | Self::Sign { project, .. } => project,
        }
    }
}

/// Run a bid subcommand.
pub async fn run(ctx: &Context, action: BidAction) -> Result<()> {
    // Reject a bad status before touching the store.
    if let BidAction::Status { status, .. } = &action {
        status.parse::<BidStatus>()?;
    }

    let (controller, mut notices, project) = open_project(ctx, action.project()).await?;
    let result = apply(&controller, &project, action).await;
    finish(&controller, &mut notices).await;

    println!("{}", result?);
    Ok(())
}

async fn apply(controller: &Controller, project: &AggregateId, action: BidAction) -> Result<String> {
    match action {
        BidAction::Status { bid, status, .. } => {
            let id = BidId::from(bid);
            let status: BidStatus = status.parse()?;
            controller.set_bid_status(project, &id, status).await?;
            Ok(format!("Bid {id} is now {status}"))
        }
        BidAction::Sign { bid, unsign, .. } => {
            let id = BidId::from(bid);
            controller.set_bid_signed(project, &id, !unsign).await?;
            let state = if unsign { "unsigned" } else { "signed" };
            Ok(format!("Bid {id} marked {state}"))
        }
    }
}
