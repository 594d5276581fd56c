//! CLI command implementations.

pub mod bid;
pub mod category;
pub mod init;
pub mod show;
pub mod status;

use anyhow::Result;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::TryRecvError};

use sync_client::{HydrationReport, LoadOutcome};
use sync_types::{Aggregate, AggregateId, Notice};

use crate::config::{Context, Controller};

/// How long running document syncs may finish after a command.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Run a bootstrap load and return its report.
pub async fn load(controller: &Controller) -> Result<HydrationReport> {
    match controller.bootstrap().await? {
        LoadOutcome::Completed(report) => Ok(report),
        LoadOutcome::Superseded => anyhow::bail!("Load was superseded by a newer one"),
    }
}

/// Open the controller, load the board and resolve `project`.
///
/// The notice receiver is subscribed before the load so nothing is missed.
pub async fn open_project(
    ctx: &Context,
    project: &str,
) -> Result<(Controller, broadcast::Receiver<Notice>, AggregateId)> {
    let controller = ctx.controller().await?;
    let notices = controller.subscribe_notices();
    load(&controller).await?;
    let id = resolve_project(&controller.snapshot().data.aggregates, project)?;
    Ok((controller, notices, id))
}

/// Find a project by id, or by case-insensitive name if that is unique.
pub fn resolve_project(aggregates: &[Aggregate], reference: &str) -> Result<AggregateId> {
    if let Some(found) = aggregates.iter().find(|a| a.id.as_str() == reference) {
        return Ok(found.id.clone());
    }

    let matches: Vec<_> = aggregates
        .iter()
        .filter(|a| a.name.eq_ignore_ascii_case(reference))
        .collect();
    match matches.as_slice() {
        [one] => Ok(one.id.clone()),
        [] => anyhow::bail!("No project matches '{reference}'"),
        _ => anyhow::bail!("'{reference}' matches several projects, use the id"),
    }
}

/// Stop the controller and print what happened to deferred work and every
/// notice raised during the command.
pub async fn finish(controller: &Controller, notices: &mut broadcast::Receiver<Notice>) {
    let report = controller.shutdown(SHUTDOWN_GRACE).await;
    if report.aborted > 0 {
        println!("Dropped {} deferred document sync(s)", report.aborted);
    }
    if report.abandoned > 0 {
        println!("Gave up on {} running document sync(s)", report.abandoned);
    }

    for notice in drain(notices) {
        print_notice(&notice);
    }
}

/// Collect every notice currently buffered.
pub fn drain(notices: &mut broadcast::Receiver<Notice>) -> Vec<Notice> {
    let mut out = Vec::new();
    loop {
        match notices.try_recv() {
            Ok(notice) => out.push(notice),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    out
}

pub(crate) fn print_notice(notice: &Notice) {
    if notice.message.is_empty() {
        println!("[{}] {}", notice.level, notice.title);
    } else {
        println!("[{}] {}: {}", notice.level, notice.title, notice.message);
    }
}
