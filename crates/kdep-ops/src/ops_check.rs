//! Operation: solve several projects independently, in parallel.
//!
//! Each member gets its own parameters and solver state; only the version
//! source is shared. Nothing is written.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use kdep_core::config::KdepConfig;
use kdep_resolver::{CancelSignal, SolveError, Solution, VersionSource};
use kdep_util::errors::KdepError;

use crate::project::ProjectOps;

/// Result of checking one member.
#[derive(Debug)]
pub struct MemberReport {
    pub name: String,
    pub result: Result<Solution, SolveError>,
}

impl MemberReport {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Concurrent solves allowed by `[resolve] parallel-checks`.
pub fn parallelism(config: &KdepConfig) -> usize {
    (config.resolve.parallel_checks as usize).max(1)
}

/// Solve every member with at most `parallel` solves in flight. Reports
/// come back sorted by member name.
///
/// Failing to gather a member's parameters aborts the check; solve
/// failures are reported per member.
pub async fn check_members<S>(
    members: Vec<Arc<dyn ProjectOps>>,
    source: Arc<S>,
    parallel: usize,
    cancel: CancelSignal,
) -> miette::Result<Vec<MemberReport>>
where
    S: VersionSource + 'static,
{
    let semaphore = Arc::new(Semaphore::new(parallel.max(1)));
    let mut join_set = JoinSet::new();

    for member in members {
        let params = member.make_params()?;
        let name = member.import_root().to_string();
        let source = Arc::clone(&source);
        let sem = Arc::clone(&semaphore);
        let cancel = cancel.clone();

        join_set.spawn(async move {
            let _permit = sem.acquire_owned().await.map_err(|e| KdepError::Generic {
                message: format!("check scheduler closed: {e}"),
            })?;
            tracing::debug!("checking {name}");
            let result = kdep_resolver::solve(&params, source.as_ref(), &cancel).await;
            Ok::<_, KdepError>(MemberReport { name, result })
        });
    }

    let mut reports = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(Ok(report)) => reports.push(report),
            Ok(Err(e)) => return Err(e.into()),
            Err(e) => return Err(miette::miette!("Background task failed: {}", e)),
        }
    }
    reports.sort_by(|a, b| a.name.cmp(&b.name));

    let failed = reports.iter().filter(|r| !r.is_ok()).count();
    if failed == 0 {
        kdep_util::progress::status("Checked", &format!("{} member(s)", reports.len()));
    } else {
        kdep_util::progress::status_warn("Checked", &format!("{failed} of {} member(s) failed", reports.len()));
    }
    Ok(reports)
}
