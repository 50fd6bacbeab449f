//! Sync dispatch: triggers the external update action for admitted units.
//!
//! The action is fire-and-forget: success means the sync was requested,
//! not that it finished. A configurable "already running" exit code is
//! mapped to success here, at the dispatcher boundary, so callers never
//! see it.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, error, info};

use stagegrid_state::ManagedUnit;

use crate::error::DispatchError;

/// Placeholder in command arguments replaced by the unit name.
pub const UNIT_PLACEHOLDER: &str = "{unit}";

/// Exit code the `argocd` CLI uses when a sync is already underway.
pub const ARGOCD_SYNC_IN_PROGRESS: i32 = 20;

/// Boxed future returned by [`SyncDispatcher::dispatch`].
pub type DispatchFuture<'a> = Pin<Box<dyn Future<Output = Result<(), DispatchError>> + Send + 'a>>;

/// Capability to request a sync of one unit.
pub trait SyncDispatcher: Send + Sync {
    fn dispatch<'a>(&'a self, unit: &'a str) -> DispatchFuture<'a>;
}

/// Runs an external command per unit, e.g. `argocd app sync <unit> --async --prune`.
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    program: String,
    args: Vec<String>,
    already_running_exit_code: Option<i32>,
    timeout: Duration,
}

impl CommandDispatcher {
    /// Create a dispatcher running `program` with `args`.
    ///
    /// Every `{unit}` in `args` is replaced by the unit name.
    pub fn new(program: &str, args: Vec<String>) -> Self {
        Self {
            program: program.to_string(),
            args,
            already_running_exit_code: Some(ARGOCD_SYNC_IN_PROGRESS),
            timeout: Duration::from_secs(30),
        }
    }

    /// The stock `argocd app sync {unit} --async --prune` invocation.
    pub fn argocd() -> Self {
        Self::new(
            "argocd",
            ["app", "sync", UNIT_PLACEHOLDER, "--async", "--prune"]
                .into_iter()
                .map(String::from)
                .collect(),
        )
    }

    /// Exit code treated as "sync already underway" (success). `None` disables the mapping.
    pub fn with_already_running_exit_code(mut self, code: Option<i32>) -> Self {
        self.already_running_exit_code = code;
        self
    }

    /// Deadline for a single invocation.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Arguments for `unit` with placeholders substituted.
    pub fn args_for(&self, unit: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.replace(UNIT_PLACEHOLDER, unit))
            .collect()
    }

    async fn run(&self, unit: &str) -> Result<(), DispatchError> {
        let args = self.args_for(unit);
        debug!(program = %self.program, ?args, "running sync command");

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DispatchError::Spawn {
                unit: unit.to_string(),
                reason: e.to_string(),
            })?;

        // Dropping the output future on timeout kills the child.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| DispatchError::Spawn {
                unit: unit.to_string(),
                reason: e.to_string(),
            })?,
            Err(_) => {
                return Err(DispatchError::Timeout {
                    unit: unit.to_string(),
                    after: self.timeout,
                });
            }
        };

        interpret_exit(
            unit,
            output.status.success(),
            output.status.code(),
            self.already_running_exit_code,
            &String::from_utf8_lossy(&output.stderr),
        )
    }
}

impl SyncDispatcher for CommandDispatcher {
    fn dispatch<'a>(&'a self, unit: &'a str) -> DispatchFuture<'a> {
        Box::pin(self.run(unit))
    }
}

/// Map a finished process to a dispatch result.
fn interpret_exit(
    unit: &str,
    success: bool,
    code: Option<i32>,
    already_running: Option<i32>,
    stderr: &str,
) -> Result<(), DispatchError> {
    if success {
        return Ok(());
    }
    if code.is_some() && code == already_running {
        debug!(%unit, ?code, "sync already in progress");
        return Ok(());
    }
    Err(DispatchError::Exit {
        unit: unit.to_string(),
        code,
        stderr: stderr.trim().to_string(),
    })
}

/// Dispatcher that only logs; used for dry runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDispatcher;

impl SyncDispatcher for NoopDispatcher {
    fn dispatch<'a>(&'a self, unit: &'a str) -> DispatchFuture<'a> {
        Box::pin(async move {
            info!(%unit, "dry run: sync skipped");
            Ok(())
        })
    }
}

/// A unit whose dispatch failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchFailure {
    pub unit: String,
    pub error: String,
}

/// Outcome of dispatching one admission batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    /// Units whose sync was requested successfully.
    pub synced: Vec<String>,
    pub failures: Vec<DispatchFailure>,
}

/// Dispatch `units` one after another.
///
/// A failure is logged and recorded for that unit only; the rest of the
/// batch still runs.
pub async fn dispatch_batch(dispatcher: &dyn SyncDispatcher, units: &[&ManagedUnit]) -> BatchResult {
    let mut result = BatchResult::default();
    for unit in units {
        info!(unit = %unit.name, cluster = %unit.cluster, "syncing unit");
        match dispatcher.dispatch(&unit.name).await {
            Ok(()) => result.synced.push(unit.name.clone()),
            Err(e) => {
                error!(unit = %unit.name, error = %e, "failed to dispatch sync");
                result.failures.push(DispatchFailure {
                    unit: unit.name.clone(),
                    error: e.to_string(),
                });
            }
        }
    }
    result
}
