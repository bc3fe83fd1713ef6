//! Plan execution
//!
//! Runs an ordered list of actions against a [`StoragePlatform`], one at a
//! time, stopping at the first failure. Nothing already executed is rolled
//! back; the [`ApplyError`] says exactly which actions ran and which did not.

use super::action::{Action, ActionId};
use super::scheduler::Plan;
use crate::backend::StoragePlatform;
use crate::config::RuntimeConfig;
use crate::devices::DeviceTree;
use crate::error::{ApplyError, ExecutionWarning};
use tracing::{error, info};

/// Outcome of a successful [`Executor::apply`]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ApplyReport {
    /// Actions executed (or, in dry-run mode, that would have been), in order
    pub executed: Vec<ActionId>,
    /// Best-effort steps that failed without aborting the plan
    pub warnings: Vec<ExecutionWarning>,
    pub dry_run: bool,
}

impl ApplyReport {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Applies plans through a platform
pub struct Executor<'p> {
    platform: &'p mut dyn StoragePlatform,
    dry_run: bool,
}

impl<'p> Executor<'p> {
    pub fn new(platform: &'p mut dyn StoragePlatform) -> Self {
        Self {
            platform,
            dry_run: false,
        }
    }

    pub fn with_config(platform: &'p mut dyn StoragePlatform, config: &RuntimeConfig) -> Self {
        Self {
            platform,
            dry_run: config.dry_run,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Execute every action of `plan` in order
    pub fn apply(&mut self, tree: &mut DeviceTree, plan: &Plan) -> Result<ApplyReport, ApplyError> {
        let ordered: Vec<&Action> = plan.actions().iter().collect();
        self.apply_ordered(tree, &ordered)
    }

    /// Execute already-ordered actions, as returned by
    /// [`order`](super::scheduler::order)
    pub fn apply_ordered(
        &mut self,
        tree: &mut DeviceTree,
        actions: &[&Action],
    ) -> Result<ApplyReport, ApplyError> {
        let mut report = ApplyReport {
            dry_run: self.dry_run,
            ..ApplyReport::default()
        };

        if self.dry_run {
            for action in actions {
                info!("[DRY RUN] Would execute: {}", action);
                report.executed.push(action.id());
            }
            return Ok(report);
        }

        info!("Applying {} action(s)", actions.len());
        for (index, action) in actions.iter().enumerate() {
            match action.execute(tree, &mut *self.platform) {
                Ok(warnings) => {
                    report.executed.push(action.id());
                    report.warnings.extend(warnings);
                }
                Err(source) => {
                    error!("Action {} failed: {}", action, source);
                    return Err(ApplyError {
                        failed: action.id(),
                        completed: report.executed,
                        pending: actions[index + 1..].iter().map(|a| a.id()).collect(),
                        source,
                    });
                }
            }
        }

        info!(
            "Applied {} action(s) with {} warning(s)",
            report.executed.len(),
            report.warnings.len()
        );
        Ok(report)
    }
}
