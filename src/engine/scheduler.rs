//! Dependency scheduler
//!
//! Turns the unordered pending set into an execution order honoring every
//! `requires` edge. Kahn's algorithm over an explicit edge list; among the
//! actions that are ready at any point the lowest id runs first, so the
//! result is deterministic and as close to registration order as the
//! constraints allow.

use super::action::{Action, ActionId};
use crate::devices::DeviceTree;
use crate::error::PlanError;
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, trace};

/// Order `actions` so that whenever `a.requires(b)`, `b` comes first.
///
/// # Errors
///
/// `PlanError::Cycle` naming every action that could not be scheduled.
pub fn order<'a>(actions: &'a [Action], tree: &DeviceTree) -> Result<Vec<&'a Action>, PlanError> {
    let indices = order_indices(actions, tree)?;
    Ok(indices.into_iter().map(|i| &actions[i]).collect())
}

pub(crate) fn order_indices(actions: &[Action], tree: &DeviceTree) -> Result<Vec<usize>, PlanError> {
    let n = actions.len();
    let mut in_degree = vec![0usize; n];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];

    for (i, a) in actions.iter().enumerate() {
        for (j, b) in actions.iter().enumerate() {
            if i != j && a.requires(b, tree) {
                trace!("{} requires {}", a.id(), b.id());
                dependents[j].push(i);
                in_degree[i] += 1;
            }
        }
    }

    let mut ready: BTreeSet<(ActionId, usize)> = (0..n)
        .filter(|&i| in_degree[i] == 0)
        .map(|i| (actions[i].id(), i))
        .collect();
    let mut sorted = Vec::with_capacity(n);

    while let Some((_, i)) = ready.pop_first() {
        sorted.push(i);
        for &dependent in &dependents[i] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.insert((actions[dependent].id(), dependent));
            }
        }
    }

    if sorted.len() != n {
        let mut remaining: Vec<ActionId> = (0..n)
            .filter(|&i| in_degree[i] > 0)
            .map(|i| actions[i].id())
            .collect();
        remaining.sort();
        return Err(PlanError::Cycle { remaining });
    }

    debug!("Scheduled {} action(s)", n);
    Ok(sorted)
}

/// An ordered, ready-to-apply list of actions
#[derive(Debug, Clone, Default)]
pub struct Plan {
    actions: Vec<Action>,
}

impl Plan {
    /// Schedule `actions` into a plan
    pub fn schedule(actions: Vec<Action>, tree: &DeviceTree) -> Result<Self, PlanError> {
        let order = order_indices(&actions, tree)?;
        Ok(Self::from_order(actions, &order))
    }

    /// Rearrange `actions` into `order` (a permutation of their indices)
    pub(crate) fn from_order(actions: Vec<Action>, order: &[usize]) -> Self {
        let mut slots: Vec<Option<Action>> = actions.into_iter().map(Some).collect();
        let actions = order.iter().filter_map(|&i| slots[i].take()).collect();
        Self { actions }
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn into_actions(self) -> Vec<Action> {
        self.actions
    }

    pub fn ids(&self) -> Vec<ActionId> {
        self.actions.iter().map(Action::id).collect()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// True if the plan removes or overwrites existing data
    pub fn is_destructive(&self) -> bool {
        self.actions
            .iter()
            .any(|a| a.is_destroy() || (a.is_create() && a.is_format()) || a.is_shrink())
    }

    /// Returns a summary of the plan for logging/display.
    pub fn summary(&self) -> String {
        let mut lines = vec![
            "Storage Action Plan".to_string(),
            format!("  Destructive: {}", self.is_destructive()),
            format!("  Actions ({}):", self.actions.len()),
        ];
        for (i, action) in self.actions.iter().enumerate() {
            lines.push(format!("    {}. {}", i + 1, action));
        }
        lines.join("\n")
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}
