//! Pending action queue
//!
//! [`ActionQueue::register`] is the only way an action enters the queue. It
//! removes every pending action the newcomer makes redundant, so the queue
//! never holds two live actions of the same kind on one device.

use super::action::{Action, ActionId};
use super::scheduler::{self, Plan};
use crate::devices::{DeviceId, DeviceTree};
use crate::error::{ActionError, PlanError};
use crate::types::{ActionKind, ActionObject, ActionType};
use tracing::{debug, info};

/// Outcome of [`ActionQueue::register`]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Registration {
    /// The registered action's id, or `None` if it cancelled itself out
    pub inserted: Option<ActionId>,
    /// Pending actions removed because the new action made them redundant
    pub obsoleted: Vec<ActionId>,
}

/// Selects pending actions by any combination of criteria
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActionFilter {
    pub device: Option<DeviceId>,
    pub device_name: Option<String>,
    pub action_type: Option<ActionType>,
    pub object: Option<ActionObject>,
}

impl ActionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn device(mut self, device: DeviceId) -> Self {
        self.device = Some(device);
        self
    }

    pub fn device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = Some(name.into());
        self
    }

    pub fn action_type(mut self, action_type: ActionType) -> Self {
        self.action_type = Some(action_type);
        self
    }

    pub fn object(mut self, object: ActionObject) -> Self {
        self.object = Some(object);
        self
    }

    /// Filter by a textual type label such as `"destroy"` or `"resize"`
    pub fn type_label(self, label: &str) -> Result<Self, ActionError> {
        let action_type = label
            .parse::<ActionType>()
            .map_err(|_| ActionError::UnknownLabel(label.to_string()))?;
        Ok(self.action_type(action_type))
    }

    /// Filter by a textual object label, `"device"` or `"format"`
    pub fn object_label(self, label: &str) -> Result<Self, ActionError> {
        let object = label
            .parse::<ActionObject>()
            .map_err(|_| ActionError::UnknownLabel(label.to_string()))?;
        Ok(self.object(object))
    }

    pub fn matches(&self, action: &Action) -> bool {
        self.device.is_none_or(|d| d == action.device())
            && self
                .device_name
                .as_deref()
                .is_none_or(|n| n == action.device_name())
            && self.action_type.is_none_or(|t| t == action.action_type())
            && self.object.is_none_or(|o| o == action.object())
    }
}

/// The set of registered, not yet executed actions
#[derive(Debug, Default)]
pub struct ActionQueue {
    actions: Vec<Action>,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an action, first cancelling every pending action it obsoletes.
    ///
    /// An action that obsoletes itself (e.g. destroying a device that was
    /// only ever planned) is cancelled along with what it obsoletes and is not
    /// queued; `inserted` is then `None`.
    ///
    /// # Errors
    ///
    /// Fails without touching the queue if the action's device is not in the
    /// tree, or if it creates a device that already exists.
    pub fn register(
        &mut self,
        tree: &mut DeviceTree,
        mut action: Action,
    ) -> Result<Registration, ActionError> {
        let device = tree.device(action.device())?;
        if action.kind() == ActionKind::CreateDevice && device.exists {
            return Err(ActionError::DeviceExists(device.name.clone()));
        }

        let obsolete_self = action.obsoletes(&action, tree);
        let (mut removed, kept): (Vec<Action>, Vec<Action>) = std::mem::take(&mut self.actions)
            .into_iter()
            .partition(|pending| action.obsoletes(pending, tree));
        self.actions = kept;
        removed.sort_by(|a, b| b.id().cmp(&a.id()));

        let obsoleted: Vec<ActionId> = removed.iter().map(Action::id).collect();
        for old in &removed {
            debug!("Action {} obsoletes {}", action.id(), old);
        }

        let to_cancel: Vec<&Action> = if obsolete_self {
            removed.iter().collect()
        } else {
            removed
                .iter()
                .filter(|old| !action.inherit_snapshot(old))
                .collect()
        };

        if obsolete_self {
            info!("Action {} cancels itself out", action);
            action.cancel(tree)?;
        }
        for old in to_cancel {
            old.cancel(tree)?;
        }

        if obsolete_self {
            return Ok(Registration {
                inserted: None,
                obsoleted,
            });
        }

        info!("Registered action: {}", action);
        let id = action.id();
        self.actions.push(action);
        debug_assert!(self.is_unique(), "duplicate live action after registering {}", id);

        Ok(Registration {
            inserted: Some(id),
            obsoleted,
        })
    }

    /// Withdraw a pending action and revert its intent.
    ///
    /// Cancelling anything but the newest action touching an attribute leaves
    /// the model wherever that action's snapshot points.
    pub fn cancel(&mut self, tree: &mut DeviceTree, id: ActionId) -> Result<Action, ActionError> {
        let index = self
            .actions
            .iter()
            .position(|a| a.id() == id)
            .ok_or(ActionError::NotQueued(id))?;
        let action = self.actions.remove(index);
        action.cancel(tree)?;
        info!("Cancelled action: {}", action);
        Ok(action)
    }

    /// Cancel every pending action, newest first, restoring the model to its
    /// state before any of them were constructed
    pub fn cancel_all(&mut self, tree: &mut DeviceTree) -> Result<(), ActionError> {
        self.actions.sort_by_key(|a| a.id());
        while let Some(action) = self.actions.pop() {
            action.cancel(tree)?;
        }
        Ok(())
    }

    /// Pending actions matching `filter`, in registration order
    pub fn find(&self, filter: &ActionFilter) -> Vec<&Action> {
        self.actions.iter().filter(|a| filter.matches(a)).collect()
    }

    pub fn get(&self, id: ActionId) -> Option<&Action> {
        self.actions.iter().find(|a| a.id() == id)
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Order the pending actions and move them into a [`Plan`].
    ///
    /// On a dependency cycle the queue is left untouched.
    pub fn into_plan(&mut self, tree: &DeviceTree) -> Result<Plan, PlanError> {
        let order = scheduler::order_indices(&self.actions, tree)?;
        let actions = std::mem::take(&mut self.actions);
        Ok(Plan::from_order(actions, &order))
    }

    fn is_unique(&self) -> bool {
        self.actions.iter().enumerate().all(|(i, a)| {
            self.actions[i + 1..]
                .iter()
                .all(|b| a.device() != b.device() || a.kind() != b.kind())
        })
    }
}

impl<'a> IntoIterator for &'a ActionQueue {
    type Item = &'a Action;
    type IntoIter = std::slice::Iter<'a, Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.iter()
    }
}
