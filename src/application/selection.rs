use crate::domain::models::{ScheduleItem, Trip};
use crate::infrastructure::error::PlannerError;
use crate::infrastructure::trip_store::{BatchOp, BatchOutcome, TripStore};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Where a multi-select session lives. Selections never span containers;
/// picking an item somewhere else restarts the session there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionTarget {
    Pattern(String),
    Candidates,
}

#[derive(Debug, Clone, Default)]
pub struct ScheduleSelection {
    target: Option<SelectionTarget>,
    selected: Vec<String>,
}

impl ScheduleSelection {
    pub fn target(&self) -> Option<&SelectionTarget> {
        self.target.as_ref()
    }

    pub fn selected_ids(&self) -> &[String] {
        &self.selected
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    /// Adds or removes one id. A different target clears the previous
    /// session first.
    pub fn toggle(&mut self, target: SelectionTarget, item_id: &str) {
        if self.target.as_ref() != Some(&target) {
            self.selected.clear();
            self.target = Some(target);
        }
        match self.selected.iter().position(|id| id == item_id) {
            Some(index) => {
                self.selected.remove(index);
            }
            None => self.selected.push(item_id.to_string()),
        }
        if self.selected.is_empty() {
            self.target = None;
        }
    }

    pub fn clear(&mut self) {
        self.selected.clear();
        self.target = None;
    }

    /// Drops ids that no longer exist in the selection's container. Ids that
    /// are still valid keep their order; the rest of the selection survives
    /// a concurrent edit untouched.
    pub fn prune(&mut self, trip: &Trip) {
        let valid: HashSet<&str> = match &self.target {
            Some(SelectionTarget::Pattern(pattern_id)) => trip
                .pattern_by_id(pattern_id)
                .map(|pattern| {
                    pattern
                        .schedules
                        .iter()
                        .map(|schedule| schedule.id.as_str())
                        .collect()
                })
                .unwrap_or_default(),
            Some(SelectionTarget::Candidates) => trip
                .candidates
                .iter()
                .map(|schedule| schedule.id.as_str())
                .collect(),
            None => HashSet::new(),
        };
        self.selected.retain(|id| valid.contains(id.as_str()));
        if self.selected.is_empty() {
            self.target = None;
        }
    }
}

/// Item view with unconfirmed local writes layered over the last confirmed
/// read. An overlay entry of `None` is an optimistic delete.
#[derive(Debug, Default)]
pub struct OptimisticCache {
    confirmed: HashMap<String, ScheduleItem>,
    overlay: HashMap<String, Option<ScheduleItem>>,
}

impl OptimisticCache {
    pub fn load(&mut self, items: impl IntoIterator<Item = ScheduleItem>) {
        self.confirmed = items.into_iter().map(|item| (item.id.clone(), item)).collect();
        self.overlay.clear();
    }

    pub fn get(&self, item_id: &str) -> Option<&ScheduleItem> {
        match self.overlay.get(item_id) {
            Some(staged) => staged.as_ref(),
            None => self.confirmed.get(item_id),
        }
    }

    pub fn is_visible(&self, item_id: &str) -> bool {
        self.get(item_id).is_some()
    }

    pub fn stage_delete(&mut self, item_id: &str) {
        self.overlay.insert(item_id.to_string(), None);
    }

    pub fn stage_update(&mut self, item: ScheduleItem) {
        self.overlay.insert(item.id.clone(), Some(item));
    }

    /// Promotes a staged write into the confirmed view.
    pub fn commit(&mut self, item_id: &str) {
        if let Some(staged) = self.overlay.remove(item_id) {
            match staged {
                Some(item) => {
                    self.confirmed.insert(item_id.to_string(), item);
                }
                None => {
                    self.confirmed.remove(item_id);
                }
            }
        }
    }

    /// Discards a staged write; the confirmed view shows through again.
    pub fn rollback(&mut self, item_id: &str) {
        self.overlay.remove(item_id);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
}

/// Runs batch operations over the current selection. Deletion is optimistic:
/// the items vanish and a success notice is queued before the store answers,
/// and a failed write rolls both back. The other operations report only
/// after the store confirms.
pub struct BatchCoordinator<S: TripStore> {
    trip_store: Arc<S>,
    pub selection: ScheduleSelection,
    pub cache: OptimisticCache,
    notifications: Vec<Notification>,
}

impl<S: TripStore> BatchCoordinator<S> {
    pub fn new(trip_store: Arc<S>) -> Self {
        Self {
            trip_store,
            selection: ScheduleSelection::default(),
            cache: OptimisticCache::default(),
            notifications: Vec::new(),
        }
    }

    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    pub async fn delete_selected(&mut self) -> Result<(), PlannerError> {
        let item_ids: Vec<String> = self.selection.selected_ids().to_vec();
        if item_ids.is_empty() {
            return Ok(());
        }

        for item_id in &item_ids {
            self.cache.stage_delete(item_id);
        }
        self.notify_success(format!("Deleted {} item(s)", item_ids.len()));
        self.selection.clear();

        match self.trip_store.batch_write(BatchOp::Delete, &item_ids).await {
            Ok(_) => {
                for item_id in &item_ids {
                    self.cache.commit(item_id);
                }
                Ok(())
            }
            Err(error) => {
                for item_id in &item_ids {
                    self.cache.rollback(item_id);
                }
                self.notify_failure(format!("Delete failed, items restored: {error}"));
                Err(error)
            }
        }
    }

    pub async fn assign_selected(
        &mut self,
        day_pattern_id: &str,
    ) -> Result<BatchOutcome, PlannerError> {
        self.confirmed_batch(
            BatchOp::Assign {
                day_pattern_id: day_pattern_id.to_string(),
            },
            "Moved",
        )
        .await
    }

    pub async fn unassign_selected(&mut self) -> Result<BatchOutcome, PlannerError> {
        self.confirmed_batch(BatchOp::Unassign, "Returned to candidates").await
    }

    pub async fn duplicate_selected(&mut self) -> Result<BatchOutcome, PlannerError> {
        self.confirmed_batch(BatchOp::Duplicate, "Duplicated").await
    }

    async fn confirmed_batch(
        &mut self,
        op: BatchOp,
        verb: &str,
    ) -> Result<BatchOutcome, PlannerError> {
        let item_ids: Vec<String> = self.selection.selected_ids().to_vec();
        if item_ids.is_empty() {
            return Ok(BatchOutcome::default());
        }

        match self.trip_store.batch_write(op, &item_ids).await {
            Ok(outcome) => {
                self.notify_success(format!("{verb} {} item(s)", outcome.updated_count));
                self.selection.clear();
                Ok(outcome)
            }
            Err(error) => {
                self.notify_failure(format!("Batch operation failed: {error}"));
                Err(error)
            }
        }
    }

    fn notify_success(&mut self, message: String) {
        self.notifications.push(Notification {
            kind: NotificationKind::Success,
            message,
        });
    }

    fn notify_failure(&mut self, message: String) {
        self.notifications.push(Notification {
            kind: NotificationKind::Failure,
            message,
        });
    }
}
