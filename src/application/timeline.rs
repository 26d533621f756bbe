use crate::domain::cascade::{CascadePlan, plan_time_shift};
use crate::domain::models::{ScheduleItem, Trip};
use crate::domain::time::{TimeFields, compute_time_delta};
use crate::infrastructure::error::PlannerError;
use crate::infrastructure::trip_store::{BatchOp, BatchOutcome, SchedulePatch, TripStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Result of a guarded time edit: the stored item after the write, and the
/// cascade that editing it makes possible (empty when the edit changed no
/// time field in an actionable way).
#[derive(Debug, Clone)]
pub struct TimeEditOutcome {
    pub updated: ScheduleItem,
    pub cascade: Option<CascadePlan>,
}

pub struct TimelineService<S: TripStore> {
    trip_store: Arc<S>,
    cascade_preview_limit: usize,
}

impl<S: TripStore> TimelineService<S> {
    pub fn new(trip_store: Arc<S>) -> Self {
        Self {
            trip_store,
            cascade_preview_limit: 5,
        }
    }

    pub fn with_cascade_preview_limit(mut self, cascade_preview_limit: usize) -> Self {
        self.cascade_preview_limit = cascade_preview_limit.max(1);
        self
    }

    /// Writes new time fields for one item under the concurrency guard, then
    /// proposes a cascade over the items after it on the same pattern. The
    /// cascade is a proposal only; nothing moves until [`confirm_cascade`].
    ///
    /// [`confirm_cascade`]: Self::confirm_cascade
    pub async fn edit_schedule_time(
        &self,
        trip_id: &str,
        item_id: &str,
        new_times: TimeFields,
        expected_updated_at: Option<DateTime<Utc>>,
    ) -> Result<TimeEditOutcome, PlannerError> {
        let trip = self.trip_store.read_trip(trip_id).await?;
        let original = trip
            .schedule_by_id(item_id)
            .ok_or_else(|| PlannerError::Gone {
                item_id: item_id.to_string(),
            })?;
        let original_times = original.time_fields();
        let pattern_id = original.day_pattern_id.clone();

        let patch = SchedulePatch::times(
            new_times.start_time,
            new_times.end_time,
            new_times.end_day_offset,
        );
        let updated = self
            .trip_store
            .write_schedule(item_id, patch, expected_updated_at)
            .await?;

        let cascade = compute_time_delta(&original_times, &updated.time_fields())
            .filter(|delta| delta.delta_minutes != 0)
            .and_then(|delta| {
                let pattern_id = pattern_id.as_deref()?;
                let pattern = trip.pattern_by_id(pattern_id)?;
                let plan = plan_time_shift(&pattern.schedules, item_id, delta.delta_minutes);
                (!plan.is_empty()).then_some(plan)
            });

        Ok(TimeEditOutcome { updated, cascade })
    }

    /// Applies an accepted cascade as a single batch shift over the
    /// shiftable items. Skipped items stay where they are.
    pub async fn confirm_cascade(&self, plan: &CascadePlan) -> Result<BatchOutcome, PlannerError> {
        let item_ids = plan.shiftable_ids();
        if item_ids.is_empty() {
            return Ok(BatchOutcome::default());
        }
        self.trip_store
            .batch_write(
                BatchOp::Shift {
                    delta_minutes: plan.delta_minutes,
                },
                &item_ids,
            )
            .await
    }

    pub async fn read_trip(&self, trip_id: &str) -> Result<Trip, PlannerError> {
        self.trip_store.read_trip(trip_id).await
    }

    pub async fn reorder_pattern(
        &self,
        pattern_id: &str,
        ordered_item_ids: &[String],
    ) -> Result<(), PlannerError> {
        self.trip_store.reorder(pattern_id, ordered_item_ids).await
    }

    /// Renders the before/after rows a confirmation prompt shows, collapsing
    /// everything past the preview limit into a trailing "+N more" line.
    pub fn format_cascade_preview(&self, plan: &CascadePlan) -> Vec<String> {
        let mut lines = Vec::new();
        for preview in plan.shiftable.iter().take(self.cascade_preview_limit) {
            let line = match (preview.end_before, preview.end_after) {
                (Some(end_before), Some(end_after)) => format!(
                    "{}: {} - {} -> {} - {}",
                    preview.name,
                    preview.start_before,
                    end_before,
                    preview.start_after,
                    end_after
                ),
                _ => format!(
                    "{}: {} -> {}",
                    preview.name, preview.start_before, preview.start_after
                ),
            };
            lines.push(line);
        }
        if plan.shiftable.len() > self.cascade_preview_limit {
            lines.push(format!(
                "+{} more",
                plan.shiftable.len() - self.cascade_preview_limit
            ));
        }
        for skipped in &plan.skipped {
            lines.push(format!("{}: stays ({})", skipped.name, skipped.reason.as_str()));
        }
        lines
    }
}
