use crate::domain::models::ScheduleItem;
use crate::domain::time::TimeOfDay;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoStartTime,
    OutOfRange,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoStartTime => "has no start time",
            Self::OutOfRange => "would leave the day",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShiftPreview {
    pub schedule_id: String,
    pub name: String,
    pub start_before: TimeOfDay,
    pub start_after: TimeOfDay,
    pub end_before: Option<TimeOfDay>,
    pub end_after: Option<TimeOfDay>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedShift {
    pub schedule_id: String,
    pub name: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadePlan {
    pub delta_minutes: i32,
    pub shiftable: Vec<ShiftPreview>,
    pub skipped: Vec<SkippedShift>,
}

impl CascadePlan {
    pub fn is_empty(&self) -> bool {
        self.shiftable.is_empty() && self.skipped.is_empty()
    }

    pub fn shiftable_ids(&self) -> Vec<String> {
        self.shiftable
            .iter()
            .map(|preview| preview.schedule_id.clone())
            .collect()
    }
}

/// Classifies every item after the edited one (by sort order, same pattern)
/// as shiftable or skipped for a `delta_minutes` shift. Shifting is
/// time-of-day arithmetic only: an item whose stay crosses a day boundary
/// keeps its end time and `end_day_offset` untouched, and a shift that would
/// leave `[00:00, 23:59]` is a modeled skip, never an error.
pub fn plan_time_shift(
    schedules: &[ScheduleItem],
    edited_id: &str,
    delta_minutes: i32,
) -> CascadePlan {
    let mut plan = CascadePlan {
        delta_minutes,
        shiftable: Vec::new(),
        skipped: Vec::new(),
    };
    let Some(edited) = schedules.iter().find(|schedule| schedule.id == edited_id) else {
        return plan;
    };

    let mut following: Vec<&ScheduleItem> = schedules
        .iter()
        .filter(|schedule| schedule.id != edited_id && schedule.sort_order > edited.sort_order)
        .collect();
    following.sort_by_key(|schedule| schedule.sort_order);

    for schedule in following {
        match classify(schedule, delta_minutes) {
            Ok(preview) => plan.shiftable.push(preview),
            Err(reason) => plan.skipped.push(SkippedShift {
                schedule_id: schedule.id.clone(),
                name: schedule.name.clone(),
                reason,
            }),
        }
    }
    plan
}

fn classify(schedule: &ScheduleItem, delta_minutes: i32) -> Result<ShiftPreview, SkipReason> {
    let Some(start_before) = schedule.start_time else {
        return Err(SkipReason::NoStartTime);
    };
    let Some(start_after) = start_before.shift(delta_minutes) else {
        return Err(SkipReason::OutOfRange);
    };

    let (end_before, end_after) = match schedule.end_time {
        Some(end) if schedule.end_day_offset.unwrap_or(0) == 0 => {
            let Some(shifted_end) = end.shift(delta_minutes) else {
                return Err(SkipReason::OutOfRange);
            };
            (Some(end), Some(shifted_end))
        }
        // A stay that already crosses a day boundary keeps its checkout.
        other => (other, other),
    };

    Ok(ShiftPreview {
        schedule_id: schedule.id.clone(),
        name: schedule.name.clone(),
        start_before,
        start_after,
        end_before,
        end_after,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ScheduleCategory;
    use crate::domain::time::{DeltaSource, TimeFields, compute_time_delta};
    use chrono::{DateTime, Utc};

    fn fixed_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-05-01T08:00:00Z")
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn time(value: &str) -> TimeOfDay {
        TimeOfDay::parse(value).expect("valid time")
    }

    fn schedule(
        id: &str,
        sort_order: u32,
        start: Option<&str>,
        end: Option<&str>,
        end_day_offset: Option<u32>,
    ) -> ScheduleItem {
        ScheduleItem {
            id: id.to_string(),
            day_pattern_id: Some("pat-1".to_string()),
            name: format!("Item {id}"),
            category: ScheduleCategory::Sightseeing,
            color: None,
            address: None,
            memo: None,
            urls: Vec::new(),
            start_time: start.map(time),
            end_time: end.map(time),
            end_day_offset,
            departure_place: None,
            arrival_place: None,
            transport_method: None,
            sort_order,
            updated_at: fixed_time(),
        }
    }

    #[test]
    fn late_item_is_skipped_while_the_rest_shift() {
        // Editing the first item 09:00 -> 09:30 cascades +30 to the three
        // items after it; the 23:45 one cannot move without leaving the day.
        let original = TimeFields {
            start_time: Some(time("09:00")),
            end_time: None,
            end_day_offset: None,
        };
        let updated = TimeFields {
            start_time: Some(time("09:30")),
            end_time: None,
            end_day_offset: None,
        };
        let delta = compute_time_delta(&original, &updated).expect("actionable delta");
        assert_eq!(delta.delta_minutes, 30);
        assert_eq!(delta.source, DeltaSource::Start);

        let schedules = vec![
            schedule("edited", 0, Some("09:00"), Some("10:00"), None),
            schedule("museum", 1, Some("10:30"), Some("12:00"), None),
            schedule("lunch", 2, Some("12:30"), None, None),
            schedule("late-show", 3, Some("23:45"), None, None),
        ];

        let plan = plan_time_shift(&schedules, "edited", delta.delta_minutes);
        assert_eq!(plan.shiftable.len(), 2);
        assert_eq!(plan.shiftable[0].schedule_id, "museum");
        assert_eq!(plan.shiftable[0].start_after, time("11:00"));
        assert_eq!(plan.shiftable[0].end_after, Some(time("12:30")));
        assert_eq!(plan.shiftable[1].schedule_id, "lunch");
        assert_eq!(plan.shiftable[1].end_after, None);

        assert_eq!(plan.skipped.len(), 1);
        assert_eq!(plan.skipped[0].schedule_id, "late-show");
        assert_eq!(plan.skipped[0].reason, SkipReason::OutOfRange);
    }

    #[test]
    fn items_before_the_edited_one_are_untouched() {
        let schedules = vec![
            schedule("breakfast", 0, Some("08:00"), None, None),
            schedule("edited", 1, Some("10:00"), None, None),
            schedule("afternoon", 2, Some("14:00"), None, None),
        ];
        let plan = plan_time_shift(&schedules, "edited", 60);
        assert_eq!(plan.shiftable.len(), 1);
        assert_eq!(plan.shiftable[0].schedule_id, "afternoon");
        assert!(plan.skipped.is_empty());
    }

    #[test]
    fn untimed_items_are_reported_not_dropped() {
        let schedules = vec![
            schedule("edited", 0, Some("09:00"), None, None),
            schedule("someday", 1, None, None, None),
        ];
        let plan = plan_time_shift(&schedules, "edited", 15);
        assert!(plan.shiftable.is_empty());
        assert_eq!(plan.skipped.len(), 1);
        assert_eq!(plan.skipped[0].reason, SkipReason::NoStartTime);
    }

    #[test]
    fn end_time_bound_is_checked_for_same_day_items() {
        let schedules = vec![
            schedule("edited", 0, Some("09:00"), None, None),
            schedule("dinner", 1, Some("21:00"), Some("23:30"), Some(0)),
        ];
        let plan = plan_time_shift(&schedules, "edited", 45);
        assert!(plan.shiftable.is_empty());
        assert_eq!(plan.skipped[0].schedule_id, "dinner");
        assert_eq!(plan.skipped[0].reason, SkipReason::OutOfRange);
    }

    #[test]
    fn multi_day_stay_shifts_its_start_but_keeps_its_checkout() {
        let schedules = vec![
            schedule("edited", 0, Some("09:00"), None, None),
            schedule("hotel", 1, Some("18:00"), Some("10:00"), Some(1)),
        ];
        let plan = plan_time_shift(&schedules, "edited", 120);
        assert_eq!(plan.shiftable.len(), 1);
        let preview = &plan.shiftable[0];
        assert_eq!(preview.start_after, time("20:00"));
        assert_eq!(preview.end_before, Some(time("10:00")));
        assert_eq!(preview.end_after, Some(time("10:00")));
    }

    #[test]
    fn negative_delta_is_bounded_at_midnight() {
        let schedules = vec![
            schedule("edited", 0, Some("09:00"), None, None),
            schedule("early", 1, Some("00:20"), None, None),
            schedule("morning", 2, Some("08:00"), None, None),
        ];
        let plan = plan_time_shift(&schedules, "edited", -30);
        assert_eq!(plan.shiftable.len(), 1);
        assert_eq!(plan.shiftable[0].schedule_id, "morning");
        assert_eq!(plan.skipped[0].schedule_id, "early");
        assert_eq!(plan.skipped[0].reason, SkipReason::OutOfRange);
    }

    #[test]
    fn unknown_edited_id_yields_an_empty_plan() {
        let schedules = vec![schedule("only", 0, Some("09:00"), None, None)];
        let plan = plan_time_shift(&schedules, "missing", 30);
        assert!(plan.is_empty());
    }
}
