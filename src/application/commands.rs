use crate::application::bootstrap::{PlannerSettings, bootstrap_workspace};
use crate::application::status_transition::StatusTransitionService;
use crate::application::timeline::TimelineService;
use crate::domain::cross_day::{CrossDayPosition, cross_day_label, project_cross_day};
use crate::domain::models::{
    Day, Pattern, ScheduleCategory, ScheduleItem, Trip, TripStatus, UserRole,
};
use crate::domain::time::{TimeFields, TimeOfDay};
use crate::infrastructure::error::PlannerError;
use crate::infrastructure::trip_store::{BatchOp, BatchOutcome, SchedulePatch, SqliteTripStore, TripStore};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id(prefix: &str) -> String {
    let sequence = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{sequence}", Utc::now().timestamp_micros())
}

pub struct AppState {
    database_path: PathBuf,
    logs_dir: PathBuf,
    settings: PlannerSettings,
    // Long-lived so the status transition attempt budget survives across
    // background ticks.
    status_transitions: StatusTransitionService,
    log_guard: Mutex<()>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, PlannerError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;

        Ok(Self {
            database_path: bootstrap.database_path,
            logs_dir: bootstrap.logs_dir,
            settings: bootstrap.settings,
            status_transitions: StatusTransitionService::new(),
            log_guard: Mutex::new(()),
        })
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn command_error(&self, command: &str, error: &PlannerError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }
}

fn trip_store(state: &AppState) -> Arc<SqliteTripStore> {
    Arc::new(SqliteTripStore::new(state.database_path()))
}

fn timeline_service(state: &AppState) -> TimelineService<SqliteTripStore> {
    TimelineService::new(trip_store(state))
        .with_cascade_preview_limit(state.settings.cascade_preview_limit)
}

#[derive(Debug, Clone, Serialize)]
pub struct CascadeResponse {
    pub delta_minutes: i32,
    pub shiftable_ids: Vec<String>,
    pub preview: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EditScheduleTimeResponse {
    pub item_id: String,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub end_day_offset: Option<u32>,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cascade: Option<CascadeResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrossDayEntryResponse {
    pub schedule_id: String,
    pub name: String,
    pub source_day_number: u32,
    pub position: String,
    pub label: Option<String>,
    pub end_time: Option<String>,
}

pub async fn create_trip_impl(
    state: &AppState,
    title: String,
    destination: String,
    start_date: String,
    end_date: String,
) -> Result<Trip, PlannerError> {
    let title = require_text(&title, "title")?;
    let destination = require_text(&destination, "destination")?;
    let start_date = parse_date_input(&start_date, "start_date")?;
    let end_date = parse_date_input(&end_date, "end_date")?;
    if end_date < start_date {
        return Err(PlannerError::InvalidInput(
            "end_date must not be before start_date".to_string(),
        ));
    }

    let pattern_label = state.settings.default_pattern_label.clone();
    let trip_id = next_id("trip");
    let day_count = (end_date - start_date).num_days() as u32 + 1;
    let days = (0..day_count)
        .map(|index| {
            let day_id = next_id("day");
            Day {
                id: day_id.clone(),
                trip_id: trip_id.clone(),
                day_number: index + 1,
                date: start_date + Duration::days(i64::from(index)),
                memo: None,
                patterns: vec![Pattern {
                    id: next_id("pat"),
                    day_id,
                    label: pattern_label.clone(),
                    is_default: true,
                    sort_order: 0,
                    schedules: Vec::new(),
                }],
            }
        })
        .collect();

    let trip = Trip {
        id: trip_id,
        title,
        destination,
        start_date,
        end_date,
        status: TripStatus::Planned,
        role: UserRole::Owner,
        days,
        candidates: Vec::new(),
    };
    trip_store(state).insert_trip(trip.clone()).await?;

    state.log_info(
        "create_trip",
        &format!("created trip_id={} with {} days", trip.id, day_count),
    );
    Ok(trip)
}

pub async fn get_trip_impl(state: &AppState, trip_id: String) -> Result<Trip, PlannerError> {
    let trip_id = require_text(&trip_id, "trip_id")?;
    trip_store(state).read_trip(&trip_id).await
}

pub async fn add_schedule_impl(
    state: &AppState,
    trip_id: String,
    day_pattern_id: Option<String>,
    name: String,
    category: String,
    start_time: Option<String>,
    end_time: Option<String>,
    end_day_offset: Option<u32>,
) -> Result<ScheduleItem, PlannerError> {
    let trip_id = require_text(&trip_id, "trip_id")?;
    let name = require_text(&name, "name")?;

    let schedule = ScheduleItem {
        id: next_id("sch"),
        day_pattern_id: day_pattern_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned),
        name,
        category: parse_category_input(&category)?,
        color: None,
        address: None,
        memo: None,
        urls: Vec::new(),
        start_time: parse_time_input(start_time.as_deref())?,
        end_time: parse_time_input(end_time.as_deref())?,
        end_day_offset,
        departure_place: None,
        arrival_place: None,
        transport_method: None,
        sort_order: 0,
        updated_at: Utc::now(),
    };

    let inserted = trip_store(state).insert_schedule(&trip_id, schedule).await?;
    state.log_info(
        "add_schedule",
        &format!("added schedule_id={} to trip_id={trip_id}", inserted.id),
    );
    Ok(inserted)
}

pub async fn update_schedule_impl(
    state: &AppState,
    item_id: String,
    name: Option<String>,
    memo: Option<String>,
    address: Option<String>,
    expected_updated_at: Option<String>,
) -> Result<ScheduleItem, PlannerError> {
    let item_id = require_text(&item_id, "item_id")?;
    let patch = SchedulePatch {
        name: name
            .as_deref()
            .map(|value| require_text(value, "name"))
            .transpose()?,
        memo,
        address,
        ..SchedulePatch::default()
    };
    let guard = parse_guard_input(expected_updated_at.as_deref())?;

    let updated = trip_store(state).write_schedule(&item_id, patch, guard).await?;
    state.log_info("update_schedule", &format!("updated schedule_id={item_id}"));
    Ok(updated)
}

pub async fn edit_schedule_time_impl(
    state: &AppState,
    trip_id: String,
    item_id: String,
    start_time: Option<String>,
    end_time: Option<String>,
    end_day_offset: Option<u32>,
    expected_updated_at: Option<String>,
) -> Result<EditScheduleTimeResponse, PlannerError> {
    let trip_id = require_text(&trip_id, "trip_id")?;
    let item_id = require_text(&item_id, "item_id")?;
    let new_times = TimeFields {
        start_time: parse_time_input(start_time.as_deref())?,
        end_time: parse_time_input(end_time.as_deref())?,
        end_day_offset,
    };
    let guard = parse_guard_input(expected_updated_at.as_deref())?;

    let service = timeline_service(state);
    let outcome = service
        .edit_schedule_time(&trip_id, &item_id, new_times, guard)
        .await?;

    let cascade = outcome.cascade.as_ref().map(|plan| CascadeResponse {
        delta_minutes: plan.delta_minutes,
        shiftable_ids: plan.shiftable_ids(),
        preview: service.format_cascade_preview(plan),
    });

    state.log_info(
        "edit_schedule_time",
        &format!(
            "edited schedule_id={item_id} cascade_candidates={}",
            cascade
                .as_ref()
                .map(|response| response.shiftable_ids.len())
                .unwrap_or(0)
        ),
    );

    Ok(EditScheduleTimeResponse {
        item_id: outcome.updated.id.clone(),
        start_time: outcome.updated.start_time.map(|time| time.to_string()),
        end_time: outcome.updated.end_time.map(|time| time.to_string()),
        end_day_offset: outcome.updated.end_day_offset,
        updated_at: outcome.updated.updated_at.to_rfc3339(),
        cascade,
    })
}

/// Applies a previously proposed cascade. The plan is recomputed against the
/// current tree so a collaborator's edit between proposal and confirmation
/// is taken into account rather than overwritten.
pub async fn apply_cascade_impl(
    state: &AppState,
    trip_id: String,
    edited_item_id: String,
    delta_minutes: i32,
) -> Result<BatchOutcome, PlannerError> {
    let trip_id = require_text(&trip_id, "trip_id")?;
    let edited_item_id = require_text(&edited_item_id, "edited_item_id")?;
    if delta_minutes == 0 {
        return Ok(BatchOutcome::default());
    }

    let service = timeline_service(state);
    let trip = service.read_trip(&trip_id).await?;
    let edited = trip
        .schedule_by_id(&edited_item_id)
        .ok_or_else(|| PlannerError::Gone {
            item_id: edited_item_id.clone(),
        })?;
    let Some(pattern_id) = edited.day_pattern_id.as_deref() else {
        return Ok(BatchOutcome::default());
    };
    let Some(pattern) = trip.pattern_by_id(pattern_id) else {
        return Ok(BatchOutcome::default());
    };

    let plan = crate::domain::cascade::plan_time_shift(
        &pattern.schedules,
        &edited_item_id,
        delta_minutes,
    );
    let outcome = service.confirm_cascade(&plan).await?;
    state.log_info(
        "apply_cascade",
        &format!(
            "shifted {} item(s) by {delta_minutes} minute(s), {} skipped",
            outcome.updated_count,
            plan.skipped.len()
        ),
    );
    Ok(outcome)
}

pub async fn cross_day_view_impl(
    state: &AppState,
    trip_id: String,
    day_number: u32,
) -> Result<Vec<CrossDayEntryResponse>, PlannerError> {
    let trip_id = require_text(&trip_id, "trip_id")?;
    let trip = trip_store(state).read_trip(&trip_id).await?;

    let entries = project_cross_day(&trip.days, day_number).map_err(PlannerError::InvalidInput)?;
    Ok(entries
        .into_iter()
        .map(|entry| {
            let label =
                cross_day_label(entry.schedule.category, entry.position).map(ToOwned::to_owned);
            CrossDayEntryResponse {
                schedule_id: entry.schedule.id,
                name: entry.schedule.name,
                source_day_number: entry.source_day_number,
                position: match entry.position {
                    CrossDayPosition::Intermediate => "intermediate",
                    CrossDayPosition::Final => "final",
                }
                .to_string(),
                label,
                end_time: entry.schedule.end_time.map(|time| time.to_string()),
            }
        })
        .collect())
}

pub async fn delete_schedules_impl(
    state: &AppState,
    item_ids: Vec<String>,
) -> Result<BatchOutcome, PlannerError> {
    let item_ids = normalize_ids(item_ids)?;
    let outcome = trip_store(state).batch_write(BatchOp::Delete, &item_ids).await?;
    state.log_info(
        "delete_schedules",
        &format!("deleted {} item(s)", outcome.updated_count),
    );
    Ok(outcome)
}

pub async fn assign_schedules_impl(
    state: &AppState,
    day_pattern_id: String,
    item_ids: Vec<String>,
) -> Result<BatchOutcome, PlannerError> {
    let day_pattern_id = require_text(&day_pattern_id, "day_pattern_id")?;
    let item_ids = normalize_ids(item_ids)?;
    let outcome = trip_store(state)
        .batch_write(BatchOp::Assign { day_pattern_id }, &item_ids)
        .await?;
    state.log_info(
        "assign_schedules",
        &format!("assigned {} item(s)", outcome.updated_count),
    );
    Ok(outcome)
}

pub async fn unassign_schedules_impl(
    state: &AppState,
    item_ids: Vec<String>,
) -> Result<BatchOutcome, PlannerError> {
    let item_ids = normalize_ids(item_ids)?;
    let outcome = trip_store(state).batch_write(BatchOp::Unassign, &item_ids).await?;
    state.log_info(
        "unassign_schedules",
        &format!("returned {} item(s) to candidates", outcome.updated_count),
    );
    Ok(outcome)
}

pub async fn duplicate_schedules_impl(
    state: &AppState,
    item_ids: Vec<String>,
) -> Result<BatchOutcome, PlannerError> {
    let item_ids = normalize_ids(item_ids)?;
    let outcome = trip_store(state)
        .batch_write(BatchOp::Duplicate, &item_ids)
        .await?;
    state.log_info(
        "duplicate_schedules",
        &format!("duplicated {} item(s)", outcome.updated_count),
    );
    Ok(outcome)
}

pub async fn reorder_schedules_impl(
    state: &AppState,
    pattern_id: String,
    ordered_item_ids: Vec<String>,
) -> Result<(), PlannerError> {
    let pattern_id = require_text(&pattern_id, "pattern_id")?;
    let ordered_item_ids = normalize_ids(ordered_item_ids)?;
    trip_store(state).reorder(&pattern_id, &ordered_item_ids).await?;
    state.log_info(
        "reorder_schedules",
        &format!("reordered pattern_id={pattern_id}"),
    );
    Ok(())
}

/// One background tick of the automatic status lifecycle for a trip.
/// Returns the status that was written, if any.
pub async fn advance_trip_status_impl(
    state: &AppState,
    trip_id: String,
) -> Result<Option<String>, PlannerError> {
    let trip_id = require_text(&trip_id, "trip_id")?;
    if !state.settings.auto_status_enabled {
        return Ok(None);
    }

    let store = trip_store(state);
    let trip = store.read_trip(&trip_id).await?;
    let written = state.status_transitions.tick(store.as_ref(), &trip).await?;
    if let Some(status) = written {
        state.log_info(
            "advance_trip_status",
            &format!("trip_id={trip_id} moved to {}", status.as_str()),
        );
    }
    Ok(written.map(|status| status.as_str().to_string()))
}

fn require_text(value: &str, field_name: &str) -> Result<String, PlannerError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(PlannerError::InvalidInput(format!(
            "{field_name} must not be empty"
        )));
    }
    Ok(trimmed.to_string())
}

fn normalize_ids(item_ids: Vec<String>) -> Result<Vec<String>, PlannerError> {
    let normalized: Vec<String> = item_ids
        .into_iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect();
    if normalized.is_empty() {
        return Err(PlannerError::InvalidInput(
            "item_ids must contain at least one id".to_string(),
        ));
    }
    Ok(normalized)
}

fn parse_date_input(value: &str, field_name: &str) -> Result<NaiveDate, PlannerError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|error| {
        PlannerError::InvalidInput(format!("{field_name} must be YYYY-MM-DD: {error}"))
    })
}

fn parse_time_input(value: Option<&str>) -> Result<Option<TimeOfDay>, PlannerError> {
    value
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .map(|raw| TimeOfDay::parse(raw).map_err(PlannerError::from))
        .transpose()
}

fn parse_guard_input(value: Option<&str>) -> Result<Option<DateTime<Utc>>, PlannerError> {
    value
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .map(|raw| {
            DateTime::parse_from_rfc3339(raw)
                .map(|parsed| parsed.with_timezone(&Utc))
                .map_err(|error| {
                    PlannerError::InvalidInput(format!(
                        "expected_updated_at must be RFC3339: {error}"
                    ))
                })
        })
        .transpose()
}

fn parse_category_input(value: &str) -> Result<ScheduleCategory, PlannerError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "sightseeing" => Ok(ScheduleCategory::Sightseeing),
        "restaurant" => Ok(ScheduleCategory::Restaurant),
        "hotel" => Ok(ScheduleCategory::Hotel),
        "transport" => Ok(ScheduleCategory::Transport),
        "activity" => Ok(ScheduleCategory::Activity),
        "other" => Ok(ScheduleCategory::Other),
        other => Err(PlannerError::InvalidInput(format!(
            "unsupported schedule category: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::atomic::AtomicUsize;

    static NEXT_TEMP_WORKSPACE: AtomicUsize = AtomicUsize::new(0);

    struct TempWorkspace {
        path: PathBuf,
    }

    impl TempWorkspace {
        fn new() -> Self {
            let sequence = NEXT_TEMP_WORKSPACE.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "tripweave-command-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp workspace");
            Self { path }
        }

        fn app_state(&self) -> AppState {
            AppState::new(self.path.clone()).expect("initialize app state")
        }
    }

    impl Drop for TempWorkspace {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    async fn seeded_trip(state: &AppState) -> Trip {
        create_trip_impl(
            state,
            "Kyoto long weekend".to_string(),
            "Kyoto".to_string(),
            "2026-05-04".to_string(),
            "2026-05-06".to_string(),
        )
        .await
        .expect("create trip")
    }

    #[tokio::test]
    async fn create_trip_builds_one_default_pattern_per_day() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();

        let trip = seeded_trip(&state).await;
        assert_eq!(trip.days.len(), 3);
        for day in &trip.days {
            assert_eq!(day.patterns.len(), 1);
            assert!(day.patterns[0].is_default);
            assert_eq!(day.patterns[0].label, "Plan A");
        }

        let stored = get_trip_impl(&state, trip.id.clone()).await.expect("read trip");
        assert_eq!(stored.days.len(), 3);
        assert!(stored.validate().is_ok());
    }

    #[tokio::test]
    async fn create_trip_rejects_reversed_dates() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let result = create_trip_impl(
            &state,
            "Backwards".to_string(),
            "Nowhere".to_string(),
            "2026-05-06".to_string(),
            "2026-05-04".to_string(),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn time_edit_reports_a_cascade_and_apply_shifts_the_rest() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let trip = seeded_trip(&state).await;
        let pattern_id = trip.days[0].patterns[0].id.clone();

        let breakfast = add_schedule_impl(
            &state,
            trip.id.clone(),
            Some(pattern_id.clone()),
            "Breakfast".to_string(),
            "restaurant".to_string(),
            Some("09:00".to_string()),
            Some("10:00".to_string()),
            None,
        )
        .await
        .expect("add breakfast");
        let museum = add_schedule_impl(
            &state,
            trip.id.clone(),
            Some(pattern_id.clone()),
            "Museum".to_string(),
            "sightseeing".to_string(),
            Some("10:30".to_string()),
            Some("12:00".to_string()),
            None,
        )
        .await
        .expect("add museum");

        let response = edit_schedule_time_impl(
            &state,
            trip.id.clone(),
            breakfast.id.clone(),
            Some("09:00".to_string()),
            Some("10:30".to_string()),
            None,
            None,
        )
        .await
        .expect("edit time");
        let cascade = response.cascade.expect("cascade proposed");
        assert_eq!(cascade.delta_minutes, 30);
        assert_eq!(cascade.shiftable_ids, vec![museum.id.clone()]);

        let outcome = apply_cascade_impl(&state, trip.id.clone(), breakfast.id, 30)
            .await
            .expect("apply cascade");
        assert_eq!(outcome.updated_count, 1);

        let stored = get_trip_impl(&state, trip.id).await.expect("read trip");
        let shifted = stored.schedule_by_id(&museum.id).expect("item exists");
        assert_eq!(shifted.start_time.map(|time| time.to_string()), Some("11:00".to_string()));
    }

    #[tokio::test]
    async fn stale_guard_is_rejected() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let trip = seeded_trip(&state).await;
        let pattern_id = trip.days[0].patterns[0].id.clone();

        let item = add_schedule_impl(
            &state,
            trip.id.clone(),
            Some(pattern_id),
            "Walk".to_string(),
            "activity".to_string(),
            Some("08:00".to_string()),
            None,
            None,
        )
        .await
        .expect("add schedule");

        let stale = (item.updated_at - Duration::hours(1)).to_rfc3339();
        let result = update_schedule_impl(
            &state,
            item.id,
            Some("Renamed".to_string()),
            None,
            None,
            Some(stale),
        )
        .await;
        assert!(matches!(result, Err(PlannerError::Conflict { .. })));
    }

    #[tokio::test]
    async fn cross_day_view_projects_a_hotel_stay() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let trip = seeded_trip(&state).await;
        let pattern_id = trip.days[0].patterns[0].id.clone();

        add_schedule_impl(
            &state,
            trip.id.clone(),
            Some(pattern_id),
            "Ryokan".to_string(),
            "hotel".to_string(),
            Some("18:00".to_string()),
            Some("10:00".to_string()),
            Some(2),
        )
        .await
        .expect("add hotel");

        let day2 = cross_day_view_impl(&state, trip.id.clone(), 2)
            .await
            .expect("day 2 view");
        assert_eq!(day2.len(), 1);
        assert_eq!(day2[0].position, "intermediate");
        assert_eq!(day2[0].label.as_deref(), Some("staying"));

        let day3 = cross_day_view_impl(&state, trip.id, 3).await.expect("day 3 view");
        assert_eq!(day3.len(), 1);
        assert_eq!(day3[0].position, "final");
        assert_eq!(day3[0].label.as_deref(), Some("check-out"));
        assert_eq!(day3[0].end_time.as_deref(), Some("10:00"));
    }

    #[tokio::test]
    async fn candidate_assignment_roundtrip() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let trip = seeded_trip(&state).await;
        let pattern_id = trip.days[1].patterns[0].id.clone();

        let candidate = add_schedule_impl(
            &state,
            trip.id.clone(),
            None,
            "Maybe a market".to_string(),
            "other".to_string(),
            None,
            None,
            None,
        )
        .await
        .expect("add candidate");

        let assigned = assign_schedules_impl(
            &state,
            pattern_id.clone(),
            vec![candidate.id.clone()],
        )
        .await
        .expect("assign");
        assert_eq!(assigned.updated_count, 1);

        let unassigned = unassign_schedules_impl(&state, vec![candidate.id.clone()])
            .await
            .expect("unassign");
        assert_eq!(unassigned.updated_count, 1);

        let stored = get_trip_impl(&state, trip.id).await.expect("read trip");
        assert!(stored
            .candidates
            .iter()
            .any(|schedule| schedule.id == candidate.id));
    }

    #[tokio::test]
    async fn duplicate_and_delete_report_counts() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let trip = seeded_trip(&state).await;
        let pattern_id = trip.days[0].patterns[0].id.clone();

        let item = add_schedule_impl(
            &state,
            trip.id.clone(),
            Some(pattern_id.clone()),
            "Temple".to_string(),
            "sightseeing".to_string(),
            Some("13:00".to_string()),
            None,
            None,
        )
        .await
        .expect("add schedule");

        let duplicated = duplicate_schedules_impl(&state, vec![item.id.clone()])
            .await
            .expect("duplicate");
        assert_eq!(duplicated.updated_count, 1);

        let stored = get_trip_impl(&state, trip.id.clone()).await.expect("read trip");
        let pattern = stored.pattern_by_id(&pattern_id).expect("pattern exists");
        assert_eq!(pattern.schedules.len(), 2);

        let deleted = delete_schedules_impl(
            &state,
            pattern
                .schedules
                .iter()
                .map(|schedule| schedule.id.clone())
                .collect(),
        )
        .await
        .expect("delete");
        assert_eq!(deleted.updated_count, 2);
    }

    #[tokio::test]
    async fn reorder_rejects_unknown_pattern() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let _trip = seeded_trip(&state).await;

        let result = reorder_schedules_impl(
            &state,
            "pat-missing".to_string(),
            vec!["sch-1".to_string()],
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn status_advance_is_a_no_op_for_future_trips() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let trip = create_trip_impl(
            &state,
            "Next year".to_string(),
            "Sapporo".to_string(),
            "2099-01-10".to_string(),
            "2099-01-12".to_string(),
        )
        .await
        .expect("create trip");

        let written = advance_trip_status_impl(&state, trip.id)
            .await
            .expect("tick");
        assert_eq!(written, None);
    }

    #[tokio::test]
    async fn status_advance_walks_a_past_trip_through_the_lifecycle() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let trip = create_trip_impl(
            &state,
            "Last winter".to_string(),
            "Nara".to_string(),
            "2020-01-10".to_string(),
            "2020-01-12".to_string(),
        )
        .await
        .expect("create trip");

        let first = advance_trip_status_impl(&state, trip.id.clone())
            .await
            .expect("first tick");
        assert_eq!(first.as_deref(), Some("active"));

        let second = advance_trip_status_impl(&state, trip.id.clone())
            .await
            .expect("second tick");
        assert_eq!(second.as_deref(), Some("completed"));

        let third = advance_trip_status_impl(&state, trip.id)
            .await
            .expect("third tick");
        assert_eq!(third, None);
    }

    struct OfflineStore {
        write_calls: AtomicUsize,
    }

    #[async_trait]
    impl TripStore for OfflineStore {
        async fn read_trip(&self, trip_id: &str) -> Result<Trip, PlannerError> {
            Err(PlannerError::Network(format!("store offline for {trip_id}")))
        }

        async fn insert_trip(&self, _trip: Trip) -> Result<(), PlannerError> {
            Err(PlannerError::Network("store offline".to_string()))
        }

        async fn insert_schedule(
            &self,
            _trip_id: &str,
            _schedule: ScheduleItem,
        ) -> Result<ScheduleItem, PlannerError> {
            Err(PlannerError::Network("store offline".to_string()))
        }

        async fn write_schedule(
            &self,
            _item_id: &str,
            _patch: SchedulePatch,
            _expected_updated_at: Option<DateTime<Utc>>,
        ) -> Result<ScheduleItem, PlannerError> {
            Err(PlannerError::Network("store offline".to_string()))
        }

        async fn batch_write(
            &self,
            _op: BatchOp,
            _item_ids: &[String],
        ) -> Result<BatchOutcome, PlannerError> {
            Err(PlannerError::Network("store offline".to_string()))
        }

        async fn reorder(
            &self,
            _pattern_id: &str,
            _ordered_item_ids: &[String],
        ) -> Result<(), PlannerError> {
            Err(PlannerError::Network("store offline".to_string()))
        }

        async fn write_trip_status(
            &self,
            _trip_id: &str,
            _from: TripStatus,
            _to: TripStatus,
        ) -> Result<(), PlannerError> {
            self.write_calls.fetch_add(1, Ordering::SeqCst);
            Err(PlannerError::Network("store offline".to_string()))
        }
    }

    // The attempt budget lives on the app state, not on any one tick.
    #[tokio::test]
    async fn status_attempt_budget_survives_across_ticks() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let store = OfflineStore {
            write_calls: AtomicUsize::new(0),
        };
        let trip = Trip {
            id: "trip-offline".to_string(),
            title: "Past trip".to_string(),
            destination: "Nara".to_string(),
            start_date: NaiveDate::from_ymd_opt(2020, 1, 10).expect("valid date"),
            end_date: NaiveDate::from_ymd_opt(2020, 1, 12).expect("valid date"),
            status: TripStatus::Planned,
            role: UserRole::Owner,
            days: Vec::new(),
            candidates: Vec::new(),
        };

        for _ in 0..5 {
            let written = state
                .status_transitions
                .tick(&store, &trip)
                .await
                .expect("tick stays quiet");
            assert_eq!(written, None);
        }
        assert_eq!(store.write_calls.load(Ordering::SeqCst), 3);
    }
}
