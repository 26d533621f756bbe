use crate::domain::models::{
    Day, Pattern, ScheduleCategory, ScheduleItem, Trip, TripStatus, UserRole,
};
use crate::domain::time::TimeOfDay;
use crate::infrastructure::error::PlannerError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_schedule_id() -> String {
    let sequence = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("sch-{}-{sequence}", Utc::now().timestamp_micros())
}

/// Patch value for a field that can itself be absent: a write either keeps
/// the stored value, clears it, or sets a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPatch<T> {
    Keep,
    Clear,
    Set(T),
}

impl<T> Default for FieldPatch<T> {
    fn default() -> Self {
        Self::Keep
    }
}

impl<T: Copy> FieldPatch<T> {
    pub fn set_or_clear(value: Option<T>) -> Self {
        match value {
            Some(value) => Self::Set(value),
            None => Self::Clear,
        }
    }

    fn apply(self, slot: &mut Option<T>) {
        match self {
            Self::Keep => {}
            Self::Clear => *slot = None,
            Self::Set(value) => *slot = Some(value),
        }
    }
}

/// Field-level patch for a schedule write; `Some` sets, `None` leaves the
/// stored value untouched. The time fields are three-state because an edit
/// can also remove a time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulePatch {
    pub name: Option<String>,
    pub category: Option<ScheduleCategory>,
    pub color: Option<String>,
    pub address: Option<String>,
    pub memo: Option<String>,
    pub urls: Option<Vec<String>>,
    pub start_time: FieldPatch<TimeOfDay>,
    pub end_time: FieldPatch<TimeOfDay>,
    pub end_day_offset: FieldPatch<u32>,
    pub departure_place: Option<String>,
    pub arrival_place: Option<String>,
    pub transport_method: Option<String>,
}

impl SchedulePatch {
    /// Full replacement of the time triple, as a time edit dialog submits
    /// it: an absent side clears the stored one.
    pub fn times(
        start_time: Option<TimeOfDay>,
        end_time: Option<TimeOfDay>,
        end_day_offset: Option<u32>,
    ) -> Self {
        Self {
            start_time: FieldPatch::set_or_clear(start_time),
            end_time: FieldPatch::set_or_clear(end_time),
            end_day_offset: FieldPatch::set_or_clear(end_day_offset),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Shift { delta_minutes: i32 },
    Assign { day_pattern_id: String },
    Unassign,
    Delete,
    Duplicate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct BatchOutcome {
    pub updated_count: usize,
    pub skipped_count: usize,
}

/// Storage boundary for the schedule tree. Every mutating call is treated as
/// an asynchronous round trip; single-item writes are arbitrated by the
/// `expected_updated_at` conflict check, batch calls are atomic per op.
#[async_trait]
pub trait TripStore: Send + Sync {
    async fn read_trip(&self, trip_id: &str) -> Result<Trip, PlannerError>;

    async fn insert_trip(&self, trip: Trip) -> Result<(), PlannerError>;

    /// Places a new item on its pattern (or with the candidates when
    /// `day_pattern_id` is `None`) at the end of the sort order.
    async fn insert_schedule(
        &self,
        trip_id: &str,
        schedule: ScheduleItem,
    ) -> Result<ScheduleItem, PlannerError>;

    /// Rejects with `Conflict` when `expected_updated_at` no longer matches
    /// the stored timestamp, and with `Gone` when the item was deleted.
    /// Without `expected_updated_at` the write is last-writer-wins.
    async fn write_schedule(
        &self,
        item_id: &str,
        patch: SchedulePatch,
        expected_updated_at: Option<DateTime<Utc>>,
    ) -> Result<ScheduleItem, PlannerError>;

    async fn batch_write(
        &self,
        op: BatchOp,
        item_ids: &[String],
    ) -> Result<BatchOutcome, PlannerError>;

    async fn reorder(
        &self,
        pattern_id: &str,
        ordered_item_ids: &[String],
    ) -> Result<(), PlannerError>;

    /// Compare-and-set used by the automatic status transition guard.
    async fn write_trip_status(
        &self,
        trip_id: &str,
        from: TripStatus,
        to: TripStatus,
    ) -> Result<(), PlannerError>;
}

fn apply_patch(item: &mut ScheduleItem, patch: &SchedulePatch) {
    if let Some(name) = &patch.name {
        item.name = name.clone();
    }
    if let Some(category) = patch.category {
        item.category = category;
    }
    if let Some(color) = &patch.color {
        item.color = Some(color.clone());
    }
    if let Some(address) = &patch.address {
        item.address = Some(address.clone());
    }
    if let Some(memo) = &patch.memo {
        item.memo = Some(memo.clone());
    }
    if let Some(urls) = &patch.urls {
        item.urls = urls.clone();
    }
    patch.start_time.apply(&mut item.start_time);
    patch.end_time.apply(&mut item.end_time);
    patch.end_day_offset.apply(&mut item.end_day_offset);
    if let Some(departure_place) = &patch.departure_place {
        item.departure_place = Some(departure_place.clone());
    }
    if let Some(arrival_place) = &patch.arrival_place {
        item.arrival_place = Some(arrival_place.clone());
    }
    if let Some(transport_method) = &patch.transport_method {
        item.transport_method = Some(transport_method.clone());
    }
}

/// Shifted `(start, end)` times, or `None` when the item cannot move: no
/// start time, or a bound would be crossed. An item whose stay spans days
/// keeps its end time untouched.
fn try_shift(item: &ScheduleItem, delta_minutes: i32) -> Option<(TimeOfDay, Option<TimeOfDay>)> {
    let start = item.start_time?;
    let shifted_start = start.shift(delta_minutes)?;
    match item.end_time {
        Some(end) if item.end_day_offset.unwrap_or(0) == 0 => {
            let shifted_end = end.shift(delta_minutes)?;
            Some((shifted_start, Some(shifted_end)))
        }
        other => Some((shifted_start, other)),
    }
}

fn reindex(schedules: &mut [ScheduleItem]) {
    for (index, schedule) in schedules.iter_mut().enumerate() {
        schedule.sort_order = index as u32;
    }
}

fn find_schedule_mut<'a>(trip: &'a mut Trip, item_id: &str) -> Option<&'a mut ScheduleItem> {
    trip.days
        .iter_mut()
        .flat_map(|day| day.patterns.iter_mut())
        .flat_map(|pattern| pattern.schedules.iter_mut())
        .chain(trip.candidates.iter_mut())
        .find(|schedule| schedule.id == item_id)
}

fn take_schedule(trip: &mut Trip, item_id: &str) -> Option<ScheduleItem> {
    for day in &mut trip.days {
        for pattern in &mut day.patterns {
            if let Some(index) = pattern
                .schedules
                .iter()
                .position(|schedule| schedule.id == item_id)
            {
                let taken = pattern.schedules.remove(index);
                reindex(&mut pattern.schedules);
                return Some(taken);
            }
        }
    }
    if let Some(index) = trip
        .candidates
        .iter()
        .position(|schedule| schedule.id == item_id)
    {
        let taken = trip.candidates.remove(index);
        reindex(&mut trip.candidates);
        return Some(taken);
    }
    None
}

fn pattern_mut<'a>(trip: &'a mut Trip, pattern_id: &str) -> Option<&'a mut Pattern> {
    trip.days
        .iter_mut()
        .flat_map(|day| day.patterns.iter_mut())
        .find(|pattern| pattern.id == pattern_id)
}

#[derive(Debug, Default)]
pub struct InMemoryTripStore {
    trips: Mutex<HashMap<String, Trip>>,
}

impl InMemoryTripStore {
    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Trip>>, PlannerError> {
        self.trips
            .lock()
            .map_err(|error| PlannerError::InvalidInput(format!("trip store lock poisoned: {error}")))
    }
}

#[async_trait]
impl TripStore for InMemoryTripStore {
    async fn read_trip(&self, trip_id: &str) -> Result<Trip, PlannerError> {
        let trips = self.lock()?;
        trips.get(trip_id).cloned().ok_or_else(|| PlannerError::Gone {
            item_id: trip_id.to_string(),
        })
    }

    async fn insert_trip(&self, trip: Trip) -> Result<(), PlannerError> {
        trip.validate().map_err(PlannerError::InvalidInput)?;
        let mut trips = self.lock()?;
        trips.insert(trip.id.clone(), trip);
        Ok(())
    }

    async fn insert_schedule(
        &self,
        trip_id: &str,
        mut schedule: ScheduleItem,
    ) -> Result<ScheduleItem, PlannerError> {
        schedule.validate().map_err(PlannerError::InvalidInput)?;
        let mut trips = self.lock()?;
        let trip = trips.get_mut(trip_id).ok_or_else(|| PlannerError::Gone {
            item_id: trip_id.to_string(),
        })?;

        match schedule.day_pattern_id.clone() {
            Some(pattern_id) => {
                let pattern = pattern_mut(trip, &pattern_id).ok_or_else(|| {
                    PlannerError::InvalidInput(format!("pattern not found: {pattern_id}"))
                })?;
                schedule.sort_order = pattern.schedules.len() as u32;
                pattern.schedules.push(schedule.clone());
            }
            None => {
                schedule.sort_order = trip.candidates.len() as u32;
                trip.candidates.push(schedule.clone());
            }
        }
        Ok(schedule)
    }

    async fn write_schedule(
        &self,
        item_id: &str,
        patch: SchedulePatch,
        expected_updated_at: Option<DateTime<Utc>>,
    ) -> Result<ScheduleItem, PlannerError> {
        let mut trips = self.lock()?;
        for trip in trips.values_mut() {
            if let Some(item) = find_schedule_mut(trip, item_id) {
                if let Some(expected) = expected_updated_at {
                    if item.updated_at != expected {
                        return Err(PlannerError::Conflict {
                            item_id: item_id.to_string(),
                        });
                    }
                }
                let mut updated = item.clone();
                apply_patch(&mut updated, &patch);
                updated.updated_at = Utc::now();
                updated.validate().map_err(PlannerError::InvalidInput)?;
                *item = updated.clone();
                return Ok(updated);
            }
        }
        Err(PlannerError::Gone {
            item_id: item_id.to_string(),
        })
    }

    async fn batch_write(
        &self,
        op: BatchOp,
        item_ids: &[String],
    ) -> Result<BatchOutcome, PlannerError> {
        let mut trips = self.lock()?;
        let mut outcome = BatchOutcome::default();

        for item_id in item_ids {
            let mut handled = false;
            for trip in trips.values_mut() {
                if trip.schedule_by_id(item_id).is_none() {
                    continue;
                }
                handled = true;
                match &op {
                    BatchOp::Shift { delta_minutes } => {
                        let item =
                            find_schedule_mut(trip, item_id).expect("item located above");
                        match try_shift(item, *delta_minutes) {
                            Some((start, end)) => {
                                item.start_time = Some(start);
                                item.end_time = end;
                                item.updated_at = Utc::now();
                                outcome.updated_count += 1;
                            }
                            None => outcome.skipped_count += 1,
                        }
                    }
                    BatchOp::Delete => {
                        take_schedule(trip, item_id);
                        outcome.updated_count += 1;
                    }
                    BatchOp::Assign { day_pattern_id } => {
                        if pattern_mut(trip, day_pattern_id).is_none() {
                            return Err(PlannerError::InvalidInput(format!(
                                "pattern not found: {day_pattern_id}"
                            )));
                        }
                        let mut item =
                            take_schedule(trip, item_id).expect("item located above");
                        item.day_pattern_id = Some(day_pattern_id.clone());
                        item.updated_at = Utc::now();
                        let pattern = pattern_mut(trip, day_pattern_id)
                            .expect("pattern checked above");
                        item.sort_order = pattern.schedules.len() as u32;
                        pattern.schedules.push(item);
                        outcome.updated_count += 1;
                    }
                    BatchOp::Unassign => {
                        let already_candidate = trip
                            .schedule_by_id(item_id)
                            .is_some_and(ScheduleItem::is_candidate);
                        if already_candidate {
                            outcome.skipped_count += 1;
                        } else {
                            let mut item =
                                take_schedule(trip, item_id).expect("item located above");
                            item.day_pattern_id = None;
                            item.sort_order = trip.candidates.len() as u32;
                            item.updated_at = Utc::now();
                            trip.candidates.push(item);
                            outcome.updated_count += 1;
                        }
                    }
                    BatchOp::Duplicate => {
                        let original = trip
                            .schedule_by_id(item_id)
                            .cloned()
                            .expect("item located above");
                        let mut copy = original;
                        copy.id = next_schedule_id();
                        copy.updated_at = Utc::now();
                        match copy.day_pattern_id.clone() {
                            Some(pattern_id) => {
                                let pattern = pattern_mut(trip, &pattern_id)
                                    .expect("pattern of an existing item");
                                copy.sort_order = pattern.schedules.len() as u32;
                                pattern.schedules.push(copy);
                            }
                            None => {
                                copy.sort_order = trip.candidates.len() as u32;
                                trip.candidates.push(copy);
                            }
                        }
                        outcome.updated_count += 1;
                    }
                }
                break;
            }
            if !handled {
                outcome.skipped_count += 1;
            }
        }
        Ok(outcome)
    }

    async fn reorder(
        &self,
        pattern_id: &str,
        ordered_item_ids: &[String],
    ) -> Result<(), PlannerError> {
        let positions: HashMap<&str, usize> = ordered_item_ids
            .iter()
            .enumerate()
            .map(|(index, id)| (id.as_str(), index))
            .collect();

        let mut trips = self.lock()?;
        for trip in trips.values_mut() {
            if let Some(pattern) = pattern_mut(trip, pattern_id) {
                pattern.schedules.sort_by_key(|schedule| {
                    positions
                        .get(schedule.id.as_str())
                        .copied()
                        .unwrap_or(usize::MAX)
                });
                reindex(&mut pattern.schedules);
                return Ok(());
            }
        }
        Err(PlannerError::InvalidInput(format!(
            "pattern not found: {pattern_id}"
        )))
    }

    async fn write_trip_status(
        &self,
        trip_id: &str,
        from: TripStatus,
        to: TripStatus,
    ) -> Result<(), PlannerError> {
        let mut trips = self.lock()?;
        let trip = trips.get_mut(trip_id).ok_or_else(|| PlannerError::Gone {
            item_id: trip_id.to_string(),
        })?;
        if trip.status != from {
            return Err(PlannerError::Conflict {
                item_id: trip_id.to_string(),
            });
        }
        trip.status = to;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SqliteTripStore {
    db_path: PathBuf,
}

const SCHEDULE_COLUMNS: &str = "id, day_pattern_id, name, category, color, address, memo, urls, \
     start_time, end_time, end_day_offset, departure_place, arrival_place, transport_method, \
     sort_order, updated_at";

struct ScheduleRow {
    id: String,
    day_pattern_id: Option<String>,
    name: String,
    category: String,
    color: Option<String>,
    address: Option<String>,
    memo: Option<String>,
    urls: String,
    start_time: Option<String>,
    end_time: Option<String>,
    end_day_offset: Option<u32>,
    departure_place: Option<String>,
    arrival_place: Option<String>,
    transport_method: Option<String>,
    sort_order: u32,
    updated_at: String,
}

fn map_schedule_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScheduleRow> {
    Ok(ScheduleRow {
        id: row.get(0)?,
        day_pattern_id: row.get(1)?,
        name: row.get(2)?,
        category: row.get(3)?,
        color: row.get(4)?,
        address: row.get(5)?,
        memo: row.get(6)?,
        urls: row.get(7)?,
        start_time: row.get(8)?,
        end_time: row.get(9)?,
        end_day_offset: row.get(10)?,
        departure_place: row.get(11)?,
        arrival_place: row.get(12)?,
        transport_method: row.get(13)?,
        sort_order: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

impl ScheduleRow {
    fn into_item(self) -> Result<ScheduleItem, PlannerError> {
        Ok(ScheduleItem {
            start_time: self.start_time.as_deref().map(TimeOfDay::parse).transpose()?,
            end_time: self.end_time.as_deref().map(TimeOfDay::parse).transpose()?,
            updated_at: parse_rfc3339(&self.updated_at)?,
            urls: serde_json::from_str(&self.urls)?,
            category: parse_category(&self.category)?,
            id: self.id,
            day_pattern_id: self.day_pattern_id,
            name: self.name,
            color: self.color,
            address: self.address,
            memo: self.memo,
            end_day_offset: self.end_day_offset,
            departure_place: self.departure_place,
            arrival_place: self.arrival_place,
            transport_method: self.transport_method,
            sort_order: self.sort_order,
        })
    }
}

fn parse_rfc3339(raw: &str) -> Result<DateTime<Utc>, PlannerError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| PlannerError::InvalidInput(format!("invalid timestamp '{raw}': {error}")))
}

fn parse_date(raw: &str) -> Result<NaiveDate, PlannerError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|error| PlannerError::InvalidInput(format!("invalid date '{raw}': {error}")))
}

fn parse_category(raw: &str) -> Result<ScheduleCategory, PlannerError> {
    match raw {
        "sightseeing" => Ok(ScheduleCategory::Sightseeing),
        "restaurant" => Ok(ScheduleCategory::Restaurant),
        "hotel" => Ok(ScheduleCategory::Hotel),
        "transport" => Ok(ScheduleCategory::Transport),
        "activity" => Ok(ScheduleCategory::Activity),
        "other" => Ok(ScheduleCategory::Other),
        other => Err(PlannerError::InvalidInput(format!(
            "unknown schedule category: {other}"
        ))),
    }
}

fn parse_status(raw: &str) -> Result<TripStatus, PlannerError> {
    match raw {
        "planned" => Ok(TripStatus::Planned),
        "active" => Ok(TripStatus::Active),
        "completed" => Ok(TripStatus::Completed),
        other => Err(PlannerError::InvalidInput(format!(
            "unknown trip status: {other}"
        ))),
    }
}

fn parse_role(raw: &str) -> Result<UserRole, PlannerError> {
    match raw {
        "owner" => Ok(UserRole::Owner),
        "editor" => Ok(UserRole::Editor),
        "viewer" => Ok(UserRole::Viewer),
        other => Err(PlannerError::InvalidInput(format!(
            "unknown user role: {other}"
        ))),
    }
}

impl SqliteTripStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, PlannerError> {
        Connection::open(&self.db_path).map_err(PlannerError::from)
    }

    fn query_schedules(
        connection: &Connection,
        sql: &str,
        key: &str,
    ) -> Result<Vec<ScheduleItem>, PlannerError> {
        let mut statement = connection.prepare(sql)?;
        let rows = statement.query_map(params![key], map_schedule_row)?;
        let mut schedules = Vec::new();
        for row in rows {
            schedules.push(row?.into_item()?);
        }
        Ok(schedules)
    }

    fn read_schedule(
        connection: &Connection,
        item_id: &str,
    ) -> Result<Option<ScheduleItem>, PlannerError> {
        let row = connection
            .query_row(
                &format!("SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE id = ?1"),
                params![item_id],
                map_schedule_row,
            )
            .optional()?;
        row.map(ScheduleRow::into_item).transpose()
    }

    fn schedule_trip_id(
        connection: &Connection,
        item_id: &str,
    ) -> Result<Option<String>, PlannerError> {
        Ok(connection
            .query_row(
                "SELECT trip_id FROM schedules WHERE id = ?1",
                params![item_id],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn store_schedule(
        connection: &Connection,
        trip_id: &str,
        item: &ScheduleItem,
    ) -> Result<(), PlannerError> {
        connection.execute(
            "INSERT INTO schedules (id, trip_id, day_pattern_id, name, category, color, address, \
             memo, urls, start_time, end_time, end_day_offset, departure_place, arrival_place, \
             transport_method, sort_order, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
             ON CONFLICT(id) DO UPDATE SET
               trip_id = excluded.trip_id,
               day_pattern_id = excluded.day_pattern_id,
               name = excluded.name,
               category = excluded.category,
               color = excluded.color,
               address = excluded.address,
               memo = excluded.memo,
               urls = excluded.urls,
               start_time = excluded.start_time,
               end_time = excluded.end_time,
               end_day_offset = excluded.end_day_offset,
               departure_place = excluded.departure_place,
               arrival_place = excluded.arrival_place,
               transport_method = excluded.transport_method,
               sort_order = excluded.sort_order,
               updated_at = excluded.updated_at",
            params![
                item.id,
                trip_id,
                item.day_pattern_id,
                item.name,
                item.category.as_str(),
                item.color,
                item.address,
                item.memo,
                serde_json::to_string(&item.urls)?,
                item.start_time.map(|time| time.to_string()),
                item.end_time.map(|time| time.to_string()),
                item.end_day_offset,
                item.departure_place,
                item.arrival_place,
                item.transport_method,
                item.sort_order,
                item.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Reissues a dense sort order for one pattern, or for the trip's
    /// candidates when `day_pattern_id` is `None`.
    fn reindex_container(
        connection: &Connection,
        trip_id: &str,
        day_pattern_id: Option<&str>,
    ) -> Result<(), PlannerError> {
        let ids: Vec<String> = match day_pattern_id {
            Some(pattern_id) => {
                let mut statement = connection.prepare(
                    "SELECT id FROM schedules WHERE day_pattern_id = ?1 ORDER BY sort_order, id",
                )?;
                let rows = statement.query_map(params![pattern_id], |row| row.get(0))?;
                rows.collect::<Result<_, _>>()?
            }
            None => {
                let mut statement = connection.prepare(
                    "SELECT id FROM schedules WHERE trip_id = ?1 AND day_pattern_id IS NULL \
                     ORDER BY sort_order, id",
                )?;
                let rows = statement.query_map(params![trip_id], |row| row.get(0))?;
                rows.collect::<Result<_, _>>()?
            }
        };
        for (index, id) in ids.iter().enumerate() {
            connection.execute(
                "UPDATE schedules SET sort_order = ?1 WHERE id = ?2",
                params![index as u32, id],
            )?;
        }
        Ok(())
    }

    fn container_len(
        connection: &Connection,
        trip_id: &str,
        day_pattern_id: Option<&str>,
    ) -> Result<u32, PlannerError> {
        let count: u32 = match day_pattern_id {
            Some(pattern_id) => connection.query_row(
                "SELECT COUNT(*) FROM schedules WHERE day_pattern_id = ?1",
                params![pattern_id],
                |row| row.get(0),
            )?,
            None => connection.query_row(
                "SELECT COUNT(*) FROM schedules WHERE trip_id = ?1 AND day_pattern_id IS NULL",
                params![trip_id],
                |row| row.get(0),
            )?,
        };
        Ok(count)
    }

    fn pattern_exists(connection: &Connection, pattern_id: &str) -> Result<bool, PlannerError> {
        let count: u32 = connection.query_row(
            "SELECT COUNT(*) FROM patterns WHERE id = ?1",
            params![pattern_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

#[async_trait]
impl TripStore for SqliteTripStore {
    async fn read_trip(&self, trip_id: &str) -> Result<Trip, PlannerError> {
        let connection = self.connect()?;
        let trip_row: Option<(String, String, String, String, String, String)> = connection
            .query_row(
                "SELECT title, destination, start_date, end_date, status, role \
                 FROM trips WHERE id = ?1",
                params![trip_id],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                },
            )
            .optional()?;
        let Some((title, destination, start_date, end_date, status, role)) = trip_row else {
            return Err(PlannerError::Gone {
                item_id: trip_id.to_string(),
            });
        };

        let day_rows: Vec<(String, u32, String, Option<String>)> = {
            let mut statement = connection.prepare(
                "SELECT id, day_number, date, memo FROM days WHERE trip_id = ?1 \
                 ORDER BY day_number",
            )?;
            let rows = statement.query_map(params![trip_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?;
            rows.collect::<Result<_, _>>()?
        };

        let mut days = Vec::with_capacity(day_rows.len());
        for (day_id, day_number, date, memo) in day_rows {
            let pattern_rows: Vec<(String, String, bool, u32)> = {
                let mut statement = connection.prepare(
                    "SELECT id, label, is_default, sort_order FROM patterns WHERE day_id = ?1 \
                     ORDER BY sort_order",
                )?;
                let rows = statement.query_map(params![day_id], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })?;
                rows.collect::<Result<_, _>>()?
            };

            let mut patterns = Vec::with_capacity(pattern_rows.len());
            for (pattern_id, label, is_default, sort_order) in pattern_rows {
                let schedules = Self::query_schedules(
                    &connection,
                    &format!(
                        "SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE day_pattern_id = ?1 \
                         ORDER BY sort_order"
                    ),
                    &pattern_id,
                )?;
                patterns.push(Pattern {
                    id: pattern_id,
                    day_id: day_id.clone(),
                    label,
                    is_default,
                    sort_order,
                    schedules,
                });
            }
            days.push(Day {
                id: day_id,
                trip_id: trip_id.to_string(),
                day_number,
                date: parse_date(&date)?,
                memo,
                patterns,
            });
        }

        let candidates = Self::query_schedules(
            &connection,
            &format!(
                "SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE trip_id = ?1 \
                 AND day_pattern_id IS NULL ORDER BY sort_order"
            ),
            trip_id,
        )?;

        Ok(Trip {
            id: trip_id.to_string(),
            title,
            destination,
            start_date: parse_date(&start_date)?,
            end_date: parse_date(&end_date)?,
            status: parse_status(&status)?,
            role: parse_role(&role)?,
            days,
            candidates,
        })
    }

    async fn insert_trip(&self, trip: Trip) -> Result<(), PlannerError> {
        trip.validate().map_err(PlannerError::InvalidInput)?;
        let mut connection = self.connect()?;
        let tx = connection.transaction()?;

        tx.execute("DELETE FROM trips WHERE id = ?1", params![trip.id])?;
        tx.execute(
            "DELETE FROM schedules WHERE trip_id = ?1",
            params![trip.id],
        )?;
        tx.execute(
            "DELETE FROM patterns WHERE day_id IN (SELECT id FROM days WHERE trip_id = ?1)",
            params![trip.id],
        )?;
        tx.execute("DELETE FROM days WHERE trip_id = ?1", params![trip.id])?;

        tx.execute(
            "INSERT INTO trips (id, title, destination, start_date, end_date, status, role)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                trip.id,
                trip.title,
                trip.destination,
                trip.start_date.to_string(),
                trip.end_date.to_string(),
                trip.status.as_str(),
                trip.role.as_str(),
            ],
        )?;
        for day in &trip.days {
            tx.execute(
                "INSERT INTO days (id, trip_id, day_number, date, memo)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    day.id,
                    trip.id,
                    day.day_number,
                    day.date.to_string(),
                    day.memo
                ],
            )?;
            for pattern in &day.patterns {
                tx.execute(
                    "INSERT INTO patterns (id, day_id, label, is_default, sort_order)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        pattern.id,
                        day.id,
                        pattern.label,
                        pattern.is_default,
                        pattern.sort_order
                    ],
                )?;
                for schedule in &pattern.schedules {
                    Self::store_schedule(&tx, &trip.id, schedule)?;
                }
            }
        }
        for candidate in &trip.candidates {
            Self::store_schedule(&tx, &trip.id, candidate)?;
        }

        tx.commit()?;
        Ok(())
    }

    async fn insert_schedule(
        &self,
        trip_id: &str,
        mut schedule: ScheduleItem,
    ) -> Result<ScheduleItem, PlannerError> {
        schedule.validate().map_err(PlannerError::InvalidInput)?;
        let mut connection = self.connect()?;
        let tx = connection.transaction()?;

        if let Some(pattern_id) = schedule.day_pattern_id.clone() {
            if !Self::pattern_exists(&tx, &pattern_id)? {
                return Err(PlannerError::InvalidInput(format!(
                    "pattern not found: {pattern_id}"
                )));
            }
            schedule.sort_order = Self::container_len(&tx, trip_id, Some(&pattern_id))?;
        } else {
            schedule.sort_order = Self::container_len(&tx, trip_id, None)?;
        }
        Self::store_schedule(&tx, trip_id, &schedule)?;
        tx.commit()?;
        Ok(schedule)
    }

    async fn write_schedule(
        &self,
        item_id: &str,
        patch: SchedulePatch,
        expected_updated_at: Option<DateTime<Utc>>,
    ) -> Result<ScheduleItem, PlannerError> {
        let mut connection = self.connect()?;
        let tx = connection.transaction()?;

        let Some(mut item) = Self::read_schedule(&tx, item_id)? else {
            return Err(PlannerError::Gone {
                item_id: item_id.to_string(),
            });
        };
        if let Some(expected) = expected_updated_at {
            if item.updated_at != expected {
                return Err(PlannerError::Conflict {
                    item_id: item_id.to_string(),
                });
            }
        }
        let trip_id = Self::schedule_trip_id(&tx, item_id)?.ok_or_else(|| PlannerError::Gone {
            item_id: item_id.to_string(),
        })?;

        apply_patch(&mut item, &patch);
        item.updated_at = Utc::now();
        item.validate().map_err(PlannerError::InvalidInput)?;
        Self::store_schedule(&tx, &trip_id, &item)?;
        tx.commit()?;
        Ok(item)
    }

    async fn batch_write(
        &self,
        op: BatchOp,
        item_ids: &[String],
    ) -> Result<BatchOutcome, PlannerError> {
        let mut connection = self.connect()?;
        let tx = connection.transaction()?;
        let mut outcome = BatchOutcome::default();

        for item_id in item_ids {
            let Some(item) = Self::read_schedule(&tx, item_id)? else {
                outcome.skipped_count += 1;
                continue;
            };
            let trip_id =
                Self::schedule_trip_id(&tx, item_id)?.ok_or_else(|| PlannerError::Gone {
                    item_id: item_id.to_string(),
                })?;

            match &op {
                BatchOp::Shift { delta_minutes } => match try_shift(&item, *delta_minutes) {
                    Some((start, end)) => {
                        let mut shifted = item;
                        shifted.start_time = Some(start);
                        shifted.end_time = end;
                        shifted.updated_at = Utc::now();
                        Self::store_schedule(&tx, &trip_id, &shifted)?;
                        outcome.updated_count += 1;
                    }
                    None => outcome.skipped_count += 1,
                },
                BatchOp::Delete => {
                    tx.execute("DELETE FROM schedules WHERE id = ?1", params![item_id])?;
                    Self::reindex_container(&tx, &trip_id, item.day_pattern_id.as_deref())?;
                    outcome.updated_count += 1;
                }
                BatchOp::Assign { day_pattern_id } => {
                    if !Self::pattern_exists(&tx, day_pattern_id)? {
                        return Err(PlannerError::InvalidInput(format!(
                            "pattern not found: {day_pattern_id}"
                        )));
                    }
                    let previous_container = item.day_pattern_id.clone();
                    let mut moved = item;
                    moved.day_pattern_id = Some(day_pattern_id.clone());
                    moved.sort_order = Self::container_len(&tx, &trip_id, Some(day_pattern_id))?;
                    moved.updated_at = Utc::now();
                    Self::store_schedule(&tx, &trip_id, &moved)?;
                    Self::reindex_container(&tx, &trip_id, previous_container.as_deref())?;
                    outcome.updated_count += 1;
                }
                BatchOp::Unassign => {
                    if item.day_pattern_id.is_none() {
                        outcome.skipped_count += 1;
                        continue;
                    }
                    let previous_container = item.day_pattern_id.clone();
                    let mut moved = item;
                    moved.day_pattern_id = None;
                    moved.sort_order = Self::container_len(&tx, &trip_id, None)?;
                    moved.updated_at = Utc::now();
                    Self::store_schedule(&tx, &trip_id, &moved)?;
                    Self::reindex_container(&tx, &trip_id, previous_container.as_deref())?;
                    outcome.updated_count += 1;
                }
                BatchOp::Duplicate => {
                    let mut copy = item;
                    copy.id = next_schedule_id();
                    copy.sort_order =
                        Self::container_len(&tx, &trip_id, copy.day_pattern_id.as_deref())?;
                    copy.updated_at = Utc::now();
                    Self::store_schedule(&tx, &trip_id, &copy)?;
                    outcome.updated_count += 1;
                }
            }
        }

        tx.commit()?;
        Ok(outcome)
    }

    async fn reorder(
        &self,
        pattern_id: &str,
        ordered_item_ids: &[String],
    ) -> Result<(), PlannerError> {
        let mut connection = self.connect()?;
        let tx = connection.transaction()?;
        if !Self::pattern_exists(&tx, pattern_id)? {
            return Err(PlannerError::InvalidInput(format!(
                "pattern not found: {pattern_id}"
            )));
        }

        let current_ids: Vec<String> = {
            let mut statement = tx.prepare(
                "SELECT id FROM schedules WHERE day_pattern_id = ?1 ORDER BY sort_order, id",
            )?;
            let rows = statement.query_map(params![pattern_id], |row| row.get(0))?;
            rows.collect::<Result<_, _>>()?
        };
        let positions: HashMap<&str, usize> = ordered_item_ids
            .iter()
            .enumerate()
            .map(|(index, id)| (id.as_str(), index))
            .collect();
        let mut ordered = current_ids;
        ordered.sort_by_key(|id| positions.get(id.as_str()).copied().unwrap_or(usize::MAX));

        for (index, id) in ordered.iter().enumerate() {
            tx.execute(
                "UPDATE schedules SET sort_order = ?1 WHERE id = ?2",
                params![index as u32, id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn write_trip_status(
        &self,
        trip_id: &str,
        from: TripStatus,
        to: TripStatus,
    ) -> Result<(), PlannerError> {
        let connection = self.connect()?;
        let changed = connection.execute(
            "UPDATE trips SET status = ?1 WHERE id = ?2 AND status = ?3",
            params![to.as_str(), trip_id, from.as_str()],
        )?;
        if changed == 1 {
            return Ok(());
        }
        let exists: u32 = connection.query_row(
            "SELECT COUNT(*) FROM trips WHERE id = ?1",
            params![trip_id],
            |row| row.get(0),
        )?;
        if exists == 0 {
            Err(PlannerError::Gone {
                item_id: trip_id.to_string(),
            })
        } else {
            Err(PlannerError::Conflict {
                item_id: trip_id.to_string(),
            })
        }
    }
}
