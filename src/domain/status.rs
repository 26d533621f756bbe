use crate::domain::models::{ScheduleItem, Trip, TripStatus};
use crate::domain::time::TimeOfDay;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleTimeStatus {
    Upcoming,
    Current,
    Past,
}

fn at(date: NaiveDate, time: TimeOfDay) -> NaiveDateTime {
    let minutes = time.minutes();
    date.and_hms_opt(u32::from(minutes / 60), u32::from(minutes % 60), 0)
        .expect("minutes stay within the day")
}

/// Where a schedule item anchored on `date` sits relative to `now` on the
/// implicit trip-local clock. Untimed items are always `Upcoming`.
pub fn schedule_time_status(
    schedule: &ScheduleItem,
    date: NaiveDate,
    now: DateTime<Utc>,
) -> ScheduleTimeStatus {
    let now = now.naive_utc();
    let start_at = schedule.start_time.map(|time| at(date, time));
    let end_at = schedule.end_time.map(|time| {
        let end_date = date + Duration::days(i64::from(schedule.end_day_offset.unwrap_or(0)));
        at(end_date, time)
    });

    if let Some(end_at) = end_at {
        if now >= end_at {
            return ScheduleTimeStatus::Past;
        }
    }
    match start_at {
        Some(start_at) if now < start_at => ScheduleTimeStatus::Upcoming,
        Some(_) if end_at.is_some() => ScheduleTimeStatus::Current,
        Some(_) => ScheduleTimeStatus::Past,
        None if end_at.is_some() => ScheduleTimeStatus::Current,
        None => ScheduleTimeStatus::Upcoming,
    }
}

/// Decides the next automatic lifecycle step, if any. Transitions are
/// monotonic: `planned -> active -> completed`.
pub fn next_status(trip: &Trip, now: DateTime<Utc>) -> Option<TripStatus> {
    let today = now.date_naive();
    match trip.status {
        TripStatus::Planned => {
            if today > trip.start_date {
                return Some(TripStatus::Active);
            }
            if today < trip.start_date {
                return None;
            }
            // On the start date the trip goes active once any item that day
            // has a start time that is not strictly in the future.
            let started = day_schedules(trip, trip.start_date).any(|schedule| {
                schedule
                    .start_time
                    .map(|time| at(trip.start_date, time) <= now.naive_utc())
                    .unwrap_or(false)
            });
            started.then_some(TripStatus::Active)
        }
        TripStatus::Active => {
            if today > trip.end_date {
                return Some(TripStatus::Completed);
            }
            if today < trip.end_date {
                return None;
            }
            let all_past = day_schedules(trip, trip.end_date)
                .filter(|schedule| schedule.start_time.is_some() || schedule.end_time.is_some())
                .all(|schedule| {
                    schedule_time_status(schedule, trip.end_date, now) == ScheduleTimeStatus::Past
                });
            all_past.then_some(TripStatus::Completed)
        }
        TripStatus::Completed => None,
    }
}

fn day_schedules(trip: &Trip, date: NaiveDate) -> impl Iterator<Item = &ScheduleItem> {
    trip.days
        .iter()
        .filter(move |day| day.date == date)
        .flat_map(|day| day.patterns.iter())
        .flat_map(|pattern| pattern.schedules.iter())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Day, Pattern, ScheduleCategory, UserRole};

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn time(value: &str) -> TimeOfDay {
        TimeOfDay::parse(value).expect("valid time")
    }

    fn schedule(id: &str, sort_order: u32, start: Option<&str>, end: Option<&str>) -> ScheduleItem {
        ScheduleItem {
            id: id.to_string(),
            day_pattern_id: Some("pat".to_string()),
            name: format!("Item {id}"),
            category: ScheduleCategory::Sightseeing,
            color: None,
            address: None,
            memo: None,
            urls: Vec::new(),
            start_time: start.map(time),
            end_time: end.map(time),
            end_day_offset: None,
            departure_place: None,
            arrival_place: None,
            transport_method: None,
            sort_order,
            updated_at: fixed_time("2026-05-01T00:00:00Z"),
        }
    }

    fn trip(status: TripStatus, first_day: Vec<ScheduleItem>, last_day: Vec<ScheduleItem>) -> Trip {
        let start_date = NaiveDate::from_ymd_opt(2026, 5, 4).expect("valid date");
        let make_day = |number: u32, schedules: Vec<ScheduleItem>| {
            let day_id = format!("day-{number}");
            let mut schedules = schedules;
            for (index, schedule) in schedules.iter_mut().enumerate() {
                schedule.day_pattern_id = Some(format!("pat-{number}"));
                schedule.sort_order = index as u32;
            }
            Day {
                id: day_id.clone(),
                trip_id: "trip-1".to_string(),
                day_number: number,
                date: start_date + Duration::days(i64::from(number) - 1),
                memo: None,
                patterns: vec![Pattern {
                    id: format!("pat-{number}"),
                    day_id,
                    label: "Plan A".to_string(),
                    is_default: true,
                    sort_order: 0,
                    schedules,
                }],
            }
        };

        Trip {
            id: "trip-1".to_string(),
            title: "Kyoto long weekend".to_string(),
            destination: "Kyoto".to_string(),
            start_date,
            end_date: start_date + Duration::days(1),
            status,
            role: UserRole::Owner,
            days: vec![make_day(1, first_day), make_day(2, last_day)],
            candidates: Vec::new(),
        }
    }

    #[test]
    fn planned_goes_active_once_the_start_date_has_passed() {
        let trip = trip(TripStatus::Planned, Vec::new(), Vec::new());
        assert_eq!(
            next_status(&trip, fixed_time("2026-05-05T00:00:00Z")),
            Some(TripStatus::Active)
        );
        assert_eq!(next_status(&trip, fixed_time("2026-05-03T12:00:00Z")), None);
    }

    #[test]
    fn planned_goes_active_on_the_start_date_when_an_item_has_started() {
        let trip = trip(
            TripStatus::Planned,
            vec![schedule("sch-1", 0, Some("10:00"), None)],
            Vec::new(),
        );
        assert_eq!(next_status(&trip, fixed_time("2026-05-04T09:59:00Z")), None);
        assert_eq!(
            next_status(&trip, fixed_time("2026-05-04T10:00:00Z")),
            Some(TripStatus::Active)
        );
    }

    #[test]
    fn start_date_without_started_items_stays_planned() {
        let trip = trip(
            TripStatus::Planned,
            vec![schedule("sch-1", 0, None, Some("23:00"))],
            Vec::new(),
        );
        assert_eq!(next_status(&trip, fixed_time("2026-05-04T12:00:00Z")), None);
    }

    #[test]
    fn active_completes_once_the_end_date_has_passed() {
        let trip = trip(TripStatus::Active, Vec::new(), Vec::new());
        assert_eq!(
            next_status(&trip, fixed_time("2026-05-06T00:00:00Z")),
            Some(TripStatus::Completed)
        );
        assert_eq!(next_status(&trip, fixed_time("2026-05-04T12:00:00Z")), None);
    }

    #[test]
    fn active_completes_on_the_end_date_once_every_timed_item_is_past() {
        let trip = trip(
            TripStatus::Active,
            Vec::new(),
            vec![
                schedule("sch-1", 0, Some("09:00"), Some("10:00")),
                schedule("sch-2", 1, Some("11:00"), None),
            ],
        );
        assert_eq!(next_status(&trip, fixed_time("2026-05-05T10:30:00Z")), None);
        assert_eq!(
            next_status(&trip, fixed_time("2026-05-05T11:00:00Z")),
            Some(TripStatus::Completed)
        );
    }

    #[test]
    fn completed_never_regresses() {
        let trip = trip(TripStatus::Completed, Vec::new(), Vec::new());
        assert_eq!(next_status(&trip, fixed_time("2026-05-10T00:00:00Z")), None);
    }

    #[test]
    fn schedule_time_status_tracks_the_clock() {
        let date = NaiveDate::from_ymd_opt(2026, 5, 4).expect("valid date");
        let timed = schedule("sch-1", 0, Some("09:00"), Some("10:00"));
        assert_eq!(
            schedule_time_status(&timed, date, fixed_time("2026-05-04T08:00:00Z")),
            ScheduleTimeStatus::Upcoming
        );
        assert_eq!(
            schedule_time_status(&timed, date, fixed_time("2026-05-04T09:30:00Z")),
            ScheduleTimeStatus::Current
        );
        assert_eq!(
            schedule_time_status(&timed, date, fixed_time("2026-05-04T10:00:00Z")),
            ScheduleTimeStatus::Past
        );

        let untimed = schedule("sch-2", 1, None, None);
        assert_eq!(
            schedule_time_status(&untimed, date, fixed_time("2026-05-04T23:00:00Z")),
            ScheduleTimeStatus::Upcoming
        );

        let mut overnight = schedule("sch-3", 2, Some("18:00"), Some("10:00"));
        overnight.end_day_offset = Some(1);
        assert_eq!(
            schedule_time_status(&overnight, date, fixed_time("2026-05-05T09:00:00Z")),
            ScheduleTimeStatus::Current
        );
        assert_eq!(
            schedule_time_status(&overnight, date, fixed_time("2026-05-05T10:00:00Z")),
            ScheduleTimeStatus::Past
        );
    }
}
