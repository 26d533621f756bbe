use crate::domain::models::{Trip, TripStatus};
use crate::domain::status::next_status;
use crate::infrastructure::error::PlannerError;
use crate::infrastructure::trip_store::TripStore;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

const MAX_ATTEMPTS: u8 = 3;

/// Advances a trip's status along planned -> active -> completed when the
/// clock says so. Transitions are background work: a write that keeps
/// failing is retried on later ticks, and after the attempt budget for that
/// target status is spent the service goes quiet instead of surfacing an
/// error to the user. The attempt counters outlive any one store handle, so
/// the service is meant to be held for the life of the session.
pub struct StatusTransitionService {
    now_provider: NowProvider,
    attempts: Mutex<HashMap<(String, TripStatus), u8>>,
}

impl Default for StatusTransitionService {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusTransitionService {
    pub fn new() -> Self {
        Self {
            now_provider: Arc::new(Utc::now),
            attempts: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    /// Checks one trip and writes the due transition, if any. Only owners
    /// and editors write; a viewer's clock never changes shared state.
    /// Returns the status that was written, or `None` when nothing was due
    /// or the write was skipped.
    pub async fn tick<S: TripStore + ?Sized>(
        &self,
        trip_store: &S,
        trip: &Trip,
    ) -> Result<Option<TripStatus>, PlannerError> {
        if !trip.role.can_edit() {
            return Ok(None);
        }
        let Some(target) = next_status(trip, (self.now_provider)()) else {
            return Ok(None);
        };
        if self.attempts_spent(&trip.id, target)? {
            return Ok(None);
        }

        match trip_store.write_trip_status(&trip.id, trip.status, target).await {
            Ok(()) => {
                self.reset_attempts(&trip.id, target)?;
                Ok(Some(target))
            }
            // Another collaborator won the write, or the trip is gone.
            // Either way the transition is not this client's to make.
            Err(PlannerError::Conflict { .. }) | Err(PlannerError::Gone { .. }) => {
                self.reset_attempts(&trip.id, target)?;
                Ok(None)
            }
            Err(_) => {
                self.record_attempt(&trip.id, target)?;
                Ok(None)
            }
        }
    }

    fn lock_attempts(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<(String, TripStatus), u8>>, PlannerError> {
        self.attempts.lock().map_err(|error| {
            PlannerError::InvalidInput(format!("attempt counter lock poisoned: {error}"))
        })
    }

    fn attempts_spent(&self, trip_id: &str, target: TripStatus) -> Result<bool, PlannerError> {
        let attempts = self.lock_attempts()?;
        Ok(attempts
            .get(&(trip_id.to_string(), target))
            .is_some_and(|count| *count >= MAX_ATTEMPTS))
    }

    fn record_attempt(&self, trip_id: &str, target: TripStatus) -> Result<(), PlannerError> {
        let mut attempts = self.lock_attempts()?;
        *attempts.entry((trip_id.to_string(), target)).or_insert(0) += 1;
        Ok(())
    }

    fn reset_attempts(&self, trip_id: &str, target: TripStatus) -> Result<(), PlannerError> {
        let mut attempts = self.lock_attempts()?;
        attempts.remove(&(trip_id.to_string(), target));
        Ok(())
    }
}
