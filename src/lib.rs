pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::bootstrap::{BootstrapResult, PlannerSettings, bootstrap_workspace};
pub use application::commands::AppState;
pub use application::selection::{BatchCoordinator, ScheduleSelection, SelectionTarget};
pub use application::status_transition::StatusTransitionService;
pub use application::timeline::TimelineService;
pub use domain::models::{Day, Pattern, ScheduleCategory, ScheduleItem, Trip, TripStatus, UserRole};
pub use domain::time::TimeOfDay;
pub use infrastructure::error::PlannerError;
pub use infrastructure::trip_store::{
    BatchOp, BatchOutcome, FieldPatch, InMemoryTripStore, SchedulePatch, SqliteTripStore,
    TripStore,
};
