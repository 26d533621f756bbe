use crate::infrastructure::error::PlannerError;
use rusqlite::Connection;
use std::path::Path;

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

/// Creates the schedule tree schema if it is not present yet. The schema is
/// idempotent, so re-running against an existing database is a no-op.
pub fn initialize_database(path: &Path) -> Result<(), PlannerError> {
    let connection = Connection::open(path)?;
    connection.pragma_update(None, "foreign_keys", true)?;
    connection.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
