use crate::infrastructure::config::{
    ensure_default_configs, load_configs, read_auto_status_enabled, read_cascade_preview_limit,
    read_default_pattern_label,
};
use crate::infrastructure::error::PlannerError;
use crate::infrastructure::storage::initialize_database;
use std::fs;
use std::path::{Path, PathBuf};

/// Snapshot of the planner configuration taken at startup. The command layer
/// reads from this snapshot instead of re-opening the config files per call.
#[derive(Debug, Clone)]
pub struct PlannerSettings {
    pub cascade_preview_limit: usize,
    pub auto_status_enabled: bool,
    pub default_pattern_label: String,
}

#[derive(Debug)]
pub struct BootstrapResult {
    pub workspace_root: PathBuf,
    pub config_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub database_path: PathBuf,
    pub settings: PlannerSettings,
}

/// Lays out the workspace (`config/`, `state/`, `logs/`), writes any missing
/// config files, validates their schema, initializes the schedule database
/// and takes the settings snapshot the session runs with.
pub fn bootstrap_workspace(workspace_root: &Path) -> Result<BootstrapResult, PlannerError> {
    let config_dir = workspace_root.join("config");
    let state_dir = workspace_root.join("state");
    let logs_dir = workspace_root.join("logs");
    let database_path = state_dir.join("tripweave.sqlite");

    fs::create_dir_all(&config_dir)?;
    fs::create_dir_all(&state_dir)?;
    fs::create_dir_all(&logs_dir)?;

    ensure_default_configs(&config_dir)?;
    load_configs(&config_dir)?;
    let settings = PlannerSettings {
        cascade_preview_limit: read_cascade_preview_limit(&config_dir),
        auto_status_enabled: read_auto_status_enabled(&config_dir),
        default_pattern_label: read_default_pattern_label(&config_dir)?,
    };
    initialize_database(&database_path)?;

    Ok(BootstrapResult {
        workspace_root: workspace_root.to_path_buf(),
        config_dir,
        logs_dir,
        database_path,
        settings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_ROOT: AtomicUsize = AtomicUsize::new(0);

    fn temp_root() -> PathBuf {
        let sequence = NEXT_TEMP_ROOT.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!(
            "tripweave-bootstrap-tests-{}-{sequence}",
            std::process::id()
        ))
    }

    #[test]
    fn bootstrap_lays_out_the_workspace_with_default_settings() {
        let root = temp_root();
        let result = bootstrap_workspace(&root).expect("bootstrap");

        assert!(result.config_dir.join("app.json").exists());
        assert!(result.config_dir.join("planner.json").exists());
        assert!(result.database_path.exists());
        assert!(result.logs_dir.exists());
        assert_eq!(result.settings.cascade_preview_limit, 5);
        assert!(result.settings.auto_status_enabled);
        assert_eq!(result.settings.default_pattern_label, "Plan A");

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn bootstrap_picks_up_an_edited_planner_config() {
        let root = temp_root();
        bootstrap_workspace(&root).expect("first bootstrap");
        fs::write(
            root.join("config").join("planner.json"),
            "{\"schema\": 1, \"cascadePreviewLimit\": 2, \"autoStatusEnabled\": false}\n",
        )
        .expect("write planner config");

        let result = bootstrap_workspace(&root).expect("second bootstrap");
        assert_eq!(result.settings.cascade_preview_limit, 2);
        assert!(!result.settings.auto_status_enabled);

        let _ = fs::remove_dir_all(&root);
    }
}
