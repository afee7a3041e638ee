mod logic;
pub(crate) mod archive;
pub(crate) mod db_dump;
pub(crate) mod retention;
pub(crate) mod s3_upload;
pub(crate) mod targets;

pub use logic::{report_outcome, RunOutcome};
pub use targets::TargetFlags;

use crate::config::AppConfig;
use crate::notify::Notifier;
use crate::storage::s3::SpacesStore;
use db_dump::MysqlDump;
use logic::{BackupRun, RunClock};
use retention::RetentionPolicy;
use targets::{MySqlCatalogue, TargetRequest};

/// Public entry point for the backup process: wires the MySQL, mysqldump and
/// object-store collaborators from the configuration and runs the pipeline once.
pub async fn run_backup_flow(
    app_config: &AppConfig,
    flags: TargetFlags,
    notifier: &dyn Notifier,
) -> RunOutcome {
    let catalogue = MySqlCatalogue::new(&app_config.database);
    let exporter = MysqlDump::new(&app_config.database, app_config.mysqldump_path.clone());
    let store = SpacesStore::connect(&app_config.spaces).await;

    let run = BackupRun {
        request: TargetRequest::new(&app_config.database.databases, flags),
        catalogue: &catalogue,
        exporter: &exporter,
        store: &store,
        notifier,
        retention: RetentionPolicy::new(&app_config.spaces.root_folder, app_config.retention_days),
        root_folder: app_config.spaces.root_folder.clone(),
        work_dir: app_config.work_dir.clone(),
        clock: RunClock::now(),
    };
    run.execute().await
}
