use anyhow::{Result, anyhow};
use tokio::time::Instant;
use tracing::{error, info, trace, warn};

use rgw_migrate::Config;
use rgw_migrate::pipeline::Pipeline;
use rgw_migrate::types::token::create_pipeline_cancellation_token;
use rgw_migrate::types::{MIGRATION_SUMMARY_NAME, MigrationSummary};

mod ctrl_c_handler;

/// Failed objects or skipped owners do not fail the process, only a run that could not start does.
pub async fn run(config: Config) -> Result<()> {
    let cancellation_token = create_pipeline_cancellation_token();

    ctrl_c_handler::spawn_ctrl_c_handler(cancellation_token.clone());

    let start_time = Instant::now();
    trace!("migration pipeline start.");

    let mut pipeline = Pipeline::new(config, cancellation_token)?;
    pipeline.run().await;

    let duration_sec = format!("{:.3}", start_time.elapsed().as_secs_f32());
    if pipeline.has_error() {
        error!(duration_sec = duration_sec, "rgw-migrate failed.");

        return Err(anyhow!("rgw-migrate failed."));
    }

    let summary = pipeline.get_summary();
    show_migration_summary(&summary);

    if summary.is_rerun_recommended() {
        warn!("some items were not migrated, run rgw-migrate again to retry them.");
    } else if pipeline.has_warning() {
        warn!("rgw-migrate has been completed with warnings.");
    }

    trace!(duration_sec = duration_sec, "rgw-migrate has been completed.");

    Ok(())
}

fn show_migration_summary(summary: &MigrationSummary) {
    info!(
        name = MIGRATION_SUMMARY_NAME,
        identities_touched = summary.identities_touched,
        identities_created = summary.identities_created,
        containers_touched = summary.containers_touched,
        containers_created = summary.containers_created,
        objects_checked = summary.objects_checked,
        objects_up_to_date = summary.objects_up_to_date,
        stale_objects_deleted = summary.stale_objects_deleted,
        objects_attempted = summary.objects_attempted,
        objects_succeeded = summary.objects_succeeded,
        objects_failed = summary.objects_failed,
        objects_dry_run = summary.objects_dry_run,
        bytes_transferred = summary.bytes_transferred,
        unrecognized_owners = summary.unrecognized_owners,
        provisioning_failures = summary.provisioning_failures,
        listing_failures = summary.listing_failures,
    );
}
