mod error;
mod logging;
mod settings;
mod state;

use std::sync::Arc;

use certflow_pki::{JobSpec, Scheduler};
use settings::Settings;

use crate::{error::Result, logging::init_tracing, state::AppState};

const RENEWAL_JOB: &str = "certificate-auto-renewal";

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/services.toml".to_string());
    let settings = Settings::load_or_default(&config_path)?;
    init_tracing(&settings.log)?;
    tracing::info!(config = %config_path, "settings loaded");

    let state = AppState::bootstrap(&settings)?;
    tracing::info!(
        root_ca_id = %state.root_ca.id,
        certificates = state.store.certificates().len(),
        "certificate store ready"
    );

    let scheduler = Scheduler::new();
    if settings.renewal.enabled {
        scheduler.ensure(
            JobSpec {
                name: RENEWAL_JOB.to_string(),
                schedule: settings.renewal.run_at,
                start_delay: settings.renewal.start_delay(),
            },
            Arc::new(state.renewal_job(&settings)),
        );
    } else {
        tracing::info!("automatic renewal disabled");
    }

    tracing::info!("PKI renewal daemon started");
    tokio::signal::ctrl_c().await?;

    tracing::info!("shutting down");
    scheduler.shutdown().await;
    Ok(())
}
