use std::sync::Arc;

use certflow_pki::{
    CertificateAuthority, InternalCaSigner, IssuanceDeps, IssuanceOrchestrator, LocalKeyVault,
    MemoryIssuanceQueue, MemoryStore, RenewalJob,
};
use uuid::Uuid;

use crate::{error::Result, settings::Settings};

/// 进程内共享状态
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MemoryStore>,
    pub orchestrator: Arc<IssuanceOrchestrator>,
    pub root_ca: CertificateAuthority,
}

impl AppState {
    /// 组装存储、签发器与保管库，并引导根CA
    pub fn bootstrap(settings: &Settings) -> Result<Self> {
        let store = Arc::new(MemoryStore::new());
        let signer = Arc::new(InternalCaSigner::new());
        let vault = match &settings.vault.master_key_hex {
            Some(master_key_hex) => LocalKeyVault::from_hex(master_key_hex)?,
            None => {
                tracing::warn!("no vault master key configured, using an ephemeral key");
                LocalKeyVault::generate()?
            }
        };

        let project_id = settings.service.project_id.unwrap_or_else(Uuid::new_v4);
        let root_ca = signer.bootstrap_root(project_id, &settings.ca)?;
        store.insert_ca(root_ca.clone());
        tracing::info!(
            ca_id = %root_ca.id,
            project_id = %project_id,
            name = %root_ca.name,
            "root CA ready"
        );

        let deps = IssuanceDeps::with_memory_store(
            store.clone(),
            signer,
            Arc::new(vault),
            Arc::new(MemoryIssuanceQueue::new()),
        );

        Ok(Self {
            store,
            orchestrator: Arc::new(IssuanceOrchestrator::new(deps)),
            root_ca,
        })
    }

    pub fn renewal_job(&self, settings: &Settings) -> RenewalJob {
        RenewalJob::new(self.orchestrator.clone(), settings.renewal.job_config())
    }
}
