use std::{
    collections::{BTreeMap, HashMap},
    ops::Bound,
    sync::Arc,
};

use async_trait::async_trait;
use parking_lot::RwLock;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    tx::{EncryptedBody, TxContext, TxOp},
    CaStore, CertificateRequestStore, CertificateStore, PolicyStore, ProfileStore,
};
use crate::{
    ca::CertificateAuthority,
    cert::{Certificate, CertificateStatus},
    error::{PkiError, Result},
    policy::{ensure_policy_deletable, validate_policy_definition, CertificatePolicy, CompiledPolicy},
    profile::{ApiEnrollmentConfig, CertificateProfile, EstEnrollmentConfig, ProfileWithConfigs},
    ra::{CertificateRequest, RequestStatus},
};

#[derive(Clone, Default)]
struct State {
    policies: HashMap<Uuid, Arc<CompiledPolicy>>,
    profiles: HashMap<Uuid, CertificateProfile>,
    api_configs: HashMap<Uuid, ApiEnrollmentConfig>,
    est_configs: HashMap<Uuid, EstEnrollmentConfig>,
    cas: HashMap<Uuid, CertificateAuthority>,
    requests: HashMap<Uuid, CertificateRequest>,
    certificates: BTreeMap<Uuid, Certificate>,
    bodies: HashMap<Uuid, EncryptedBody>,
    secrets: HashMap<Uuid, Vec<u8>>,
}

impl State {
    fn certificate_mut(&mut self, id: Uuid) -> Result<&mut Certificate> {
        self.certificates
            .get_mut(&id)
            .ok_or_else(|| PkiError::TransientInfra(format!("Certificate {id} not found")))
    }

    fn ensure_certificate(&self, id: Uuid) -> Result<()> {
        if self.certificates.contains_key(&id) {
            Ok(())
        } else {
            Err(PkiError::TransientInfra(format!("Certificate {id} not found")))
        }
    }

    fn apply(&mut self, op: TxOp) -> Result<()> {
        match op {
            TxOp::CreateCertificate(cert) => {
                if self.certificates.contains_key(&cert.id) {
                    return Err(PkiError::TransientInfra(format!(
                        "Certificate {} already exists",
                        cert.id
                    )));
                }
                self.certificates.insert(cert.id, *cert);
            }
            TxOp::StoreBody {
                certificate_id,
                body,
            } => {
                self.ensure_certificate(certificate_id)?;
                self.bodies.insert(certificate_id, body);
            }
            TxOp::StoreSecret {
                certificate_id,
                encrypted_private_key,
            } => {
                self.ensure_certificate(certificate_id)?;
                self.secrets.insert(certificate_id, encrypted_private_key);
            }
            TxOp::UpdateCertificate {
                certificate_id,
                patch,
            } => patch.apply(self.certificate_mut(certificate_id)?),
            TxOp::MarkRequestIssued {
                request_id,
                certificate_id,
            } => {
                self.ensure_certificate(certificate_id)?;
                let request = self.requests.get_mut(&request_id).ok_or_else(|| {
                    PkiError::TransientInfra(format!("Certificate request {request_id} not found"))
                })?;
                request.status.ensure_transition(RequestStatus::Issued)?;
                request.status = RequestStatus::Issued;
                request.certificate_id = Some(certificate_id);
                request.error_message = None;
                request.updated_at = OffsetDateTime::now_utc();
            }
            TxOp::CopyMetadata {
                certificate_id,
                metadata,
            } => self.certificate_mut(certificate_id)?.metadata.extend(metadata),
        }
        Ok(())
    }
}

/// 内存存储，实现全部存储接口
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 校验并编译后保存策略
    pub fn insert_policy(&self, policy: CertificatePolicy) -> Result<()> {
        validate_policy_definition(&policy)?;
        let compiled = Arc::new(CompiledPolicy::compile(&policy));
        self.state.write().policies.insert(policy.id, compiled);
        Ok(())
    }

    /// 仍被配置文件引用的策略不能删除
    pub fn delete_policy(&self, policy_id: Uuid) -> Result<()> {
        let mut state = self.state.write();
        let referencing: Vec<String> = state
            .profiles
            .values()
            .filter(|p| p.policy_id == policy_id)
            .map(|p| p.slug.clone())
            .collect();
        ensure_policy_deletable(policy_id, &referencing)?;
        state
            .policies
            .remove(&policy_id)
            .map(|_| ())
            .ok_or_else(|| PkiError::NotFound("Certificate policy not found".to_string()))
    }

    pub fn insert_profile(
        &self,
        profile: CertificateProfile,
        api_config: Option<ApiEnrollmentConfig>,
        est_config: Option<EstEnrollmentConfig>,
    ) -> Result<()> {
        profile.validate()?;
        let mut state = self.state.write();
        if let Some(config) = api_config {
            state.api_configs.insert(profile.id, config);
        }
        if let Some(config) = est_config {
            state.est_configs.insert(profile.id, config);
        }
        state.profiles.insert(profile.id, profile);
        Ok(())
    }

    pub fn set_api_config(&self, profile_id: Uuid, config: ApiEnrollmentConfig) {
        self.state.write().api_configs.insert(profile_id, config);
    }

    pub fn insert_ca(&self, ca: CertificateAuthority) {
        self.state.write().cas.insert(ca.id, ca);
    }

    pub fn insert_request(&self, request: CertificateRequest) {
        self.state.write().requests.insert(request.id, request);
    }

    /// 直接写入证书记录（导入或测试数据）
    pub fn insert_certificate(&self, cert: Certificate, encrypted_private_key: Option<Vec<u8>>) {
        let mut state = self.state.write();
        if let Some(secret) = encrypted_private_key {
            state.secrets.insert(cert.id, secret);
        }
        state.certificates.insert(cert.id, cert);
    }

    pub fn certificate(&self, id: Uuid) -> Option<Certificate> {
        self.state.read().certificates.get(&id).cloned()
    }

    pub fn certificates(&self) -> Vec<Certificate> {
        self.state.read().certificates.values().cloned().collect()
    }

    pub fn request(&self, id: Uuid) -> Option<CertificateRequest> {
        self.state.read().requests.get(&id).cloned()
    }

    pub fn body(&self, certificate_id: Uuid) -> Option<EncryptedBody> {
        self.state.read().bodies.get(&certificate_id).cloned()
    }

    pub fn secret(&self, certificate_id: Uuid) -> Option<Vec<u8>> {
        self.state.read().secrets.get(&certificate_id).cloned()
    }
}

#[async_trait]
impl PolicyStore for MemoryStore {
    async fn find_policy_by_id(&self, id: Uuid) -> Result<Option<Arc<CompiledPolicy>>> {
        Ok(self.state.read().policies.get(&id).cloned())
    }

    async fn referencing_profiles(&self, policy_id: Uuid) -> Result<Vec<String>> {
        Ok(self
            .state
            .read()
            .profiles
            .values()
            .filter(|p| p.policy_id == policy_id)
            .map(|p| p.slug.clone())
            .collect())
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn find_by_id_with_configs(&self, id: Uuid) -> Result<Option<ProfileWithConfigs>> {
        let state = self.state.read();
        Ok(state.profiles.get(&id).map(|profile| ProfileWithConfigs {
            api_config: state.api_configs.get(&id).copied(),
            est_config: state.est_configs.get(&id).cloned(),
            ca: profile.ca_id.and_then(|ca_id| state.cas.get(&ca_id).cloned()),
            profile: profile.clone(),
        }))
    }
}

#[async_trait]
impl CaStore for MemoryStore {
    async fn find_ca_by_id(&self, id: Uuid) -> Result<Option<CertificateAuthority>> {
        Ok(self.state.read().cas.get(&id).cloned())
    }
}

#[async_trait]
impl CertificateRequestStore for MemoryStore {
    async fn find_request_by_id(&self, id: Uuid) -> Result<Option<CertificateRequest>> {
        Ok(self.state.read().requests.get(&id).cloned())
    }

    async fn update_request_status(
        &self,
        id: Uuid,
        status: RequestStatus,
        error_message: Option<String>,
    ) -> Result<()> {
        let mut state = self.state.write();
        let request = state
            .requests
            .get_mut(&id)
            .ok_or_else(|| PkiError::NotFound("Certificate request not found".to_string()))?;
        request.status.ensure_transition(status)?;
        request.status = status;
        request.error_message = error_message;
        request.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }
}

#[async_trait]
impl CertificateStore for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Certificate>> {
        Ok(self.certificate(id))
    }

    async fn has_secret(&self, id: Uuid) -> Result<bool> {
        Ok(self.state.read().secrets.contains_key(&id))
    }

    async fn find_renewal_candidates(&self, after: Option<Uuid>, limit: usize) -> Result<Vec<Certificate>> {
        let state = self.state.read();
        let lower = after.map_or(Bound::Unbounded, Bound::Excluded);
        Ok(state
            .certificates
            .range((lower, Bound::Unbounded))
            .map(|(_, cert)| cert)
            .filter(|cert| {
                cert.profile_id.is_some()
                    && cert.status == CertificateStatus::Active
                    && cert.renewed_by_certificate_id.is_none()
                    && cert.renewal_error.is_none()
                    && cert.revoked_at.is_none()
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn set_renewal_error(&self, id: Uuid, error: Option<String>) -> Result<()> {
        self.state.write().certificate_mut(id)?.renewal_error = error;
        Ok(())
    }

    async fn set_renew_before_days(&self, id: Uuid, days: Option<u32>) -> Result<()> {
        self.state.write().certificate_mut(id)?.renew_before_days = days;
        Ok(())
    }

    async fn commit(&self, tx: TxContext) -> Result<()> {
        let mut state = self.state.write();
        let mut staged = state.clone();
        for op in tx.into_ops() {
            staged.apply(op)?;
        }
        *state = staged;
        Ok(())
    }
}
