//! 签发与续期测试共用的内存环境

use std::sync::Arc;

use uuid::Uuid;

use super::{IssuanceDeps, IssuanceOrchestrator, MemoryIssuanceQueue};
use crate::{
    ca::{CaConfig, CaStatus, CaType, CertificateAuthority, InternalCaSigner},
    keystore::LocalKeyVault,
    policy::{AlgorithmPolicy, AttributeRule, CertificatePolicy, PatternRule, SanRule, UsageRule, ValidityPolicy},
    profile::{ApiEnrollmentConfig, CertificateProfile, EnrollmentType, IssuerType, ProfileDefaults},
    ra::{CertificateRequestInput, SubjectFields},
    store::MemoryStore,
    types::{ExtendedKeyUsage, KeyUsage, SanType, SubjectAttributeType, SubjectAltName, Ttl},
};

pub(crate) struct Fixture {
    pub project_id: Uuid,
    pub store: Arc<MemoryStore>,
    pub signer: Arc<InternalCaSigner>,
    pub vault: Arc<LocalKeyVault>,
    pub queue: Arc<MemoryIssuanceQueue>,
    pub orchestrator: IssuanceOrchestrator,
}

fn allowed(values: &[&str]) -> PatternRule {
    PatternRule {
        allowed: Some(values.iter().map(|v| v.to_string()).collect()),
        ..Default::default()
    }
}

impl Fixture {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let signer = Arc::new(InternalCaSigner::new());
        let vault = Arc::new(LocalKeyVault::new([7u8; 32]));
        let queue = Arc::new(MemoryIssuanceQueue::new());
        let orchestrator = IssuanceOrchestrator::new(IssuanceDeps::with_memory_store(
            store.clone(),
            signer.clone(),
            vault.clone(),
            queue.clone(),
        ));
        Self {
            project_id: Uuid::new_v4(),
            store,
            signer,
            vault,
            queue,
            orchestrator,
        }
    }

    /// `*.example.com` 主机、服务端用途、ECDSA/RSA SHA256、最长 90 天
    pub fn web_policy(&self) -> CertificatePolicy {
        let mut policy = CertificatePolicy::empty(self.project_id, "web-server");
        policy.subject = Some(vec![AttributeRule {
            attribute: SubjectAttributeType::CommonName,
            rule: allowed(&["*.example.com"]),
        }]);
        policy.sans = Some(vec![SanRule {
            san_type: SanType::DnsName,
            rule: allowed(&["*.example.com"]),
        }]);
        policy.key_usages = Some(UsageRule {
            allowed: Some(vec![KeyUsage::DigitalSignature, KeyUsage::KeyEncipherment]),
            ..Default::default()
        });
        policy.extended_key_usages = Some(UsageRule {
            allowed: Some(vec![ExtendedKeyUsage::ServerAuth]),
            ..Default::default()
        });
        policy.algorithms = Some(AlgorithmPolicy {
            signature: Some(vec!["SHA256-ECDSA".into(), "SHA256-RSA".into()]),
            key_algorithm: Some(vec!["ECDSA-P256".into(), "RSA-2048".into()]),
        });
        policy.validity = Some(ValidityPolicy {
            max: Some("90d".into()),
        });
        policy
    }

    pub fn add_policy(&self, policy: CertificatePolicy) -> Uuid {
        let id = policy.id;
        self.store.insert_policy(policy).unwrap();
        id
    }

    pub fn internal_root(&self) -> CertificateAuthority {
        let ca = self
            .signer
            .bootstrap_root(self.project_id, &CaConfig::root_ca("Test Root CA"))
            .unwrap();
        self.store.insert_ca(ca.clone());
        ca
    }

    pub fn external_ca(&self, ca_type: CaType) -> CertificateAuthority {
        let ca = CertificateAuthority {
            id: Uuid::new_v4(),
            project_id: self.project_id,
            name: format!("{ca_type} issuer"),
            ca_type,
            status: CaStatus::Active,
            key_algorithm: None,
            not_after: None,
        };
        self.store.insert_ca(ca.clone());
        ca
    }

    pub fn add_profile(
        &self,
        issuer_type: IssuerType,
        ca_id: Option<Uuid>,
        policy_id: Uuid,
        api_config: Option<ApiEnrollmentConfig>,
    ) -> Uuid {
        self.add_profile_with(issuer_type, EnrollmentType::Api, ca_id, policy_id, api_config)
    }

    pub fn add_profile_with(
        &self,
        issuer_type: IssuerType,
        enrollment_type: EnrollmentType,
        ca_id: Option<Uuid>,
        policy_id: Uuid,
        api_config: Option<ApiEnrollmentConfig>,
    ) -> Uuid {
        let profile = CertificateProfile {
            id: Uuid::new_v4(),
            project_id: self.project_id,
            slug: "web".into(),
            issuer_type,
            enrollment_type,
            ca_id,
            policy_id,
            defaults: ProfileDefaults {
                ttl: Some(Ttl::days(30)),
                key_usages: Some(vec![KeyUsage::DigitalSignature, KeyUsage::KeyEncipherment]),
                extended_key_usages: Some(vec![ExtendedKeyUsage::ServerAuth]),
                ..Default::default()
            },
        };
        let id = profile.id;
        self.store.insert_profile(profile, api_config, None).unwrap();
        id
    }
}

/// 满足 `web_policy` 的请求
pub(crate) fn web_request(host: &str) -> CertificateRequestInput {
    CertificateRequestInput {
        subject: SubjectFields::with_common_name(host),
        subject_alt_names: Some(vec![SubjectAltName::dns(host)]),
        signature_algorithm: Some(crate::types::SignatureAlgorithm::EcdsaSha256),
        key_algorithm: Some(crate::types::KeyAlgorithm::EcdsaP256),
        ..Default::default()
    }
}
