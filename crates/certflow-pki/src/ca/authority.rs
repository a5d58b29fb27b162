//! CA核心机构实现
//!
//! 进程内CA：持有 CA 密钥与证书，为内部CA签发证书与签署CSR

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, CertificateSigningRequestParams, IsCa,
    KeyPair, KeyUsagePurpose,
};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use super::{
    config::CaConfig,
    signer::{CaIssuedCertificate, CaSigner, IssueFromCaParams, SignFromCaParams},
    CaStatus, CaType, CertificateAuthority,
};
use crate::{
    cert::{alt_names_string, generator::distinguished_name, CertificateSpec},
    csr::Csr,
    error::{PkiError, Result},
    keystore::generate_key_pair,
    ra::SubjectFields,
};

/// 证书颁发机构
struct Authority {
    /// CA摘要
    summary: CertificateAuthority,
    /// CA密钥对
    key_pair: KeyPair,
    /// CA证书
    certificate: Certificate,
    /// 上级CA证书链（根CA为空）
    parent_chain_pem: String,
    /// 已签发证书计数
    issued_count: u64,
}

impl Authority {
    fn certificate_pem(&self) -> String {
        self.certificate.pem()
    }

    /// 本CA到根CA的证书链
    fn chain_pem(&self) -> String {
        let mut chain = self.certificate_pem();
        chain.push_str(&self.parent_chain_pem);
        chain
    }

    fn ensure_can_issue(&self, not_after: OffsetDateTime) -> Result<()> {
        if !self.summary.is_active() {
            return Err(PkiError::BadRequest(format!(
                "Certificate Authority is {}, must be active",
                self.summary.status
            )));
        }
        if let Some(ca_not_after) = self.summary.not_after {
            if not_after > ca_not_after {
                return Err(PkiError::BadRequest(format!(
                    "Certificate expiry ({not_after}) exceeds issuing CA expiry ({ca_not_after})"
                )));
            }
        }
        Ok(())
    }
}

/// 内部CA签发器
#[derive(Default)]
pub struct InternalCaSigner {
    authorities: RwLock<HashMap<Uuid, Authority>>,
}

impl InternalCaSigner {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建新的根CA
    pub fn bootstrap_root(&self, project_id: Uuid, config: &CaConfig) -> Result<CertificateAuthority> {
        let key_pair = generate_key_pair(config.key_algorithm, config.signature_algorithm)?;
        let params = ca_params(config, OffsetDateTime::now_utc())?;
        let not_after = params.not_after;

        let certificate = params
            .self_signed(&key_pair)
            .map_err(|e| PkiError::GenerationError(format!("Failed to create root CA certificate: {e}")))?;

        let summary = CertificateAuthority {
            id: Uuid::new_v4(),
            project_id,
            name: config.name.clone(),
            ca_type: CaType::Internal,
            status: CaStatus::Active,
            key_algorithm: Some(config.key_algorithm.as_str().to_string()),
            not_after: Some(not_after),
        };

        tracing::info!(ca_id = %summary.id, name = %summary.name, "bootstrapped root CA");

        self.authorities.write().insert(
            summary.id,
            Authority {
                summary: summary.clone(),
                key_pair,
                certificate,
                parent_chain_pem: String::new(),
                issued_count: 0,
            },
        );
        Ok(summary)
    }

    /// 使用父CA签发中间CA
    pub fn create_intermediate(&self, parent_id: Uuid, config: &CaConfig) -> Result<CertificateAuthority> {
        let key_pair = generate_key_pair(config.key_algorithm, config.signature_algorithm)?;
        let params = ca_params(config, OffsetDateTime::now_utc())?;
        let not_after = params.not_after;

        let mut authorities = self.authorities.write();
        let parent = authorities
            .get_mut(&parent_id)
            .ok_or_else(|| PkiError::NotFound("Certificate Authority not found".to_string()))?;
        parent.ensure_can_issue(not_after)?;

        let certificate = params
            .signed_by(&key_pair, &parent.certificate, &parent.key_pair)
            .map_err(|e| {
                PkiError::SigningError(format!("Failed to sign intermediate CA certificate: {e}"))
            })?;
        parent.issued_count += 1;

        let summary = CertificateAuthority {
            id: Uuid::new_v4(),
            project_id: parent.summary.project_id,
            name: config.name.clone(),
            ca_type: CaType::Internal,
            status: CaStatus::Active,
            key_algorithm: Some(config.key_algorithm.as_str().to_string()),
            not_after: Some(not_after),
        };
        let parent_chain_pem = parent.chain_pem();

        authorities.insert(
            summary.id,
            Authority {
                summary: summary.clone(),
                key_pair,
                certificate,
                parent_chain_pem,
                issued_count: 0,
            },
        );
        Ok(summary)
    }

    /// CA摘要
    pub fn authority(&self, ca_id: Uuid) -> Option<CertificateAuthority> {
        self.authorities.read().get(&ca_id).map(|a| a.summary.clone())
    }

    /// 所有CA摘要
    pub fn authorities(&self) -> Vec<CertificateAuthority> {
        self.authorities
            .read()
            .values()
            .map(|a| a.summary.clone())
            .collect()
    }

    /// 修改CA状态
    pub fn set_status(&self, ca_id: Uuid, status: CaStatus) -> Result<()> {
        let mut authorities = self.authorities.write();
        let authority = authorities
            .get_mut(&ca_id)
            .ok_or_else(|| PkiError::NotFound("Certificate Authority not found".to_string()))?;
        authority.summary.status = status;
        Ok(())
    }

    /// CA证书PEM
    pub fn certificate_pem(&self, ca_id: Uuid) -> Option<String> {
        self.authorities.read().get(&ca_id).map(Authority::certificate_pem)
    }

    /// 已签发证书数量
    pub fn issued_count(&self, ca_id: Uuid) -> u64 {
        self.authorities
            .read()
            .get(&ca_id)
            .map(|a| a.issued_count)
            .unwrap_or_default()
    }

    fn issue(&self, params: IssueFromCaParams) -> Result<CaIssuedCertificate> {
        let key_pair = generate_key_pair(params.key_algorithm, params.signature_algorithm)?;
        let spec = CertificateSpec {
            subject: params.subject,
            sans: params.sans,
            key_usages: params.key_usages,
            extended_key_usages: params.extended_key_usages,
            not_before: params.not_before,
            not_after: params.not_after,
            is_ca: params.is_ca,
            path_length: params.path_length,
        };
        let (cert_params, serial_number) = spec.to_params()?;

        let mut authorities = self.authorities.write();
        let authority = authorities
            .get_mut(&params.ca_id)
            .ok_or_else(|| PkiError::NotFound("Certificate Authority not found".to_string()))?;
        authority.ensure_can_issue(spec.not_after)?;

        let certificate = cert_params
            .signed_by(&key_pair, &authority.certificate, &authority.key_pair)
            .map_err(|e| PkiError::SigningError(format!("Failed to sign certificate: {e}")))?;
        authority.issued_count += 1;

        tracing::debug!(
            ca_id = %params.ca_id,
            serial_number = %serial_number,
            "issued certificate from internal CA"
        );

        Ok(CaIssuedCertificate {
            certificate_pem: certificate.pem(),
            certificate_chain_pem: authority.chain_pem(),
            issuing_ca_certificate_pem: authority.certificate_pem(),
            private_key_pem: Some(key_pair.serialize_pem()),
            serial_number,
            common_name: spec.subject.common_name.clone(),
            alt_names: alt_names_string(&spec.sans),
            key_usages: spec.key_usages,
            extended_key_usages: spec.extended_key_usages,
            not_before: spec.not_before,
            not_after: spec.not_after,
        })
    }

    fn sign(&self, params: SignFromCaParams) -> Result<CaIssuedCertificate> {
        let normalized = Csr::from_pem(&params.csr_pem)?.normalized_request()?;
        let spec = CertificateSpec {
            subject: normalized.subject,
            // CSR 未携带的扩展不写入证书
            sans: normalized.subject_alt_names.unwrap_or_default(),
            key_usages: normalized.key_usages.unwrap_or_default(),
            extended_key_usages: normalized.extended_key_usages.unwrap_or_default(),
            not_before: params.not_before,
            not_after: params.not_after,
            is_ca: false,
            path_length: None,
        };
        let (cert_params, serial_number) = spec.to_params()?;

        let mut csr = CertificateSigningRequestParams::from_pem(&params.csr_pem)
            .map_err(|e| PkiError::MalformedInput(format!("Invalid CSR: {e}")))?;
        csr.params = cert_params;

        let mut authorities = self.authorities.write();
        let authority = authorities
            .get_mut(&params.ca_id)
            .ok_or_else(|| PkiError::NotFound("Certificate Authority not found".to_string()))?;
        authority.ensure_can_issue(spec.not_after)?;

        let certificate = csr
            .signed_by(&authority.certificate, &authority.key_pair)
            .map_err(|e| PkiError::SigningError(format!("Failed to sign CSR: {e}")))?;
        authority.issued_count += 1;

        tracing::debug!(
            ca_id = %params.ca_id,
            serial_number = %serial_number,
            "signed CSR with internal CA"
        );

        Ok(CaIssuedCertificate {
            certificate_pem: certificate.pem(),
            certificate_chain_pem: authority.chain_pem(),
            issuing_ca_certificate_pem: authority.certificate_pem(),
            private_key_pem: None,
            serial_number,
            common_name: spec.subject.common_name.clone(),
            alt_names: alt_names_string(&spec.sans),
            key_usages: spec.key_usages,
            extended_key_usages: spec.extended_key_usages,
            not_before: spec.not_before,
            not_after: spec.not_after,
        })
    }
}

#[async_trait]
impl CaSigner for InternalCaSigner {
    async fn issue_cert_from_ca(&self, params: IssueFromCaParams) -> Result<CaIssuedCertificate> {
        self.issue(params)
    }

    async fn sign_cert_from_ca(&self, params: SignFromCaParams) -> Result<CaIssuedCertificate> {
        self.sign(params)
    }
}

fn ca_params(config: &CaConfig, now: OffsetDateTime) -> Result<CertificateParams> {
    let subject = SubjectFields {
        common_name: Some(config.name.clone()),
        organization: config.organization.clone(),
        country: config.country.clone(),
        ..Default::default()
    };

    let mut params = CertificateParams::default();
    params.distinguished_name = distinguished_name(&subject);
    params.is_ca = IsCa::Ca(match config.max_path_length {
        Some(len) => BasicConstraints::Constrained(len),
        None => BasicConstraints::Unconstrained,
    });
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
    ];
    params.not_before = now.replace_nanosecond(0).unwrap_or(now);
    params.not_after = params.not_before + Duration::days(i64::from(config.validity_days));

    let (serial, _) = crate::cert::generator::random_serial()?;
    params.serial_number = Some(serial);
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cert::parse_certificate,
        csr::extract_request,
        types::{ExtendedKeyUsage, KeyAlgorithm, KeyUsage, SignatureAlgorithm, SubjectAltName},
    };

    fn issue_params(ca_id: Uuid, not_after: OffsetDateTime) -> IssueFromCaParams {
        let now = OffsetDateTime::now_utc();
        IssueFromCaParams {
            ca_id,
            subject: SubjectFields::with_common_name("api.example.com"),
            sans: vec![SubjectAltName::dns("api.example.com")],
            key_usages: vec![KeyUsage::DigitalSignature],
            extended_key_usages: vec![ExtendedKeyUsage::ServerAuth],
            not_before: now,
            not_after,
            signature_algorithm: SignatureAlgorithm::EcdsaSha256,
            key_algorithm: KeyAlgorithm::EcdsaP256,
            is_ca: false,
            path_length: None,
        }
    }

    #[tokio::test]
    async fn test_issue_from_root() {
        let signer = InternalCaSigner::new();
        let ca = signer.bootstrap_root(Uuid::new_v4(), &CaConfig::root_ca("Test Root")).unwrap();

        let issued = signer
            .issue_cert_from_ca(issue_params(ca.id, OffsetDateTime::now_utc() + Duration::days(30)))
            .await
            .unwrap();

        assert!(issued.private_key_pem.is_some());
        assert_eq!(issued.common_name.as_deref(), Some("api.example.com"));
        assert_eq!(issued.alt_names, "api.example.com");
        assert_eq!(issued.certificate_chain_pem, issued.issuing_ca_certificate_pem);

        let info = parse_certificate(issued.certificate_pem.as_bytes()).unwrap();
        assert!(!info.is_ca);
        assert_eq!(info.subject.common_name.as_deref(), Some("api.example.com"));
        assert_eq!(info.issuer.common_name.as_deref(), Some("Test Root"));
        assert_eq!(signer.issued_count(ca.id), 1);
    }

    #[tokio::test]
    async fn test_sign_csr() {
        let signer = InternalCaSigner::new();
        let ca = signer.bootstrap_root(Uuid::new_v4(), &CaConfig::root_ca("Test Root")).unwrap();

        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(vec!["csr.example.com".to_string()]).unwrap();
        params
            .distinguished_name
            .push(rcgen::DnType::CommonName, "csr.example.com");
        let csr_pem = params.serialize_request(&key).unwrap().pem().unwrap();

        let now = OffsetDateTime::now_utc();
        let issued = signer
            .sign_cert_from_ca(SignFromCaParams {
                ca_id: ca.id,
                csr_pem: csr_pem.clone(),
                not_before: now,
                not_after: now + Duration::days(7),
            })
            .await
            .unwrap();

        assert!(issued.private_key_pem.is_none());
        assert_eq!(issued.alt_names, "csr.example.com");
        // CSR 未请求用途扩展
        assert!(issued.key_usages.is_empty());
        assert!(issued.extended_key_usages.is_empty());
        let info = parse_certificate(issued.certificate_pem.as_bytes()).unwrap();
        assert_eq!(info.subject.common_name.as_deref(), Some("csr.example.com"));
        assert_eq!(
            extract_request(&csr_pem).unwrap().subject.common_name.as_deref(),
            Some("csr.example.com")
        );
    }

    #[tokio::test]
    async fn test_rsa_root_issues_rsa_leaf() {
        let signer = InternalCaSigner::new();
        let config = CaConfig::root_ca("RSA Root")
            .with_algorithms(KeyAlgorithm::Rsa2048, SignatureAlgorithm::RsaSha256);
        let ca = signer.bootstrap_root(Uuid::new_v4(), &config).unwrap();
        assert_eq!(ca.key_algorithm.as_deref(), Some("RSA_2048"));

        let issued = signer
            .issue_cert_from_ca(IssueFromCaParams {
                signature_algorithm: SignatureAlgorithm::RsaSha256,
                key_algorithm: KeyAlgorithm::Rsa2048,
                ..issue_params(ca.id, OffsetDateTime::now_utc() + Duration::days(30))
            })
            .await
            .unwrap();
        let info = parse_certificate(issued.certificate_pem.as_bytes()).unwrap();
        assert_eq!(info.issuer.common_name.as_deref(), Some("RSA Root"));
    }

    #[tokio::test]
    async fn test_rejects_expiry_beyond_ca() {
        let signer = InternalCaSigner::new();
        let config = CaConfig::root_ca("Short Root").with_validity_days(10);
        let ca = signer.bootstrap_root(Uuid::new_v4(), &config).unwrap();

        let err = signer
            .issue_cert_from_ca(issue_params(ca.id, OffsetDateTime::now_utc() + Duration::days(30)))
            .await
            .unwrap_err();
        assert!(matches!(err, PkiError::BadRequest(_)));
        assert_eq!(signer.issued_count(ca.id), 0);
    }

    #[tokio::test]
    async fn test_disabled_and_unknown_ca() {
        let signer = InternalCaSigner::new();
        let ca = signer.bootstrap_root(Uuid::new_v4(), &CaConfig::default()).unwrap();
        signer.set_status(ca.id, CaStatus::Disabled).unwrap();

        let not_after = OffsetDateTime::now_utc() + Duration::days(1);
        let err = signer.issue_cert_from_ca(issue_params(ca.id, not_after)).await.unwrap_err();
        assert_eq!(err.to_string(), "Certificate Authority is disabled, must be active");

        let err = signer
            .issue_cert_from_ca(issue_params(Uuid::new_v4(), not_after))
            .await
            .unwrap_err();
        assert!(matches!(err, PkiError::NotFound(_)));
    }

    #[test]
    fn test_intermediate_chain() {
        let signer = InternalCaSigner::new();
        let root = signer.bootstrap_root(Uuid::new_v4(), &CaConfig::root_ca("Root")).unwrap();
        let intermediate = signer
            .create_intermediate(root.id, &CaConfig::root_ca("Issuing").with_validity_days(365))
            .unwrap();

        assert_eq!(intermediate.project_id, root.project_id);
        assert_eq!(signer.issued_count(root.id), 1);

        let pem = signer.certificate_pem(intermediate.id).unwrap();
        let info = parse_certificate(pem.as_bytes()).unwrap();
        assert!(info.is_ca);
        assert_eq!(info.issuer.common_name.as_deref(), Some("Root"));
        assert_eq!(signer.authorities().len(), 2);
    }
}
