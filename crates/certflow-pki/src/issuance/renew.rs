//! 证书续期与续期配置管理

use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    orchestrator::{IssuanceContext, IssuanceOrchestrator, RouteOutcome},
    queue::IssuanceJob,
    IssuanceResult,
};
use crate::{
    ca::{validate_ca_support, CertificateAuthority},
    cert::{detect_san_type, remove_root_from_chain, Certificate, CertificateStatus},
    error::{PkiError, Result},
    lifecycle::{
        check_certificate_eligibility, check_renewal_eligibility, is_valid_renewal_timing,
        EligibilityReport,
    },
    policy::PolicyValidator,
    profile::{EnrollmentType, IssuerType, ProfileWithConfigs},
    ra::{CertificateRequestInput, SubjectFields, ValidityRequest},
    store::CertificatePatch,
    types::{SubjectAltName, Ttl},
};

const RENEWAL_CONTEXT: &str = "Certificate renewal failed";

/// 续期选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenewOptions {
    /// 由续期任务发起，而非用户请求
    pub internal: bool,
    /// 返回的证书链不含根证书
    pub remove_roots_from_chain: bool,
}

impl RenewOptions {
    pub fn internal() -> Self {
        Self {
            internal: true,
            ..Default::default()
        }
    }
}

/// 由原证书还原续期请求：只保留 CN，沿用用途、SAN、算法与原有效期
fn renewal_input(cert: &Certificate) -> CertificateRequestInput {
    let sans = cert
        .alt_names
        .split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| SubjectAltName::new(detect_san_type(value), value))
        .collect();
    let ttl_days = u64::try_from(cert.ttl_days()).unwrap_or(1).max(1);

    CertificateRequestInput {
        subject: SubjectFields {
            common_name: cert.common_name.clone(),
            ..Default::default()
        },
        subject_alt_names: Some(sans),
        key_usages: Some(cert.key_usages.clone()),
        extended_key_usages: Some(cert.extended_key_usages.clone()),
        signature_algorithm: cert.signature_algorithm,
        key_algorithm: cert.key_algorithm,
        validity: ValidityRequest::ttl(Ttl::days(ttl_days)),
        basic_constraints: None,
    }
}

fn enrollment_label(enrollment: EnrollmentType) -> String {
    enrollment.as_str().to_uppercase()
}

impl IssuanceOrchestrator {
    /// 续期一张由配置文件签发的证书
    pub async fn renew_certificate(&self, certificate_id: Uuid, options: RenewOptions) -> Result<IssuanceResult> {
        self.renew_certificate_at(certificate_id, options, OffsetDateTime::now_utc())
            .await
    }

    pub async fn renew_certificate_at(
        &self,
        certificate_id: Uuid,
        options: RenewOptions,
        now: OffsetDateTime,
    ) -> Result<IssuanceResult> {
        let certificates = &self.deps.certificates;
        let original = certificates
            .find_by_id(certificate_id)
            .await?
            .ok_or_else(|| PkiError::NotFound("Certificate not found".to_string()))?;

        let profile_id = original.profile_id.ok_or_else(|| {
            PkiError::Forbidden("Only certificates issued from a profile can be renewed".to_string())
        })?;
        if original.signature_algorithm.is_none() || original.key_algorithm.is_none() {
            return Err(PkiError::BadRequest(
                "Original certificate does not have algorithm information stored. Cannot renew certificate issued before algorithm tracking was implemented."
                    .to_string(),
            ));
        }

        let profile = self.load_profile(profile_id).await?;
        if profile.profile.enrollment_type != EnrollmentType::Api {
            return Err(PkiError::Forbidden(format!(
                "Certificate is not eligible for renewal: {} certificates cannot be renewed through this endpoint",
                enrollment_label(profile.profile.enrollment_type)
            )));
        }
        if !certificates.has_secret(original.id).await? {
            return Err(PkiError::Forbidden(
                "Certificate is not eligible for renewal: certificates issued from CSR (external private key) cannot be renewed"
                    .to_string(),
            ));
        }

        let ca = match profile.profile.issuer_type {
            IssuerType::Ca => Some(self.renewal_ca(&original, &profile, now).await?),
            IssuerType::SelfSigned => {
                self.ensure_eligible(&original, check_certificate_eligibility(&original, now))
                    .await?;
                None
            }
        };

        let input = renewal_input(&original);

        if let Some(ca) = ca.as_ref().filter(|ca| ca.ca_type.is_external_async()) {
            self.deps
                .queue
                .enqueue(IssuanceJob {
                    certificate_request_id: None,
                    profile_id,
                    ca_id: ca.id,
                    ttl: input.validity.ttl,
                    signature_algorithm: input.signature_algorithm,
                    key_algorithm: input.key_algorithm,
                    subject: input.subject.clone(),
                    subject_alt_names: input.sans().to_vec(),
                    key_usages: input.key_usages().to_vec(),
                    extended_key_usages: input.extended_key_usages().to_vec(),
                    csr: None,
                    is_renewal: true,
                    original_certificate_id: Some(original.id),
                })
                .await?;
            tracing::info!(
                certificate_id = %original.id,
                ca_id = %ca.id,
                ca_type = %ca.ca_type,
                "renewal queued for external CA"
            );
            return Ok(IssuanceResult::Pending { request_id: None });
        }
        if let Some(ca) = &ca {
            validate_ca_support(ca, "direct certificate issuance")?;
        }

        let policy = self.load_policy(&profile).await?;
        let outcome = PolicyValidator::validate_at(&policy, &input, now);
        if !outcome.is_valid {
            let message = format!("Policy validation failed: {}", outcome.errors.join(", "));
            certificates.set_renewal_error(original.id, Some(message)).await?;
            return Err(PkiError::RequestRejected {
                context: RENEWAL_CONTEXT.to_string(),
                reasons: outcome.errors,
            });
        }

        let ctx = IssuanceContext {
            request_id: None,
            project_id: original.project_id,
            profile,
            policy,
            input,
            csr: None,
            metadata: original.metadata.clone(),
            is_renewal: true,
        };
        let outcome = match ctx.profile.profile.issuer_type {
            IssuerType::Ca => self.handle_internal_ca(&ctx, now).await?,
            IssuerType::SelfSigned => self.handle_self_signed(&ctx, now)?,
        };
        let RouteOutcome::Issued(artifact) = outcome else {
            return Ok(IssuanceResult::Pending { request_id: None });
        };

        let (mut tx, mut issued) = self.stage(&ctx, artifact, now).await?;
        tx.update_certificate(
            issued.certificate_id,
            CertificatePatch {
                renewed_from_certificate_id: Some(original.id),
                ..Default::default()
            },
        )
        .update_certificate(
            original.id,
            CertificatePatch {
                renewed_by_certificate_id: Some(issued.certificate_id),
                renewal_error: Some(None),
                ..Default::default()
            },
        );
        certificates.commit(tx).await?;

        tracing::info!(
            original_certificate_id = %original.id,
            certificate_id = %issued.certificate_id,
            internal = options.internal,
            renew_before_days = ?issued.renew_before_days,
            "certificate renewed"
        );

        if options.remove_roots_from_chain {
            issued.certificate_chain_pem = remove_root_from_chain(&issued.certificate_chain_pem)?;
        }
        if issued.common_name.is_empty() {
            issued.common_name = original.common_name.clone().unwrap_or_default();
        }
        Ok(IssuanceResult::Issued(Box::new(issued)))
    }

    /// 解析续期使用的CA并做资格检查；不合格时在证书上记录原因
    async fn renewal_ca(
        &self,
        original: &Certificate,
        profile: &ProfileWithConfigs,
        now: OffsetDateTime,
    ) -> Result<CertificateAuthority> {
        let ca_id = profile
            .profile
            .ca_id
            .or(original.ca_id)
            .ok_or_else(|| PkiError::NotFound("Certificate Authority ID not found".to_string()))?;
        let ca = self.load_ca(ca_id).await?;

        self.ensure_eligible(original, check_renewal_eligibility(original, &ca, now))
            .await?;
        Ok(ca)
    }

    /// 不满足续期条件时把原因记录到原证书上
    async fn ensure_eligible(&self, original: &Certificate, report: EligibilityReport) -> Result<()> {
        if !report.is_eligible() {
            let message = format!(
                "Certificate is not eligible for renewal: {}",
                report.errors.join(", ")
            );
            self.deps
                .certificates
                .set_renewal_error(original.id, Some(message))
                .await?;
        }
        report.into_result()
    }

    /// 设置证书的续期阈值
    pub async fn update_renewal_config(&self, certificate_id: Uuid, renew_before_days: u32) -> Result<u32> {
        self.update_renewal_config_at(certificate_id, renew_before_days, OffsetDateTime::now_utc())
            .await
    }

    pub async fn update_renewal_config_at(
        &self,
        certificate_id: Uuid,
        renew_before_days: u32,
        now: OffsetDateTime,
    ) -> Result<u32> {
        let cert = self.auto_renewable_certificate(certificate_id).await?;

        if !self.deps.certificates.has_secret(cert.id).await? {
            return Err(PkiError::Forbidden(
                "Certificate is not eligible for auto-renewal: certificates issued from CSR (external private key) cannot be auto-renewed"
                    .to_string(),
            ));
        }
        if cert.status != CertificateStatus::Active {
            return Err(PkiError::BadRequest(format!(
                "Certificate is not eligible for auto-renewal: certificate status is {}, must be active",
                cert.status
            )));
        }
        if cert.not_after <= now {
            return Err(PkiError::BadRequest(
                "Certificate is not eligible for auto-renewal: certificate has expired".to_string(),
            ));
        }
        if cert.revoked_at.is_some() {
            return Err(PkiError::BadRequest(
                "Certificate is not eligible for auto-renewal: certificate has been revoked".to_string(),
            ));
        }
        if cert.is_renewed() {
            return Err(PkiError::BadRequest(
                "Certificate is not eligible for auto-renewal: certificate has already been renewed".to_string(),
            ));
        }
        if i64::from(renew_before_days) >= cert.ttl_days() {
            return Err(PkiError::BadRequest(
                "Invalid renewal configuration: renewal threshold exceeds certificate validity period".to_string(),
            ));
        }
        if !is_valid_renewal_timing(renew_before_days, cert.not_after, now) {
            return Err(PkiError::BadRequest(
                "Invalid renewal configuration: renewal would be triggered immediately or in the past".to_string(),
            ));
        }

        self.deps
            .certificates
            .set_renew_before_days(cert.id, Some(renew_before_days))
            .await?;
        tracing::info!(%certificate_id, renew_before_days, "renewal configuration updated");
        Ok(renew_before_days)
    }

    /// 清除证书的续期阈值
    pub async fn disable_renewal_config(&self, certificate_id: Uuid) -> Result<()> {
        let cert = self.auto_renewable_certificate(certificate_id).await?;
        self.deps.certificates.set_renew_before_days(cert.id, None).await?;
        tracing::info!(%certificate_id, "renewal configuration disabled");
        Ok(())
    }

    async fn auto_renewable_certificate(&self, certificate_id: Uuid) -> Result<Certificate> {
        let cert = self
            .deps
            .certificates
            .find_by_id(certificate_id)
            .await?
            .ok_or_else(|| PkiError::NotFound("Certificate not found".to_string()))?;

        let profile_id = cert.profile_id.ok_or_else(|| {
            PkiError::BadRequest(
                "Certificate is not eligible for auto-renewal: certificate was not issued from a profile".to_string(),
            )
        })?;
        let profile = self.load_profile(profile_id).await?;
        if profile.profile.enrollment_type != EnrollmentType::Api {
            return Err(PkiError::Forbidden(format!(
                "Certificate is not eligible for auto-renewal: {} certificates cannot be auto-renewed",
                enrollment_label(profile.profile.enrollment_type)
            )));
        }
        Ok(cert)
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::{
        ca::{CaStatus, CaType},
        issuance::testing::{web_request, Fixture},
        policy::{AttributeRule, PatternRule},
        profile::ApiEnrollmentConfig,
        ra::ResourceMetadata,
        store::{CertificateStore, TxContext, TxOp},
        types::{ExtendedKeyUsage, KeyAlgorithm, KeyUsage, SignatureAlgorithm, SubjectAttributeType},
    };

    fn auto_renew(days: u32) -> Option<ApiEnrollmentConfig> {
        Some(ApiEnrollmentConfig {
            auto_renew: true,
            renew_before_days: Some(days),
        })
    }

    fn stored_certificate(
        fx: &Fixture,
        profile_id: Uuid,
        ca_id: Option<Uuid>,
        not_before: OffsetDateTime,
        not_after: OffsetDateTime,
    ) -> Certificate {
        let cert = Certificate {
            id: Uuid::new_v4(),
            project_id: fx.project_id,
            profile_id: Some(profile_id),
            ca_id,
            pki_subscriber_id: None,
            serial_number: "1f".into(),
            common_name: Some("api.example.com".into()),
            alt_names: "api.example.com".into(),
            key_usages: vec![KeyUsage::DigitalSignature],
            extended_key_usages: vec![ExtendedKeyUsage::ServerAuth],
            signature_algorithm: Some(SignatureAlgorithm::EcdsaSha256),
            key_algorithm: Some(KeyAlgorithm::EcdsaP256),
            not_before,
            not_after,
            status: CertificateStatus::Active,
            revoked_at: None,
            renew_before_days: None,
            renewed_by_certificate_id: None,
            renewed_from_certificate_id: None,
            renewal_error: None,
            metadata: vec![],
        };
        fx.store.insert_certificate(cert.clone(), Some(vec![0u8; 16]));
        cert
    }

    async fn issue(fx: &Fixture, profile_id: Uuid, host: &str) -> Uuid {
        fx.orchestrator
            .issue_from_profile(profile_id, web_request(host))
            .await
            .unwrap()
            .issued()
            .unwrap()
            .certificate_id
    }

    #[test]
    fn test_renewal_input_from_certificate() {
        let fx = Fixture::new();
        let mut cert = stored_certificate(
            &fx,
            Uuid::new_v4(),
            None,
            datetime!(2024-01-01 0:00 UTC),
            datetime!(2024-01-31 12:00 UTC),
        );
        cert.alt_names = "api.example.com, 10.0.0.1,ops@example.com,".into();

        let input = renewal_input(&cert);
        assert_eq!(input.subject, SubjectFields::with_common_name("api.example.com"));
        assert_eq!(input.validity.ttl, Some(Ttl::days(31)));
        let types: Vec<_> = input.sans().iter().map(|san| san.san_type).collect();
        assert_eq!(
            types,
            vec![
                crate::types::SanType::DnsName,
                crate::types::SanType::IpAddress,
                crate::types::SanType::Email
            ]
        );
        assert_eq!(input.signature_algorithm, Some(SignatureAlgorithm::EcdsaSha256));
    }

    #[tokio::test]
    async fn test_renew_internal_ca_certificate() {
        let fx = Fixture::new();
        let ca = fx.internal_root();
        let policy_id = fx.add_policy(fx.web_policy());
        let profile_id = fx.add_profile(IssuerType::Ca, Some(ca.id), policy_id, auto_renew(5));
        let original_id = issue(&fx, profile_id, "db.example.com").await;

        // 原证书上的元数据随续期复制
        let mut tx = TxContext::new();
        tx.push(TxOp::CopyMetadata {
            certificate_id: original_id,
            metadata: vec![ResourceMetadata {
                key: "owner".into(),
                value: "dba".into(),
            }],
        });
        fx.store.commit(tx).await.unwrap();

        let result = fx
            .orchestrator
            .renew_certificate(
                original_id,
                RenewOptions {
                    internal: false,
                    remove_roots_from_chain: true,
                },
            )
            .await
            .unwrap();
        let renewed = result.issued().unwrap();
        assert_eq!(renewed.common_name, "db.example.com");
        assert_eq!(renewed.renew_before_days, Some(5));
        assert!(renewed.certificate_chain_pem.is_empty(), "root removed from chain");

        let original = fx.store.certificate(original_id).unwrap();
        assert_eq!(original.renewed_by_certificate_id, Some(renewed.certificate_id));
        assert_eq!(original.renewal_error, None);

        let new_cert = fx.store.certificate(renewed.certificate_id).unwrap();
        assert_eq!(new_cert.renewed_from_certificate_id, Some(original_id));
        assert_eq!(new_cert.ttl_days(), original.ttl_days());
        assert_eq!(new_cert.alt_names, original.alt_names);
        assert_eq!(new_cert.metadata, original.metadata);
        assert_eq!(fx.signer.issued_count(ca.id), 2);

        let err = fx
            .orchestrator
            .renew_certificate(original_id, RenewOptions::internal())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Certificate has already been renewed"));
    }

    #[tokio::test]
    async fn test_renew_self_signed_certificate() {
        let fx = Fixture::new();
        let policy_id = fx.add_policy(fx.web_policy());
        let profile_id = fx.add_profile(IssuerType::SelfSigned, None, policy_id, None);
        let original_id = issue(&fx, profile_id, "api.example.com").await;

        let result = fx
            .orchestrator
            .renew_certificate(original_id, RenewOptions::internal())
            .await
            .unwrap();
        let renewed = result.issued().unwrap();
        assert_eq!(renewed.common_name, "api.example.com");
        assert!(renewed.private_key_pem.is_some());
        assert_eq!(renewed.renew_before_days, None);
        assert_eq!(
            fx.store.certificate(original_id).unwrap().renewed_by_certificate_id,
            Some(renewed.certificate_id)
        );
    }

    #[tokio::test]
    async fn test_self_signed_renewed_at_most_once() {
        let fx = Fixture::new();
        let policy_id = fx.add_policy(fx.web_policy());
        let profile_id = fx.add_profile(IssuerType::SelfSigned, None, policy_id, None);
        let original_id = issue(&fx, profile_id, "api.example.com").await;

        let first = fx
            .orchestrator
            .renew_certificate(original_id, RenewOptions::default())
            .await
            .unwrap();
        let first_id = first.issued().unwrap().certificate_id;

        let err = fx
            .orchestrator
            .renew_certificate(original_id, RenewOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PkiError::RenewalIneligible(_)));

        let original = fx.store.certificate(original_id).unwrap();
        assert_eq!(original.renewed_by_certificate_id, Some(first_id));
        assert_eq!(
            original.renewal_error.as_deref(),
            Some("Certificate is not eligible for renewal: Certificate has already been renewed")
        );
        assert_eq!(fx.store.certificates().len(), 2);
    }

    #[tokio::test]
    async fn test_renew_self_signed_revoked_or_expired() {
        let fx = Fixture::new();
        let policy_id = fx.add_policy(fx.web_policy());
        let profile_id = fx.add_profile(IssuerType::SelfSigned, None, policy_id, None);

        let now = OffsetDateTime::now_utc();
        let revoked = Certificate {
            status: CertificateStatus::Revoked,
            revoked_at: Some(now),
            ..stored_certificate(&fx, profile_id, None, now, now + time::Duration::days(30))
        };
        fx.store.insert_certificate(revoked.clone(), Some(vec![1]));
        let err = fx
            .orchestrator
            .renew_certificate(revoked.id, RenewOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Certificate is revoked and cannot be renewed"));

        let expired = stored_certificate(
            &fx,
            profile_id,
            None,
            now - time::Duration::days(40),
            now - time::Duration::days(10),
        );
        let err = fx
            .orchestrator
            .renew_certificate(expired.id, RenewOptions::default())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Certificate is not eligible for renewal: Certificate is already expired"
        );
        assert!(fx.store.certificate(expired.id).unwrap().renewed_by_certificate_id.is_none());
    }

    #[tokio::test]
    async fn test_renew_refuses_csr_and_legacy_certificates() {
        let fx = Fixture::new();
        let ca = fx.internal_root();
        let policy_id = fx.add_policy(fx.web_policy());
        let profile_id = fx.add_profile(IssuerType::Ca, Some(ca.id), policy_id, None);

        let now = OffsetDateTime::now_utc();
        let cert = stored_certificate(&fx, profile_id, Some(ca.id), now, now + time::Duration::days(30));
        let csr_cert = Certificate {
            id: Uuid::new_v4(),
            ..cert.clone()
        };
        fx.store.insert_certificate(csr_cert.clone(), None);
        let err = fx
            .orchestrator
            .renew_certificate(csr_cert.id, RenewOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PkiError::Forbidden(_)));
        assert!(err.to_string().contains("certificates issued from CSR"));

        let legacy = Certificate {
            id: Uuid::new_v4(),
            key_algorithm: None,
            ..cert.clone()
        };
        fx.store.insert_certificate(legacy.clone(), Some(vec![1]));
        let err = fx
            .orchestrator
            .renew_certificate(legacy.id, RenewOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Original certificate does not have algorithm information"));

        let orphan = Certificate {
            id: Uuid::new_v4(),
            profile_id: None,
            ..cert
        };
        fx.store.insert_certificate(orphan.clone(), Some(vec![1]));
        let err = fx
            .orchestrator
            .renew_certificate(orphan.id, RenewOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Only certificates issued from a profile can be renewed");
    }

    #[tokio::test]
    async fn test_renew_ineligible_records_error() {
        let fx = Fixture::new();
        let ca = fx.internal_root();
        let policy_id = fx.add_policy(fx.web_policy());
        let profile_id = fx.add_profile(IssuerType::Ca, Some(ca.id), policy_id, None);
        let original_id = issue(&fx, profile_id, "db.example.com").await;

        fx.store.insert_ca(CertificateAuthority {
            status: CaStatus::Disabled,
            ..ca
        });

        let err = fx
            .orchestrator
            .renew_certificate(original_id, RenewOptions::internal())
            .await
            .unwrap_err();
        assert!(matches!(err, PkiError::RenewalIneligible(_)));
        assert_eq!(
            fx.store.certificate(original_id).unwrap().renewal_error.as_deref(),
            Some("Certificate is not eligible for renewal: Certificate Authority is disabled, must be active")
        );
    }

    #[tokio::test]
    async fn test_renew_policy_drift_records_error() {
        let fx = Fixture::new();
        let ca = fx.internal_root();
        let policy = fx.web_policy();
        let policy_id = fx.add_policy(policy.clone());
        let profile_id = fx.add_profile(IssuerType::Ca, Some(ca.id), policy_id, None);
        let original_id = issue(&fx, profile_id, "db.example.com").await;

        let mut narrowed = policy;
        narrowed.subject = Some(vec![AttributeRule {
            attribute: SubjectAttributeType::CommonName,
            rule: PatternRule {
                allowed: Some(vec!["*.internal.example.com".into()]),
                ..Default::default()
            },
        }]);
        fx.store.insert_policy(narrowed).unwrap();

        let err = fx
            .orchestrator
            .renew_certificate(original_id, RenewOptions::internal())
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Certificate renewal failed: "));

        let original = fx.store.certificate(original_id).unwrap();
        assert!(original
            .renewal_error
            .as_deref()
            .is_some_and(|e| e.starts_with("Policy validation failed: ")));
        assert!(original.renewed_by_certificate_id.is_none());
        assert_eq!(fx.store.certificates().len(), 1);
    }

    #[tokio::test]
    async fn test_renew_through_external_ca_is_queued() {
        let fx = Fixture::new();
        let ca = fx.external_ca(CaType::AzureAdCs);
        let policy_id = fx.add_policy(fx.web_policy());
        let profile_id = fx.add_profile(IssuerType::Ca, Some(ca.id), policy_id, None);

        let now = OffsetDateTime::now_utc();
        let cert = stored_certificate(&fx, profile_id, Some(ca.id), now, now + time::Duration::days(30));

        let result = fx
            .orchestrator
            .renew_certificate(cert.id, RenewOptions::internal())
            .await
            .unwrap();
        assert!(result.is_pending());

        let jobs = fx.queue.drain();
        assert_eq!(jobs.len(), 1);
        assert!(jobs[0].is_renewal);
        assert_eq!(jobs[0].original_certificate_id, Some(cert.id));
        assert_eq!(jobs[0].ttl, Some(Ttl::days(30)));
    }

    #[tokio::test]
    async fn test_update_renewal_config() {
        let fx = Fixture::new();
        let policy_id = fx.add_policy(fx.web_policy());
        let profile_id = fx.add_profile(IssuerType::SelfSigned, None, policy_id, None);
        let cert = stored_certificate(
            &fx,
            profile_id,
            None,
            datetime!(2024-01-01 0:00 UTC),
            datetime!(2024-01-31 0:00 UTC),
        );
        let now = datetime!(2024-01-20 9:00 UTC);
        let orchestrator = &fx.orchestrator;

        assert_eq!(orchestrator.update_renewal_config_at(cert.id, 10, now).await.unwrap(), 10);
        assert_eq!(fx.store.certificate(cert.id).unwrap().renew_before_days, Some(10));

        let err = orchestrator.update_renewal_config_at(cert.id, 11, now).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid renewal configuration: renewal would be triggered immediately or in the past"
        );
        let err = orchestrator.update_renewal_config_at(cert.id, 30, now).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid renewal configuration: renewal threshold exceeds certificate validity period"
        );
        let err = orchestrator
            .update_renewal_config_at(cert.id, 5, datetime!(2024-02-01 0:00 UTC))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Certificate is not eligible for auto-renewal: certificate has expired"
        );

        orchestrator.disable_renewal_config(cert.id).await.unwrap();
        assert_eq!(fx.store.certificate(cert.id).unwrap().renew_before_days, None);
    }

    #[tokio::test]
    async fn test_renewal_config_requires_api_enrollment() {
        let fx = Fixture::new();
        let ca = fx.internal_root();
        let policy_id = fx.add_policy(fx.web_policy());
        let profile_id =
            fx.add_profile_with(IssuerType::Ca, EnrollmentType::Est, Some(ca.id), policy_id, None);
        let now = OffsetDateTime::now_utc();
        let cert = stored_certificate(&fx, profile_id, Some(ca.id), now, now + time::Duration::days(30));

        let err = fx.orchestrator.disable_renewal_config(cert.id).await.unwrap_err();
        assert!(matches!(err, PkiError::Forbidden(_)));
        assert_eq!(
            err.to_string(),
            "Certificate is not eligible for auto-renewal: EST certificates cannot be auto-renewed"
        );

        let err = fx
            .orchestrator
            .renew_certificate(cert.id, RenewOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("EST certificates cannot be renewed through this endpoint"));
    }
}
