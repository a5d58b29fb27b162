//! 续期资格检查

use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime};

use crate::{
    ca::{CaStatus, CertificateAuthority},
    cert::{Certificate, CertificateStatus},
    error::{PkiError, Result},
};

/// 续期资格检查结果，汇总全部不满足的条件
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EligibilityReport {
    pub errors: Vec<String>,
}

impl EligibilityReport {
    pub fn is_eligible(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_result(self) -> Result<()> {
        if self.is_eligible() {
            Ok(())
        } else {
            Err(PkiError::RenewalIneligible(self.errors))
        }
    }
}

fn iso(value: OffsetDateTime) -> String {
    value.format(&Rfc3339).unwrap_or_else(|_| value.to_string())
}

/// 与签发者无关的检查，自签名证书续期时使用
pub fn check_certificate_eligibility(cert: &Certificate, now: OffsetDateTime) -> EligibilityReport {
    let mut errors = Vec::new();

    if cert.status != CertificateStatus::Active {
        errors.push(format!(
            "Certificate status is {}, must be {}",
            cert.status,
            CertificateStatus::Active
        ));
    }
    if cert.not_after <= now {
        errors.push("Certificate is already expired".to_string());
    }
    if cert.revoked_at.is_some() {
        errors.push("Certificate is revoked and cannot be renewed".to_string());
    }
    if cert.is_imported() {
        errors.push("Externally imported certificates cannot be renewed".to_string());
    }
    if cert.is_renewed() {
        errors.push("Certificate has already been renewed".to_string());
    }

    EligibilityReport { errors }
}

/// 检查证书能否由其CA续期
pub fn check_renewal_eligibility(
    cert: &Certificate,
    ca: &CertificateAuthority,
    now: OffsetDateTime,
) -> EligibilityReport {
    let mut errors = Vec::new();

    if cert.status != CertificateStatus::Active {
        errors.push(format!(
            "Certificate status is {}, must be {}",
            cert.status,
            CertificateStatus::Active
        ));
    }
    if cert.not_after <= now {
        errors.push("Certificate is already expired".to_string());
    }
    if cert.revoked_at.is_some() {
        errors.push("Certificate is revoked and cannot be renewed".to_string());
    }
    if !ca.ca_type.supports_renewal() {
        errors.push(format!("CA type {} does not support renewal", ca.ca_type));
    }
    if cert.is_imported() {
        errors.push("Externally imported certificates cannot be renewed".to_string());
    }
    if ca.status != CaStatus::Active {
        errors.push(format!(
            "Certificate Authority is {}, must be {}",
            ca.status,
            CaStatus::Active
        ));
    }
    if cert.is_renewed() {
        errors.push("Certificate has already been renewed".to_string());
    }

    if let Some(ca_not_after) = ca.not_after {
        let proposed = now + Duration::days(cert.ttl_days());
        if proposed > ca_not_after {
            errors.push(format!(
                "New certificate would expire ({}) after its issuing CA ({})",
                iso(proposed),
                iso(ca_not_after)
            ));
        }
    }

    EligibilityReport { errors }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;
    use uuid::Uuid;

    use super::*;
    use crate::ca::CaType;

    fn cert() -> Certificate {
        Certificate {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            profile_id: Some(Uuid::new_v4()),
            ca_id: None,
            pki_subscriber_id: None,
            serial_number: "01".into(),
            common_name: Some("svc.example.com".into()),
            alt_names: String::new(),
            key_usages: vec![],
            extended_key_usages: vec![],
            signature_algorithm: None,
            key_algorithm: None,
            not_before: datetime!(2024-01-01 0:00 UTC),
            not_after: datetime!(2024-01-31 0:00 UTC),
            status: CertificateStatus::Active,
            revoked_at: None,
            renew_before_days: Some(7),
            renewed_by_certificate_id: None,
            renewed_from_certificate_id: None,
            renewal_error: None,
            metadata: vec![],
        }
    }

    fn ca(ca_type: CaType) -> CertificateAuthority {
        CertificateAuthority {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            name: "issuing".into(),
            ca_type,
            status: CaStatus::Active,
            key_algorithm: Some("RSA_2048".into()),
            not_after: Some(datetime!(2030-01-01 0:00 UTC)),
        }
    }

    #[test]
    fn test_eligible_certificate() {
        let report = check_renewal_eligibility(&cert(), &ca(CaType::Internal), datetime!(2024-01-25 0:00 UTC));
        assert!(report.is_eligible());
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn test_collects_all_reasons() {
        let mut cert = cert();
        cert.revoked_at = Some(datetime!(2024-01-10 0:00 UTC));
        cert.renewed_by_certificate_id = Some(Uuid::new_v4());
        let mut ca = ca(CaType::AwsPca);
        ca.status = CaStatus::Disabled;

        let report = check_renewal_eligibility(&cert, &ca, datetime!(2024-02-05 0:00 UTC));
        assert_eq!(
            report.errors,
            vec![
                "Certificate is already expired".to_string(),
                "Certificate is revoked and cannot be renewed".to_string(),
                "CA type aws-pca does not support renewal".to_string(),
                "Certificate Authority is disabled, must be active".to_string(),
                "Certificate has already been renewed".to_string(),
            ]
        );
        let err = report.into_result().unwrap_err();
        assert!(err.to_string().starts_with("Certificate is not eligible for renewal: "));
    }

    #[test]
    fn test_new_certificate_would_outlive_ca() {
        let mut ca = ca(CaType::Acme);
        ca.not_after = Some(datetime!(2024-02-10 0:00 UTC));
        let report = check_renewal_eligibility(&cert(), &ca, datetime!(2024-01-25 0:00 UTC));
        assert_eq!(
            report.errors,
            vec!["New certificate would expire (2024-02-24T00:00:00Z) after its issuing CA (2024-02-10T00:00:00Z)".to_string()]
        );
    }

    #[test]
    fn test_certificate_checks_without_ca() {
        assert!(check_certificate_eligibility(&cert(), datetime!(2024-01-25 0:00 UTC)).is_eligible());

        let mut cert = cert();
        cert.status = CertificateStatus::Revoked;
        cert.revoked_at = Some(datetime!(2024-01-10 0:00 UTC));
        cert.renewed_by_certificate_id = Some(Uuid::new_v4());
        let report = check_certificate_eligibility(&cert, datetime!(2024-01-25 0:00 UTC));
        assert_eq!(
            report.errors,
            vec![
                "Certificate status is revoked, must be active".to_string(),
                "Certificate is revoked and cannot be renewed".to_string(),
                "Certificate has already been renewed".to_string(),
            ]
        );
    }

    #[test]
    fn test_imported_certificate() {
        let mut cert = cert();
        cert.profile_id = None;
        cert.pki_subscriber_id = Some(Uuid::new_v4());
        let report = check_renewal_eligibility(&cert, &ca(CaType::Internal), datetime!(2024-01-25 0:00 UTC));
        assert_eq!(report.errors, vec!["Externally imported certificates cannot be renewed".to_string()]);
    }
}
