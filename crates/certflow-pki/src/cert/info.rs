//! 已编码证书的解析

use der::Decode;
use time::OffsetDateTime;
use x509_cert::{ext::pkix::BasicConstraints, time::Time, Certificate};

use super::types::CertificateInfo;
use crate::{
    csr::parse_subject,
    error::{PkiError, Result},
};

const BASIC_CONSTRAINTS: der::asn1::ObjectIdentifier =
    der::asn1::ObjectIdentifier::new_unwrap("2.5.29.19");

/// 解析 PEM 或 DER 格式的证书
pub fn parse_certificate(cert_data: &[u8]) -> Result<CertificateInfo> {
    let der_data = if cert_data.starts_with(b"-----BEGIN") {
        pem::parse(cert_data)
            .map_err(|e| PkiError::MalformedInput(format!("Failed to parse PEM: {e}")))?
            .into_contents()
    } else {
        cert_data.to_vec()
    };

    let cert = Certificate::from_der(&der_data)
        .map_err(|e| PkiError::MalformedInput(format!("Failed to parse certificate: {e}")))?;
    let tbs = &cert.tbs_certificate;

    let mut is_ca = false;
    let mut path_len_constraint = None;
    for ext in tbs.extensions.iter().flatten() {
        if ext.extn_id == BASIC_CONSTRAINTS {
            let bc = BasicConstraints::from_der(ext.extn_value.as_bytes())?;
            is_ca = bc.ca;
            path_len_constraint = bc.path_len_constraint;
        }
    }

    Ok(CertificateInfo {
        serial_number: hex::encode(tbs.serial_number.as_bytes()),
        subject: parse_subject(&tbs.subject),
        issuer: parse_subject(&tbs.issuer),
        not_before: to_offset(&tbs.validity.not_before)?,
        not_after: to_offset(&tbs.validity.not_after)?,
        is_ca,
        path_len_constraint,
    })
}

fn to_offset(time: &Time) -> Result<OffsetDateTime> {
    let secs = i64::try_from(time.to_unix_duration().as_secs())
        .map_err(|_| PkiError::MalformedInput("Certificate time out of range".to_string()))?;
    OffsetDateTime::from_unix_timestamp(secs)
        .map_err(|e| PkiError::MalformedInput(format!("Certificate time out of range: {e}")))
}

/// 去掉证书链中的自签名根证书，其余证书保持原顺序
pub fn remove_root_from_chain(chain_pem: &str) -> Result<String> {
    let blocks = pem::parse_many(chain_pem)
        .map_err(|e| PkiError::MalformedInput(format!("Failed to parse certificate chain: {e}")))?;

    let mut kept = Vec::with_capacity(blocks.len());
    for block in blocks {
        let info = parse_certificate(block.contents())?;
        if info.is_ca && info.subject == info.issuer {
            continue;
        }
        kept.push(pem::encode(&block));
    }
    Ok(kept.concat())
}
