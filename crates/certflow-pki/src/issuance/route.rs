//! 签发路径选择

use std::fmt;

use crate::{
    error::{PkiError, Result},
    profile::{IssuerType, ProfileWithConfigs},
};

/// 签发路径，每个变体对应一个处理器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssuanceRoute {
    /// 外部CA，入队后异步签发
    ExternalQueue,
    /// 内部CA签署请求携带的 CSR
    CsrSigning,
    SelfSigned,
    /// 内部CA生成密钥并签发
    InternalCa,
}

impl IssuanceRoute {
    /// 外部CA优先，其次 CSR，最后按签发方式
    pub fn select(profile: &ProfileWithConfigs, has_csr: bool) -> Result<Self> {
        if profile
            .ca
            .as_ref()
            .is_some_and(|ca| ca.ca_type.is_external_async())
        {
            return Ok(IssuanceRoute::ExternalQueue);
        }
        if has_csr {
            return Ok(IssuanceRoute::CsrSigning);
        }
        match profile.profile.issuer_type {
            IssuerType::SelfSigned => Ok(IssuanceRoute::SelfSigned),
            IssuerType::Ca if profile.profile.ca_id.is_some() => Ok(IssuanceRoute::InternalCa),
            IssuerType::Ca => Err(PkiError::NotFound(
                "Certificate Authority ID not found".to_string(),
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IssuanceRoute::ExternalQueue => "external_queue",
            IssuanceRoute::CsrSigning => "csr_signing",
            IssuanceRoute::SelfSigned => "self_signed",
            IssuanceRoute::InternalCa => "internal_ca",
        }
    }
}

impl fmt::Display for IssuanceRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
