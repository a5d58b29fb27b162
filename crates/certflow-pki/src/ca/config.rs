//! CA配置管理
//!
//! 进程内根CA的引导配置

use serde::{Deserialize, Serialize};

use crate::types::{KeyAlgorithm, SignatureAlgorithm};

/// CA配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaConfig {
    /// CA名称（同时作为 CN）
    pub name: String,
    /// 组织
    pub organization: Option<String>,
    /// 国家
    pub country: Option<String>,
    /// 证书有效期（天）
    pub validity_days: u32,
    /// 最大证书链深度，`None` 表示不限
    pub max_path_length: Option<u8>,
    /// CA密钥算法
    pub key_algorithm: KeyAlgorithm,
    /// CA签名算法
    pub signature_algorithm: SignatureAlgorithm,
}

impl Default for CaConfig {
    fn default() -> Self {
        Self {
            name: "Certflow Root CA".to_string(),
            organization: Some("Certflow".to_string()),
            country: None,
            validity_days: 3650,
            max_path_length: Some(1),
            key_algorithm: KeyAlgorithm::EcdsaP256,
            signature_algorithm: SignatureAlgorithm::EcdsaSha256,
        }
    }
}

impl CaConfig {
    /// 创建根CA配置
    pub fn root_ca(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// 设置算法
    pub fn with_algorithms(mut self, key: KeyAlgorithm, signature: SignatureAlgorithm) -> Self {
        self.key_algorithm = key;
        self.signature_algorithm = signature;
        self
    }

    /// 设置有效期
    pub fn with_validity_days(mut self, days: u32) -> Self {
        self.validity_days = days;
        self
    }
}
