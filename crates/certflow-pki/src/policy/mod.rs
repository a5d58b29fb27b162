//! 证书策略模块
//!
//! 策略是按项目划分的命名规则集，约束请求可以包含的主题属性、SAN、
//! 密钥用途、扩展密钥用途、算法、有效期以及 CA 约束。
//!
//! 规则在加载时编译为 [`CompiledPolicy`]，校验时不再构造正则。

pub mod admin;
pub mod matcher;
pub mod validator;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use admin::{ensure_policy_deletable, validate_policy_definition};
pub use matcher::Matcher;
pub use validator::{PolicyValidator, ValidationOutcome};

use crate::types::{ExtendedKeyUsage, KeyUsage, SanType, SubjectAttributeType, Ttl};

/// 允许 / 必需 / 禁止 三类模式
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub denied: Option<Vec<String>>,
}

impl PatternRule {
    /// 禁止列表中含 `*`，即该类型完全不可出现
    pub fn prohibits_all(&self) -> bool {
        self.denied
            .as_ref()
            .is_some_and(|denied| denied.iter().any(|p| p == "*"))
    }
}

/// 主题属性规则
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeRule {
    #[serde(rename = "type")]
    pub attribute: SubjectAttributeType,
    #[serde(flatten)]
    pub rule: PatternRule,
}

/// SAN 规则
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanRule {
    #[serde(rename = "type")]
    pub san_type: SanType,
    #[serde(flatten)]
    pub rule: PatternRule,
}

/// 密钥用途 / 扩展密钥用途规则
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct UsageRule<T> {
    #[serde(default)]
    pub allowed: Option<Vec<T>>,
    #[serde(default)]
    pub required: Option<Vec<T>>,
    #[serde(default)]
    pub denied: Option<Vec<T>>,
}

impl<T> Default for UsageRule<T> {
    fn default() -> Self {
        Self {
            allowed: None,
            required: None,
            denied: None,
        }
    }
}

impl<T: PartialEq> UsageRule<T> {
    pub fn allowed(&self) -> &[T] {
        self.allowed.as_deref().unwrap_or_default()
    }

    pub fn required(&self) -> &[T] {
        self.required.as_deref().unwrap_or_default()
    }

    pub fn denied(&self) -> &[T] {
        self.denied.as_deref().unwrap_or_default()
    }
}

/// 算法规则，值采用策略命名（`SHA256-RSA`、`RSA-2048`）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorithmPolicy {
    pub signature: Option<Vec<String>>,
    pub key_algorithm: Option<Vec<String>>,
}

/// 有效期规则
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityPolicy {
    /// 最长有效期，TTL 格式
    pub max: Option<String>,
}

/// CA 证书许可状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaPermission {
    Allowed,
    Required,
    #[default]
    Denied,
}

/// 基本约束规则
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicConstraintsPolicy {
    pub is_ca: CaPermission,
    pub max_path_length: Option<i32>,
}

/// 证书策略
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificatePolicy {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub subject: Option<Vec<AttributeRule>>,
    #[serde(default)]
    pub sans: Option<Vec<SanRule>>,
    #[serde(default)]
    pub key_usages: Option<UsageRule<KeyUsage>>,
    #[serde(default)]
    pub extended_key_usages: Option<UsageRule<ExtendedKeyUsage>>,
    #[serde(default)]
    pub algorithms: Option<AlgorithmPolicy>,
    #[serde(default)]
    pub validity: Option<ValidityPolicy>,
    #[serde(default)]
    pub basic_constraints: Option<BasicConstraintsPolicy>,
}

impl CertificatePolicy {
    /// 空策略：所有类别均未定义，即全部拒绝
    pub fn empty(project_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            name: name.into(),
            description: None,
            subject: None,
            sans: None,
            key_usages: None,
            extended_key_usages: None,
            algorithms: None,
            validity: None,
            basic_constraints: None,
        }
    }

    pub fn subject_rule(&self, attribute: SubjectAttributeType) -> Option<&AttributeRule> {
        self.subject
            .as_ref()?
            .iter()
            .find(|rule| rule.attribute == attribute)
    }

    pub fn san_rule(&self, san_type: SanType) -> Option<&SanRule> {
        self.sans.as_ref()?.iter().find(|rule| rule.san_type == san_type)
    }

    /// 策略允许的签名算法名称
    pub fn signature_algorithms(&self) -> &[String] {
        self.algorithms
            .as_ref()
            .and_then(|alg| alg.signature.as_deref())
            .unwrap_or_default()
    }
}

/// 编译后的模式规则
#[derive(Debug, Clone, Default)]
pub struct CompiledRule {
    pub allowed: Vec<Matcher>,
    pub required: Vec<Matcher>,
    pub denied: Vec<Matcher>,
}

impl CompiledRule {
    fn compile(rule: &PatternRule, fallbacks: &mut Vec<String>) -> Self {
        let mut compile_all = |patterns: &Option<Vec<String>>| -> Vec<Matcher> {
            patterns
                .iter()
                .flatten()
                .map(|pattern| match Matcher::try_compile(pattern) {
                    Ok(matcher) => matcher,
                    Err(e) => {
                        tracing::warn!(pattern = %pattern, error = %e, "policy pattern falls back to exact match");
                        fallbacks.push(pattern.clone());
                        Matcher::Exact(pattern.clone())
                    }
                })
                .collect()
        };

        Self {
            allowed: compile_all(&rule.allowed),
            required: compile_all(&rule.required),
            denied: compile_all(&rule.denied),
        }
    }

    pub fn is_denied(&self, value: &str) -> bool {
        self.denied.iter().any(|m| m.matches(value))
    }

    pub fn satisfies_required(&self, value: &str) -> bool {
        self.required.iter().any(|m| m.matches(value))
    }

    pub fn is_allowed(&self, value: &str) -> bool {
        self.allowed.iter().any(|m| m.matches(value))
    }

    pub fn has_wildcards(&self) -> bool {
        self.allowed.iter().any(Matcher::is_wildcard)
    }
}

/// 预编译策略
#[derive(Debug, Clone)]
pub struct CompiledPolicy {
    source: CertificatePolicy,
    subject: Option<Vec<(SubjectAttributeType, CompiledRule)>>,
    sans: Option<Vec<(SanType, CompiledRule)>>,
    max_validity: Option<Ttl>,
    /// 无法解析的 `validity.max`，校验时拒绝所有请求
    invalid_max_validity: Option<String>,
    /// 无法编译、按字面匹配的模式
    fallbacks: Vec<String>,
}

impl CompiledPolicy {
    pub fn compile(policy: &CertificatePolicy) -> Self {
        let mut fallbacks = Vec::new();

        let subject = policy.subject.as_ref().map(|rules| {
            rules
                .iter()
                .map(|r| (r.attribute, CompiledRule::compile(&r.rule, &mut fallbacks)))
                .collect()
        });
        let sans = policy.sans.as_ref().map(|rules| {
            rules
                .iter()
                .map(|r| (r.san_type, CompiledRule::compile(&r.rule, &mut fallbacks)))
                .collect()
        });

        let mut max_validity = None;
        let mut invalid_max_validity = None;
        if let Some(max) = policy.validity.as_ref().and_then(|v| v.max.as_deref()) {
            match max.parse::<Ttl>() {
                Ok(ttl) => max_validity = Some(ttl),
                Err(e) => {
                    tracing::warn!(policy_id = %policy.id, max, error = %e, "unparsable validity.max, policy rejects all requests");
                    invalid_max_validity = Some(max.to_string());
                }
            }
        }

        Self {
            source: policy.clone(),
            subject,
            sans,
            max_validity,
            invalid_max_validity,
            fallbacks,
        }
    }

    pub fn policy(&self) -> &CertificatePolicy {
        &self.source
    }

    /// 策略是否定义了主题属性规则列表
    pub fn has_subject_rules(&self) -> bool {
        self.subject.as_ref().is_some_and(|rules| !rules.is_empty())
    }

    pub fn subject_rules(&self) -> &[(SubjectAttributeType, CompiledRule)] {
        self.subject.as_deref().unwrap_or_default()
    }

    pub fn subject_rule(&self, attribute: SubjectAttributeType) -> Option<&CompiledRule> {
        self.subject_rules()
            .iter()
            .find(|(attr, _)| *attr == attribute)
            .map(|(_, rule)| rule)
    }

    pub fn has_san_rules(&self) -> bool {
        self.sans.as_ref().is_some_and(|rules| !rules.is_empty())
    }

    pub fn san_rules(&self) -> &[(SanType, CompiledRule)] {
        self.sans.as_deref().unwrap_or_default()
    }

    pub fn san_rule(&self, san_type: SanType) -> Option<&CompiledRule> {
        self.san_rules()
            .iter()
            .find(|(t, _)| *t == san_type)
            .map(|(_, rule)| rule)
    }

    pub fn max_validity(&self) -> Option<Ttl> {
        self.max_validity
    }

    pub fn invalid_max_validity(&self) -> Option<&str> {
        self.invalid_max_validity.as_deref()
    }

    pub fn fallbacks(&self) -> &[String] {
        &self.fallbacks
    }
}
