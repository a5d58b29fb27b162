//! 策略校验器
//!
//! 按类别（主题属性、SAN、密钥用途、扩展密钥用途、算法、有效期、CA 约束）
//! 校验证书请求。校验不在第一个错误处中断，所有违规一次性收集。
//!
//! 策略未定义某一类别而请求提供了该类别的值时，一律拒绝。

use std::collections::BTreeMap;

use time::OffsetDateTime;

use super::{CaPermission, CompiledPolicy, CompiledRule, UsageRule};
use crate::{
    error::PkiError,
    ra::CertificateRequestInput,
    types::{ExtendedKeyUsage, KeyUsage, SanType},
};

/// 校验结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationOutcome {
    /// 转换为带上下文前缀的错误
    pub fn into_result(self, context: &str) -> crate::Result<Vec<String>> {
        if self.is_valid {
            Ok(self.warnings)
        } else {
            Err(PkiError::RequestRejected {
                context: context.to_string(),
                reasons: self.errors,
            })
        }
    }
}

/// 策略校验器（无状态）
pub struct PolicyValidator;

impl PolicyValidator {
    /// 以当前时间校验
    pub fn validate(policy: &CompiledPolicy, request: &CertificateRequestInput) -> ValidationOutcome {
        Self::validate_at(policy, request, OffsetDateTime::now_utc())
    }

    /// 以指定时间校验；`now` 仅在请求只给出 `not_after` 时用于计算时长
    pub fn validate_at(
        policy: &CompiledPolicy,
        request: &CertificateRequestInput,
        now: OffsetDateTime,
    ) -> ValidationOutcome {
        let mut errors = Vec::new();
        let warnings = policy
            .fallbacks()
            .iter()
            .map(|p| format!("Pattern '{p}' could not be compiled and is matched literally"))
            .collect();

        validate_subject(policy, request, &mut errors);
        validate_sans(policy, request, &mut errors);
        validate_usages(
            "key usages",
            policy.policy().key_usages.as_ref(),
            request.key_usages.as_deref(),
            KeyUsage::as_str,
            &mut errors,
        );
        validate_usages(
            "extended key usages",
            policy.policy().extended_key_usages.as_ref(),
            request.extended_key_usages.as_deref(),
            ExtendedKeyUsage::as_str,
            &mut errors,
        );
        validate_algorithms(policy, request, &mut errors);
        validate_validity(policy, request, now, &mut errors);
        validate_basic_constraints(policy, request, &mut errors);

        ValidationOutcome {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

fn allowed_error(rule: &CompiledRule, field: &str, value: &str) -> String {
    if rule.has_wildcards() {
        let patterns = rule
            .allowed
            .iter()
            .map(|m| m.pattern())
            .collect::<Vec<_>>()
            .join(", ");
        format!("{field} value '{value}' does not match allowed patterns: {patterns}")
    } else {
        format!("{field} value '{value}' is not in allowed values list")
    }
}

fn validate_subject(policy: &CompiledPolicy, request: &CertificateRequestInput, errors: &mut Vec<String>) {
    let present = request.subject.present();

    if !policy.has_subject_rules() {
        for (attr, _) in &present {
            errors.push(format!("{attr} is not allowed by policy (no subject policies defined)"));
        }
        return;
    }

    for (attr, rule) in policy.subject_rules() {
        let value = present.iter().find(|(a, _)| a == attr).map(|(_, v)| *v);

        if !rule.required.is_empty() {
            match value {
                None => errors.push(format!("Missing required {attr} attribute")),
                Some(v) if !rule.satisfies_required(v) => {
                    let patterns = rule
                        .required
                        .iter()
                        .map(|m| m.pattern())
                        .collect::<Vec<_>>()
                        .join(", ");
                    errors.push(format!(
                        "{attr} value '{v}' does not match any required patterns: {patterns}"
                    ));
                }
                Some(_) => {}
            }
        }

        let Some(value) = value else { continue };

        if rule.is_denied(value) {
            errors.push(format!("{attr} value '{value}' is denied by policy"));
            continue;
        }

        if !rule.allowed.is_empty() && !rule.satisfies_required(value) && !rule.is_allowed(value) {
            errors.push(allowed_error(rule, attr.as_str(), value));
        }
    }

    for (attr, _) in &present {
        if policy.subject_rule(*attr).is_none() {
            errors.push(format!("{attr} is not allowed by policy (not defined in policy)"));
        }
    }
}

fn validate_sans(policy: &CompiledPolicy, request: &CertificateRequestInput, errors: &mut Vec<String>) {
    let sans = request.sans();

    if !policy.has_san_rules() {
        for san in sans {
            errors.push(format!(
                "{} SAN is not allowed by policy (no SAN policies defined)",
                san.san_type
            ));
        }
        return;
    }

    let mut by_type: BTreeMap<SanType, Vec<&str>> = BTreeMap::new();
    for san in sans {
        by_type.entry(san.san_type).or_default().push(san.value.as_str());
    }

    for (san_type, rule) in policy.san_rules() {
        let values = by_type.get(san_type).map(Vec::as_slice).unwrap_or_default();
        let field = format!("{san_type} SAN");

        for required in &rule.required {
            if !values.iter().any(|v| required.matches(v)) {
                errors.push(format!(
                    "Required {san_type} SAN matching pattern '{}' not found in request",
                    required.pattern()
                ));
            }
        }

        let mut denied_values = Vec::new();
        for value in values {
            if rule.is_denied(value) {
                errors.push(format!("{san_type} SAN matching denied pattern '{value}' found in request"));
                denied_values.push(*value);
            }
        }

        if !rule.allowed.is_empty() {
            for value in values {
                if denied_values.contains(value) || rule.satisfies_required(value) {
                    continue;
                }
                if !rule.is_allowed(value) {
                    errors.push(allowed_error(rule, &field, value));
                }
            }
        }
    }

    for san_type in by_type.keys() {
        if policy.san_rule(*san_type).is_none() {
            errors.push(format!(
                "{san_type} SAN is not allowed by policy (not defined in policy)"
            ));
        }
    }
}

fn validate_usages<T: Copy + PartialEq>(
    label: &str,
    rule: Option<&UsageRule<T>>,
    requested: Option<&[T]>,
    name: fn(&T) -> &'static str,
    errors: &mut Vec<String>,
) {
    let requested = requested.unwrap_or_default();
    let join = |items: &[T]| items.iter().map(name).collect::<Vec<_>>().join(", ");

    let Some(rule) = rule else {
        if !requested.is_empty() {
            let mut label = label.to_string();
            if let Some(first) = label.get_mut(0..1) {
                first.make_ascii_uppercase();
            }
            errors.push(format!("{label} are not allowed by policy (not defined in policy)"));
        }
        return;
    };

    let missing: Vec<T> = rule
        .required()
        .iter()
        .filter(|u| !requested.contains(*u))
        .copied()
        .collect();
    if !missing.is_empty() {
        errors.push(format!("Missing required {label}: {}", join(&missing)));
    }

    let denied: Vec<T> = requested
        .iter()
        .filter(|u| rule.denied().contains(*u))
        .copied()
        .collect();
    if !denied.is_empty() {
        errors.push(format!("Denied {label} found in request: {}", join(&denied)));
    }

    let invalid: Vec<T> = requested
        .iter()
        .filter(|u| !denied.contains(*u))
        .filter(|u| !rule.required().contains(*u) && !rule.allowed().contains(*u))
        .copied()
        .collect();
    if !invalid.is_empty() {
        errors.push(format!("Invalid {label}: {}", join(&invalid)));
    }
}

fn validate_algorithms(policy: &CompiledPolicy, request: &CertificateRequestInput, errors: &mut Vec<String>) {
    let algorithms = policy.policy().algorithms.as_ref();

    if let Some(signature) = request.signature_algorithm {
        match algorithms.and_then(|a| a.signature.as_ref()) {
            Some(list) if !list.is_empty() => {
                if !list.iter().any(|name| name == signature.policy_name()) {
                    errors.push(format!(
                        "Signature algorithm '{signature}' is not allowed by policy"
                    ));
                }
            }
            Some(_) => {}
            None => errors.push(format!(
                "Signature algorithm '{signature}' is not allowed by policy (not defined in policy)"
            )),
        }
    }

    if let Some(key) = request.key_algorithm {
        match algorithms.and_then(|a| a.key_algorithm.as_ref()) {
            Some(list) if !list.is_empty() => {
                if !list.iter().any(|name| name == key.policy_name()) {
                    errors.push(format!("Key algorithm '{key}' is not allowed by policy"));
                }
            }
            Some(_) => {}
            None => errors.push(format!(
                "Key algorithm '{key}' is not allowed by policy (not defined in policy)"
            )),
        }
    }
}

fn validate_validity(
    policy: &CompiledPolicy,
    request: &CertificateRequestInput,
    now: OffsetDateTime,
    errors: &mut Vec<String>,
) {
    let validity = &request.validity;

    if validity.ttl.is_some() && validity.has_explicit_dates() {
        errors.push(
            "Cannot specify both TTL and notBefore/notAfter. Use either TTL for duration-based validity or notBefore/notAfter for explicit date range."
                .to_string(),
        );
    }

    if let (Some(not_before), Some(not_after)) = (validity.not_before, validity.not_after) {
        if not_before >= not_after {
            errors.push("notBefore must be earlier than notAfter".to_string());
        }
    }

    if let Some(raw) = policy.invalid_max_validity() {
        errors.push(format!(
            "Policy maximum validity '{raw}' is invalid, cannot validate requested validity period"
        ));
        return;
    }

    let Some(max) = policy.max_validity() else {
        return;
    };

    if let Some(ttl) = validity.ttl {
        if ttl.duration() > max.duration() {
            errors.push(format!(
                "Requested validity period exceeds maximum allowed duration of {max}"
            ));
        }
    }

    if let Some(not_after) = validity.not_after {
        let not_before = validity.not_before.unwrap_or(now);
        if not_after - not_before > max.duration() {
            errors.push(format!(
                "Requested validity period (notBefore to notAfter) exceeds maximum allowed duration of {max}"
            ));
        }
    }
}

fn validate_basic_constraints(
    policy: &CompiledPolicy,
    request: &CertificateRequestInput,
    errors: &mut Vec<String>,
) {
    let bc_policy = policy.policy().basic_constraints.unwrap_or_default();
    let wants_ca = request.wants_ca();

    match bc_policy.is_ca {
        CaPermission::Denied if wants_ca => errors.push(
            "CA certificate issuance is denied by this policy. The policy does not allow issuing CA certificates."
                .to_string(),
        ),
        CaPermission::Required if !wants_ca => errors.push(
            "CA certificate issuance is required by this policy. The request must include basicConstraints with isCA set to true."
                .to_string(),
        ),
        _ => {}
    }

    if !wants_ca || bc_policy.is_ca == CaPermission::Denied {
        return;
    }

    let Some(max) = bc_policy.max_path_length.filter(|m| *m != -1) else {
        return;
    };

    match request.basic_constraints.and_then(|bc| bc.path_length) {
        None => errors.push(format!(
            "Path length is required when issuing CA certificates because the policy only allows a maximum path length of {max}."
        )),
        Some(len) if len < -1 => {
            errors.push("Path length must be -1 (unlimited), 0, or a positive integer.".to_string())
        }
        Some(len) if len > max => errors.push(format!(
            "Requested path length ({len}) exceeds maximum allowed by policy ({max})."
        )),
        Some(_) => {}
    }
}
