//! 策略管理检查
//!
//! 策略创建、更新与删除前的结构性检查。

use std::collections::HashSet;
use std::hash::Hash;

use uuid::Uuid;

use super::{CertificatePolicy, PatternRule, UsageRule};
use crate::{
    error::{PkiError, Result},
    types::Ttl,
};

/// 校验策略定义本身是否合法
pub fn validate_policy_definition(policy: &CertificatePolicy) -> Result<()> {
    let mut errors = Vec::new();

    if policy.name.trim().is_empty() {
        errors.push("Policy name must not be empty".to_string());
    }

    if let Some(rules) = &policy.subject {
        let mut seen = HashSet::new();
        for rule in rules {
            if !seen.insert(rule.attribute) {
                errors.push(format!("Subject attribute {} is defined more than once", rule.attribute));
            }
            check_pattern_rule(&format!("Subject attribute {}", rule.attribute), &rule.rule, &mut errors);
        }
    }

    if let Some(rules) = &policy.sans {
        let mut seen = HashSet::new();
        for rule in rules {
            if !seen.insert(rule.san_type) {
                errors.push(format!("SAN type {} is defined more than once", rule.san_type));
            }
            check_pattern_rule(&format!("SAN type {}", rule.san_type), &rule.rule, &mut errors);
        }
    }

    if let Some(rule) = &policy.key_usages {
        check_usage_rule("Key usages", rule, &mut errors);
    }
    if let Some(rule) = &policy.extended_key_usages {
        check_usage_rule("Extended key usages", rule, &mut errors);
    }

    if let Some(max) = policy.validity.as_ref().and_then(|v| v.max.as_deref()) {
        if let Err(e) = max.parse::<Ttl>() {
            errors.push(format!("Validity max is invalid: {e}"));
        }
    }

    if let Some(max) = policy.basic_constraints.and_then(|bc| bc.max_path_length) {
        if max < -1 {
            errors.push("Max path length must be -1 (unlimited), 0, or a positive integer".to_string());
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(PkiError::ValidationFailure(errors))
    }
}

/// 被配置文件引用的策略不可删除
pub fn ensure_policy_deletable(policy_id: Uuid, referencing_profiles: &[String]) -> Result<()> {
    if referencing_profiles.is_empty() {
        return Ok(());
    }
    Err(PkiError::BadRequest(format!(
        "Policy {policy_id} is in use by profiles: {}",
        referencing_profiles.join(", ")
    )))
}

fn check_pattern_rule(label: &str, rule: &PatternRule, errors: &mut Vec<String>) {
    if rule.allowed.is_none() && rule.required.is_none() && rule.denied.is_none() {
        errors.push(format!("{label} must define at least one of allowed, required or denied"));
    }
    for (kind, list) in [
        ("allowed", &rule.allowed),
        ("required", &rule.required),
        ("denied", &rule.denied),
    ] {
        if let Some(dup) = first_duplicate(list.iter().flatten()) {
            errors.push(format!("{label} has duplicate {kind} value '{dup}'"));
        }
    }
}

fn check_usage_rule<T>(label: &str, rule: &UsageRule<T>, errors: &mut Vec<String>)
where
    T: Eq + Hash + std::fmt::Display,
{
    if rule.allowed.is_none() && rule.required.is_none() && rule.denied.is_none() {
        errors.push(format!("{label} must define at least one of allowed, required or denied"));
    }
    for (kind, list) in [
        ("allowed", rule.allowed()),
        ("required", rule.required()),
        ("denied", rule.denied()),
    ] {
        if let Some(dup) = first_duplicate(list.iter()) {
            errors.push(format!("{label} has duplicate {kind} value '{dup}'"));
        }
    }
}

fn first_duplicate<'a, T: Eq + Hash + 'a>(items: impl Iterator<Item = &'a T>) -> Option<&'a T> {
    let mut seen = HashSet::new();
    items.into_iter().find(|item| !seen.insert(*item))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        policy::{AttributeRule, BasicConstraintsPolicy, SanRule, ValidityPolicy},
        types::{KeyUsage, SanType, SubjectAttributeType},
    };

    fn base() -> CertificatePolicy {
        CertificatePolicy::empty(Uuid::new_v4(), "web")
    }

    #[test]
    fn test_valid_definition() {
        let mut policy = base();
        policy.subject = Some(vec![AttributeRule {
            attribute: SubjectAttributeType::CommonName,
            rule: PatternRule {
                allowed: Some(vec!["*.corp.io".into()]),
                ..Default::default()
            },
        }]);
        policy.validity = Some(ValidityPolicy { max: Some("1y".into()) });
        assert!(validate_policy_definition(&policy).is_ok());
    }

    #[test]
    fn test_definition_errors_are_aggregated() {
        let mut policy = base();
        let rule = SanRule {
            san_type: SanType::DnsName,
            rule: PatternRule {
                allowed: Some(vec!["a.io".into(), "a.io".into()]),
                ..Default::default()
            },
        };
        policy.sans = Some(vec![rule.clone(), rule]);
        policy.key_usages = Some(UsageRule::default());
        policy.validity = Some(ValidityPolicy { max: Some("ten days".into()) });
        policy.basic_constraints = Some(BasicConstraintsPolicy {
            max_path_length: Some(-3),
            ..Default::default()
        });

        let Err(PkiError::ValidationFailure(errors)) = validate_policy_definition(&policy) else {
            panic!("expected validation failure");
        };
        assert!(errors.contains(&"SAN type dns_name is defined more than once".to_string()));
        assert!(errors.contains(&"SAN type dns_name has duplicate allowed value 'a.io'".to_string()));
        assert!(errors.iter().any(|e| e.starts_with("Key usages must define")));
        assert!(errors.iter().any(|e| e.starts_with("Validity max is invalid")));
        assert!(errors.iter().any(|e| e.starts_with("Max path length")));
    }

    #[test]
    fn test_duplicate_usage() {
        let mut policy = base();
        policy.key_usages = Some(UsageRule {
            required: Some(vec![KeyUsage::DigitalSignature, KeyUsage::DigitalSignature]),
            ..Default::default()
        });
        let err = validate_policy_definition(&policy).unwrap_err();
        assert_eq!(err.to_string(), "Key usages has duplicate required value 'digital_signature'");
    }

    #[test]
    fn test_policy_in_use_cannot_be_deleted() {
        let id = Uuid::new_v4();
        assert!(ensure_policy_deletable(id, &[]).is_ok());
        let err = ensure_policy_deletable(id, &["web-tls".into(), "mtls".into()]).unwrap_err();
        assert!(err.to_string().ends_with("in use by profiles: web-tls, mtls"));
    }
}
