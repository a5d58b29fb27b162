//! 配置文件缺省值合并
//!
//! 以字段是否存在判断"未提供"：请求中为 `Some` 的字段（即使为空）保持不变。

use crate::{
    profile::ProfileDefaults,
    ra::{CertificateRequestInput, SubjectFields},
};

fn fill<T: Clone>(target: &mut Option<T>, default: &Option<T>) {
    if target.is_none() {
        target.clone_from(default);
    }
}

fn merge_subject(subject: &mut SubjectFields, defaults: &SubjectFields) {
    fill(&mut subject.common_name, &defaults.common_name);
    fill(&mut subject.organization, &defaults.organization);
    fill(&mut subject.organizational_unit, &defaults.organizational_unit);
    fill(&mut subject.country, &defaults.country);
    fill(&mut subject.state, &defaults.state);
    fill(&mut subject.locality, &defaults.locality);
}

/// 合并缺省值，返回新的请求
pub fn apply_profile_defaults(
    request: &CertificateRequestInput,
    defaults: &ProfileDefaults,
) -> CertificateRequestInput {
    let mut merged = request.clone();
    merge_subject(&mut merged.subject, &defaults.subject);
    fill(&mut merged.subject_alt_names, &defaults.subject_alt_names);
    fill(&mut merged.key_usages, &defaults.key_usages);
    fill(&mut merged.extended_key_usages, &defaults.extended_key_usages);
    fill(&mut merged.signature_algorithm, &defaults.signature_algorithm);
    fill(&mut merged.key_algorithm, &defaults.key_algorithm);
    fill(&mut merged.basic_constraints, &defaults.basic_constraints);

    // 显式日期与 TTL 互斥，只有两者都缺失时才使用缺省 TTL
    if merged.validity.ttl.is_none() && !merged.validity.has_explicit_dates() {
        merged.validity.ttl = defaults.ttl;
    }
    merged
}
