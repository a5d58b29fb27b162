//! 证书生命周期：续期阈值、续期资格与续期错误分类

pub mod classify;
pub mod eligibility;
pub mod renewal;

pub use classify::{classify_renewal_error, RenewalErrorCategory};
pub use eligibility::{check_certificate_eligibility, check_renewal_eligibility, EligibilityReport};
pub use renewal::{calculate_renewal_threshold, is_valid_renewal_timing, RenewalConfig};
