pub mod generator;
pub mod info;
pub mod record;
pub mod types;

// 重新导出常用类型和函数
pub use generator::{
    alt_names_string, build_certificate_subject, build_subject_alt_names, detect_san_type,
    generate_self_signed, resolve_validity, validity_days, CertificateSpec,
};
pub use info::{parse_certificate, remove_root_from_chain};
pub use record::{Certificate, CertificateStatus};
pub use types::{CertificateInfo, SelfSignedCertificate};
