//! Certflow PKI - 证书策略、签发与续期
//!
//! 提供证书策略校验、CSR 解析、证书生成、签发编排与自动续期

pub mod ca;
pub mod cert;
pub mod csr;
pub mod error;
pub mod issuance;
pub mod keystore;
pub mod lifecycle;
pub mod policy;
pub mod profile;
pub mod ra;
pub mod scheduler;
pub mod store;
pub mod types;

// 重新导出常用类型
pub use ca::{CaConfig, CaSigner, CaStatus, CaType, CertificateAuthority, InternalCaSigner};
pub use cert::{
    detect_san_type, generate_self_signed, parse_certificate, Certificate, CertificateInfo,
    CertificateStatus, SelfSignedCertificate,
};
pub use csr::{extract_algorithms, extract_request, Csr, CsrAlgorithms, NormalizedRequest};
pub use error::{PkiError, Result};
pub use issuance::{
    IssuanceDeps, IssuanceOrchestrator, IssuanceResult, IssuedCertificate, MemoryIssuanceQueue,
    RenewOptions,
};
pub use keystore::{KeyVault, LocalKeyVault};
pub use lifecycle::{
    calculate_renewal_threshold, check_certificate_eligibility, check_renewal_eligibility,
    classify_renewal_error,
    is_valid_renewal_timing, RenewalConfig, RenewalErrorCategory,
};
pub use policy::{CertificatePolicy, CompiledPolicy, PolicyValidator, ValidationOutcome};
pub use profile::{CertificateProfile, EnrollmentType, IssuerType, ProfileWithConfigs};
pub use ra::{CertificateRequest, CertificateRequestInput, RequestStatus};
pub use scheduler::{DailySchedule, JobSpec, RenewalJob, RenewalJobConfig, Scheduler};
pub use store::MemoryStore;

/// 预导入模块，包含最常用的类型和函数
pub mod prelude {
    pub use crate::{
        ca::{CaConfig, CaSigner, CertificateAuthority, InternalCaSigner},
        error::{PkiError, Result},
        issuance::{IssuanceDeps, IssuanceOrchestrator, IssuanceResult, RenewOptions},
        keystore::{KeyVault, LocalKeyVault},
        policy::{CertificatePolicy, PolicyValidator},
        profile::{CertificateProfile, IssuerType},
        ra::{CertificateRequest, CertificateRequestInput, SubjectFields},
        scheduler::{JobSpec, RenewalJob, Scheduler},
        store::MemoryStore,
        types::{KeyAlgorithm, SignatureAlgorithm, SubjectAltName, Ttl},
    };
}
