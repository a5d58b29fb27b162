//! # Certflow - 证书签发与自动续期
//!
//! 多租户 X.509 证书管理的核心部分
//!
//! ## 模块
//!
//! - `certflow_pki` - 策略校验、CSR 解析、证书生成、签发编排与续期调度

pub use certflow_pki;
