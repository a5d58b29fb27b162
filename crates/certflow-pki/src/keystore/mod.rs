//! 密钥管理模块
//!
//! - 按算法生成证书密钥对
//! - 私钥与证书正文的按项目加密存储

pub mod generator;
pub mod vault;

pub use generator::{generate_key_pair, signing_algorithm};
pub use vault::{KeyVault, LocalKeyVault};
