use thiserror::Error;

/// PKI模块的错误类型
#[derive(Error, Debug)]
pub enum PkiError {
    /// 策略校验失败（聚合全部原因）
    #[error("{}", .0.join(", "))]
    ValidationFailure(Vec<String>),

    /// 证书请求校验失败，携带上下文前缀
    #[error("{context}: {}", .reasons.join(", "))]
    RequestRejected {
        context: String,
        reasons: Vec<String>,
    },

    /// 无法解析的输入（CSR、算法、SAN 类型等）
    #[error("{0}")]
    MalformedInput(String),

    /// 资源未找到
    #[error("{0}")]
    NotFound(String),

    /// CA 类型不支持该操作
    #[error("{0}")]
    Unsupported(String),

    /// 请求参数错误
    #[error("{0}")]
    BadRequest(String),

    /// 操作被禁止
    #[error("{0}")]
    Forbidden(String),

    /// 续期资格检查失败
    #[error("Certificate is not eligible for renewal: {}", .0.join(", "))]
    RenewalIneligible(Vec<String>),

    /// 存储或事务错误
    #[error("Store error: {0}")]
    TransientInfra(String),

    /// 证书生成错误
    #[error("Generation error: {0}")]
    GenerationError(String),

    /// 签名错误
    #[error("Signing error: {0}")]
    SigningError(String),

    /// 密钥错误
    #[error("Key error: {0}")]
    KeyError(String),

    /// DER 编解码错误
    #[error("DER error: {0}")]
    DerError(#[from] der::Error),

    /// 证书构建错误
    #[error("Certificate builder error: {0}")]
    RcgenError(#[from] rcgen::Error),

    /// 序列化错误
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Result类型别名
pub type Result<T> = std::result::Result<T, PkiError>;
