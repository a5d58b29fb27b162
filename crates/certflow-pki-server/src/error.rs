use certflow_pki::PkiError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("log filter error: {0}")]
    LogFilter(#[from] tracing_subscriber::filter::ParseError),

    #[error("PKI error: {0}")]
    Pki(#[from] PkiError),
}

pub type Result<T, E = AppError> = core::result::Result<T, E>;
