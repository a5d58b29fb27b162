use tracing_subscriber::EnvFilter;

use crate::{error::Result, settings::LogCfg};

/// 初始化日志；`RUST_LOG` 优先，否则使用配置中的级别
pub fn init_tracing(cfg: &LogCfg) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new(&cfg.level)
            .add_directive("certflow_pki=info".parse()?)
            .add_directive("certflow_pki_server=info".parse()?),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(cfg.with_target)
        .init();
    Ok(())
}
