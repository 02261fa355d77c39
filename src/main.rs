//! # Token Router 主程序
//!
//! 加载配置、初始化数据库并启动 HTTP 服务

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use token_router::{
    ProxyError, Result,
    app::AppContext,
    config::ConfigManager,
    database, lerror, linfo,
    logging::{self, LogComponent, LogStage},
    management,
};

/// 命令行参数
#[derive(Debug, Parser)]
#[command(name = "token-router", version, about = "Token group routing for a multi-tenant AI gateway")]
struct Args {
    /// 配置文件路径，优先于 TOKEN_ROUTER_CONFIG_PATH
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 日志级别，RUST_LOG 存在时以其为准
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init_optimized_logging(args.log_level.as_ref());

    if let Err(e) = run(args).await {
        lerror!(
            "system",
            LogStage::Startup,
            LogComponent::Main,
            "service_start_failed",
            &format!("服务启动失败: {e:?}")
        );
        return Err(e);
    }

    linfo!("system", LogStage::Shutdown, LogComponent::Main, "service_shutdown", "服务正常关闭");
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let config_manager = ConfigManager::new(args.config.as_deref()).await?;
    let config = config_manager.get_config().await;

    let db = database::init_database(&config.database)
        .await
        .map_err(|e| ProxyError::database_with_source("数据库连接失败", e))?;
    database::run_migrations(&db)
        .await
        .map_err(|e| ProxyError::database_with_source("数据库迁移失败", e))?;
    database::check_database_status(&db)
        .await
        .map_err(|e| ProxyError::database_with_source("数据库状态检查失败", e))?;

    let context = AppContext::build(&config, Arc::new(db), config_manager.group_settings());

    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::Main,
        "service_starting",
        &format!("服务启动，监听 {}", config.listen_addr())
    );
    management::serve(Arc::new(context), &config.server).await
}
