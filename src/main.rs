use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Arg, ArgMatches, Command};
use hookcast_core::config::AppConfig;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod app;
mod shutdown;

use app::Application;
use shutdown::ShutdownManager;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    let config_path = matches.get_one::<String>("config").map(String::as_str);
    let mut config = AppConfig::load(config_path)
        .with_context(|| format!("加载配置文件失败: {}", config_path.unwrap_or("<默认路径>")))?;
    apply_overrides(&mut config, &matches);
    config.validate().context("命令行覆盖后的配置无效")?;

    init_logging(&config.observability.log_level, &config.observability.log_format)?;

    info!("启动Webhook事件分发引擎");
    info!("目标配置文件: {}", config.hooks.path);

    let drain_timeout = Duration::from_secs(config.dispatcher.drain_timeout_seconds);
    let app = Arc::new(Application::new(config).await?);

    let shutdown_manager = ShutdownManager::new();

    let app_handle = {
        let shutdown_rx = shutdown_manager.subscribe();
        let app = Arc::clone(&app);
        tokio::spawn(async move { app.run(shutdown_rx).await })
    };

    #[cfg(unix)]
    spawn_reload_listener(Arc::clone(&app));

    // 接入服务停止后还要等待分发任务，多留一些余量
    supervise(
        app_handle,
        wait_for_shutdown_signal(),
        &shutdown_manager,
        drain_timeout + Duration::from_secs(5),
    )
    .await?;

    info!("Webhook事件分发引擎已退出");
    Ok(())
}

/// 等待关闭信号；应用提前退出（例如地址被占用）时直接返回错误
async fn supervise(
    mut app_handle: JoinHandle<Result<()>>,
    shutdown_signal: impl Future<Output = ()>,
    shutdown_manager: &ShutdownManager,
    grace: Duration,
) -> Result<()> {
    tokio::select! {
        joined = &mut app_handle => {
            return match joined {
                Ok(Ok(())) => Err(anyhow!("应用在收到关闭信号前退出")),
                Ok(Err(e)) => Err(e.context("应用运行失败")),
                Err(e) => Err(anyhow!("应用任务异常终止: {e}")),
            };
        }
        _ = shutdown_signal => {}
    }

    info!("收到关闭信号，开始优雅关闭...");
    shutdown_manager.shutdown();

    match tokio::time::timeout(grace, app_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("应用已优雅关闭");
            Ok(())
        }
        Ok(Ok(Err(e))) => Err(e.context("应用关闭时发生错误")),
        Ok(Err(e)) => Err(anyhow!("应用任务异常终止: {e}")),
        Err(_) => {
            warn!("应用关闭超时，强制退出");
            Ok(())
        }
    }
}

fn cli() -> Command {
    Command::new("hookcast")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Webhook事件分发引擎")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径"),
        )
        .arg(
            Arg::new("hooks")
                .long("hooks")
                .value_name("FILE")
                .help("目标配置文件路径 (JSON)"),
        )
        .arg(
            Arg::new("bind")
                .long("bind")
                .value_name("ADDR")
                .help("接入服务监听地址"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式")
                .value_parser(["json", "pretty"]),
        )
}

/// 命令行参数优先于配置文件和环境变量
fn apply_overrides(config: &mut AppConfig, matches: &ArgMatches) {
    if let Some(path) = matches.get_one::<String>("hooks") {
        config.hooks.path = path.clone();
    }
    if let Some(bind) = matches.get_one::<String>("bind") {
        config.server.bind_address = bind.clone();
    }
    if let Some(level) = matches.get_one::<String>("log-level") {
        config.observability.log_level = level.clone();
    }
    if let Some(format) = matches.get_one::<String>("log-format") {
        config.observability.log_format = format.clone();
    }
}

/// 初始化日志系统
fn init_logging(log_level: &str, log_format: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .context("初始化JSON日志格式失败")?;
        }
        "pretty" => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()
                .context("初始化Pretty日志格式失败")?;
        }
        _ => {
            return Err(anyhow::anyhow!("不支持的日志格式: {log_format}"));
        }
    }

    Ok(())
}

/// SIGHUP 时重新加载目标配置
#[cfg(unix)]
fn spawn_reload_listener(app: Arc<Application>) {
    tokio::spawn(async move {
        let mut hangup = match signal::unix::signal(signal::unix::SignalKind::hangup()) {
            Ok(stream) => stream,
            Err(e) => {
                warn!("安装SIGHUP信号处理器失败: {e}");
                return;
            }
        };

        while hangup.recv().await.is_some() {
            info!("收到SIGHUP信号，重新加载目标配置");
            match app.reload_hooks().await {
                Ok(()) => info!("目标配置数量: {}", app.controller().hook_count().await),
                Err(e) => error!("重新加载失败，继续使用旧配置: {e:#}"),
            }
        }
    });
}

/// 等待关闭信号
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("安装Ctrl+C信号处理器失败: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("安装SIGTERM信号处理器失败: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("收到Ctrl+C信号");
        },
        _ = terminate => {
            info!("收到SIGTERM信号");
        },
    }
}
