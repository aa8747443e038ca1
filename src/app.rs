use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use hookcast_api::{create_app, routes::AppState};
use hookcast_core::config::{load_configurations, AppConfig};
use hookcast_core::traits::ProcessEnv;
use hookcast_core::EnvSource;
use hookcast_dispatcher::{
    ConfigurationMapper, Dispatcher, EventController, FilterChain, LoggingMiddleware, RetryPolicy,
    SenderRegistry, TaskTracker, TraceIdMiddleware,
};
use hookcast_infrastructure::{
    build_store, AmqpSender, ConsoleSender, HttpSender, HttpSenderConfig, MemoryStore,
    SimpleExpressionEvaluator,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::{net::TcpListener, sync::watch};
use tracing::{info, warn};

/// 主应用程序
pub struct Application {
    config: AppConfig,
    controller: Arc<EventController>,
    memory_store: Option<Arc<MemoryStore>>,
    amqp: Option<Arc<AmqpSender>>,
    metrics: Option<PrometheusHandle>,
}

impl Application {
    /// 创建新的应用实例
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!("初始化应用程序，存储类型: {:?}", config.store.r#type);

        let configs = load_configurations(&config.hooks.path)
            .with_context(|| format!("加载目标配置失败: {}", config.hooks.path))?;
        info!("已加载 {} 个目标配置", configs.len());

        let (store, memory_store) = build_store(&config.store)
            .await
            .context("创建节流存储失败")?;

        let (senders, amqp) = build_senders(&config);
        info!("已注册传输方式: {:?}", senders.transports());

        let retry_policy =
            RetryPolicy::new(Duration::from_secs(config.dispatcher.default_retry_backoff_seconds));
        let dispatcher = Dispatcher::with_parts(
            store,
            senders,
            TaskTracker::new(),
            retry_policy,
            config.dispatcher.max_retained_errors,
        );

        let env: Arc<dyn EnvSource> = Arc::new(ProcessEnv);
        let filters = FilterChain::standard(
            Arc::new(SimpleExpressionEvaluator::new()),
            Arc::clone(&env),
            config.dispatcher.kill_switch_enabled,
        );
        let controller = EventController::new(ConfigurationMapper::new(configs), filters, dispatcher, env)
            .with_middleware(Box::new(TraceIdMiddleware))
            .with_middleware(Box::new(LoggingMiddleware));

        let metrics = if config.observability.metrics_enabled {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .context("安装Prometheus指标记录器失败")?;
            Some(handle)
        } else {
            None
        };

        Ok(Self {
            config,
            controller: Arc::new(controller),
            memory_store,
            amqp,
            metrics,
        })
    }

    pub fn controller(&self) -> &Arc<EventController> {
        &self.controller
    }

    /// 运行接入服务，收到关闭信号后停止接收请求并等待分发任务完成
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        let mut state = AppState::new(Arc::clone(&self.controller));
        if let Some(handle) = &self.metrics {
            state = state.with_metrics(handle.clone());
        }
        let app = create_app(state, self.config.server.max_body_bytes);

        let bind_address = &self.config.server.bind_address;
        let listener = TcpListener::bind(bind_address)
            .await
            .with_context(|| format!("绑定地址失败: {bind_address}"))?;
        info!("接入服务监听于 {}", bind_address);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                crate::shutdown::stopped(&mut shutdown_rx).await;
                info!("接入服务停止接收新请求");
            })
            .await
            .context("接入服务运行失败")?;

        self.drain().await;
        Ok(())
    }

    /// 重新读取目标配置文件并替换映射
    pub async fn reload_hooks(&self) -> Result<()> {
        let configs = load_configurations(&self.config.hooks.path)
            .with_context(|| format!("重新加载目标配置失败: {}", self.config.hooks.path))?;
        self.controller.reload(configs).await;
        Ok(())
    }

    async fn drain(&self) {
        let dispatcher = self.controller.dispatcher();
        let timeout = Duration::from_secs(self.config.dispatcher.drain_timeout_seconds);
        info!("等待 {} 个分发任务完成", dispatcher.in_flight());

        if dispatcher.drain_timeout(timeout).await {
            info!("所有分发任务已完成");
        } else {
            warn!("等待分发任务超时，仍有 {} 个任务未完成", dispatcher.in_flight());
        }

        let errors = dispatcher.take_errors().await;
        if !errors.is_empty() {
            warn!("关闭时仍保留 {} 个最近的分发错误", errors.len());
        }

        if let Some(amqp) = &self.amqp {
            if let Err(e) = amqp.close().await {
                warn!("关闭AMQP连接失败: {}", e);
            }
        }
        if let Some(store) = &self.memory_store {
            store.shutdown();
        }
    }
}

fn build_senders(config: &AppConfig) -> (SenderRegistry, Option<Arc<AmqpSender>>) {
    let http = HttpSender::with_config(HttpSenderConfig {
        timeout: Duration::from_secs(config.senders.http_timeout_seconds),
        user_agent: config.senders.user_agent.clone(),
    });

    let mut senders = SenderRegistry::with_default_transport(config.senders.default_transport.clone())
        .with_sender(Arc::new(http))
        .with_sender(Arc::new(ConsoleSender::new()));

    let amqp = config.senders.amqp_url.as_ref().map(|url| Arc::new(AmqpSender::new(url.clone())));
    if let Some(sender) = &amqp {
        senders.register(sender.clone());
    }

    (senders, amqp)
}
