use std::collections::HashSet;
use std::sync::Arc;

use metrics::counter;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use hookcast_core::{Configuration, DispatchError, Destination, EnvSource, IncomingEvent};

use crate::dispatcher::Dispatcher;
use crate::filters::FilterChain;
use crate::mapper::ConfigurationMapper;
use crate::middleware::Middleware;

/// 一次事件处理的回执
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchReceipt {
    pub accepted: bool,
    /// 启动了任务的目标名称
    pub destinations: Vec<String>,
    /// 本次事件的目标在返回前已经产生的错误
    pub errors: Vec<DispatchError>,
}

/// 事件处理入口：校验 → 映射 → 过滤 → 中间件 → 分发
pub struct EventController {
    mapper: RwLock<Arc<ConfigurationMapper>>,
    filters: FilterChain,
    middlewares: Vec<Box<dyn Middleware>>,
    dispatcher: Dispatcher,
    env: Arc<dyn EnvSource>,
}

impl EventController {
    pub fn new(
        mapper: ConfigurationMapper,
        filters: FilterChain,
        dispatcher: Dispatcher,
        env: Arc<dyn EnvSource>,
    ) -> Self {
        Self {
            mapper: RwLock::new(Arc::new(mapper)),
            filters,
            middlewares: Vec::new(),
            dispatcher,
            env,
        }
    }

    pub fn with_middleware(mut self, middleware: Box<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub async fn hook_count(&self) -> usize {
        self.mapper.read().await.len()
    }

    /// 重建映射并整体替换，进行中的分发继续使用旧配置
    pub async fn reload(&self, configs: Vec<Configuration>) {
        let mapper = ConfigurationMapper::new(configs);
        info!(
            "重新加载目标配置: {} 个配置, {} 个动作键",
            mapper.len(),
            mapper.action_keys().len()
        );
        *self.mapper.write().await = Arc::new(mapper);
    }

    pub async fn handle(&self, mut event: IncomingEvent) -> Result<DispatchReceipt, DispatchError> {
        counter!("hookcast_events_received_total").increment(1);

        if let Err(e) = event.validate() {
            warn!(event_key = %event.event_key, "拒绝无效事件: {}", e);
            counter!("hookcast_events_rejected_total").increment(1);
            return Err(DispatchError::execution(e.to_string()));
        }

        let mapper = Arc::clone(&*self.mapper.read().await);
        let candidates: Vec<Destination> = mapper
            .configs_for_key(&event.event_key)
            .into_iter()
            .map(|config| Destination::from_env(config, self.env.as_ref()))
            .collect();
        let candidate_count = candidates.len();

        let eligible = self.filters.sift(&event, candidates);
        let allowed: HashSet<String> = eligible.iter().map(|d| d.name().to_string()).collect();
        debug!(
            event_key = %event.event_key,
            "{} 个订阅目标中 {} 个通过过滤",
            candidate_count,
            allowed.len()
        );

        let mut destinations = eligible;
        for middleware in &self.middlewares {
            destinations = middleware.apply(&mut event, destinations);
        }
        destinations.retain(|destination| {
            let known = allowed.contains(destination.name());
            if !known {
                warn!(destination = %destination.name(), "中间件引入的目标被忽略");
            }
            known
        });

        let names: Vec<String> = destinations.iter().map(|d| d.name().to_string()).collect();
        let outcome = self.dispatcher.dispatch(event, destinations).await;
        if !outcome.accepted {
            counter!("hookcast_events_rejected_total").increment(1);
            return Err(outcome
                .errors
                .into_iter()
                .next()
                .unwrap_or_else(|| DispatchError::execution("事件未被接受")));
        }

        Ok(DispatchReceipt {
            accepted: true,
            destinations: names,
            errors: outcome.errors,
        })
    }
}
