#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use hookcast_core::traits::MapEnv;
use hookcast_core::{
    Configuration, Destination, EnvSource, HookcastError, HookcastResult, IncomingEvent, Sender,
};
use hookcast_dispatcher::{
    ConfigurationMapper, Dispatcher, EventController, FilterChain, SenderRegistry,
    TraceIdMiddleware,
};
use hookcast_infrastructure::{MemoryStore, SimpleExpressionEvaluator};

/// 一次发送调用的记录
#[derive(Debug, Clone)]
pub struct SentEvent {
    pub destination: String,
    pub callback_url: String,
    pub event: IncomingEvent,
    pub at: Instant,
}

/// 记录所有调用的发送器，可配置为总是失败
pub struct RecordingSender {
    name: String,
    failure: Option<HookcastError>,
    sent: Mutex<Vec<SentEvent>>,
}

impl RecordingSender {
    pub fn ok() -> Arc<Self> {
        Self::named("http", None)
    }

    pub fn failing(error: HookcastError) -> Arc<Self> {
        Self::named("http", Some(error))
    }

    pub fn named(name: &str, failure: Option<HookcastError>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            failure,
            sent: Mutex::new(Vec::new()),
        })
    }

    pub async fn calls(&self) -> usize {
        self.sent.lock().await.len()
    }

    pub async fn sent(&self) -> Vec<SentEvent> {
        self.sent.lock().await.clone()
    }

    pub async fn destinations(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .sent
            .lock()
            .await
            .iter()
            .map(|s| s.destination.clone())
            .collect();
        names.sort();
        names
    }
}

#[async_trait]
impl Sender for RecordingSender {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send_event(&self, event: &IncomingEvent, destination: &Destination) -> HookcastResult<()> {
        self.sent.lock().await.push(SentEvent {
            destination: destination.name().to_string(),
            callback_url: destination.callback_url().to_string(),
            event: event.clone(),
            at: Instant::now(),
        });
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

pub fn subscriber(name: &str) -> Configuration {
    Configuration::new(name)
        .with_actions(["product.update"])
        .with_source(format!("{name}-service"))
        .with_callback_url(format!("https://{name}.example.com/hook"))
}

pub fn product_event() -> IncomingEvent {
    IncomingEvent::new("product.update", "core")
        .with_payload(serde_json::json!({"field1": 1}))
        .with_target_id("product_id")
}

pub fn build_controller(
    configs: Vec<Configuration>,
    sender: Arc<RecordingSender>,
    env: MapEnv,
) -> EventController {
    let store = Arc::new(MemoryStore::new());
    let senders = SenderRegistry::new().with_sender(sender);
    let dispatcher = Dispatcher::new(store, senders);
    let env: Arc<dyn EnvSource> = Arc::new(env);
    let filters = FilterChain::standard(Arc::new(SimpleExpressionEvaluator::new()), env.clone(), true);

    EventController::new(ConfigurationMapper::new(configs), filters, dispatcher, env)
        .with_middleware(Box::new(TraceIdMiddleware))
}
