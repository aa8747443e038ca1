use std::collections::HashMap;
use std::sync::Arc;

use hookcast_core::{HookcastError, HookcastResult, Sender};

pub const DEFAULT_TRANSPORT: &str = "http";

/// 按传输选择器查找发送器
pub struct SenderRegistry {
    senders: HashMap<String, Arc<dyn Sender>>,
    default_transport: String,
}

impl SenderRegistry {
    pub fn new() -> Self {
        Self::with_default_transport(DEFAULT_TRANSPORT)
    }

    pub fn with_default_transport(default_transport: impl Into<String>) -> Self {
        Self {
            senders: HashMap::new(),
            default_transport: default_transport.into(),
        }
    }

    /// 以发送器自身的名称注册，同名的会被替换
    pub fn register(&mut self, sender: Arc<dyn Sender>) {
        self.senders.insert(sender.name().to_string(), sender);
    }

    pub fn with_sender(mut self, sender: Arc<dyn Sender>) -> Self {
        self.register(sender);
        self
    }

    pub fn default_transport(&self) -> &str {
        &self.default_transport
    }

    pub fn transports(&self) -> Vec<String> {
        let mut names: Vec<String> = self.senders.keys().cloned().collect();
        names.sort();
        names
    }

    /// 空选择器使用默认传输；未知的选择器是配置错误，不可重试
    pub fn resolve(&self, selector: &str) -> HookcastResult<Arc<dyn Sender>> {
        let selector = selector.trim();
        let name = if selector.is_empty() {
            self.default_transport.as_str()
        } else {
            selector
        };
        self.senders
            .get(name)
            .cloned()
            .ok_or_else(|| HookcastError::Unretryable(format!("未知的传输类型: {name}")))
    }
}

impl Default for SenderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
