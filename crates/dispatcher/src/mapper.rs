use std::collections::HashMap;
use std::sync::Arc;

use hookcast_core::Configuration;

/// 按订阅的动作键索引目标配置
///
/// 一个订阅了 N 个动作键的配置会出现在 N 个列表中；同一个键下的顺序
/// 与输入顺序一致，不隐含任何优先级。
#[derive(Debug, Default)]
pub struct ConfigurationMapper {
    by_action: HashMap<String, Vec<Arc<Configuration>>>,
    configs: Vec<Arc<Configuration>>,
}

impl ConfigurationMapper {
    pub fn new(configs: Vec<Configuration>) -> Self {
        Self::from_shared(configs.into_iter().map(Arc::new).collect())
    }

    pub fn from_shared(configs: Vec<Arc<Configuration>>) -> Self {
        let mut by_action: HashMap<String, Vec<Arc<Configuration>>> = HashMap::new();
        for config in &configs {
            for action in &config.actions {
                by_action
                    .entry(action.clone())
                    .or_default()
                    .push(Arc::clone(config));
            }
        }
        Self { by_action, configs }
    }

    /// 没有订阅者时返回空列表
    pub fn configs_for_key(&self, action_key: &str) -> Vec<Arc<Configuration>> {
        self.by_action.get(action_key).cloned().unwrap_or_default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<Configuration>> {
        self.configs.iter().find(|c| c.name == name).cloned()
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    pub fn action_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.by_action.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}
