use std::sync::Arc;

use crate::traits::EnvSource;

use super::Configuration;

/// 绑定到单次分发的目标
///
/// 由 [`Configuration`] 加上环境变量覆盖（回调地址、文档存储）组成，
/// 每次分发时创建，不做持久化。
#[derive(Debug, Clone)]
pub struct Destination {
    config: Arc<Configuration>,
    callback_url_override: Option<String>,
    document_store_override: Option<String>,
}

impl Destination {
    pub fn new(config: Arc<Configuration>) -> Self {
        Self {
            config,
            callback_url_override: None,
            document_store_override: None,
        }
    }

    /// 读取 `<NAME>_CALLBACK_URL` 和 `<NAME>_DOCUMENT_STORE` 覆盖
    pub fn from_env(config: Arc<Configuration>, env: &dyn EnvSource) -> Self {
        let prefix = env_prefix(&config.name);
        let callback_url_override = non_empty(env.var(&format!("{prefix}_CALLBACK_URL")));
        let document_store_override = non_empty(env.var(&format!("{prefix}_DOCUMENT_STORE")));
        Self {
            config,
            callback_url_override,
            document_store_override,
        }
    }

    pub fn with_callback_url_override(mut self, url: impl Into<String>) -> Self {
        self.callback_url_override = Some(url.into());
        self
    }

    pub fn with_document_store_override(mut self, store: impl Into<String>) -> Self {
        self.document_store_override = Some(store.into());
        self
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn shared_config(&self) -> Arc<Configuration> {
        Arc::clone(&self.config)
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn callback_url(&self) -> &str {
        self.callback_url_override
            .as_deref()
            .unwrap_or(&self.config.callback_url)
    }

    pub fn document_store(&self) -> &str {
        self.document_store_override
            .as_deref()
            .unwrap_or(&self.config.document_store)
    }

    pub fn env_prefix(&self) -> String {
        env_prefix(&self.config.name)
    }
}

/// 目标名转换为环境变量前缀：大写，非字母数字字符替换为 `_`
pub fn env_prefix(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
