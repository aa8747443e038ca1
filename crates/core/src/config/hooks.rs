use std::collections::HashSet;
use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::models::Configuration;
use crate::{HookcastError, HookcastResult};

/// 从 JSON 文件加载目标配置
pub fn load_configurations(path: impl AsRef<Path>) -> HookcastResult<Vec<Configuration>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        HookcastError::Configuration(format!("读取目标配置文件 {} 失败: {e}", path.display()))
    })?;

    let configs = parse_configurations(&content)?;
    info!("Loaded {} hook configurations from {}", configs.len(), path.display());
    Ok(configs)
}

/// 解析目标配置数组，名称必须非空且唯一
pub fn parse_configurations(content: &str) -> HookcastResult<Vec<Configuration>> {
    let configs: Vec<Configuration> = serde_json::from_str(content)
        .map_err(|e| HookcastError::Configuration(format!("解析目标配置失败: {e}")))?;

    let mut names = HashSet::new();
    for config in &configs {
        if config.name.trim().is_empty() {
            return Err(HookcastError::Configuration(format!(
                "目标配置缺少名称 (id={})",
                config.id
            )));
        }
        if !names.insert(config.name.as_str()) {
            return Err(HookcastError::Configuration(format!(
                "目标名称重复: {}",
                config.name
            )));
        }
        if config.actions.is_empty() {
            debug!("Hook '{}' subscribes to no actions", config.name);
        }
    }

    Ok(configs)
}
