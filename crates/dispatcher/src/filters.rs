use std::sync::Arc;

use tracing::{debug, warn};

use hookcast_core::{
    Destination, EnvSource, ExpressionEvaluator, HookcastError, HookcastResult, IncomingEvent,
};

/// 目标过滤器
///
/// 只有 `applicable` 返回 true 时才会调用 `run`。`run` 返回 `Ok(false)`
/// 或错误都会把该目标排除。
pub trait DestinationFilter: Send + Sync {
    fn name(&self) -> &str;

    fn applicable(&self, event: &IncomingEvent, destination: &Destination) -> bool;

    fn run(&self, event: &IncomingEvent, destination: &Destination) -> HookcastResult<bool>;
}

/// 校验表达式过滤器
///
/// 负载绑定为 `document`，目标配置绑定为 `config`。求值失败时按不合格处理。
pub struct ValidationFilter {
    evaluator: Arc<dyn ExpressionEvaluator>,
}

impl ValidationFilter {
    pub fn new(evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        Self { evaluator }
    }
}

impl DestinationFilter for ValidationFilter {
    fn name(&self) -> &str {
        "validation"
    }

    fn applicable(&self, _event: &IncomingEvent, destination: &Destination) -> bool {
        !destination.config().validate.trim().is_empty()
    }

    fn run(&self, event: &IncomingEvent, destination: &Destination) -> HookcastResult<bool> {
        let config = serde_json::to_value(destination.config())?;
        self.evaluator
            .evaluate(&destination.config().validate, &event.payload, &config)
    }
}

/// 来源过滤器，防止服务触发自己的 webhook
pub struct SourceFilter;

impl DestinationFilter for SourceFilter {
    fn name(&self) -> &str {
        "source"
    }

    fn applicable(&self, _event: &IncomingEvent, destination: &Destination) -> bool {
        !destination.config().allow_loopback
    }

    fn run(&self, event: &IncomingEvent, destination: &Destination) -> HookcastResult<bool> {
        Ok(event.source != destination.config().source)
    }
}

/// 定向重投过滤器：控制参数里列出目标名时，只保留列表中的目标
pub struct DesiredHookFilter;

impl DestinationFilter for DesiredHookFilter {
    fn name(&self) -> &str {
        "desired_hook"
    }

    fn applicable(&self, event: &IncomingEvent, _destination: &Destination) -> bool {
        event
            .control
            .desired_hooks
            .as_ref()
            .is_some_and(|hooks| !hooks.is_empty())
    }

    fn run(&self, event: &IncomingEvent, destination: &Destination) -> HookcastResult<bool> {
        let hooks = event.control.desired_hooks.as_deref().unwrap_or_default();
        Ok(hooks.iter().any(|name| name == destination.name()))
    }
}

/// 环境开关过滤器：`<NAME>_ENABLED` 显式设置为关闭值时排除目标
pub struct EnvironmentFilter {
    env: Arc<dyn EnvSource>,
}

const DISABLING_VALUES: [&str; 5] = ["false", "0", "no", "off", "disabled"];

impl EnvironmentFilter {
    pub fn new(env: Arc<dyn EnvSource>) -> Self {
        Self { env }
    }

    pub fn toggle_name(destination: &Destination) -> String {
        format!("{}_ENABLED", destination.env_prefix())
    }
}

impl DestinationFilter for EnvironmentFilter {
    fn name(&self) -> &str {
        "environment"
    }

    fn applicable(&self, _event: &IncomingEvent, _destination: &Destination) -> bool {
        true
    }

    fn run(&self, _event: &IncomingEvent, destination: &Destination) -> HookcastResult<bool> {
        let enabled = match self.env.var(&Self::toggle_name(destination)) {
            Some(value) => {
                let value = value.trim().to_ascii_lowercase();
                !DISABLING_VALUES.contains(&value.as_str())
            }
            None => true,
        };
        Ok(enabled)
    }
}

/// 按固定顺序执行的过滤器链
pub struct FilterChain {
    filters: Vec<Box<dyn DestinationFilter>>,
}

impl FilterChain {
    pub fn new(filters: Vec<Box<dyn DestinationFilter>>) -> Self {
        Self { filters }
    }

    /// 校验表达式 → 来源 → 定向重投 →（可选）环境开关
    pub fn standard(
        evaluator: Arc<dyn ExpressionEvaluator>,
        env: Arc<dyn EnvSource>,
        kill_switch: bool,
    ) -> Self {
        let mut filters: Vec<Box<dyn DestinationFilter>> = vec![
            Box::new(ValidationFilter::new(evaluator)),
            Box::new(SourceFilter),
            Box::new(DesiredHookFilter),
        ];
        if kill_switch {
            filters.push(Box::new(EnvironmentFilter::new(env)));
        }
        Self { filters }
    }

    pub fn filter_names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// 任一适用的过滤器否决即短路
    pub fn is_eligible(&self, event: &IncomingEvent, destination: &Destination) -> bool {
        for filter in &self.filters {
            if !filter.applicable(event, destination) {
                continue;
            }
            match filter.run(event, destination) {
                Ok(true) => {}
                Ok(false) => {
                    debug!(
                        event_key = %event.event_key,
                        destination = %destination.name(),
                        "目标被过滤器 {} 排除",
                        filter.name()
                    );
                    return false;
                }
                Err(e) => {
                    log_filter_error(filter.name(), event, destination, &e);
                    return false;
                }
            }
        }
        true
    }

    pub fn sift(&self, event: &IncomingEvent, destinations: Vec<Destination>) -> Vec<Destination> {
        destinations
            .into_iter()
            .filter(|destination| self.is_eligible(event, destination))
            .collect()
    }
}

fn log_filter_error(
    filter: &str,
    event: &IncomingEvent,
    destination: &Destination,
    error: &HookcastError,
) {
    warn!(
        event_key = %event.event_key,
        destination = %destination.name(),
        "过滤器 {} 执行失败，目标被排除: {}",
        filter,
        error
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use hookcast_core::traits::MapEnv;
    use hookcast_core::{Configuration, ControlParams};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 按表达式字面值返回结果的求值器
    struct StubEvaluator {
        calls: AtomicUsize,
    }

    impl StubEvaluator {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl ExpressionEvaluator for StubEvaluator {
        fn evaluate(&self, expression: &str, document: &Value, config: &Value) -> HookcastResult<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match expression {
                "true" => Ok(true),
                "false" => Ok(false),
                "has_field1" => Ok(document.get("field1").is_some()),
                "config_named_search" => Ok(config["name"] == "search"),
                _ => Err(HookcastError::Expression(format!("cannot parse '{expression}'"))),
            }
        }
    }

    fn destination(config: Configuration) -> Destination {
        Destination::new(Arc::new(config))
    }

    fn event() -> IncomingEvent {
        IncomingEvent::new("product.update", "core")
            .with_payload(json!({"field1": 1}))
            .with_target_id("product_id")
    }

    fn chain(evaluator: Arc<StubEvaluator>, env: MapEnv) -> FilterChain {
        FilterChain::standard(evaluator, Arc::new(env), true)
    }

    #[test]
    fn test_standard_order() {
        let chain = chain(Arc::new(StubEvaluator::new()), MapEnv::new());
        assert_eq!(
            chain.filter_names(),
            vec!["validation", "source", "desired_hook", "environment"]
        );
        let without_kill_switch = FilterChain::standard(
            Arc::new(StubEvaluator::new()),
            Arc::new(MapEnv::new()),
            false,
        );
        assert_eq!(without_kill_switch.filter_names().len(), 3);
    }

    #[test]
    fn test_validation_filter_binds_document_and_config() {
        let evaluator = Arc::new(StubEvaluator::new());
        let chain = chain(evaluator.clone(), MapEnv::new());

        let pass = destination(Configuration::new("search").with_validate("has_field1"));
        let by_config = destination(Configuration::new("search").with_validate("config_named_search"));
        let reject = destination(Configuration::new("search").with_validate("false"));

        assert!(chain.is_eligible(&event(), &pass));
        assert!(chain.is_eligible(&event(), &by_config));
        assert!(!chain.is_eligible(&event(), &reject));
        assert_eq!(evaluator.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_validation_error_fails_closed() {
        let chain = chain(Arc::new(StubEvaluator::new()), MapEnv::new());
        let broken = destination(Configuration::new("search").with_validate("document.(("));
        assert!(!chain.is_eligible(&event(), &broken));
    }

    #[test]
    fn test_empty_expression_is_not_evaluated() {
        let evaluator = Arc::new(StubEvaluator::new());
        let chain = chain(evaluator.clone(), MapEnv::new());
        assert!(chain.is_eligible(&event(), &destination(Configuration::new("search"))));
        assert_eq!(evaluator.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_source_filter_blocks_loopback() {
        let chain = chain(Arc::new(StubEvaluator::new()), MapEnv::new());
        let same_source = destination(Configuration::new("core-hook").with_source("core"));
        let loopback_allowed = destination(
            Configuration::new("core-hook")
                .with_source("core")
                .with_allow_loopback(true),
        );
        let other_source = destination(Configuration::new("search").with_source("search"));

        assert!(!chain.is_eligible(&event(), &same_source));
        assert!(chain.is_eligible(&event(), &loopback_allowed));
        assert!(chain.is_eligible(&event(), &other_source));
    }

    #[test]
    fn test_desired_hooks_allow_list() {
        let chain = chain(Arc::new(StubEvaluator::new()), MapEnv::new());
        let targeted = event().with_control(ControlParams::default().with_desired_hooks(["audit"]));

        let destinations = vec![
            destination(Configuration::new("search")),
            destination(Configuration::new("audit")),
            destination(Configuration::new("crm")),
        ];
        let kept = chain.sift(&targeted, destinations);
        let names: Vec<&str> = kept.iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["audit"]);
    }

    #[test]
    fn test_desired_hooks_do_not_override_other_vetoes() {
        let chain = chain(Arc::new(StubEvaluator::new()), MapEnv::new());
        let targeted = event().with_control(ControlParams::default().with_desired_hooks(["audit"]));
        let audit = destination(Configuration::new("audit").with_validate("false"));
        assert!(!chain.is_eligible(&targeted, &audit));
    }

    #[test]
    fn test_environment_kill_switch() {
        let env = MapEnv::new()
            .with_var("SEARCH_INDEXER_ENABLED", "False")
            .with_var("AUDIT_ENABLED", "true");
        let chain = chain(Arc::new(StubEvaluator::new()), env);

        assert!(!chain.is_eligible(&event(), &destination(Configuration::new("search-indexer"))));
        assert!(chain.is_eligible(&event(), &destination(Configuration::new("audit"))));
        // 未设置时默认启用
        assert!(chain.is_eligible(&event(), &destination(Configuration::new("crm"))));
    }
}
