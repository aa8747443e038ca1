//! 事件分发引擎的核心类型：数据模型、错误分类、能力接口和配置

pub mod config;
pub mod duration;
pub mod errors;
pub mod models;
pub mod traits;

pub use errors::*;
pub use models::{Configuration, ControlParams, Destination, IncomingEvent};
pub use traits::{EnvSource, ExpressionEvaluator, Sender, Store};
