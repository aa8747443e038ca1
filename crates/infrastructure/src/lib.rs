pub mod evaluator;
pub mod senders;
pub mod store;

pub use evaluator::SimpleExpressionEvaluator;
pub use senders::{AmqpSender, ConsoleSender, HttpSender, HttpSenderConfig};
pub use store::{build_store, MemoryStore, MemoryStoreConfig, RedisStore, RedisStoreConfig};
