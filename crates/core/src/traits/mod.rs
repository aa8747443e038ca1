pub mod env;
pub mod evaluator;
pub mod sender;
pub mod store;

pub use env::{EnvSource, MapEnv, ProcessEnv};
pub use evaluator::ExpressionEvaluator;
pub use sender::Sender;
pub use store::{build_data_key, QueuedValues, SetOutcome, Store, StoredValue};
