pub mod engine;
pub mod retry;

pub use engine::{ExecutorEngine, PlanDispatch};
