//! Immutable value objects and aggregation primitives.

pub mod block;
pub mod cost;
pub mod model;
pub mod period;
pub mod plan;
pub mod request;
pub mod stats;
pub mod token;

pub use block::Block;
pub use cost::Cost;
pub use model::Model;
pub use period::Period;
pub use plan::{Plan, PlanName};
pub use request::Request;
pub use stats::Stats;
pub use token::Token;
