pub mod barrier;
pub mod metrics;
pub mod schema;
pub mod sink;
pub mod statement;
