pub mod deterministic;
pub mod structuring;
