pub mod engine;
pub mod plan;
pub mod providers;
pub mod value;
