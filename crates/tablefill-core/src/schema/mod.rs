pub mod inspect;
pub mod postgres;
pub mod types;
