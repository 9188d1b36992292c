pub mod domain;
pub mod error;
pub mod protocol;

pub use primitive_types::U256;
