//! pdhost core - isolated multi-instance hosting of a Pure Data engine

pub mod config;
pub mod pd;
pub mod types;

pub use types::*;
