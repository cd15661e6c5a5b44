//! Export run orchestration.

mod runner;


pub use runner::{RunStats, Runner};
