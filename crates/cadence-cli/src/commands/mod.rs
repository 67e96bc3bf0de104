pub mod common;
pub mod config;
pub mod detect;
pub mod missed;
pub mod stats;
pub mod task;
