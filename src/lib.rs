#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod catalog;
pub mod config;
pub mod controller;
pub mod decorate;
pub mod logging;
pub mod machine;
pub mod pipeline;
pub mod preload;
pub mod ui;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::{run, RunOptions};
