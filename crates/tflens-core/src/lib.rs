#[macro_use]
extern crate serde_derive;

pub extern crate tflens_kit as kit;

pub mod config;
pub mod eval;
pub mod issues;
pub mod runner;

pub use issues::{Issue, Issues};
pub use runner::{new_module_runners, Runner};
