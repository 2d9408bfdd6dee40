pub mod cli;
pub mod config;
pub mod controller;
pub mod error;
pub mod objects;
pub mod runtime;
pub mod tracer;

pub use error::{Error, Result};
