pub mod aggregate;
pub mod config;
pub mod entity;
pub mod error;
pub mod fragments;
pub mod mapping;
pub mod pipeline;
pub mod publish;

pub use error::{PipelineError, Result};
