pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod extract;
pub mod format;
pub mod logging;
pub mod masking;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod prompt;
pub mod schema;
pub mod validation;
