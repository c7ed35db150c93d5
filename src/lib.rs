pub mod command;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod format;
pub mod hwaccel;
pub mod models;
pub mod processor;
pub mod service;
pub mod store;
pub mod web;

pub use config::Config;
pub use error::{Error, Result};
pub use service::ConversionService;
