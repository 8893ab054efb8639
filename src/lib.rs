// Kagami image resizing library

pub mod cache;
pub mod config;
pub mod constants;
pub mod diagnostics;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod metrics;
pub mod options;
pub mod pipeline;
pub mod proxy;
pub mod responsive;
pub mod router;
pub mod service;
pub mod storage;
pub mod strategy;
