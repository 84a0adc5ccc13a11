pub mod api;
pub mod classify;
pub mod config;
pub mod dispatch;
pub mod fetch;
pub mod ingest;
pub mod observability;
pub mod runtime;
pub mod storage;
