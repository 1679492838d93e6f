pub mod config;
pub mod download_cache;
pub mod evaluation;
pub mod export;
pub mod feature_table;
pub mod forest;
pub mod http_client;
pub mod matrix;
pub mod metrics;
pub mod pipeline;
pub mod provider;
pub mod records;
pub mod row_filter;
pub mod schedule_context;
pub mod temporal;
