pub mod metrics_defs;
pub mod run_log;
