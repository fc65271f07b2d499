pub mod status_log;
