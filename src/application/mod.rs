pub mod app_error;
pub mod event_dispatch;
pub mod ports;
pub mod use_cases;
