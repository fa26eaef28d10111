pub mod billing_event;
pub mod notification;
pub mod plan_catalog;
pub mod subscription;
