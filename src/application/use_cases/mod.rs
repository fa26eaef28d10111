pub mod notification;
pub mod reconciliation;
