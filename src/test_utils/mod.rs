//! Test utilities for use case and HTTP tests.
//!
//! This module provides:
//! - Fixture factories for provider payloads and stored rows
//! - In-memory implementations of the repository and port traits
//! - `TestAppStateBuilder` for driving the router through `axum-test`

mod app_state_builder;
mod billing_mocks;
mod notification_mocks;

pub use app_state_builder::*;
pub use billing_mocks::*;
pub use factories::*;
pub use notification_mocks::*;
