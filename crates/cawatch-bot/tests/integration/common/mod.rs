//! Shared fixtures for bot integration tests.

pub mod fixtures;
pub mod mock_telegram;
