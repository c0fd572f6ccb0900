//! Integration tests for cawatch-bot.
//!
//! These tests verify the interaction between components:
//! - Scheduler windows driving scheduled re-checks
//! - Message intake through resolution, filtering, dedup and dispatch
//! - Telegram transport against a mock Bot API

#![allow(dead_code)]

pub mod common;
