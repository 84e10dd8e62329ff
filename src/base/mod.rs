//! Core components, types, and utilities for the twim-bot.
//!
//! This module contains fundamental building blocks used throughout the application:
//! - Configuration handling and environment variables.
//! - Fixed reply phrases.
//! - Common types and result handling.

pub mod config;
pub mod phrases;
pub mod types;
