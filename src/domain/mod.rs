//! Core domain types and logic.

pub mod ohlcv;
pub mod tick;
pub mod order_book;
pub mod algo;
pub mod indicator;
pub mod signal;
pub mod fusion;
pub mod risk;
pub mod position;
pub mod portfolio;
pub mod execution;
pub mod backtest;
pub mod metrics;
pub mod strategy;
pub mod params;
pub mod config_validation;
pub mod universe;
pub mod batch;
pub mod history_cache;
pub mod context;
pub mod error;
