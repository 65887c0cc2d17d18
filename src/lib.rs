//! # SQL Query Sentinel Library
//!
//! Defensive SQL drafting, validation, and self-correcting execution
//! for databases of OCR-extracted values.

pub mod app;
pub mod builder;
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod fixer;
pub mod llm;
pub mod output;
pub mod rules;
pub mod schema;
pub mod sqltext;
pub mod template;
