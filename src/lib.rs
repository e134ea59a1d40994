// src/lib.rs
//! GrowHire: LinkedIn job search automation.
//!
//! Scrapes job listings and feed posts through a WebDriver-controlled
//! browser, scores jobs against a resume with a language model, stores
//! everything in SQL, and sends scheduled notifications for strong matches.

pub mod bot;
pub mod browser;
pub mod cli;
pub mod config;
pub mod console;
pub mod error;
pub mod evaluation;
pub mod llm;
pub mod resume;
pub mod scheduler;
pub mod scraping;
pub mod storage;
pub mod tasks;
pub mod text;

pub use bot::GrowHireBot;
pub use config::AppConfig;
pub use error::{classify, ErrorKind};
