//! Gemini - Google Gemini generate-content provider
//!
//! This module implements the Google Gemini provider using reqwest.

mod config;
mod convert;
mod provider;

#[cfg(test)]
mod tests;

pub use config::{API_KEY_ENV_VARS, DEFAULT_MODEL, GEMINI_API_BASE};
pub use provider::GeminiProvider;
