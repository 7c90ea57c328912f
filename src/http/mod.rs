//! HTTP responder adapters
//!
//! Provides the OpenAI-compatible chat completion client used by the CLI.

mod client;

pub use client::{OpenAiCompatibleResponder, Pricing};
