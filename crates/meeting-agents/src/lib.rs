//! Command-line host for meeting generation.
//!
//! Wires the `coordination` engine to a real chat completions endpoint
//! ([`client::OpenAiGateway`]), loads configuration and the meeting input,
//! and persists scene logs and the finished meeting.

pub mod client;
pub mod config;
pub mod input;
pub mod persistence;
pub mod runner;

pub use client::OpenAiGateway;
pub use config::{ApiStyle, AppConfig, LlmEndpoint, RetrySettings};
pub use input::{InputError, MeetingInput};
pub use persistence::{JsonlSceneSink, OutputPaths, PersistenceError};
pub use runner::{run_meeting, RunOptions, RunReport};
