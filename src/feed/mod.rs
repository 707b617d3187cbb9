//! Inbound feed for the EMG Predict Agent.
//!
//! This module provides the line transport that delivers sensor readings and
//! word events, and the parser that turns each line into a feed event.

pub mod reader;
pub mod types;

// Re-export commonly used types
pub use reader::{FeedError, SampleFeed};
pub use types::{parse_line, parse_value, FeedEvent, ParseError, Sample, WordEvent};
