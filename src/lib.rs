//! Library root for the `comment_sentiment` crate

// Core error handling
pub mod errors;
pub mod api_errors;

// Configuration and logging
pub mod config;
pub mod logging;

// Text classification pipeline
pub mod label;
pub mod normalizer;
pub mod vectorizer;
pub mod classifier;
pub mod pipeline;

// Offline stages
pub mod dataset;
pub mod training;
pub mod evaluation;
pub mod registry;

// Serving and command line
pub mod serving;
pub mod cli;
