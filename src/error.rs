//! Error types for configuration, segmentation and alignment.

use thiserror::Error;

/// Errors raised while building a feature system, scorer or project.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown feature: {0}")]
    UnknownFeature(String),

    #[error("unknown feature symbol: {0}")]
    UnknownSymbol(String),

    #[error("feature symbol {0} is defined more than once")]
    DuplicateSymbol(String),

    #[error("feature {0} is defined more than once")]
    DuplicateFeature(String),

    #[error("relevant feature {0} has no weight")]
    MissingWeight(String),

    #[error("symbol {symbol} of relevant feature {feature} has no value metric")]
    MissingMetric { feature: String, symbol: String },

    #[error("feature {0} does not fit: the feature system is full")]
    TooManyFeatures(String),

    #[error("feature symbol {0} does not fit: the feature system is full")]
    TooManySymbols(String),

    #[error("segment {0} is defined more than once")]
    DuplicateSegment(String),

    #[error("invalid sound class {name}: {reason}")]
    InvalidSoundClass { name: String, reason: String },

    #[error("invalid project configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while turning a transcription into segments.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SegmentationError {
    #[error("unrecognized symbol {symbol:?} in {text:?}")]
    UnknownSymbol { text: String, symbol: String },

    #[error("modifier {symbol:?} has no segment to attach to in {text:?}")]
    DanglingModifier { text: String, symbol: String },

    #[error("joiner at the end of {0:?}")]
    DanglingJoiner(String),

    #[error("stem markers must come in a single pair: {0:?}")]
    UnbalancedStem(String),
}

/// Errors raised by alignment entry points.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AlignmentError {
    #[error("multiple alignment needs at least 2 sequences, got {0}")]
    TooFewSequences(usize),
}
