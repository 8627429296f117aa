//! Error types for the receive pipeline.
//!
//! Only a handful of operations can fail in a way the caller has to handle:
//! claiming the radio transport, configuring the hardware decoder, loading
//! configuration and reading capture files. Everything that happens per
//! packet on the lossy link (bad frames, orphan fragments, input slot
//! starvation) is dropped and logged instead of surfacing as an error.
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use fpvlink::LinkError;
//!
//! let error = LinkError::transport_failed("adapter not claimed");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::types::Channel;

/// Result type alias for pipeline operations.
pub type Result<T, E = LinkError> = std::result::Result<T, E>;

/// Main error type for pipeline operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum LinkError {
    #[error("Radio transport failure: {reason}")]
    Transport {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Decoder operation '{operation}' failed with status {code}")]
    Decoder { operation: String, code: i32 },

    #[error("Failed to configure {mime} decoder: {reason}")]
    DecoderConfig { mime: String, reason: String },

    #[error("Aggregator for {channel} channel failed: {reason}")]
    Aggregator { channel: Channel, reason: String },

    #[error("Invalid configuration: {reason}")]
    Config {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("I/O error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Capture error in {context}: {details}")]
    Capture { context: String, details: String },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("'{operation}' is not valid while the decoder is {state}")]
    InvalidState { operation: String, state: String },
}

impl LinkError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            LinkError::Transport { .. } => true,
            LinkError::Decoder { .. } => true,
            LinkError::DecoderConfig { .. } => true,
            LinkError::Timeout { .. } => true,
            LinkError::Aggregator { .. } => false,
            LinkError::Config { .. } => false,
            LinkError::Io { .. } => false,
            LinkError::Capture { .. } => false,
            LinkError::InvalidState { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            LinkError::Transport { .. } => vec![
                "Check the WiFi adapter is plugged in and powered",
                "Grant USB permission to the application",
                "Retry channel acquisition",
            ],
            LinkError::Decoder { .. } => vec![
                "Re-initialize the decoder",
                "Check the stream codec matches the decoder capabilities",
            ],
            LinkError::DecoderConfig { .. } => vec![
                "Wait for fresh parameter sets from the stream",
                "Verify the device supports the stream resolution",
                "Check the configured codec family",
            ],
            LinkError::Aggregator { .. } => vec![
                "Check the link key file is present and readable",
                "Verify the link id matches the transmitter",
            ],
            LinkError::Config { .. } => vec![
                "Check the configuration file syntax",
                "Compare values against the documented defaults",
            ],
            LinkError::Io { .. } => vec![
                "Check the file exists and is readable",
                "Check file permissions",
            ],
            LinkError::Capture { .. } => vec![
                "Verify the capture file is a pcap with 802.11 or radiotap frames",
                "Check the capture file is not truncated",
            ],
            LinkError::Timeout { .. } => vec![
                "Increase the timeout duration",
                "Check the hardware decoder is responsive",
            ],
            LinkError::InvalidState { .. } => vec![
                "Call deinit before re-initializing the decoder",
                "Check the decoder lifecycle ordering",
            ],
        }
    }

    /// Helper constructor for transport failures.
    pub fn transport_failed(reason: impl Into<String>) -> Self {
        LinkError::Transport { reason: reason.into(), source: None }
    }

    /// Helper constructor for transport failures with source.
    pub fn transport_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        LinkError::Transport { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for decoder status failures.
    pub fn decoder_fault(operation: impl Into<String>, code: i32) -> Self {
        LinkError::Decoder { operation: operation.into(), code }
    }

    /// Helper constructor for decoder configuration failures.
    pub fn decoder_config(mime: impl Into<String>, reason: impl Into<String>) -> Self {
        LinkError::DecoderConfig { mime: mime.into(), reason: reason.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config(reason: impl Into<String>) -> Self {
        LinkError::Config { reason: reason.into(), source: None }
    }

    /// Helper constructor for capture parsing errors.
    pub fn capture(context: impl Into<String>, details: impl Into<String>) -> Self {
        LinkError::Capture { context: context.into(), details: details.into() }
    }

    /// Helper constructor for file errors with path context.
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LinkError::Io { path: path.into(), source }
    }

    /// Helper constructor for lifecycle violations.
    pub fn invalid_state(operation: impl Into<String>, state: impl ToString) -> Self {
        LinkError::InvalidState { operation: operation.into(), state: state.to_string() }
    }
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        LinkError::Io { path: PathBuf::from("<unknown>"), source: err }
    }
}

impl From<serde_yaml_ng::Error> for LinkError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        LinkError::Config { reason: err.to_string(), source: Some(Box::new(err)) }
    }
}
