//! Error types for Ripple

use thiserror::Error;

/// Errors related to node addresses
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Invalid identity format: {0}")]
    InvalidFormat(String),

    #[error("Invalid address length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },
}

/// Errors produced while encoding or decoding flood frames
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame truncated: needed {needed} bytes, had {available}")]
    Truncated { needed: usize, available: usize },

    #[error("Unexpected ethertype 0x{actual:04x} (expected 0x{expected:04x})")]
    WrongEtherType { expected: u16, actual: u16 },

    #[error("Unsupported flood header version {0}")]
    UnsupportedVersion(u8),

    #[error("Invalid address in flood header: {0}")]
    InvalidAddress(#[from] IdentityError),

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },
}
