use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for cartridge operations
pub type Result<T> = std::result::Result<T, CartridgeError>;

/// Unified error type for packing and loading cartridges
#[derive(Debug, Error)]
pub enum CartridgeError {
    // Build errors
    /// An input could not be opened, sized or read. `index` is 1-based.
    #[error("Error reading input file #{index} '{}'", path.display())]
    InputFile {
        index: usize,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Error writing output file '{}'", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Block index full: no empty slot for input #{index}")]
    IndexFull { index: usize },

    #[error("Input #{index} name '{name}' hashes to the reserved empty id")]
    ReservedId { index: usize, name: String },

    // Load errors
    #[error("Invalid magic number: expected {expected:08X}, found {found:08X}")]
    InvalidMagic { expected: u32, found: u32 },

    #[error("Unsupported cartridge version: {0}")]
    UnsupportedVersion(u64),

    #[error("Truncated cartridge: expected {expected} bytes, found {actual}")]
    Truncated { expected: u64, actual: u64 },

    #[error("Invalid cartridge structure: {0}")]
    InvalidStructure(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CartridgeError {
    /// True when the archive was rejected because its magic or version did not match.
    pub fn is_format_mismatch(&self) -> bool {
        matches!(
            self,
            CartridgeError::InvalidMagic { .. } | CartridgeError::UnsupportedVersion(_)
        )
    }

    /// 1-based position of the offending input for build-time failures.
    pub fn input_index(&self) -> Option<usize> {
        match self {
            CartridgeError::InputFile { index, .. }
            | CartridgeError::IndexFull { index }
            | CartridgeError::ReservedId { index, .. } => Some(*index),
            _ => None,
        }
    }
}
