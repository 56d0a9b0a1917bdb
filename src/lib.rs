//! Cartridge-rs: content-addressed asset archives with constant-time lookup
//!
//! A cartridge packs any number of files into one contiguous blob:
//! - a fixed 32-byte header (`crpk` magic, version, block count, data size)
//! - a block index sized to the file count, addressed by name hash with linear probing
//! - the data section, every file's bytes back to back in build order
//!
//! Looking a file up hashes its name twice (placement hash and verification id)
//! and probes the index; no directory is scanned.
//!
//! # Example
//!
//! ```no_run
//! use cartridge_rs::{Cartridge, Packer};
//!
//! // Pack two files, keyed by their paths
//! let mut packer = Packer::new();
//! packer.add_file("assets/hero.png").add_file("assets/theme.wav");
//! packer.pack("game.crpk")?;
//!
//! // Load and look up by name
//! let cartridge = Cartridge::open("game.crpk")?;
//! let hero: &[u8] = cartridge.get("assets/hero.png");
//! # let _ = hero;
//! # Ok::<(), cartridge_rs::error::CartridgeError>(())
//! ```

// Core modules
pub mod archive;
pub mod error;
pub mod hash;

// Re-export commonly used types
pub use archive::{
    pack, BlockRecord, Cartridge, Header, PackPlan, PackSummary, Packer, BLOCK_RECORD_SIZE,
    FORMAT_VERSION, HEADER_SIZE, MAGIC_NUMBER,
};
pub use error::{CartridgeError, Result};
pub use hash::NameKey;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_basics() {
        // Ensure core types are accessible
        let header = Header::new(0, 0);
        assert!(header.validate().is_ok());
        assert!(Packer::new().is_empty());
        assert_eq!(&MAGIC_NUMBER, b"crpk");
    }
}
