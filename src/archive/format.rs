use crate::error::{CartridgeError, Result};
use serde::Serialize;
use std::io::{Read, Write};

/// Magic tag `crpk`, stored as a little-endian u32
pub const MAGIC_NUMBER: [u8; 4] = *b"crpk";

/// Current format version
pub const FORMAT_VERSION: u64 = 1;

/// Header size in bytes
pub const HEADER_SIZE: usize = 32;

/// Block record size in bytes
pub const BLOCK_RECORD_SIZE: usize = 32;

/// Magic number as it appears in the header's first field
pub fn magic_u32() -> u32 {
    u32::from_le_bytes(MAGIC_NUMBER)
}

/// File header at the beginning of the cartridge
///
/// Layout (32 bytes, little-endian):
/// - Magic: "crpk" (4 bytes)
/// - Padding: uint32 (4 bytes, zero)
/// - Version: uint64 (8 bytes)
/// - Block Count: uint64 (8 bytes)
/// - Data Size: uint64 (8 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Header {
    pub magic: u32,
    pub padding: u32,
    pub version: u64,
    pub block_count: u64,
    pub data_size: u64,
}

impl Header {
    pub fn new(block_count: u64, data_size: u64) -> Self {
        Self {
            magic: magic_u32(),
            padding: 0,
            version: FORMAT_VERSION,
            block_count,
            data_size,
        }
    }

    /// Write header to a writer
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(&self.magic.to_le_bytes())?;
        writer.write_all(&self.padding.to_le_bytes())?;
        writer.write_all(&self.version.to_le_bytes())?;
        writer.write_all(&self.block_count.to_le_bytes())?;
        writer.write_all(&self.data_size.to_le_bytes())?;
        Ok(())
    }

    /// Read header from a reader without validating it
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        Ok(Self {
            magic: read_u32(&mut reader)?,
            padding: read_u32(&mut reader)?,
            version: read_u64(&mut reader)?,
            block_count: read_u64(&mut reader)?,
            data_size: read_u64(&mut reader)?,
        })
    }

    /// Reject headers whose magic or version do not match this implementation
    pub fn validate(&self) -> Result<()> {
        if self.magic != magic_u32() {
            return Err(CartridgeError::InvalidMagic {
                expected: magic_u32(),
                found: self.magic,
            });
        }
        if self.version != FORMAT_VERSION {
            return Err(CartridgeError::UnsupportedVersion(self.version));
        }
        Ok(())
    }

    /// Size of the block index in bytes
    pub fn index_size(&self) -> Result<u64> {
        self.block_count
            .checked_mul(BLOCK_RECORD_SIZE as u64)
            .ok_or_else(|| {
                CartridgeError::InvalidStructure(format!(
                    "block count {} overflows the index size",
                    self.block_count
                ))
            })
    }

    /// Size of everything after the header: index plus data section
    pub fn payload_size(&self) -> Result<u64> {
        self.index_size()?
            .checked_add(self.data_size)
            .ok_or_else(|| {
                CartridgeError::InvalidStructure(format!(
                    "data size {} overflows the archive size",
                    self.data_size
                ))
            })
    }

    /// Total on-disk size described by this header
    pub fn archive_size(&self) -> Result<u64> {
        self.payload_size()?
            .checked_add(HEADER_SIZE as u64)
            .ok_or_else(|| CartridgeError::InvalidStructure("archive size overflow".to_string()))
    }
}

/// One slot of the block index
///
/// `id == 0` marks an empty slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BlockRecord {
    pub id: u64,
    pub hash: u64,
    pub start_offset: u64,
    pub length: u64,
}

impl BlockRecord {
    pub const EMPTY: BlockRecord = BlockRecord {
        id: 0,
        hash: 0,
        start_offset: 0,
        length: 0,
    };

    pub fn is_empty(&self) -> bool {
        self.id == crate::hash::EMPTY_ID
    }

    /// Offset one past the last byte of this block, if it does not overflow
    pub fn end_offset(&self) -> Option<u64> {
        self.start_offset.checked_add(self.length)
    }

    /// Write record to a writer
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(&self.id.to_le_bytes())?;
        writer.write_all(&self.hash.to_le_bytes())?;
        writer.write_all(&self.start_offset.to_le_bytes())?;
        writer.write_all(&self.length.to_le_bytes())?;
        Ok(())
    }

    /// Read record from a reader
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        Ok(Self {
            id: read_u64(&mut reader)?,
            hash: read_u64(&mut reader)?,
            start_offset: read_u64(&mut reader)?,
            length: read_u64(&mut reader)?,
        })
    }

    /// Decode a record from exactly `BLOCK_RECORD_SIZE` bytes
    pub fn decode(bytes: &[u8; BLOCK_RECORD_SIZE]) -> Self {
        Self {
            id: le_u64(bytes, 0),
            hash: le_u64(bytes, 8),
            start_offset: le_u64(bytes, 16),
            length: le_u64(bytes, 24),
        }
    }
}

fn le_u64(bytes: &[u8; BLOCK_RECORD_SIZE], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(buf)
}

// Helper functions for reading primitive types
fn read_u32<R: Read>(mut reader: R) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(mut reader: R) -> Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = Header::new(3, 35);

        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();

        assert_eq!(buf.len(), HEADER_SIZE);
        assert_eq!(&buf[0..4], b"crpk");
        assert_eq!(&buf[4..8], &[0, 0, 0, 0]);
        assert_eq!(&buf[8..16], &1u64.to_le_bytes());
        assert_eq!(&buf[16..24], &3u64.to_le_bytes());
        assert_eq!(&buf[24..32], &35u64.to_le_bytes());

        let parsed = Header::read_from(&buf[..]).unwrap();
        assert_eq!(parsed, header);
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn test_header_sizes() {
        let header = Header::new(3, 35);
        assert_eq!(header.index_size().unwrap(), 96);
        assert_eq!(header.payload_size().unwrap(), 131);
        assert_eq!(header.archive_size().unwrap(), 163);

        let huge = Header::new(u64::MAX / 2, 0);
        assert!(matches!(
            huge.index_size(),
            Err(CartridgeError::InvalidStructure(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_magic() {
        let mut header = Header::new(1, 1);
        header.magic = u32::from_le_bytes(*b"nope");
        match header.validate() {
            Err(CartridgeError::InvalidMagic { expected, found }) => {
                assert_eq!(expected, magic_u32());
                assert_eq!(found, u32::from_le_bytes(*b"nope"));
            }
            other => panic!("Expected InvalidMagic, got: {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_version() {
        let mut header = Header::new(1, 1);
        header.version = 2;
        assert!(matches!(
            header.validate(),
            Err(CartridgeError::UnsupportedVersion(2))
        ));
    }

    #[test]
    fn test_block_record_layout() {
        let record = BlockRecord {
            id: 0x1122334455667788,
            hash: 0xDEADBEEF,
            start_offset: 10,
            length: 20,
        };

        let mut buf = Vec::new();
        record.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), BLOCK_RECORD_SIZE);
        assert_eq!(&buf[0..8], &0x1122334455667788u64.to_le_bytes());

        let mut fixed = [0u8; BLOCK_RECORD_SIZE];
        fixed.copy_from_slice(&buf);
        assert_eq!(BlockRecord::decode(&fixed), record);
        assert_eq!(BlockRecord::read_from(&buf[..]).unwrap(), record);
        assert_eq!(record.end_offset(), Some(30));
    }

    #[test]
    fn test_empty_record() {
        assert!(BlockRecord::EMPTY.is_empty());
        assert!(BlockRecord::default().is_empty());
        assert!(BlockRecord::read_from(&[0u8; 16][..]).is_err());
    }
}
