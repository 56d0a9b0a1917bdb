use crate::archive::format::{BlockRecord, Header, HEADER_SIZE};
use crate::archive::index::{find_slot, IndexView};
use crate::error::{CartridgeError, Result};
use crate::hash::{path_name, NameKey};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use tracing::debug;

/// A loaded cartridge with O(1) lookup by name
///
/// The block index and the data section live back to back in one owned
/// buffer. Lookups hand out borrowed slices of that buffer.
#[derive(Debug, Clone)]
pub struct Cartridge {
    header: Header,
    /// Encoded block index followed by the data section
    buf: Vec<u8>,
    index_len: usize,
}

/// This is the public facing portion of the loader.
impl Cartridge {
    /// Load a cartridge from a file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path)?;
        let file_len = file.metadata()?.len();

        let header = read_header(&mut file)?;
        header.validate()?;

        // Check the declared size against the file before allocating for it.
        let expected = header.archive_size()?;
        if file_len < expected {
            return Err(CartridgeError::Truncated {
                expected,
                actual: file_len,
            });
        }

        let cartridge = Self::read_payload(header, file)?;
        debug!(
            path = %path.display(),
            blocks = header.block_count,
            data_size = header.data_size,
            "cartridge loaded"
        );
        Ok(cartridge)
    }

    /// Load a cartridge held entirely in memory, copying out of `bytes`
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let head = bytes.get(..HEADER_SIZE).ok_or(CartridgeError::Truncated {
            expected: HEADER_SIZE as u64,
            actual: bytes.len() as u64,
        })?;
        let header = Header::read_from(head)?;
        header.validate()?;

        let expected = header.archive_size()?;
        if (bytes.len() as u64) < expected {
            return Err(CartridgeError::Truncated {
                expected,
                actual: bytes.len() as u64,
            });
        }
        if bytes.len() as u64 > expected {
            debug!(
                trailing = bytes.len() as u64 - expected,
                "ignoring bytes after data section"
            );
        }

        let payload = &bytes[HEADER_SIZE..expected as usize];
        Self::from_parts(header, payload.to_vec())
    }

    /// Load a cartridge from any reader: header, then index, then data
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let header = read_header(&mut reader)?;
        header.validate()?;
        Self::read_payload(header, reader)
    }

    fn read_payload<R: Read>(header: Header, reader: R) -> Result<Self> {
        let payload_len = header.payload_size()?;
        let capacity = usize::try_from(payload_len).map_err(|_| {
            CartridgeError::InvalidStructure(format!(
                "payload of {} bytes does not fit in memory",
                payload_len
            ))
        })?;

        let mut buf = Vec::new();
        buf.try_reserve_exact(capacity).map_err(|e| {
            CartridgeError::InvalidStructure(format!("cannot allocate {} bytes: {}", capacity, e))
        })?;
        reader.take(payload_len).read_to_end(&mut buf)?;

        if buf.len() as u64 != payload_len {
            return Err(CartridgeError::Truncated {
                expected: HEADER_SIZE as u64 + payload_len,
                actual: HEADER_SIZE as u64 + buf.len() as u64,
            });
        }

        Self::from_parts(header, buf)
    }

    /// Bounds-check every occupied record against the data section
    fn from_parts(header: Header, buf: Vec<u8>) -> Result<Self> {
        let index_len = header.index_size()? as usize;
        let cartridge = Self {
            header,
            buf,
            index_len,
        };

        for (slot, record) in cartridge.index().iter().enumerate() {
            if record.is_empty() {
                continue;
            }
            match record.end_offset() {
                Some(end) if end <= header.data_size => {}
                _ => {
                    return Err(CartridgeError::InvalidStructure(format!(
                        "block in slot {} spans {}+{} outside data section of {} bytes",
                        slot, record.start_offset, record.length, header.data_size
                    )))
                }
            }
        }

        Ok(cartridge)
    }

    /// Get archive header information
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Number of slots in the block index
    pub fn block_count(&self) -> usize {
        self.index().len()
    }

    /// Size of the data section in bytes
    pub fn data_size(&self) -> u64 {
        self.header.data_size
    }

    /// Typed view over the block index
    pub fn index(&self) -> IndexView<'_> {
        IndexView::new(&self.buf[..self.index_len])
    }

    /// The whole data section
    pub fn data(&self) -> &[u8] {
        &self.buf[self.index_len..]
    }

    /// Resolve a name to its bytes
    pub fn lookup<N: AsRef<[u8]>>(&self, name: N) -> Option<&[u8]> {
        self.lookup_key(NameKey::of(name))
    }

    /// Resolve an already hashed name
    ///
    /// The reserved id never matches, even against an empty slot.
    pub fn lookup_key(&self, key: NameKey) -> Option<&[u8]> {
        if key.is_reserved() {
            return None;
        }

        let index = self.index();
        let slot = find_slot(&index, key.hash, key.id)?;
        let record = index.get(slot)?;
        self.slice(&record)
    }

    /// Resolve a name to its bytes, or an empty slice when absent
    pub fn get<N: AsRef<[u8]>>(&self, name: N) -> &[u8] {
        self.lookup(name).unwrap_or(&[])
    }

    /// Resolve a path by its raw encoded bytes
    pub fn lookup_path<P: AsRef<Path>>(&self, path: P) -> Option<&[u8]> {
        self.lookup(path_name(path.as_ref()))
    }

    /// Check if a name is packed in this cartridge
    pub fn contains<N: AsRef<[u8]>>(&self, name: N) -> bool {
        self.lookup(name).is_some()
    }

    /// Records in slot order
    pub fn blocks(&self) -> impl Iterator<Item = BlockRecord> + '_ {
        self.index().iter()
    }

    /// Occupied records in data-section order
    pub fn entries(&self) -> Vec<BlockRecord> {
        let mut entries: Vec<_> = self.blocks().filter(|r| !r.is_empty()).collect();
        entries.sort_by_key(|r| r.start_offset);
        entries
    }

    /// Bytes of a record, if its range lies inside the data section
    pub fn slice(&self, record: &BlockRecord) -> Option<&[u8]> {
        let start = usize::try_from(record.start_offset).ok()?;
        let end = usize::try_from(record.end_offset()?).ok()?;
        self.data().get(start..end)
    }

    /// Check the full layout: a full index of contiguous, reachable blocks
    pub fn verify(&self) -> Result<()> {
        let index = self.index();

        for (slot, record) in index.iter().enumerate() {
            if record.is_empty() {
                return Err(CartridgeError::InvalidStructure(format!(
                    "slot {} is empty",
                    slot
                )));
            }
            if find_slot(&index, record.hash, record.id) != Some(slot) {
                return Err(CartridgeError::InvalidStructure(format!(
                    "block in slot {} is shadowed or not reachable from its hash",
                    slot
                )));
            }
        }

        let mut expected_offset = 0u64;
        for record in self.entries() {
            if record.start_offset != expected_offset {
                return Err(CartridgeError::InvalidStructure(format!(
                    "block {:016x} starts at {}, expected {}",
                    record.id, record.start_offset, expected_offset
                )));
            }
            expected_offset = record.end_offset().ok_or_else(|| {
                CartridgeError::InvalidStructure(format!("block {:016x} overflows", record.id))
            })?;
        }

        if expected_offset != self.header.data_size {
            return Err(CartridgeError::InvalidStructure(format!(
                "blocks cover {} bytes but data section is {}",
                expected_offset, self.header.data_size
            )));
        }

        Ok(())
    }
}

/// Read the fixed header, reporting a short source as truncation
fn read_header<R: Read>(reader: R) -> Result<Header> {
    let mut head = Vec::with_capacity(HEADER_SIZE);
    reader.take(HEADER_SIZE as u64).read_to_end(&mut head)?;
    if head.len() < HEADER_SIZE {
        return Err(CartridgeError::Truncated {
            expected: HEADER_SIZE as u64,
            actual: head.len() as u64,
        });
    }
    Header::read_from(io::Cursor::new(head))
}
