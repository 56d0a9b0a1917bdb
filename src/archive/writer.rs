use crate::archive::format::{BlockRecord, Header, BLOCK_RECORD_SIZE, HEADER_SIZE};
use crate::archive::index::find_empty_slot;
use crate::error::{CartridgeError, Result};
use crate::hash::{path_name, NameKey};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default size of the buffer used to stream input bytes into the cartridge
pub const DEFAULT_CHUNK_SIZE: usize = 2048;

/// One file scheduled for packing
#[derive(Debug, Clone)]
struct PackInput {
    name: Vec<u8>,
    path: PathBuf,
}

/// Header and block index computed by the sizing pass
#[derive(Debug, Clone)]
pub struct PackPlan {
    pub header: Header,
    pub blocks: Vec<BlockRecord>,
    /// Slot claimed by each input, in input order
    pub slots: Vec<usize>,
}

impl PackPlan {
    /// Records in data-section order, which is input order
    pub fn records_in_data_order(&self) -> Vec<BlockRecord> {
        self.slots.iter().map(|&slot| self.blocks[slot]).collect()
    }
}

/// Outcome of a successful pack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PackSummary {
    pub block_count: u64,
    pub data_size: u64,
    pub archive_size: u64,
}

impl PackSummary {
    fn from_header(header: &Header) -> Result<Self> {
        Ok(Self {
            block_count: header.block_count,
            data_size: header.data_size,
            archive_size: header.archive_size()?,
        })
    }
}

/// Where a write went wrong, before the output path is attached
enum WriteFailure {
    Input { index: usize, source: io::Error },
    Output(io::Error),
}

/// Two-pass cartridge builder
///
/// The first pass hashes every name, claims a slot and sizes each input
/// without reading it. The second pass streams each input, one at a time, into
/// the output directly after the index.
#[derive(Debug, Clone)]
pub struct Packer {
    inputs: Vec<PackInput>,
    chunk_size: usize,
    atomic: bool,
}

impl Packer {
    pub fn new() -> Self {
        Self {
            inputs: Vec::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            atomic: true,
        }
    }

    /// Set the copy buffer size used while streaming inputs
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Write through a temporary file and rename it into place (default on)
    ///
    /// When off, the destination is written directly and a failed pack may
    /// leave a partial file behind.
    pub fn with_atomic_output(mut self, atomic: bool) -> Self {
        self.atomic = atomic;
        self
    }

    /// Add a file keyed by its path exactly as given
    pub fn add_file<P: AsRef<Path>>(&mut self, path: P) -> &mut Self {
        let path = path.as_ref();
        self.inputs.push(PackInput {
            name: path_name(path).to_vec(),
            path: path.to_path_buf(),
        });
        self
    }

    /// Add a file from disk under a different logical name
    pub fn add_named_file<N: AsRef<[u8]>, P: AsRef<Path>>(&mut self, name: N, path: P) -> &mut Self {
        self.inputs.push(PackInput {
            name: name.as_ref().to_vec(),
            path: path.as_ref().to_path_buf(),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Run the sizing pass: build the block index and header
    pub fn plan(&self) -> Result<PackPlan> {
        let mut blocks = vec![BlockRecord::EMPTY; self.inputs.len()];
        let mut slots = Vec::with_capacity(self.inputs.len());
        let mut offset: u64 = 0;

        for (position, input) in self.inputs.iter().enumerate() {
            let index = position + 1;
            let key = NameKey::of(&input.name);
            let slot = claim_slot(&blocks, key, index, &input.name)?;

            let length = input_length(&input.path)
                .map_err(|source| input_error(index, &input.path, source))?;

            blocks[slot] = BlockRecord {
                id: key.id,
                hash: key.hash,
                start_offset: offset,
                length,
            };
            slots.push(slot);
            debug!(
                index,
                slot,
                offset,
                length,
                path = %input.path.display(),
                "planned block"
            );

            offset = offset.checked_add(length).ok_or_else(|| {
                input_error(
                    index,
                    &input.path,
                    io::Error::new(io::ErrorKind::InvalidInput, "data section exceeds u64"),
                )
            })?;
        }

        Ok(PackPlan {
            header: Header::new(self.inputs.len() as u64, offset),
            blocks,
            slots,
        })
    }

    /// Pack into an arbitrary writer
    pub fn write_to<W: Write>(&self, writer: W) -> Result<PackSummary> {
        let plan = self.plan()?;
        self.write_plan(&plan, writer).map_err(|failure| match failure {
            WriteFailure::Input { index, source } => {
                input_error(index, &self.inputs[index - 1].path, source)
            }
            WriteFailure::Output(source) => CartridgeError::Io(source),
        })?;
        PackSummary::from_header(&plan.header)
    }

    /// Pack into a file at `output`
    ///
    /// The output is only opened once every input has been sized.
    pub fn pack<P: AsRef<Path>>(&self, output: P) -> Result<PackSummary> {
        let plan = self.plan()?;
        self.pack_planned(&plan, output.as_ref())
    }

    /// Write an already sized plan to `output`
    fn pack_planned(&self, plan: &PackPlan, output: &Path) -> Result<PackSummary> {
        let output_error = |source: io::Error| CartridgeError::Output {
            path: output.to_path_buf(),
            source,
        };
        let map_failure = |failure: WriteFailure| match failure {
            WriteFailure::Input { index, source } => {
                input_error(index, &self.inputs[index - 1].path, source)
            }
            WriteFailure::Output(source) => output_error(source),
        };

        if self.atomic {
            let dir = match output.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            let mut builder = tempfile::Builder::new();
            builder.prefix(".cartridge").suffix(".tmp");
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                // Same mode File::create asks for; the umask still applies.
                builder.permissions(std::fs::Permissions::from_mode(0o666));
            }
            let mut temp = builder.tempfile_in(dir).map_err(output_error)?;

            // Replacing a cartridge keeps its permissions.
            if let Ok(existing) = std::fs::metadata(output) {
                temp.as_file()
                    .set_permissions(existing.permissions())
                    .map_err(output_error)?;
            }

            self.write_plan(plan, temp.as_file_mut()).map_err(map_failure)?;
            temp.as_file().sync_all().map_err(output_error)?;
            temp.persist(output).map_err(|e| output_error(e.error))?;
        } else {
            let file = File::create(output).map_err(output_error)?;
            self.write_plan(plan, file).map_err(map_failure)?;
        }

        let summary = PackSummary::from_header(&plan.header)?;
        debug!(
            output = %output.display(),
            blocks = summary.block_count,
            data_size = summary.data_size,
            "cartridge written"
        );
        Ok(summary)
    }

    /// Write header, index and data for an already computed plan
    fn write_plan<W: Write>(&self, plan: &PackPlan, writer: W) -> std::result::Result<(), WriteFailure> {
        let mut writer = BufWriter::new(writer);

        let mut head = Vec::with_capacity(HEADER_SIZE + plan.blocks.len() * BLOCK_RECORD_SIZE);
        plan.header.write_to(&mut head).map_err(into_output)?;
        for block in &plan.blocks {
            block.write_to(&mut head).map_err(into_output)?;
        }
        writer.write_all(&head).map_err(WriteFailure::Output)?;

        let mut chunk = vec![0u8; self.chunk_size];
        for (position, input) in self.inputs.iter().enumerate() {
            let index = position + 1;
            let expected = plan.blocks[plan.slots[position]].length;

            // Only one input is open at a time; it closes at the end of this iteration.
            let file = File::open(&input.path)
                .map_err(|source| WriteFailure::Input { index, source })?;
            let copied = copy_chunked(file.take(expected), &mut writer, &mut chunk)?
                .map_err(|source| WriteFailure::Input { index, source })?;

            if copied != expected {
                return Err(WriteFailure::Input {
                    index,
                    source: io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("file shrank while packing: expected {expected} bytes, read {copied}"),
                    ),
                });
            }
        }

        writer.flush().map_err(WriteFailure::Output)?;
        Ok(())
    }
}

impl Default for Packer {
    fn default() -> Self {
        Self::new()
    }
}

/// Pack `inputs` into `output`, keying every file by its path
pub fn pack<I, P, Q>(inputs: I, output: Q) -> Result<PackSummary>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let mut packer = Packer::new();
    for input in inputs {
        packer.add_file(input);
    }
    packer.pack(output)
}

/// Claim the first free slot for `key`, rejecting the reserved empty id
fn claim_slot(blocks: &[BlockRecord], key: NameKey, index: usize, name: &[u8]) -> Result<usize> {
    if key.is_reserved() {
        return Err(CartridgeError::ReservedId {
            index,
            name: String::from_utf8_lossy(name).into_owned(),
        });
    }
    find_empty_slot(blocks, key.hash).ok_or(CartridgeError::IndexFull { index })
}

/// Size a regular file without reading its content
fn input_length(path: &Path) -> io::Result<u64> {
    let file = File::open(path)?;
    let metadata = file.metadata()?;
    if !metadata.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "not a regular file",
        ));
    }
    Ok(metadata.len())
}

/// Copy through `chunk`; read errors come back in the inner result, write errors in the outer
fn copy_chunked<R: Read, W: Write>(
    mut reader: R,
    writer: &mut W,
    chunk: &mut [u8],
) -> std::result::Result<io::Result<u64>, WriteFailure> {
    let mut total = 0u64;
    loop {
        let read = match reader.read(chunk) {
            Ok(0) => return Ok(Ok(total)),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Ok(Err(e)),
        };
        writer
            .write_all(&chunk[..read])
            .map_err(WriteFailure::Output)?;
        total += read as u64;
    }
}

fn into_output(err: CartridgeError) -> WriteFailure {
    match err {
        CartridgeError::Io(source) => WriteFailure::Output(source),
        other => WriteFailure::Output(io::Error::new(io::ErrorKind::Other, other.to_string())),
    }
}

fn input_error(index: usize, path: &Path, source: io::Error) -> CartridgeError {
    CartridgeError::InputFile {
        index,
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::index::find_slot;
    use tempfile::TempDir;

    fn write_inputs(dir: &TempDir, files: &[(&str, usize)]) -> Vec<PathBuf> {
        files
            .iter()
            .map(|(name, len)| {
                let path = dir.path().join(name);
                std::fs::write(&path, vec![b'x'; *len]).unwrap();
                path
            })
            .collect()
    }

    #[test]
    fn test_plan_offsets_follow_input_order() {
        let dir = TempDir::new().unwrap();
        let paths = write_inputs(&dir, &[("a.bin", 10), ("b.bin", 20), ("c.bin", 5)]);

        let mut packer = Packer::new();
        for path in &paths {
            packer.add_file(path);
        }
        let plan = packer.plan().unwrap();

        assert_eq!(plan.header.block_count, 3);
        assert_eq!(plan.header.data_size, 35);
        assert!(plan.blocks.iter().all(|b| !b.is_empty()));

        for (path, (offset, length)) in paths.iter().zip([(0, 10), (10, 20), (30, 5)]) {
            let key = NameKey::of_path(path);
            let slot = find_slot(&plan.blocks, key.hash, key.id).unwrap();
            assert_eq!(plan.blocks[slot].start_offset, offset);
            assert_eq!(plan.blocks[slot].length, length);
        }

        let ordered = plan.records_in_data_order();
        assert_eq!(ordered[0].start_offset, 0);
        assert_eq!(ordered[2].end_offset(), Some(35));
    }

    #[test]
    fn test_plan_reports_missing_input() {
        let dir = TempDir::new().unwrap();
        let paths = write_inputs(&dir, &[("a.bin", 1)]);

        let mut packer = Packer::new();
        packer.add_file(&paths[0]);
        packer.add_file(dir.path().join("missing.bin"));

        match packer.plan() {
            Err(CartridgeError::InputFile { index, .. }) => assert_eq!(index, 2),
            other => panic!("Expected InputFile error, got: {:?}", other),
        }
    }

    #[test]
    fn test_plan_rejects_directory() {
        let dir = TempDir::new().unwrap();
        let mut packer = Packer::new();
        packer.add_file(dir.path());

        assert_eq!(packer.plan().unwrap_err().input_index(), Some(1));
    }

    #[test]
    fn test_duplicate_names_fill_distinct_slots() {
        let dir = TempDir::new().unwrap();
        let paths = write_inputs(&dir, &[("a.bin", 3)]);

        let mut packer = Packer::new();
        packer.add_file(&paths[0]).add_file(&paths[0]);
        let plan = packer.plan().unwrap();

        assert!(plan.blocks.iter().all(|b| !b.is_empty()));
        assert_eq!(plan.header.data_size, 6);
    }

    #[test]
    fn test_write_to_buffer() {
        let dir = TempDir::new().unwrap();
        let paths = write_inputs(&dir, &[("a.bin", 4), ("b.bin", 9)]);

        let mut packer = Packer::new().with_chunk_size(3);
        packer.add_named_file("first", &paths[0]);
        packer.add_named_file("second", &paths[1]);

        let mut buf = Vec::new();
        let summary = packer.write_to(&mut buf).unwrap();

        assert_eq!(summary.block_count, 2);
        assert_eq!(summary.data_size, 13);
        assert_eq!(summary.archive_size, buf.len() as u64);
        assert_eq!(buf.len(), HEADER_SIZE + 2 * BLOCK_RECORD_SIZE + 13);
    }

    #[test]
    fn test_empty_packer() {
        let mut buf = Vec::new();
        let summary = Packer::new().write_to(&mut buf).unwrap();
        assert_eq!(summary.block_count, 0);
        assert_eq!(buf.len(), HEADER_SIZE);
    }

    #[test]
    fn test_claim_slot_rejects_reserved_id() {
        let blocks = vec![BlockRecord::EMPTY; 2];
        let reserved = NameKey { id: 0, hash: 1 };

        match claim_slot(&blocks, reserved, 3, b"unlucky") {
            Err(CartridgeError::ReservedId { index, name }) => {
                assert_eq!(index, 3);
                assert_eq!(name, "unlucky");
            }
            other => panic!("Expected ReservedId, got: {:?}", other),
        }

        let key = NameKey { id: 9, hash: 1 };
        assert_eq!(claim_slot(&blocks, key, 1, b"ok").unwrap(), 1);
    }

    #[test]
    fn test_claim_slot_full_index() {
        let blocks = vec![
            BlockRecord {
                id: 1,
                ..BlockRecord::EMPTY
            };
            2
        ];
        let key = NameKey { id: 7, hash: 0 };
        assert!(matches!(
            claim_slot(&blocks, key, 2, b"late"),
            Err(CartridgeError::IndexFull { index: 2 })
        ));
    }

    #[test]
    fn test_in_place_failure_leaves_partial_output() {
        let dir = TempDir::new().unwrap();
        let paths = write_inputs(&dir, &[("a.bin", 100), ("b.bin", 20), ("c.bin", 5)]);
        let output = dir.path().join("partial.crpk");

        let mut packer = Packer::new().with_atomic_output(false);
        for path in &paths {
            packer.add_file(path);
        }
        let plan = packer.plan().unwrap();

        // Input 2 disappears after sizing
        std::fs::remove_file(&paths[1]).unwrap();
        let err = packer.pack_planned(&plan, &output).unwrap_err();
        assert_eq!(err.input_index(), Some(2));

        // Header, index and the first input made it to disk
        let written = std::fs::metadata(&output).unwrap().len();
        assert_eq!(written, (HEADER_SIZE + 3 * BLOCK_RECORD_SIZE + 100) as u64);
        assert!(matches!(
            crate::archive::Cartridge::open(&output),
            Err(CartridgeError::Truncated { .. })
        ));
    }

    #[test]
    fn test_atomic_failure_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let paths = write_inputs(&dir, &[("a.bin", 100), ("b.bin", 20)]);
        let output = dir.path().join("atomic.crpk");

        let mut packer = Packer::new();
        packer.add_file(&paths[0]).add_file(&paths[1]);
        let plan = packer.plan().unwrap();

        std::fs::remove_file(&paths[1]).unwrap();
        assert_eq!(
            packer.pack_planned(&plan, &output).unwrap_err().input_index(),
            Some(2)
        );
        assert!(!output.exists());

        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_summary_size_overflow() {
        let header = Header::new(u64::MAX / 16, u64::MAX);
        assert!(matches!(
            PackSummary::from_header(&header),
            Err(CartridgeError::InvalidStructure(_))
        ));
        assert_eq!(
            PackSummary::from_header(&Header::new(3, 35)).unwrap().archive_size,
            163
        );
    }

    #[test]
    fn test_chunk_size_floor() {
        let packer = Packer::new().with_chunk_size(0);
        assert_eq!(packer.chunk_size, 1);
    }
}
