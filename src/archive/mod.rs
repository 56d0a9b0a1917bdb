mod format;
mod index;
mod reader;
mod writer;

pub use format::{
    magic_u32, BlockRecord, Header, BLOCK_RECORD_SIZE, FORMAT_VERSION, HEADER_SIZE, MAGIC_NUMBER,
};
pub use index::{find_empty_slot, find_slot, IndexView, SlotTable};
pub use reader::Cartridge;
pub use writer::{pack, PackPlan, PackSummary, Packer, DEFAULT_CHUNK_SIZE};
