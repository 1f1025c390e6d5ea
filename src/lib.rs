pub mod chunk;
pub mod io_stream;
pub mod archive;
pub mod index;
pub mod recovery;

pub use chunk::{ChunkKind, ChunkPrefix, FrameError, HEADER_SENTINEL};
pub use io_stream::{Chunk, ChunkReader, ChunkWriter, DEFAULT_BLOCK_SIZE};
pub use archive::{archive, extract, list, ArchiveError, EntryError, PackOptions, UnpackOptions};
pub use index::{ContainerIndex, IndexEntry};
