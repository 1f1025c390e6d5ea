//! High-level pack/unpack API, the primary embedding surface.
//!
//! ```no_run
//! use chunktar::archive::{archive, extract, PackOptions, UnpackOptions};
//!
//! // Merge two files (paths relative to the working directory).
//! let report = archive("out.bin", &["a.txt", "docs/b.txt"], &PackOptions::default())?;
//! assert!(report.is_complete());
//!
//! // Split them back out under `restored/`.
//! let opts = UnpackOptions { dest_dir: Some("restored".into()) };
//! let unpacked = extract("out.bin", &opts)?;
//! assert_eq!(unpacked.files.len(), 2);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Failure model
//! Archiving skips a source it cannot use and carries on; only a failed write
//! to the container stops the run.  Extraction stops at the first malformed
//! chunk or failed destination write.  Nothing already written is rolled back
//! in either direction.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::chunk::{check_name, fill, FrameError};
use crate::index::{self, ContainerIndex};
use crate::io_stream::{Chunk, ChunkReader, ChunkWriter, DEFAULT_BLOCK_SIZE};

// ── Options ───────────────────────────────────────────────────────────────────

/// Configuration for [`archive`] / [`Encoder::create`].
#[derive(Debug, Clone)]
pub struct PackOptions {
    /// Bytes of file content per chunk.  Zero is treated as one.
    pub block_size: u16,
    /// Directory entry names are made relative to; relative source and
    /// output paths resolve against it.  Defaults to the current directory.
    pub work_dir:   Option<PathBuf>,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self { block_size: DEFAULT_BLOCK_SIZE, work_dir: None }
    }
}

/// Configuration for [`extract`] / [`Decoder::open`].
#[derive(Debug, Clone, Default)]
pub struct UnpackOptions {
    /// Root the recorded names are recreated under.  Defaults to the current
    /// directory; created if missing.
    pub dest_dir: Option<PathBuf>,
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Why a single source was left out of the container.
///
/// Every variant except [`EntryError::Container`] is recoverable: the
/// container stays well-formed and the run continues with the next source.
#[derive(Error, Debug)]
pub enum EntryError {
    #[error("{} not found: {source}", .path.display())]
    NotFound {
        path:   PathBuf,
        source: io::Error,
    },
    #[error("{} error: incorrect path, not under {}", .path.display(), .work_dir.display())]
    OutsideWorkDir { path: PathBuf, work_dir: PathBuf },
    #[error("{} error: not a regular file", .path.display())]
    NotAFile { path: PathBuf },
    #[error("{} error: this is the output container", .path.display())]
    IsContainer { path: PathBuf },
    #[error("{} error: relative path is not valid UTF-8", .path.display())]
    NonUtf8Name { path: PathBuf },
    #[error("{} error: the file name is too long ({len} bytes)", .path.display())]
    NameTooLong { path: PathBuf, len: usize },
    #[error("{} cannot be read: {source}", .path.display())]
    Read {
        path:   PathBuf,
        source: io::Error,
    },
    /// Reading failed after the HEADER chunk was written: the container holds
    /// the first `size` bytes of the file under `name`.
    #[error("{} partially archived as {name} ({size} bytes) before a read failed: {source}", .path.display())]
    Partial {
        path:   PathBuf,
        name:   String,
        size:   u64,
        source: io::Error,
    },
    /// The container itself could not be written.  Fatal.
    #[error("container write failed: {0}")]
    Container(#[source] io::Error),
}

/// A failure that ends the whole pack or unpack run.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("working directory {} is unusable: {source}", .path.display())]
    WorkDir {
        path:   PathBuf,
        source: io::Error,
    },
    #[error("{} cannot be created: {source}", .path.display())]
    CreateContainer {
        path:   PathBuf,
        source: io::Error,
    },
    #[error("{} cannot be changed: {source}", .path.display())]
    WriteContainer {
        path:   PathBuf,
        source: io::Error,
    },
    #[error("{} not found: {source}", .path.display())]
    OpenContainer {
        path:   PathBuf,
        source: io::Error,
    },
    #[error("{} cannot be read: {source}", .path.display())]
    ReadContainer {
        path:   PathBuf,
        source: io::Error,
    },
    #[error("incorrect format input file ({}): {source}", .path.display())]
    Format {
        path:   PathBuf,
        source: FrameError,
    },
    #[error("incorrect format input file ({}): unsafe entry name {name:?} at offset {offset}", .path.display())]
    UnsafeName { path: PathBuf, name: String, offset: u64 },
    #[error("{} cannot be created or changed: {source}", .path.display())]
    Destination {
        path:   PathBuf,
        source: io::Error,
    },
}

impl ArchiveError {
    /// `true` when the container itself is malformed, as opposed to an I/O failure.
    pub fn is_format(&self) -> bool {
        matches!(self, ArchiveError::Format { .. } | ArchiveError::UnsafeName { .. })
    }
}

fn frame_error(container: &Path, e: FrameError) -> ArchiveError {
    match e {
        FrameError::Io(source) => ArchiveError::ReadContainer { path: container.to_owned(), source },
        other => ArchiveError::Format { path: container.to_owned(), source: other },
    }
}

/// Absolute, lexically normalized form of `dir` (the current directory when
/// `None`).  Symlinks are left in place.
fn resolve_dir(dir: Option<&Path>) -> Result<PathBuf, ArchiveError> {
    let cwd = || std::env::current_dir()
        .map_err(|source| ArchiveError::WorkDir { path: PathBuf::from("."), source });
    let dir = match dir {
        Some(d) if d.is_absolute() => normalize(d),
        Some(d) => normalize(&cwd()?.join(d)),
        None    => cwd()?,
    };
    match fs::metadata(&dir) {
        Ok(meta) if meta.is_dir() => Ok(dir),
        Ok(_) => Err(ArchiveError::WorkDir {
            source: io::Error::new(io::ErrorKind::InvalidInput, "not a directory"),
            path:   dir,
        }),
        Err(source) => Err(ArchiveError::WorkDir { path: dir, source }),
    }
}

/// Fold `.` and `..` out of `path` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir    => {}
            Component::ParentDir => { out.pop(); }
            other                => out.push(other),
        }
    }
    out
}

// ── Reports ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedEntry {
    pub source: PathBuf,
    pub name:   String,
    pub size:   u64,
    pub chunks: u64,
}

#[derive(Debug)]
pub struct PackReport {
    pub container:     PathBuf,
    pub packed:        Vec<PackedEntry>,
    /// Sources left out of the container entirely.
    pub skipped:       Vec<EntryError>,
    /// Sources whose entry was cut short by a read failure; always
    /// [`EntryError::Partial`].  Extraction recreates them truncated.
    pub partial:       Vec<EntryError>,
    pub bytes_written: u64,
}

impl PackReport {
    /// `true` when every source was archived in full.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty() && self.partial.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpackedEntry {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
}

#[derive(Debug, Default)]
pub struct UnpackReport {
    pub files:      Vec<UnpackedEntry>,
    pub bytes_read: u64,
}

// ── Encoder ───────────────────────────────────────────────────────────────────

pub struct Encoder {
    path:      PathBuf,
    /// Canonical container path, for the self-inclusion check.
    container: Option<PathBuf>,
    work_dir:  PathBuf,
    block:     Vec<u8>,
    writer:    ChunkWriter<BufWriter<File>>,
}

impl Encoder {
    /// Create (or truncate) the container at `path`.
    pub fn create<P: AsRef<Path>>(path: P, opts: &PackOptions) -> Result<Self, ArchiveError> {
        let work_dir = resolve_dir(opts.work_dir.as_deref())?;
        let path = work_dir.join(path.as_ref());
        let block_len = usize::from(opts.block_size.max(1));

        let file = File::create(&path)
            .map_err(|source| ArchiveError::CreateContainer { path: path.clone(), source })?;
        let container = path.canonicalize().ok();
        info!(container = %path.display(), block_size = block_len, "archiving started");

        Ok(Self {
            path,
            container,
            work_dir,
            block:  vec![0u8; block_len],
            writer: ChunkWriter::new(BufWriter::with_capacity(block_len.max(8 * 1024), file)),
        })
    }

    pub fn path(&self)     -> &Path { &self.path }
    pub fn work_dir(&self) -> &Path { &self.work_dir }

    /// Resolve `source` and compute the name it would be archived under.
    ///
    /// The name is the normalized path relative to the working directory;
    /// symlinks are followed for reading but never change the name.
    pub fn entry_name(&self, source: &Path) -> Result<(PathBuf, String), EntryError> {
        let resolved = normalize(&self.work_dir.join(source));
        let relative = resolved.strip_prefix(&self.work_dir)
            .map_err(|_| EntryError::OutsideWorkDir {
                path:     source.to_owned(),
                work_dir: self.work_dir.clone(),
            })?;

        let meta = fs::metadata(&resolved).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => EntryError::NotFound { path: source.to_owned(), source: e },
            _                       => EntryError::Read { path: source.to_owned(), source: e },
        })?;
        if self.container.is_some() && resolved.canonicalize().ok() == self.container {
            return Err(EntryError::IsContainer { path: source.to_owned() });
        }
        if !meta.is_file() {
            return Err(EntryError::NotAFile { path: source.to_owned() });
        }

        let name = relative.to_str()
            .ok_or_else(|| EntryError::NonUtf8Name { path: source.to_owned() })?
            .to_owned();
        check_name(&name)
            .map_err(|_| EntryError::NameTooLong { path: source.to_owned(), len: name.len() })?;
        Ok((resolved, name))
    }

    /// Append one source file: a HEADER chunk with the first block, then one
    /// DATA chunk per further block.
    pub fn add_file(&mut self, source: &Path) -> Result<PackedEntry, EntryError> {
        let (resolved, name) = self.entry_name(source)?;
        let input = File::open(&resolved)
            .map_err(|e| EntryError::Read { path: source.to_owned(), source: e })?;
        info!(source = %source.display(), name = %name, "archiving file");
        self.append(source, name, input)
    }

    fn append<R: Read>(&mut self, source: &Path, name: String, mut input: R) -> Result<PackedEntry, EntryError> {
        let n = fill(&mut input, &mut self.block)
            .map_err(|e| EntryError::Read { path: source.to_owned(), source: e })?;
        self.writer.write_header(&name, &self.block[..n]).map_err(EntryError::Container)?;
        let mut size   = n as u64;
        let mut chunks = 1u64;

        // `fill` only comes up short at end-of-file.
        let mut at_eof = n < self.block.len();
        while !at_eof {
            let n = match fill(&mut input, &mut self.block) {
                Ok(n)  => n,
                Err(e) => return Err(EntryError::Partial { path: source.to_owned(), name, size, source: e }),
            };
            if n == 0 {
                break;
            }
            self.writer.write_data(&self.block[..n]).map_err(EntryError::Container)?;
            size   += n as u64;
            chunks += 1;
            at_eof = n < self.block.len();
        }

        debug!(name = %name, size, chunks, "archived file");
        Ok(PackedEntry { source: source.to_owned(), name, size, chunks })
    }

    /// Flush the container.  Returns the total bytes written.
    pub fn finalize(self) -> Result<u64, ArchiveError> {
        let bytes = self.writer.bytes_written();
        self.writer.finish()
            .and_then(|w| w.into_inner().map_err(|e| e.into_error()))
            .map_err(|source| ArchiveError::WriteContainer { path: self.path, source })?;
        Ok(bytes)
    }
}

/// Merge `sources`, in order, into the container at `output`.
///
/// Sources that cannot be archived are reported in [`PackReport::skipped`];
/// a container write failure aborts the run with whatever was written left
/// on disk.
pub fn archive<P, S>(output: P, sources: &[S], opts: &PackOptions) -> Result<PackReport, ArchiveError>
where
    P: AsRef<Path>,
    S: AsRef<Path>,
{
    let mut encoder = Encoder::create(output, opts)?;
    let mut packed  = Vec::with_capacity(sources.len());
    let mut skipped = Vec::new();
    let mut partial = Vec::new();

    for source in sources {
        match encoder.add_file(source.as_ref()) {
            Ok(entry) => {
                info!(source = %entry.source.display(), size = entry.size, "archiving file ended");
                packed.push(entry);
            }
            Err(EntryError::Container(source)) => {
                return Err(ArchiveError::WriteContainer { path: encoder.path().to_owned(), source });
            }
            Err(e @ EntryError::Partial { .. }) => {
                warn!(error = %e, "source partially archived");
                partial.push(e);
            }
            Err(e) => {
                warn!(error = %e, "skipping source");
                skipped.push(e);
            }
        }
    }

    let container = encoder.path().to_owned();
    let bytes_written = encoder.finalize()?;
    info!(
        container = %container.display(),
        files = packed.len(),
        skipped = skipped.len(),
        partial = partial.len(),
        "archiving complete",
    );
    Ok(PackReport { container, packed, skipped, partial, bytes_written })
}

// ── Decoder ───────────────────────────────────────────────────────────────────

/// The destination file currently receiving DATA chunks.
struct Destination {
    name:   String,
    path:   PathBuf,
    writer: BufWriter<File>,
    size:   u64,
}

impl Destination {
    fn create(dest_dir: &Path, container: &Path, name: &str, offset: u64) -> Result<Self, ArchiveError> {
        let relative = safe_relative(name).ok_or_else(|| ArchiveError::UnsafeName {
            path: container.to_owned(),
            name: name.to_owned(),
            offset,
        })?;
        let path = dest_dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| ArchiveError::Destination { path: parent.to_owned(), source })?;
        }
        let file = File::create(&path)
            .map_err(|source| ArchiveError::Destination { path: path.clone(), source })?;
        info!(name, path = %path.display(), "extracting file");
        Ok(Self { name: name.to_owned(), path, writer: BufWriter::new(file), size: 0 })
    }

    fn write(&mut self, body: &[u8]) -> Result<(), ArchiveError> {
        self.writer.write_all(body)
            .map_err(|source| ArchiveError::Destination { path: self.path.clone(), source })?;
        self.size += body.len() as u64;
        Ok(())
    }

    fn close(self) -> Result<UnpackedEntry, ArchiveError> {
        let Destination { name, path, writer, size } = self;
        if let Err(e) = writer.into_inner() {
            return Err(ArchiveError::Destination { path, source: e.into_error() });
        }
        debug!(name = %name, size, "extracted file");
        Ok(UnpackedEntry { name, path, size })
    }
}

/// Keep only plain components; absolute, prefixed or `..` names are refused.
fn safe_relative(name: &str) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir       => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if out.as_os_str().is_empty() { None } else { Some(out) }
}

pub struct Decoder<R: Read> {
    container: PathBuf,
    dest_dir:  PathBuf,
    reader:    ChunkReader<R>,
    current:   Option<Destination>,
    files:     Vec<UnpackedEntry>,
}

impl Decoder<BufReader<File>> {
    /// Open the container at `path` for extraction.
    pub fn open<P: AsRef<Path>>(path: P, opts: &UnpackOptions) -> Result<Self, ArchiveError> {
        let path = path.as_ref().to_owned();
        let file = File::open(&path)
            .map_err(|source| ArchiveError::OpenContainer { path: path.clone(), source })?;

        let dest_dir = match &opts.dest_dir {
            Some(dir) => dir.clone(),
            None      => resolve_dir(None)?,
        };
        fs::create_dir_all(&dest_dir)
            .map_err(|source| ArchiveError::Destination { path: dest_dir.clone(), source })?;

        Ok(Self::from_reader(BufReader::new(file), path, dest_dir))
    }
}

impl<R: Read> Decoder<R> {
    /// Decode from any reader.  `container` only labels error messages.
    pub fn from_reader(reader: R, container: impl Into<PathBuf>, dest_dir: impl Into<PathBuf>) -> Self {
        Self {
            container: container.into(),
            dest_dir:  dest_dir.into(),
            reader:    ChunkReader::new(reader),
            current:   None,
            files:     Vec::new(),
        }
    }

    /// Decode and apply one chunk.  `Ok(false)` once the stream has ended
    /// cleanly on a chunk boundary.
    pub fn step(&mut self) -> Result<bool, ArchiveError> {
        let Self { container, dest_dir, reader, current, files } = self;

        let offset = reader.offset();
        let chunk = match reader.next_chunk() {
            Ok(Some(chunk)) => chunk,
            Ok(None)        => return Ok(false),
            Err(e)          => return Err(frame_error(container, e)),
        };

        match chunk {
            Chunk::Header { name, body } => {
                if let Some(previous) = current.take() {
                    files.push(previous.close()?);
                }
                let mut dest = Destination::create(dest_dir, container, name, offset)?;
                dest.write(body)?;
                *current = Some(dest);
            }
            // `ChunkReader` fails on DATA before any HEADER, so a
            // destination is always open here.
            Chunk::Data { body } => {
                if let Some(dest) = current.as_mut() {
                    dest.write(body)?;
                }
            }
        }
        Ok(true)
    }

    /// Decode to the end of the stream and close the last destination.
    pub fn run(mut self) -> Result<UnpackReport, ArchiveError> {
        while self.step()? {}
        if let Some(last) = self.current.take() {
            self.files.push(last.close()?);
        }
        Ok(UnpackReport { files: self.files, bytes_read: self.reader.offset() })
    }
}

/// Recreate every file recorded in the container at `container`.
pub fn extract<P: AsRef<Path>>(container: P, opts: &UnpackOptions) -> Result<UnpackReport, ArchiveError> {
    info!(container = %container.as_ref().display(), "unpacking started");
    let report = Decoder::open(container, opts)?.run()?;
    info!(files = report.files.len(), "unpacking completed");
    Ok(report)
}

/// Sequentially list the container at `container` without extracting.
pub fn list<P: AsRef<Path>>(container: P) -> Result<ContainerIndex, ArchiveError> {
    let path = container.as_ref();
    let file = File::open(path)
        .map_err(|source| ArchiveError::OpenContainer { path: path.to_owned(), source })?;
    index::scan(BufReader::new(file)).map_err(|e| frame_error(path, e))
}
