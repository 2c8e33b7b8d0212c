//! Tools for reading a ZIP archive as it streams in.
//!
//! To start reading an archive, wrap any [`Read`] in a [`ZipStreamReader`]
//! and pull entries out of it one at a time with
//! [`next_entry()`](ZipStreamReader::next_entry).
//!
//! [`Read`]: std::io::Read

use std::io::{self, prelude::*, BufReader};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDateTime;
use log::*;

use crate::payload::Payload;
use crate::result::*;
use crate::spec::{self, Signature};

/// How much of the input stream we buffer at once
const STREAM_BUFFER_SIZE: usize = 64 * 1024;

/// The compression method used to store a file
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CompressionMethod {
    /// The file is uncompressed
    None,
    /// The file is [DEFLATE](https://en.wikipedia.org/wiki/DEFLATE)d.
    /// This is the most common format used by ZIP archives.
    Deflate,
    /// The file is compressed with a yet-unsupported format.
    /// (The u16 indicates the internal format code.)
    Unsupported(u16),
}

/// Whether an entry is a directory or a file
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
}

/// Metadata for a file or directory in the archive,
/// retrieved from its local file header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    /// Uncompressed size of the file in bytes,
    /// if the header knew it (see `has_data_descriptor`)
    pub size: Option<u64>,

    /// Compressed size of the file in bytes,
    /// if the header knew it (see `has_data_descriptor`)
    pub compressed_size: Option<u64>,

    /// Compression algorithm used to store the file
    pub compression_method: CompressionMethod,

    /// The CRC-32 of the decompressed file, as recorded.
    /// (This library doesn't check it.)
    pub crc32: u32,

    /// True if the file is encrypted (decryption is unsupported)
    pub encrypted: bool,

    /// The provided path of the file.
    pub path: Utf8PathBuf,

    /// The date and time the file was last modified,
    /// if the archive recorded a valid one
    pub last_modified: Option<NaiveDateTime>,

    /// True if sizes were written after the file's data
    /// instead of in its header
    pub has_data_descriptor: bool,

    /// True if the entry carries Zip64 (64-bit) sizes
    pub zip64: bool,
}

impl FileMetadata {
    /// Returns true if the given entry is a directory
    pub fn is_dir(&self) -> bool {
        // Path::ends_with() doesn't consider separators,
        // so we need a different approach.
        self.path.as_str().ends_with('/') && self.size.unwrap_or(0) == 0
    }

    /// Returns true if the given entry is a file
    pub fn is_file(&self) -> bool {
        !self.is_dir()
    }

    pub fn kind(&self) -> EntryKind {
        if self.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum DecoderState {
    /// Expecting another local file header (or the end of them)
    Entries,
    /// Past the last entry
    Done,
    /// Something went wrong; we've lost our place in the stream.
    Failed,
}

/// The entry whose data we're currently in the middle of
#[derive(Debug)]
struct Pending {
    path: Utf8PathBuf,
    payload: Payload,
    /// Some(zip64) if a data descriptor follows the data
    descriptor: Option<bool>,
}

/// A ZIP archive read front to back from a stream,
/// without seeking and without the central directory.
///
/// ```no_run
/// # use std::fs::File;
/// # use std::io;
/// # use zipball::read::*;
/// let mut archive = ZipStreamReader::new(File::open("foo.zip")?);
/// while let Some(mut entry) = archive.next_entry()? {
///     if entry.metadata().is_file() {
///         io::copy(&mut entry, &mut io::sink())?;
///     }
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
///
/// Each [`ZipStreamEntry`] borrows the reader, so the next entry can't be
/// requested while the current one is still around.
/// Whatever part of an entry wasn't read is skipped
/// when the next one is requested.
pub struct ZipStreamReader<R> {
    source: BufReader<R>,
    pending: Option<Pending>,
    state: DecoderState,
    entries_read: usize,
}

impl<R: Read> ZipStreamReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            source: BufReader::with_capacity(STREAM_BUFFER_SIZE, reader),
            pending: None,
            state: DecoderState::Entries,
            entries_read: 0,
        }
    }

    /// Returns the next entry in the archive,
    /// or `None` once the central directory is reached.
    ///
    /// After an error, the reader has lost its place and keeps failing.
    pub fn next_entry(&mut self) -> ZipResult<Option<ZipStreamEntry<'_, R>>> {
        match self.state {
            DecoderState::Entries => {}
            DecoderState::Done => return Ok(None),
            DecoderState::Failed => {
                return Err(ZipError::InvalidArchive(
                    "Can't continue reading after an earlier error",
                ))
            }
        }

        match self.advance() {
            Ok(Some(metadata)) => Ok(Some(ZipStreamEntry {
                metadata,
                archive: self,
            })),
            Ok(None) => Ok(None),
            Err(e) => {
                self.state = DecoderState::Failed;
                self.pending = None;
                Err(e)
            }
        }
    }

    /// How many entries have been returned so far.
    pub fn entries_read(&self) -> usize {
        self.entries_read
    }

    /// Finishes off the previous entry and parses the next header.
    fn advance(&mut self) -> ZipResult<Option<FileMetadata>> {
        self.finish_pending()?;

        let mut magic = [0u8; 4];
        self.source
            .read_exact(&mut magic)
            .map_err(ZipError::from_read)?;

        match Signature::parse(magic) {
            Signature::LocalFileHeader => {}
            end if end.ends_entries() => {
                debug!("Reached {:?} after {} entries", end, self.entries_read);
                self.drain_trailer()?;
                self.state = DecoderState::Done;
                return Ok(None);
            }
            other => {
                debug!("Unexpected signature {:?}", other);
                return Err(ZipError::InvalidArchive(
                    "Expected a local file header or the central directory",
                ));
            }
        }

        let local_header = spec::LocalFileHeader::read_from(&mut self.source)?;
        trace!("{:?}", local_header);
        let metadata = FileMetadata::from_local_header(&local_header)?;
        debug!("{:?}", metadata);

        if metadata.encrypted {
            return Err(ZipError::UnsupportedArchive(format!(
                "Can't read encrypted file {}",
                metadata.path
            )));
        }

        let payload = match Payload::new(
            metadata.compression_method,
            metadata.compressed_size,
            metadata.zip64,
        ) {
            // Directories have nothing to read, however they were stored.
            Err(ZipError::UnsupportedArchive(_))
                if metadata.is_dir() && metadata.compressed_size.is_none() =>
            {
                Payload::empty()
            }
            other => other?,
        };

        // Stored files of unknown size find their end by reading the descriptor.
        let descriptor = (metadata.has_data_descriptor && !payload.consumes_descriptor())
            .then_some(metadata.zip64);
        self.pending = Some(Pending {
            path: metadata.path.clone(),
            payload,
            descriptor,
        });
        self.entries_read += 1;
        Ok(Some(metadata))
    }

    /// Skips whatever the previous entry didn't read,
    /// along with its data descriptor.
    fn finish_pending(&mut self) -> ZipResult<()> {
        let Some(mut pending) = self.pending.take() else {
            return Ok(());
        };

        let skipped = pending
            .payload
            .skip_rest(&mut self.source)
            .map_err(ZipError::from_read)?;
        if skipped > 0 {
            debug!("Skipped {} unread bytes of {}", skipped, pending.path);
        }

        if let Some(zip64) = pending.descriptor {
            let descriptor = spec::DataDescriptor::read_from(&mut self.source, zip64)?;
            trace!(
                "{} was {} bytes ({} compressed), CRC {:08x}",
                pending.path,
                descriptor.uncompressed_size,
                descriptor.compressed_size,
                descriptor.crc32
            );
        }
        Ok(())
    }

    /// Reads the central directory and whatever else is left to the end,
    /// so a stream that breaks off there still counts as a failure.
    fn drain_trailer(&mut self) -> ZipResult<()> {
        let trailer = io::copy(&mut self.source, &mut io::sink())?;
        trace!("Drained {} trailing bytes", trailer + 4);
        Ok(())
    }

    fn read_payload(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.pending {
            Some(pending) => pending.payload.read(&mut self.source, buf),
            None => Ok(0),
        }
    }
}

/// An entry in a [`ZipStreamReader`].
///
/// Reading from it yields the entry's decompressed contents.
pub struct ZipStreamEntry<'a, R> {
    metadata: FileMetadata,
    archive: &'a mut ZipStreamReader<R>,
}

impl<R> ZipStreamEntry<'_, R> {
    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    /// The entry's path, exactly as the archive has it
    pub fn path(&self) -> &Utf8Path {
        &self.metadata.path
    }

    pub fn kind(&self) -> EntryKind {
        self.metadata.kind()
    }
}

impl<R: Read> Read for ZipStreamEntry<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.archive.read_payload(buf)
    }
}
