//! Putting entries on disk

use std::fs::{self, File};
use std::io::{self, prelude::*};

use camino::{Utf8Path, Utf8PathBuf};
use log::*;

use crate::result::*;

/// Size of the chunks file contents are copied in
const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Something entries can be extracted into.
///
/// Paths are relative to wherever the materializer puts things,
/// and have already been sanitized.
/// The empty path is the destination root.
pub trait Materializer {
    /// Creates the directory (and its parents). Existing directories are fine.
    fn create_dir(&mut self, relative: &Utf8Path) -> ExtractResult<()>;

    /// Writes everything `payload` yields into the file,
    /// replacing it if it already exists.
    /// Returns the number of bytes written.
    fn write_file(&mut self, relative: &Utf8Path, payload: &mut dyn Read) -> ExtractResult<u64>;
}

/// Extracts into a directory on the local filesystem
#[derive(Debug, Clone)]
pub struct FsMaterializer {
    root: Utf8PathBuf,
}

impl FsMaterializer {
    pub fn new<P: Into<Utf8PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn target(&self, relative: &Utf8Path) -> Utf8PathBuf {
        if relative.as_str().is_empty() {
            self.root.clone()
        } else {
            self.root.join(relative)
        }
    }
}

impl Materializer for FsMaterializer {
    fn create_dir(&mut self, relative: &Utf8Path) -> ExtractResult<()> {
        let target = self.target(relative);
        trace!("mkdir -p {}", target);
        fs::create_dir_all(&target).map_err(|e| ExtractError::filesystem(target, e))
    }

    fn write_file(&mut self, relative: &Utf8Path, payload: &mut dyn Read) -> ExtractResult<u64> {
        let target = self.target(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| ExtractError::filesystem(parent, e))?;
        }
        let mut file = File::create(&target).map_err(|e| ExtractError::filesystem(&target, e))?;
        let written = copy_payload(payload, &mut file, &target)?;
        file.flush()
            .map_err(|e| ExtractError::filesystem(&target, e))?;
        trace!("Wrote {} bytes to {}", written, target);
        Ok(written)
    }
}

/// Copies a payload into `sink` in fixed-size chunks.
///
/// Failures reading the payload are stream errors;
/// failures writing are filesystem errors about `path`.
pub fn copy_payload<W: Write + ?Sized>(
    payload: &mut dyn Read,
    sink: &mut W,
    path: &Utf8Path,
) -> ExtractResult<u64> {
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut written = 0u64;
    loop {
        let count = match payload.read(&mut buf) {
            Ok(0) => return Ok(written),
            Ok(count) => count,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ZipError::from_read(e).into()),
        };
        sink.write_all(&buf[..count])
            .map_err(|e| ExtractError::filesystem(path, e))?;
        written += count as u64;
    }
}
