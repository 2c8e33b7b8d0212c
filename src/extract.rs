//! Driving a whole archive from the stream onto disk
//!
//! An [`ExtractionRun`] pulls entries out of a [`ZipStreamReader`] in order,
//! strips their synthetic prefix, checks the result, and hands each one to a
//! [`Materializer`]. A file's contents are fully written before the next
//! entry is read off the stream.

use std::fmt;
use std::io::Read;

use camino::{Utf8Path, Utf8PathBuf};
use log::*;

use crate::materialize::{FsMaterializer, Materializer};
use crate::prefix::SyntheticPrefix;
use crate::read::{EntryKind, ZipStreamReader};
use crate::result::*;
use crate::sanitize;

/// Called once for each entry, after it's been extracted
pub type EntryObserver = Box<dyn FnMut(&ExtractedEntry)>;

/// How to extract an archive
#[derive(Default)]
pub struct ExtractOptions {
    prefix: SyntheticPrefix,
    on_entry: Option<EntryObserver>,
}

impl ExtractOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the synthetic top-level folder to strip. By default, none is.
    pub fn prefix(mut self, prefix: SyntheticPrefix) -> Self {
        self.prefix = prefix;
        self
    }

    /// Calls `observer` after each entry is extracted.
    pub fn on_entry<F>(mut self, observer: F) -> Self
    where
        F: FnMut(&ExtractedEntry) + 'static,
    {
        self.on_entry = Some(Box::new(observer));
        self
    }
}

impl fmt::Debug for ExtractOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractOptions")
            .field("prefix", &self.prefix)
            .field("on_entry", &self.on_entry.is_some())
            .finish()
    }
}

/// An entry that made it into the destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedEntry {
    pub kind: EntryKind,
    /// The path as the archive has it
    pub raw_path: Utf8PathBuf,
    /// Where it went, relative to the destination
    pub relative_path: Utf8PathBuf,
    /// Bytes written (always zero for directories)
    pub bytes: u64,
}

/// What a successful run extracted
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionReport {
    pub directories: usize,
    pub files: usize,
    pub bytes_written: u64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Succeeded,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed)
    }
}

/// A single extraction, from the first entry to success or failure.
///
/// A run can only be started once.
pub struct ExtractionRun<M> {
    materializer: M,
    options: ExtractOptions,
    state: RunState,
}

impl<M: Materializer> ExtractionRun<M> {
    pub fn new(materializer: M, options: ExtractOptions) -> Self {
        Self {
            materializer,
            options,
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn materializer(&self) -> &M {
        &self.materializer
    }

    pub fn into_materializer(self) -> M {
        self.materializer
    }

    /// Extracts every entry `input` holds.
    ///
    /// The first error ends the run; whatever was already extracted stays.
    pub fn run<R: Read>(&mut self, input: R) -> ExtractResult<ExtractionReport> {
        if self.state != RunState::Idle {
            return Err(ExtractError::AlreadyStarted);
        }
        self.state = RunState::Running;
        debug!("Extraction run started");

        let outcome = self.drive(ZipStreamReader::new(input));
        match &outcome {
            Ok(report) => {
                self.settle(true);
                info!(
                    "Extracted {} directories and {} files ({} bytes)",
                    report.directories, report.files, report.bytes_written
                );
            }
            Err(e) => {
                self.settle(false);
                info!("Extraction failed: {}", e);
            }
        }
        outcome
    }

    fn drive<R: Read>(&mut self, mut archive: ZipStreamReader<R>) -> ExtractResult<ExtractionReport> {
        let mut report = ExtractionReport::default();

        while let Some(mut entry) = archive.next_entry()? {
            let raw_path = entry.path().to_owned();
            let kind = entry.kind();
            let normalized = self.options.prefix.strip(raw_path.as_str());
            let relative_path = sanitize::relative_path(normalized)?;

            let bytes = match kind {
                EntryKind::Directory => {
                    debug!("{} -> directory {:?}", raw_path, relative_path);
                    self.materializer.create_dir(&relative_path)?;
                    report.directories += 1;
                    0
                }
                EntryKind::File => {
                    if relative_path.as_str().is_empty() {
                        return Err(ExtractError::anomaly(
                            raw_path.as_str(),
                            "file would replace the destination itself",
                        ));
                    }
                    debug!("{} -> file {}", raw_path, relative_path);
                    let written = self.materializer.write_file(&relative_path, &mut entry)?;
                    report.files += 1;
                    report.bytes_written += written;
                    written
                }
            };

            if let Some(observer) = &mut self.options.on_entry {
                observer(&ExtractedEntry {
                    kind,
                    raw_path,
                    relative_path,
                    bytes,
                });
            }
        }
        Ok(report)
    }

    /// Moves the run to its terminal state, once.
    /// Returns false if the run had already settled.
    fn settle(&mut self, succeeded: bool) -> bool {
        if self.state.is_terminal() {
            debug!("Run already {:?}; ignoring another outcome", self.state);
            return false;
        }
        self.state = if succeeded {
            RunState::Succeeded
        } else {
            RunState::Failed
        };
        debug!("Extraction run {:?}", self.state);
        true
    }
}

/// Extracts the archive streaming in from `input` into `destination`,
/// creating it if needed.
///
/// ```no_run
/// # use std::fs::File;
/// # use zipball::extract::*;
/// # use zipball::prefix::SyntheticPrefix;
/// let options = ExtractOptions::new().prefix(SyntheticPrefix::any());
/// let report = extract(File::open("snapshot.zip")?, "out", options)?;
/// println!("{} files", report.files);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn extract<R: Read, P: AsRef<Utf8Path>>(
    input: R,
    destination: P,
    options: ExtractOptions,
) -> ExtractResult<ExtractionReport> {
    let destination = destination.as_ref();
    std::fs::create_dir_all(destination)
        .map_err(|e| ExtractError::filesystem(destination, e))?;
    info!("Extracting into {}", destination);
    ExtractionRun::new(FsMaterializer::new(destination), options).run(input)
}
