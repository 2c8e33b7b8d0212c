//! zipball unpacks a ZIP archive while it's still downloading:
//!
//! ```no_run
//! # use zipball::*;
//! # use zipball::fetch::{self, FetchOptions};
//! let source = Source::new("xtremespb", "heretic", "master");
//! let response = fetch::open(&source.zipball_url(), &FetchOptions::default())?;
//!
//! let options = ExtractOptions::new()
//!     // Code hosts put everything under a folder like `xtremespb-heretic-1a2b3c4/`.
//!     .prefix(source.synthetic_prefix()?)
//!     .on_entry(|entry| println!("{}", entry.relative_path));
//! let report = extract(response, "heretic", options)?;
//! println!("{} files, {} bytes", report.files, report.bytes_written);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Zip archives are usually read from the back:
//! the central directory at the end says where every file is.
//! But each file is also preceded by a local header with (most of)
//! the same information, so we can decode them front to back as bytes
//! arrive, without seeking and without buffering the archive.
//! When a header doesn't know the file's size (it's written afterwards,
//! in a data descriptor), the DEFLATE stream itself tells us where it ends.
//!
//! Lower level, [`ZipStreamReader`] hands out entries one at a time
//! from any [`Read`](std::io::Read):
//!
//! ```no_run
//! # use std::fs::File;
//! # use std::io;
//! # use zipball::read::*;
//! let mut archive = ZipStreamReader::new(File::open("foo.zip")?);
//! while let Some(mut entry) = archive.next_entry()? {
//!     println!("{} ({:?})", entry.path(), entry.kind());
//!     io::copy(&mut entry, &mut io::sink())?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod extract;
pub mod materialize;
pub mod prefix;
pub mod read;
pub mod result;
pub mod sanitize;
pub mod source;

#[cfg(feature = "http")]
pub mod fetch;

pub use extract::{extract, ExtractOptions, ExtractionReport, ExtractionRun, RunState};
pub use prefix::SyntheticPrefix;
pub use read::{CompressionMethod, EntryKind, ZipStreamReader};
pub use source::Source;

mod payload;
mod spec;
