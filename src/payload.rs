//! Decoding one entry's data straight off the archive stream
//!
//! Each entry's bytes sit between its local file header and the next record.
//! A [`Payload`] knows where that region ends, either by counting down a size
//! from the header or by waiting for the deflate stream to say it's done,
//! and never reads past it.
//! Stored data of unknown size is the odd one out: it ends wherever
//! a signed data descriptor with matching sizes turns up.

use std::cmp;
use std::io::{self, prelude::*};

use flate2::{Decompress, FlushDecompress, Status};

use crate::read::CompressionMethod;
use crate::result::*;
use crate::spec::DATA_DESCRIPTOR_MAGIC;

/// Where we are in an entry's compressed data.
#[derive(Debug)]
pub enum Payload {
    /// Uncompressed data; `remaining` counts down to zero.
    Stored { remaining: u64 },
    /// DEFLATEd data, optionally bounded by a compressed size from the header.
    Deflated {
        inflater: Box<Decompress>,
        remaining: Option<u64>,
        done: bool,
    },
    /// Uncompressed data of unknown size, scanned for the data descriptor
    /// that ends it. The descriptor is consumed along with the data.
    StoredUntilDescriptor {
        /// Bytes that might be the start of the descriptor
        window: Vec<u8>,
        descriptor_len: usize,
        /// How much data we've handed out so far
        length: u64,
        done: bool,
    },
}

impl Payload {
    /// Sets up decoding for an entry, given its compression method
    /// and compressed size (if the header knew it).
    /// `zip64` says how wide the sizes in its data descriptor are.
    pub fn new(
        method: CompressionMethod,
        compressed_size: Option<u64>,
        zip64: bool,
    ) -> ZipResult<Self> {
        match (method, compressed_size) {
            (CompressionMethod::None, Some(remaining)) => Ok(Payload::Stored { remaining }),
            (CompressionMethod::None, None) => {
                // Signature, CRC-32, then both sizes
                let descriptor_len = if zip64 { 4 + 4 + 16 } else { 4 + 4 + 8 };
                Ok(Payload::StoredUntilDescriptor {
                    window: Vec::with_capacity(descriptor_len),
                    descriptor_len,
                    length: 0,
                    done: false,
                })
            }
            (CompressionMethod::Deflate, remaining) => Ok(Payload::Deflated {
                // Zip stores raw DEFLATE data, without a zlib header.
                inflater: Box::new(Decompress::new(false)),
                remaining,
                done: false,
            }),
            (CompressionMethod::Unsupported(code), _) => Err(ZipError::UnsupportedArchive(
                format!("Compression method {code} not supported"),
            )),
        }
    }

    /// An entry with nothing in it.
    pub fn empty() -> Self {
        Payload::Stored { remaining: 0 }
    }

    /// True if reading to the end also reads the entry's data descriptor.
    pub fn consumes_descriptor(&self) -> bool {
        matches!(self, Payload::StoredUntilDescriptor { .. })
    }

    /// Reads decompressed bytes, pulling compressed ones from `source`.
    /// Returns 0 once the entry's data is exhausted.
    pub fn read<B: BufRead>(&mut self, source: &mut B, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self {
            Payload::Stored { remaining } => {
                if *remaining == 0 {
                    return Ok(0);
                }
                let max = cmp::min(buf.len() as u64, *remaining) as usize;
                let count = source.read(&mut buf[..max])?;
                if count == 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "Archive ended inside a stored file",
                    ));
                }
                *remaining -= count as u64;
                Ok(count)
            }
            Payload::Deflated {
                inflater,
                remaining,
                done,
            } => {
                if *done {
                    return Ok(0);
                }
                inflate(inflater, remaining, done, source, buf)
            }
            Payload::StoredUntilDescriptor {
                window,
                descriptor_len,
                length,
                done,
            } => {
                if *done {
                    return Ok(0);
                }
                scan_stored(window, *descriptor_len, length, done, source, buf)
            }
        }
    }

    /// Reads and throws away whatever is left of the entry,
    /// including compressed bytes the deflate stream didn't need.
    /// Returns how many decompressed bytes were discarded.
    pub fn skip_rest<B: BufRead>(&mut self, source: &mut B) -> io::Result<u64> {
        let mut scratch = [0u8; 8 * 1024];
        let mut skipped = 0;
        loop {
            match self.read(source, &mut scratch) {
                Ok(0) => break,
                Ok(count) => skipped += count as u64,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        if let Payload::Deflated {
            remaining: Some(left),
            ..
        } = self
        {
            if *left > 0 {
                let discarded = io::copy(&mut source.by_ref().take(*left), &mut io::sink())?;
                if discarded != *left {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "Archive ended inside a compressed file",
                    ));
                }
                *left = 0;
            }
        }
        Ok(skipped)
    }
}

/// One step of inflating from a buffered source,
/// the way flate2's own `bufread` decoders do it,
/// but consuming at most `remaining` bytes of input.
fn inflate<B: BufRead>(
    inflater: &mut Decompress,
    remaining: &mut Option<u64>,
    done: &mut bool,
    source: &mut B,
    buf: &mut [u8],
) -> io::Result<usize> {
    loop {
        let (consumed, produced, status, at_end) = {
            let mut input = source.fill_buf()?;
            if let Some(left) = remaining {
                input = &input[..cmp::min(input.len() as u64, *left) as usize];
            }
            let at_end = input.is_empty();
            let flush = if at_end {
                FlushDecompress::Finish
            } else {
                FlushDecompress::None
            };

            let before_in = inflater.total_in();
            let before_out = inflater.total_out();
            let status = inflater.decompress(input, buf, flush).map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    ZipError::InvalidArchive("Corrupt DEFLATE data"),
                )
            })?;
            (
                (inflater.total_in() - before_in) as usize,
                (inflater.total_out() - before_out) as usize,
                status,
                at_end,
            )
        };
        source.consume(consumed);
        if let Some(left) = remaining {
            *left -= consumed as u64;
        }

        match status {
            Status::StreamEnd => {
                *done = true;
                return Ok(produced);
            }
            _ if produced > 0 => return Ok(produced),
            _ if at_end => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "Compressed data ended before the DEFLATE stream did",
                ))
            }
            _ => continue,
        }
    }
}

/// Hands out stored bytes until a data descriptor whose sizes match
/// everything handed out so far.
///
/// Only bytes starting with `P` can begin a descriptor. Everything else
/// passes straight through; a `P` is held in `window` until there's enough
/// after it to tell whether it's the descriptor.
/// We never consume past the descriptor's last byte.
fn scan_stored<B: BufRead>(
    window: &mut Vec<u8>,
    descriptor_len: usize,
    length: &mut u64,
    done: &mut bool,
    source: &mut B,
    buf: &mut [u8],
) -> io::Result<usize> {
    if window.is_empty() {
        let input = source.fill_buf()?;
        if input.is_empty() {
            return Err(descriptor_missing());
        }
        let limit = cmp::min(input.len(), buf.len());
        let plain = input[..limit]
            .iter()
            .position(|&b| b == b'P')
            .unwrap_or(limit);
        if plain > 0 {
            buf[..plain].copy_from_slice(&input[..plain]);
            source.consume(plain);
            *length += plain as u64;
            return Ok(plain);
        }
    }

    while window.len() < descriptor_len {
        let input = source.fill_buf()?;
        if input.is_empty() {
            return Err(descriptor_missing());
        }
        let take = cmp::min(input.len(), descriptor_len - window.len());
        window.extend_from_slice(&input[..take]);
        source.consume(take);
    }

    if is_descriptor_for(window, *length) {
        window.clear();
        *done = true;
        return Ok(0);
    }

    // Not it. Release everything up to the next possible start.
    let next = window[1..]
        .iter()
        .position(|&b| b == b'P')
        .map_or(window.len(), |i| i + 1);
    let count = cmp::min(next, buf.len());
    buf[..count].copy_from_slice(&window[..count]);
    window.drain(..count);
    *length += count as u64;
    Ok(count)
}

/// Does `window` hold a signed descriptor for `length` stored bytes?
/// (Stored data is the same size compressed or not.)
fn is_descriptor_for(window: &[u8], length: u64) -> bool {
    let Some(sizes) = window.strip_prefix(&DATA_DESCRIPTOR_MAGIC[..]) else {
        return false;
    };
    // Skip the CRC-32; we don't check it.
    let sizes = &sizes[4..];
    let (compressed, uncompressed) = sizes.split_at(sizes.len() / 2);
    let size = |bytes: &[u8]| {
        let mut le = [0u8; 8];
        le[..bytes.len()].copy_from_slice(bytes);
        u64::from_le_bytes(le)
    };
    size(compressed) == length && size(uncompressed) == length
}

fn descriptor_missing() -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        "Archive ended before the stored file's data descriptor",
    )
}
