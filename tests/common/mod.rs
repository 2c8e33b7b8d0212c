//! Hand-built archives, so tests can control exactly what's in the stream

#![allow(dead_code)]

use std::io::{self, prelude::*};

use flate2::write::DeflateEncoder;
use flate2::{Compression, Crc};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Method {
    Stored,
    Deflated,
    /// Some other method code; data is written as-is.
    Other(u16),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Descriptor {
    /// Sizes in the local header
    None,
    /// Sizes after the data, with the optional `PK\7\8` signature
    Signed,
    /// Sizes after the data, without a signature
    Unsigned,
}

/// How to write one entry
#[derive(Debug, Clone)]
pub struct Entry<'a> {
    pub name: &'a str,
    pub data: &'a [u8],
    pub method: Method,
    pub descriptor: Descriptor,
    pub zip64: bool,
    /// Extra general purpose flags (e.g., 1 for encryption)
    pub flags: u16,
}

impl<'a> Entry<'a> {
    pub fn new(name: &'a str, data: &'a [u8], method: Method) -> Self {
        Self {
            name,
            data,
            method,
            descriptor: Descriptor::None,
            zip64: false,
            flags: 0,
        }
    }
}

/// Writes local headers the way we want them,
/// followed by a central directory and end record.
#[derive(Debug, Default)]
pub struct ArchiveBuilder {
    entries: Vec<u8>,
    central: Vec<u8>,
    count: u16,
    /// Where each entry (header through descriptor) ends
    boundaries: Vec<usize>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dir(self, name: &str) -> Self {
        self.entry(Entry::new(name, b"", Method::Stored))
    }

    pub fn stored(self, name: &str, data: &[u8]) -> Self {
        self.entry(Entry::new(name, data, Method::Stored))
    }

    pub fn deflated(self, name: &str, data: &[u8]) -> Self {
        self.entry(Entry::new(name, data, Method::Deflated))
    }

    /// A deflated entry with its sizes in a data descriptor,
    /// the way streaming writers produce them
    pub fn streamed(self, name: &str, data: &[u8]) -> Self {
        self.entry(Entry {
            descriptor: Descriptor::Signed,
            ..Entry::new(name, data, Method::Deflated)
        })
    }

    pub fn entry(mut self, entry: Entry) -> Self {
        let compressed = match entry.method {
            Method::Deflated => deflate(entry.data),
            Method::Stored | Method::Other(_) => entry.data.to_vec(),
        };
        let mut crc = Crc::new();
        crc.update(entry.data);
        let crc = crc.sum();
        let method = match entry.method {
            Method::Stored => 0,
            Method::Deflated => 8,
            Method::Other(code) => code,
        };

        let streamed = entry.descriptor != Descriptor::None;
        let mut flags = entry.flags | (1 << 11);
        if streamed {
            flags |= 1 << 3;
        }

        let (header_crc, header_compressed, header_size) = if streamed && entry.zip64 {
            // Like Python's zipfile and Info-ZIP: placeholders here, zeroes in the extra field
            (0, u32::MAX, u32::MAX)
        } else if streamed {
            (0, 0, 0)
        } else if entry.zip64 {
            (crc, u32::MAX, u32::MAX)
        } else {
            (crc, compressed.len() as u32, entry.data.len() as u32)
        };

        let mut extra = Vec::new();
        if entry.zip64 {
            extra.extend_from_slice(&1u16.to_le_bytes());
            extra.extend_from_slice(&16u16.to_le_bytes());
            let (size, compressed_size) = if streamed {
                (0, 0)
            } else {
                (entry.data.len() as u64, compressed.len() as u64)
            };
            extra.extend_from_slice(&size.to_le_bytes());
            extra.extend_from_slice(&compressed_size.to_le_bytes());
        }

        let offset = self.entries.len() as u32;
        let out = &mut self.entries;
        out.extend_from_slice(b"PK\x03\x04");
        out.extend_from_slice(&45u16.to_le_bytes());
        out.extend_from_slice(&flags.to_le_bytes());
        out.extend_from_slice(&method.to_le_bytes());
        // 12:00:00 on 2020-06-01
        out.extend_from_slice(&(12u16 << 11).to_le_bytes());
        out.extend_from_slice(&(((2020u16 - 1980) << 9) | (6 << 5) | 1).to_le_bytes());
        out.extend_from_slice(&header_crc.to_le_bytes());
        out.extend_from_slice(&header_compressed.to_le_bytes());
        out.extend_from_slice(&header_size.to_le_bytes());
        out.extend_from_slice(&(entry.name.len() as u16).to_le_bytes());
        out.extend_from_slice(&(extra.len() as u16).to_le_bytes());
        out.extend_from_slice(entry.name.as_bytes());
        out.extend_from_slice(&extra);
        out.extend_from_slice(&compressed);

        if streamed {
            if entry.descriptor == Descriptor::Signed {
                out.extend_from_slice(b"PK\x07\x08");
            }
            out.extend_from_slice(&crc.to_le_bytes());
            if entry.zip64 {
                out.extend_from_slice(&(compressed.len() as u64).to_le_bytes());
                out.extend_from_slice(&(entry.data.len() as u64).to_le_bytes());
            } else {
                out.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
                out.extend_from_slice(&(entry.data.len() as u32).to_le_bytes());
            }
        }
        self.boundaries.push(out.len());

        // Just enough of a central directory header for other readers.
        let central = &mut self.central;
        central.extend_from_slice(b"PK\x01\x02");
        central.extend_from_slice(&45u16.to_le_bytes());
        central.extend_from_slice(&45u16.to_le_bytes());
        central.extend_from_slice(&flags.to_le_bytes());
        central.extend_from_slice(&method.to_le_bytes());
        central.extend_from_slice(&(12u16 << 11).to_le_bytes());
        central.extend_from_slice(&(((2020u16 - 1980) << 9) | (6 << 5) | 1).to_le_bytes());
        central.extend_from_slice(&crc.to_le_bytes());
        central.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
        central.extend_from_slice(&(entry.data.len() as u32).to_le_bytes());
        central.extend_from_slice(&(entry.name.len() as u16).to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes()); // extra
        central.extend_from_slice(&0u16.to_le_bytes()); // comment
        central.extend_from_slice(&0u16.to_le_bytes()); // disk
        central.extend_from_slice(&0u16.to_le_bytes()); // internal attributes
        central.extend_from_slice(&0u32.to_le_bytes()); // external attributes
        central.extend_from_slice(&offset.to_le_bytes());
        central.extend_from_slice(entry.name.as_bytes());

        self.count += 1;
        self
    }

    /// The whole archive
    pub fn build(&self) -> Vec<u8> {
        let mut out = self.entries.clone();
        let central_offset = out.len() as u32;
        out.extend_from_slice(&self.central);
        out.extend_from_slice(b"PK\x05\x06");
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&self.count.to_le_bytes());
        out.extend_from_slice(&self.count.to_le_bytes());
        out.extend_from_slice(&(self.central.len() as u32).to_le_bytes());
        out.extend_from_slice(&central_offset.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out
    }

    /// Only the entries, as if the stream broke off right before the central directory
    pub fn entries_only(&self) -> Vec<u8> {
        self.entries.clone()
    }

    /// The offset just past entry `index` (counting from zero)
    pub fn end_of_entry(&self, index: usize) -> usize {
        self.boundaries[index]
    }
}

pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Yields `data`, then fails as if the connection dropped
pub struct FailingReader<'a> {
    data: &'a [u8],
}

impl<'a> FailingReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl Read for FailingReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.data.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            ));
        }
        self.data.read(buf)
    }
}

/// Hands out a few bytes at a time, like a slow network
pub struct Trickle<'a> {
    data: &'a [u8],
    step: usize,
}

impl<'a> Trickle<'a> {
    pub fn new(data: &'a [u8], step: usize) -> Self {
        Self { data, step }
    }
}

impl Read for Trickle<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len = buf.len().min(self.step);
        self.data.read(&mut buf[..len])
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
