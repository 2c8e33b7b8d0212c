//! Code specific to the ZIP file format specification.
//!
//! We try to keep the nitty gritty here,
//! and higher-level stuff in the [`read`] module.
//!
//! Most comments quote the ZIP spec, [`APPNOTE.TXT`].
//! A streaming reader only ever sees what comes *before* each file's data
//! (the local file header) and what may come right after it
//! (the data descriptor), so that's all we parse.
//! The central directory at the back is only used as an end marker.
//!
//! [`read`]: ../read/index.html
//! [`APPNOTE.TXT`]: https://pkware.cachefly.net/webdocs/APPNOTE/APPNOTE-6.3.6.TXT

use std::borrow::Cow;
use std::convert::TryInto;
use std::io::Read;

use camino::Utf8PathBuf;
use chrono::{NaiveDate, NaiveDateTime};
use codepage_437::*;

use crate::read::{CompressionMethod, FileMetadata};
use crate::result::*;

// Magic numbers denoting various sections of a ZIP archive

/// Local file header magic number
pub const LOCAL_FILE_HEADER_MAGIC: [u8; 4] = [b'P', b'K', 3, 4];
/// Data descriptor magic number (optional in the archive)
pub const DATA_DESCRIPTOR_MAGIC: [u8; 4] = [b'P', b'K', 7, 8];
/// Central directory magic number
pub const CENTRAL_DIRECTORY_MAGIC: [u8; 4] = [b'P', b'K', 1, 2];
/// End of central directory magic number
pub const EOCDR_MAGIC: [u8; 4] = [b'P', b'K', 5, 6];
/// Zip64 end of central directory magic number
pub const ZIP64_EOCDR_MAGIC: [u8; 4] = [b'P', b'K', 6, 6];
/// Archive extra data record magic number
pub const ARCHIVE_EXTRA_DATA_MAGIC: [u8; 4] = [b'P', b'K', 6, 8];

/// Extra field header ID of the Zip64 extended information
const ZIP64_EXTRA_FIELD_ID: u16 = 0x0001;

impl CompressionMethod {
    fn from_u16(u: u16) -> Self {
        match u {
            0 => CompressionMethod::None,
            8 => CompressionMethod::Deflate,
            v => CompressionMethod::Unsupported(v),
        }
    }
}

/// What the next four bytes of the archive announce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signature {
    LocalFileHeader,
    CentralDirectory,
    EndOfCentralDirectory,
    Zip64EndOfCentralDirectory,
    ArchiveExtraData,
    Unknown([u8; 4]),
}

impl Signature {
    pub fn parse(magic: [u8; 4]) -> Self {
        match magic {
            LOCAL_FILE_HEADER_MAGIC => Signature::LocalFileHeader,
            CENTRAL_DIRECTORY_MAGIC => Signature::CentralDirectory,
            EOCDR_MAGIC => Signature::EndOfCentralDirectory,
            ZIP64_EOCDR_MAGIC => Signature::Zip64EndOfCentralDirectory,
            ARCHIVE_EXTRA_DATA_MAGIC => Signature::ArchiveExtraData,
            other => Signature::Unknown(other),
        }
    }

    /// True for any record that follows the last file's data.
    pub fn ends_entries(self) -> bool {
        matches!(
            self,
            Signature::CentralDirectory
                | Signature::EndOfCentralDirectory
                | Signature::Zip64EndOfCentralDirectory
                | Signature::ArchiveExtraData
        )
    }
}

// Straight from the Rust docs:

/// Reads a little-endian u64 from the front of the provided slice, shrinking it.
fn read_u64(input: &mut &[u8]) -> u64 {
    let (int_bytes, rest) = input.split_at(std::mem::size_of::<u64>());
    *input = rest;
    u64::from_le_bytes(int_bytes.try_into().expect("less than eight bytes for u64"))
}

/// Reads a little-endian u32 from the front of the provided slice, shrinking it.
fn read_u32(input: &mut &[u8]) -> u32 {
    let (int_bytes, rest) = input.split_at(std::mem::size_of::<u32>());
    *input = rest;
    u32::from_le_bytes(int_bytes.try_into().expect("less than four bytes for u32"))
}

/// Reads a little-endian u16 from the front of the provided slice, shrinking it.
fn read_u16(input: &mut &[u8]) -> u16 {
    let (int_bytes, rest) = input.split_at(std::mem::size_of::<u16>());
    *input = rest;
    u16::from_le_bytes(int_bytes.try_into().expect("less than two bytes for u16"))
}

/// Reads exactly `len` bytes from the stream into a new buffer.
fn read_field<R: Read>(reader: &mut R, len: usize) -> ZipResult<Vec<u8>> {
    let mut field = vec![0; len];
    reader.read_exact(&mut field).map_err(ZipError::from_read)?;
    Ok(field)
}

/// Data from a local file header
///
/// Each files' actual contents is preceded by this header.
/// These headers allow for "streaming" decompression without
/// the use of the central directory, which is exactly what we do.
#[derive(Debug)]
pub struct LocalFileHeader {
    pub minimum_extract_version: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub last_modified_time: u16,
    pub last_modified_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub path: Vec<u8>,
    pub extra_field: Vec<u8>,
}

impl LocalFileHeader {
    /// Size of the header's fixed fields, not counting the magic number.
    const FIXED_SIZE: usize = 26;

    /// Reads a local file header from the stream.
    /// The caller has already consumed its magic number.
    pub fn read_from<R: Read>(reader: &mut R) -> ZipResult<Self> {
        // 4.3.7  Local file header:
        //
        // local file header signature     4 bytes  (0x04034b50)
        // version needed to extract       2 bytes
        // general purpose bit flag        2 bytes
        // compression method              2 bytes
        // last mod file time              2 bytes
        // last mod file date              2 bytes
        // crc-32                          4 bytes
        // compressed size                 4 bytes
        // uncompressed size               4 bytes
        // file name length                2 bytes
        // extra field length              2 bytes
        //
        // file name (variable size)
        // extra field (variable size)
        let mut fixed = [0u8; Self::FIXED_SIZE];
        reader.read_exact(&mut fixed).map_err(ZipError::from_read)?;
        let mut header = &fixed[..];
        let minimum_extract_version = read_u16(&mut header);
        let flags = read_u16(&mut header);
        let compression_method = read_u16(&mut header);
        let last_modified_time = read_u16(&mut header);
        let last_modified_date = read_u16(&mut header);
        let crc32 = read_u32(&mut header);
        let compressed_size = read_u32(&mut header);
        let uncompressed_size = read_u32(&mut header);
        let path_length = read_u16(&mut header) as usize;
        let extra_field_length = read_u16(&mut header) as usize;
        let path = read_field(reader, path_length)?;
        let extra_field = read_field(reader, extra_field_length)?;

        Ok(Self {
            minimum_extract_version,
            flags,
            compression_method,
            last_modified_time,
            last_modified_date,
            crc32,
            compressed_size,
            uncompressed_size,
            path,
            extra_field,
        })
    }
}

/// Data from a data descriptor
///
/// Written after a file's data when the writer didn't know
/// the sizes up front (general purpose bit 3).
/// We only need to step over it, but it's nice to log.
#[derive(Debug, PartialEq, Eq)]
pub struct DataDescriptor {
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
}

impl DataDescriptor {
    /// Reads a data descriptor from the stream.
    /// Zip64 entries store 8-byte sizes instead of 4-byte ones.
    pub fn read_from<R: Read>(reader: &mut R, zip64: bool) -> ZipResult<Self> {
        // 4.3.9  Data descriptor:
        //
        // crc-32                          4 bytes
        // compressed size                 4 bytes
        // uncompressed size               4 bytes
        //
        // 4.3.9.3 Although not originally assigned a signature, the value
        // 0x08074b50 has commonly been adopted as a signature value
        // for the data descriptor record.  Implementers SHOULD be
        // aware that ZIP files MAY be encountered with or without this
        // signature marking data descriptors and SHOULD account for
        // either case when reading ZIP files to ensure compatibility.
        let mut first = [0u8; 4];
        reader.read_exact(&mut first).map_err(ZipError::from_read)?;
        let crc32 = if first == DATA_DESCRIPTOR_MAGIC {
            let mut crc = [0u8; 4];
            reader.read_exact(&mut crc).map_err(ZipError::from_read)?;
            u32::from_le_bytes(crc)
        } else {
            u32::from_le_bytes(first)
        };

        let sizes = read_field(reader, if zip64 { 16 } else { 8 })?;
        let mut sizes = &sizes[..];
        let (compressed_size, uncompressed_size) = if zip64 {
            (read_u64(&mut sizes), read_u64(&mut sizes))
        } else {
            (read_u32(&mut sizes) as u64, read_u32(&mut sizes) as u64)
        };

        Ok(Self {
            crc32,
            compressed_size,
            uncompressed_size,
        })
    }
}

/// Extracts the "is this text UTF-8?" bit from the 16-bit flags field.
///
/// If false, text is assumped to be CP437.
fn is_utf8(flags: u16) -> bool {
    // Bit 11: Language encoding flag (EFS).  If this bit is set,
    //         the filename and comment fields for this file
    //         MUST be encoded using UTF-8. (see APPENDIX D)
    flags & (1 << 11) != 0
}

/// Extracts the "is this file encrypted?" bit from the 16-bit flags field.
fn is_encrypted(flags: u16) -> bool {
    // Bit 0: If set, indicates that the file is encrypted
    flags & 1 != 0
}

/// Extracts the "sizes come after the data" bit from the 16-bit flags field.
fn has_data_descriptor(flags: u16) -> bool {
    // Bit 3: If this bit is set, the fields crc-32, compressed
    //        size and uncompressed size are set to zero in the
    //        local header.  The correct values are put in the
    //        data descriptor immediately following the compressed
    //        data.
    flags & (1 << 3) != 0
}

impl FileMetadata {
    /// Extract metadata from a local file header.
    pub(crate) fn from_local_header(local: &LocalFileHeader) -> ZipResult<Self> {
        let path: Utf8PathBuf = if is_utf8(local.flags) {
            std::str::from_utf8(&local.path)
                .map_err(ZipError::Encoding)?
                .into()
        } else {
            let str_cow: Cow<str> = Cow::borrow_from_cp437(&local.path[..], &CP437_CONTROL);
            str_cow.into_owned().into()
        };

        let has_data_descriptor = has_data_descriptor(local.flags);
        // With a data descriptor, zeroes in the header mean "unknown".
        let known = |value: u32| {
            if has_data_descriptor && value == 0 {
                None
            } else {
                Some(value as u64)
            }
        };

        let mut metadata = Self {
            size: known(local.uncompressed_size),
            compressed_size: known(local.compressed_size),
            compression_method: CompressionMethod::from_u16(local.compression_method),
            crc32: local.crc32,
            encrypted: is_encrypted(local.flags),
            path,
            last_modified: parse_msdos(local.last_modified_time, local.last_modified_date),
            has_data_descriptor,
            zip64: false,
        };

        parse_extra_field(&mut metadata, &local.extra_field)?;

        // Streaming Zip64 writers put 0xFFFFFFFF in the header
        // even when the sizes only show up in the descriptor.
        if has_data_descriptor {
            let unknown = Some(u32::MAX as u64);
            if metadata.size == unknown {
                metadata.size = None;
            }
            if metadata.compressed_size == unknown {
                metadata.compressed_size = None;
            }
        }

        Ok(metadata)
    }
}

/// Converts an MS-DOS date and time, if they make up a real moment.
fn parse_msdos(time: u16, date: u16) -> Option<NaiveDateTime> {
    let seconds = (0b0000_0000_0001_1111 & time) as u32 * 2; // MSDOS uses 2-second precision
    let minutes = (0b0000_0111_1110_0000 & time) as u32 >> 5;
    let hours = (0b1111_1000_0000_0000 & time) as u32 >> 11;

    let days = (0b0000_0000_0001_1111 & date) as u32;
    let months = (0b0000_0001_1110_0000 & date) as u32 >> 5;
    // MSDOS uses years since 1980; Always interpreted as a positive value
    let years = ((0b1111_1110_0000_0000 & date) >> 9) as i32 + 1980;

    NaiveDate::from_ymd_opt(years, months, days)?.and_hms_opt(hours, minutes, seconds)
}

/// Parses the "extra fields" found in local file headers.
///
/// Currently we just look for Zip64 info (64-bit values for files > 2^32 in size)
fn parse_extra_field(metadata: &mut FileMetadata, mut extra_field: &[u8]) -> ZipResult<()> {
    // 4.5.1 In order to allow different programs and different types
    // of information to be stored in the 'extra' field in .ZIP
    // files, the following structure MUST be used for all
    // programs storing data in this field:

    //     header1+data1 + header2+data2 . . .

    // Each header MUST consist of:

    //     Header ID - 2 bytes
    //     Data Size - 2 bytes
    while !extra_field.is_empty() {
        if extra_field.len() < 4 {
            return Err(ZipError::InvalidArchive("Truncated extra field header"));
        }
        let kind = read_u16(&mut extra_field);
        let field_len = read_u16(&mut extra_field) as usize;
        if field_len > extra_field.len() {
            return Err(ZipError::InvalidArchive("Extra field runs past its header"));
        }
        let (mut data, rest) = extra_field.split_at(field_len);
        extra_field = rest;

        // Zip64 extended information extra field
        if kind == ZIP64_EXTRA_FIELD_ID {
            // 4.5.3 [...] This entry in the Local header MUST
            // include BOTH original and compressed file size fields.
            // The data descriptor that follows then uses 8-byte sizes too.
            metadata.zip64 = true;
            let streamed = metadata.has_data_descriptor;
            if metadata.size == Some(u32::MAX as u64) {
                metadata.size =
                    zip64_size(&mut data, streamed, "Zip64 extra field is missing a size")?;
            }
            if metadata.compressed_size == Some(u32::MAX as u64) {
                metadata.compressed_size = zip64_size(
                    &mut data,
                    streamed,
                    "Zip64 extra field is missing a compressed size",
                )?;
            }
        }
    }
    Ok(())
}

/// Reads one 64-bit size from a Zip64 extra field.
///
/// When a data descriptor follows, writers leave these zeroed (or out),
/// and the real sizes come later.
fn zip64_size(
    data: &mut &[u8],
    streamed: bool,
    missing: &'static str,
) -> ZipResult<Option<u64>> {
    if data.len() < 8 {
        return if streamed {
            Ok(None)
        } else {
            Err(ZipError::InvalidArchive(missing))
        };
    }
    match read_u64(data) {
        0 if streamed => Ok(None),
        size => Ok(Some(size)),
    }
}
