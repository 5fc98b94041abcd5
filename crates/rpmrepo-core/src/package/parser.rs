//! Extract index metadata from a package stream.

use super::ParseError;
use rpm::{IndexSignatureTag, IndexTag, PackageMetadata};
use rpmrepo_schema::{Checksum, ChecksumWriter, ScannedPackage, Size, Version};
use std::fmt;
use std::io::{self, BufRead, BufReader, Read};

/// Most index entries a header may declare.
pub const MAX_HEADER_ENTRIES: u32 = 0xffff;

/// Largest data store a header may declare (256 MiB).
pub const MAX_HEADER_DATA: u32 = 256 * 1024 * 1024;

const LEAD_SIZE: usize = 96;
const LEAD_MAGIC: [u8; 4] = [0xed, 0xab, 0xee, 0xdb];
const HEADER_MAGIC: [u8; 4] = [0x8e, 0xad, 0xe8, 0x01];
const INTRO_SIZE: usize = 16;
const ENTRY_SIZE: usize = 16;

/// Metadata read from a package's headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageHeader {
    /// Package name.
    pub name: String,
    /// Architecture, `src` for source packages.
    pub arch: String,
    /// Epoch, version and release. A missing epoch is `0`.
    pub version: Version,
    /// Installed paths.
    pub files: Vec<String>,
    /// Sum of the installed file sizes.
    pub installed_size: u64,
    /// Uncompressed payload size, `0` when the package does not record it.
    pub archive_size: u64,
}

/// Decodes package headers.
///
/// Implementations may read past the headers into the payload; callers that
/// need every byte (for hashing) drain the reader afterwards.
pub trait PackageParser: Send + Sync + fmt::Debug {
    /// Parse the lead and both headers from `reader`.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] when the input is not a well-formed package.
    fn parse(&self, reader: &mut dyn Read) -> Result<PackageHeader, ParseError>;
}

/// The built-in parser for binary and source RPMs.
#[derive(Debug, Default, Clone, Copy)]
pub struct RpmHeaderParser;

/// Read one header intro into `prefix` and check its declared sizes.
fn read_intro(
    reader: &mut dyn Read,
    prefix: &mut Vec<u8>,
    section: &'static str,
) -> Result<(u32, u32), ParseError> {
    let mut intro = [0u8; INTRO_SIZE];
    reader.read_exact(&mut intro)?;
    if intro[..4] != HEADER_MAGIC {
        return Err(ParseError::BadHeaderMagic(section));
    }
    let entries = u32::from_be_bytes([intro[8], intro[9], intro[10], intro[11]]);
    let data = u32::from_be_bytes([intro[12], intro[13], intro[14], intro[15]]);
    if entries > MAX_HEADER_ENTRIES {
        return Err(ParseError::TooLarge {
            section,
            what: "index count",
            value: entries,
        });
    }
    if data > MAX_HEADER_DATA {
        return Err(ParseError::TooLarge {
            section,
            what: "data size",
            value: data,
        });
    }
    prefix.extend_from_slice(&intro);
    Ok((entries, data))
}

/// Read the lead and signature header plus the main header intro, checking
/// every declared size before anything is allocated for it.
fn read_bounded_prefix(reader: &mut dyn Read) -> Result<Vec<u8>, ParseError> {
    let mut prefix = vec![0u8; LEAD_SIZE];
    reader.read_exact(&mut prefix)?;
    if prefix[..4] != LEAD_MAGIC {
        return Err(ParseError::BadLeadMagic);
    }

    let (entries, data) = read_intro(reader, &mut prefix, "signature")?;
    // The signature header is padded to a multiple of 8 bytes.
    let body = entries as usize * ENTRY_SIZE + data as usize;
    let padded = body + (8 - data as usize % 8) % 8;
    let start = prefix.len();
    prefix.resize(start + padded, 0);
    reader.read_exact(&mut prefix[start..])?;

    read_intro(reader, &mut prefix, "main")?;
    Ok(prefix)
}

/// Decode the lead and both headers, leaving `reader` at the payload.
///
/// # Errors
///
/// Size limits are checked before the `rpm` decoder sees the input; see
/// [`ParseError`] for the rest.
pub fn read_metadata<R: BufRead>(reader: &mut R) -> Result<PackageMetadata, ParseError> {
    let prefix = read_bounded_prefix(reader)?;
    let mut input = io::Cursor::new(prefix).chain(reader);
    Ok(PackageMetadata::parse(&mut input)?)
}

fn or_missing<T>(value: Result<T, rpm::Error>, default: T) -> Result<T, ParseError> {
    match value {
        Ok(value) => Ok(value),
        Err(rpm::Error::TagNotFound(_)) => Ok(default),
        Err(err) => Err(err.into()),
    }
}

fn file_list(metadata: &PackageMetadata) -> Result<Vec<String>, ParseError> {
    let paths = metadata.get_file_paths()?;
    if !paths.is_empty() {
        return Ok(paths
            .iter()
            .map(|path| path.to_string_lossy().into_owned())
            .collect());
    }
    let old = metadata
        .header
        .get_entry_data_as_string_array(IndexTag::RPMTAG_OLDFILENAMES);
    Ok(or_missing(old, Vec::new())?
        .into_iter()
        .map(str::to_string)
        .collect())
}

fn archive_size(metadata: &PackageMetadata) -> u64 {
    let signature = &metadata.signature;
    let header = &metadata.header;
    signature
        .get_entry_data_as_u64(IndexSignatureTag::RPMSIGTAG_LONGARCHIVESIZE)
        .ok()
        .or_else(|| {
            signature
                .get_entry_data_as_u32(IndexSignatureTag::RPMSIGTAG_PAYLOADSIZE)
                .ok()
                .map(u64::from)
        })
        .or_else(|| header.get_entry_data_as_u64(IndexTag::RPMTAG_PAYLOADSIZEALT).ok())
        .or_else(|| header.get_entry_data_as_u64(IndexTag::RPMTAG_LONGARCHIVESIZE).ok())
        .or_else(|| {
            header
                .get_entry_data_as_u32(IndexTag::RPMTAG_ARCHIVESIZE)
                .ok()
                .map(u64::from)
        })
        .unwrap_or(0)
}

impl PackageHeader {
    /// Collect the index fields from decoded headers.
    ///
    /// # Errors
    ///
    /// [`ParseError::MissingTag`] when name, version or release (or the
    /// architecture of a binary package) is absent.
    pub fn from_metadata(metadata: &PackageMetadata) -> Result<Self, ParseError> {
        let epoch = or_missing(metadata.get_epoch(), 0)?;
        let arch = if metadata.is_source_package() {
            "src".to_string()
        } else {
            metadata.get_arch()?.to_string()
        };

        Ok(Self {
            name: metadata.get_name()?.to_string(),
            arch,
            version: Version::new(
                epoch.to_string(),
                metadata.get_version()?,
                metadata.get_release()?,
            ),
            files: file_list(metadata)?,
            installed_size: or_missing(metadata.get_installed_size(), 0)?,
            archive_size: archive_size(metadata),
        })
    }
}

impl PackageParser for RpmHeaderParser {
    fn parse(&self, reader: &mut dyn Read) -> Result<PackageHeader, ParseError> {
        let metadata = read_metadata(&mut BufReader::new(reader))?;
        PackageHeader::from_metadata(&metadata)
    }
}

/// Reader that hashes and counts everything read through it.
#[derive(Debug)]
pub struct HashingReader<R> {
    inner: R,
    sum: ChecksumWriter,
}

impl<R: Read> HashingReader<R> {
    /// Wrap `inner` with a fresh SHA-256 accumulator.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            sum: ChecksumWriter::new(),
        }
    }

    /// Checksum and byte count so far.
    pub fn finish(self) -> (Checksum, u64) {
        (self.sum.sum(), self.sum.bytes_written())
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.sum.update(&buf[..n]);
        Ok(n)
    }
}

/// Parse the package headers and hash the whole artifact in one pass.
///
/// # Errors
///
/// Parser failures and read errors (including those while draining the
/// payload) are returned as [`ParseError`].
pub fn scan_package<R: Read>(
    parser: &dyn PackageParser,
    key: &str,
    reader: R,
) -> Result<ScannedPackage, ParseError> {
    let mut tee = HashingReader::new(reader);
    let header = parser.parse(&mut tee)?;
    io::copy(&mut tee, &mut io::sink())?;
    let (checksum, package_size) = tee.finish();

    Ok(ScannedPackage {
        key: key.to_string(),
        name: header.name,
        arch: header.arch,
        version: header.version,
        checksum,
        size: Size {
            archive: header.archive_size,
            package: package_size,
            installed: header.installed_size,
        },
        files: header.files,
    })
}
