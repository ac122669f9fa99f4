//! .vdb Binary File Format
//!
//! Native on-disk layout for pre-normalized recipe embeddings.
//!
//! # File Structure
//!
//! ```text
//! Offset   Size    Type        Description
//! ─────────────────────────────────────────────
//! 0x00     8       [u8; 8]     Magic: "RCPVEC01"
//! 0x08     4       u32 LE      N: Number of vectors
//! 0x0C     4       u32 LE      D: Dimensions
//! 0x10     N*D*4   [f32]       Vector data (Little Endian), row i = recipe row i
//! ```
//!
//! # Example
//!
//! ```ignore
//! let mut writer = VdbWriter::new("recipes.vdb", 384)?;
//! writer.write_vector(&embedding)?;
//! writer.finish()?;
//! ```

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use thiserror::Error;

use crate::faiss::{self, FaissMetric};

/// Magic bytes identifying a .vdb file: "RCPVEC01"
pub const MAGIC: [u8; 8] = *b"RCPVEC01";

/// Header size in bytes: 8 (magic) + 4 (count) + 4 (dims) = 16
pub const HEADER_SIZE: usize = 16;

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Unrecognized index format (magic {0:?})")]
    UnknownFormat([u8; 4]),

    #[error("Unsupported FAISS index type {0:?}: only flat indexes (IxFI/IxF2) can be read")]
    UnsupportedFaissIndex(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Corrupt index: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// On-disk layout an index file was written in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    /// Native `RCPVEC01` file
    Vdb,
    /// `faiss.write_index` output for a flat index
    FaissFlat(FaissMetric),
}

impl std::fmt::Display for IndexFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexFormat::Vdb => write!(f, "vdb"),
            IndexFormat::FaissFlat(metric) => write!(f, "faiss-flat-{metric}"),
        }
    }
}

/// Parsed header of any supported index file
#[derive(Debug, Clone, Copy)]
pub struct IndexLayout {
    pub format: IndexFormat,
    pub count: usize,
    pub dimensions: usize,
    /// Byte offset of the first vector component
    pub data_offset: usize,
}

impl IndexLayout {
    /// Number of payload bytes holding vector data
    pub fn data_len(&self) -> Result<usize, FormatError> {
        self.count
            .checked_mul(self.dimensions)
            .and_then(|n| n.checked_mul(std::mem::size_of::<f32>()))
            .ok_or_else(|| {
                FormatError::Corrupt(format!(
                    "{} x {} vectors overflow the address space",
                    self.count, self.dimensions
                ))
            })
    }
}

/// Detect the file format by magic bytes and parse its header.
///
/// The payload length is validated against the declared shape, so a
/// returned layout always describes bytes that are actually present.
pub fn read_layout(bytes: &[u8]) -> Result<IndexLayout, FormatError> {
    if bytes.len() < 4 {
        return Err(FormatError::Corrupt("file too small for a header".into()));
    }

    let layout = if bytes.len() >= 8 && bytes[0..8] == MAGIC {
        let header = VdbHeader::from_bytes(bytes)?;
        IndexLayout {
            format: IndexFormat::Vdb,
            count: header.count as usize,
            dimensions: header.dimensions as usize,
            data_offset: HEADER_SIZE,
        }
    } else if faiss::is_faiss_fourcc(&bytes[0..4]) {
        faiss::read_flat_layout(bytes)?
    } else {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        return Err(FormatError::UnknownFormat(magic));
    };

    if layout.dimensions == 0 {
        return Err(FormatError::Corrupt("dimension is zero".into()));
    }

    let end = layout
        .data_len()?
        .checked_add(layout.data_offset)
        .ok_or_else(|| FormatError::Corrupt("payload end overflows".into()))?;
    if bytes.len() < end {
        return Err(FormatError::Corrupt(format!(
            "file truncated: expected {} bytes, got {}",
            end,
            bytes.len()
        )));
    }

    Ok(layout)
}

/// Parsed .vdb file header
#[derive(Debug, Clone, Copy)]
pub struct VdbHeader {
    pub count: u32,
    pub dimensions: u32,
}

impl VdbHeader {
    /// Parse header from raw bytes (first 16 bytes of file)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FormatError> {
        if bytes.len() < HEADER_SIZE {
            return Err(FormatError::Corrupt("file too small for .vdb header".into()));
        }

        if bytes[0..8] != MAGIC {
            let mut magic = [0u8; 4];
            magic.copy_from_slice(&bytes[0..4]);
            return Err(FormatError::UnknownFormat(magic));
        }

        let count = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        let dimensions = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);

        Ok(Self { count, dimensions })
    }

    /// Write header to bytes
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..8].copy_from_slice(&MAGIC);
        buf[8..12].copy_from_slice(&self.count.to_le_bytes());
        buf[12..16].copy_from_slice(&self.dimensions.to_le_bytes());
        buf
    }
}

/// Writer for creating .vdb files
///
/// Index construction happens offline; this exists for tooling and fixtures.
pub struct VdbWriter {
    writer: BufWriter<File>,
    dimensions: usize,
    count: u32,
}

impl VdbWriter {
    /// Create a new .vdb file writer
    pub fn new<P: AsRef<Path>>(path: P, dimensions: usize) -> Result<Self, FormatError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        // Placeholder count, patched in finish()
        let header = VdbHeader {
            count: 0,
            dimensions: dimensions as u32,
        };
        writer.write_all(&header.to_bytes())?;

        Ok(Self {
            writer,
            dimensions,
            count: 0,
        })
    }

    /// Append one vector as the next row
    pub fn write_vector(&mut self, vector: &[f32]) -> Result<(), FormatError> {
        if vector.len() != self.dimensions {
            return Err(FormatError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }

        for &val in vector {
            self.writer.write_all(&val.to_le_bytes())?;
        }

        self.count += 1;
        Ok(())
    }

    /// Finalize the file, updating the header with the actual count
    pub fn finish(mut self) -> Result<u32, FormatError> {
        use std::io::Seek;

        self.writer.flush()?;

        let file = self.writer.get_mut();
        file.seek(io::SeekFrom::Start(8))?;
        file.write_all(&self.count.to_le_bytes())?;
        file.sync_all()?;

        Ok(self.count)
    }
}
