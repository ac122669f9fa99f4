//! Read support for FAISS flat index files
//!
//! Recipe embeddings are commonly exported with `faiss.write_index` on an
//! `IndexFlatIP`. Flat indexes store raw vectors, so they can be served by the
//! exact scan in [`crate::index`] without linking FAISS itself.
//!
//! # Layout (little endian)
//!
//! ```text
//! fourcc      [u8; 4]   "IxFI" (inner product) | "IxF2" (L2) | "IxFl" (other)
//! d           i32       dimensions
//! ntotal      i64       number of vectors
//! dummy       i64       reserved (1 << 20)
//! dummy       i64       reserved (1 << 20)
//! is_trained  u8
//! metric_type i32       0 = inner product, 1 = L2
//! metric_arg  f32       only present when metric_type > 1
//! n_floats    u64       ntotal * d
//! codes       [f32]     vector data
//! ```

use crate::format::{FormatError, IndexFormat, IndexLayout};

const FOURCC_FLAT_IP: &[u8; 4] = b"IxFI";
const FOURCC_FLAT_L2: &[u8; 4] = b"IxF2";
const FOURCC_FLAT: &[u8; 4] = b"IxFl";

/// Metric a FAISS index was built with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaissMetric {
    InnerProduct,
    L2,
    Other(i32),
}

impl FaissMetric {
    fn from_code(code: i32) -> Self {
        match code {
            0 => FaissMetric::InnerProduct,
            1 => FaissMetric::L2,
            other => FaissMetric::Other(other),
        }
    }
}

impl std::fmt::Display for FaissMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FaissMetric::InnerProduct => write!(f, "ip"),
            FaissMetric::L2 => write!(f, "l2"),
            FaissMetric::Other(code) => write!(f, "metric{code}"),
        }
    }
}

/// Whether the leading bytes look like any FAISS index fourcc
pub(crate) fn is_faiss_fourcc(fourcc: &[u8]) -> bool {
    fourcc.len() >= 2 && fourcc[0] == b'I' && matches!(fourcc[1], b'x' | b'w' | b'b' | b'H')
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take<const N: usize>(&mut self, field: &str) -> Result<[u8; N], FormatError> {
        let end = self.pos + N;
        let slice = self.bytes.get(self.pos..end).ok_or_else(|| {
            FormatError::Corrupt(format!("FAISS header truncated reading {field}"))
        })?;
        self.pos = end;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn i32(&mut self, field: &str) -> Result<i32, FormatError> {
        self.take::<4>(field).map(i32::from_le_bytes)
    }

    fn i64(&mut self, field: &str) -> Result<i64, FormatError> {
        self.take::<8>(field).map(i64::from_le_bytes)
    }

    fn u64(&mut self, field: &str) -> Result<u64, FormatError> {
        self.take::<8>(field).map(u64::from_le_bytes)
    }
}

/// Parse the header of a FAISS flat index.
pub(crate) fn read_flat_layout(bytes: &[u8]) -> Result<IndexLayout, FormatError> {
    let mut cur = Cursor { bytes, pos: 0 };
    let fourcc = cur.take::<4>("fourcc")?;
    if &fourcc != FOURCC_FLAT_IP && &fourcc != FOURCC_FLAT_L2 && &fourcc != FOURCC_FLAT {
        return Err(FormatError::UnsupportedFaissIndex(
            String::from_utf8_lossy(&fourcc).into_owned(),
        ));
    }

    let d = cur.i32("d")?;
    let ntotal = cur.i64("ntotal")?;
    let _ = cur.i64("reserved")?;
    let _ = cur.i64("reserved")?;
    let _is_trained = cur.take::<1>("is_trained")?;
    let metric = FaissMetric::from_code(cur.i32("metric_type")?);
    if let FaissMetric::Other(code) = metric {
        if code > 1 {
            let _metric_arg = cur.take::<4>("metric_arg")?;
        }
    }
    let n_floats = cur.u64("code size")?;

    let dimensions = usize::try_from(d)
        .map_err(|_| FormatError::Corrupt(format!("negative dimension {d}")))?;
    let count = usize::try_from(ntotal)
        .map_err(|_| FormatError::Corrupt(format!("negative vector count {ntotal}")))?;

    let expected = (count as u64).checked_mul(dimensions as u64);
    if expected != Some(n_floats) {
        return Err(FormatError::Corrupt(format!(
            "code size {n_floats} does not match {count} x {dimensions}"
        )));
    }

    Ok(IndexLayout {
        format: IndexFormat::FaissFlat(metric),
        count,
        dimensions,
        data_offset: cur.pos,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::format::read_layout;

    /// Serialize vectors the way `faiss.write_index(IndexFlatIP)` does
    pub(crate) fn encode_flat_ip(dim: usize, vectors: &[Vec<f32>]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(FOURCC_FLAT_IP);
        buf.extend_from_slice(&(dim as i32).to_le_bytes());
        buf.extend_from_slice(&(vectors.len() as i64).to_le_bytes());
        buf.extend_from_slice(&(1i64 << 20).to_le_bytes());
        buf.extend_from_slice(&(1i64 << 20).to_le_bytes());
        buf.push(1);
        buf.extend_from_slice(&0i32.to_le_bytes());
        buf.extend_from_slice(&((vectors.len() * dim) as u64).to_le_bytes());
        for v in vectors {
            for x in v {
                buf.extend_from_slice(&x.to_le_bytes());
            }
        }
        buf
    }

    #[test]
    fn test_flat_ip_layout() {
        let bytes = encode_flat_ip(3, &[vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]);
        let layout = read_layout(&bytes).unwrap();

        assert_eq!(layout.format, IndexFormat::FaissFlat(FaissMetric::InnerProduct));
        assert_eq!(layout.count, 2);
        assert_eq!(layout.dimensions, 3);
        assert_eq!(layout.data_offset, 45);
    }

    #[test]
    fn test_hnsw_fourcc_unsupported() {
        let mut bytes = encode_flat_ip(2, &[vec![1.0, 0.0]]);
        bytes[0..4].copy_from_slice(b"IHNf");

        let err = read_layout(&bytes).unwrap_err();
        assert!(matches!(err, FormatError::UnsupportedFaissIndex(ref t) if t == "IHNf"));
    }

    #[test]
    fn test_code_size_mismatch() {
        let mut bytes = encode_flat_ip(2, &[vec![1.0, 0.0]]);
        // n_floats lives right before the payload
        bytes[37..45].copy_from_slice(&7u64.to_le_bytes());

        let err = read_layout(&bytes).unwrap_err();
        assert!(matches!(err, FormatError::Corrupt(_)));
    }

    #[test]
    fn test_truncated_header() {
        let bytes = encode_flat_ip(2, &[vec![1.0, 0.0]]);
        let err = read_layout(&bytes[..20]).unwrap_err();
        assert!(matches!(err, FormatError::Corrupt(_)));
    }
}
