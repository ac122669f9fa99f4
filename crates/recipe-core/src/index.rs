//! Exact inner-product index over pre-normalized recipe embeddings
//!
//! The whole index is decoded into one contiguous `Vec<f32>` at load time
//! (row-major, `count * dim`). After that it is immutable, so any number of
//! threads may call [`VectorIndex::search`] concurrently without locking.
//!
//! Search is a full scan: one dot product per row, fanned out over the rayon
//! pool, followed by a partial selection of the best `k`. Ordering is total:
//! descending score, then ascending row id, so repeated queries return
//! identical sequences.

use std::cmp::Ordering;
use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use rayon::prelude::*;
use thiserror::Error;

use crate::format::{read_layout, FormatError, IndexFormat};
use crate::simd::{dot_product, is_normalized};

/// Rows whose norm is further than this from 1.0 are reported at load
const NORM_TOLERANCE: f32 = 1e-3;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("failed to load vector index {path:?}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: FormatError,
    },

    #[error("Query dimension mismatch: index has {expected}, query has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Row data length {len} is not a multiple of dimension {dim}")]
    RaggedRows { len: usize, dim: usize },
}

/// Read-only vector index, row `i` aligned with metadata row `i`
pub struct VectorIndex {
    source: Option<PathBuf>,
    format: IndexFormat,
    dim: usize,
    count: usize,
    data: Vec<f32>,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("source", &self.source)
            .field("format", &self.format)
            .field("dim", &self.dim)
            .field("count", &self.count)
            .finish()
    }
}

impl VectorIndex {
    /// Load an index file (native `.vdb` or FAISS flat), detecting the format
    /// by magic bytes.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, IndexError> {
        let path = path.as_ref();
        let load_err = |source: FormatError| IndexError::Load {
            path: path.to_path_buf(),
            source,
        };

        let file = File::open(path).map_err(|e| load_err(e.into()))?;
        // SAFETY: the mapping is only read while decoding below and dropped
        // before returning; the vectors are copied into owned memory.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| load_err(e.into()))?;

        let layout = read_layout(&mmap).map_err(load_err)?;
        let start = layout.data_offset;
        let end = start + layout.data_len().map_err(load_err)?;

        // FAISS payloads start at odd offsets, so copy instead of casting in place
        let mut data: Vec<f32> = bytemuck::pod_collect_to_vec(&mmap[start..end]);
        if cfg!(target_endian = "big") {
            for x in data.iter_mut() {
                *x = f32::from_bits(x.to_bits().swap_bytes());
            }
        }

        let index = Self {
            source: Some(path.to_path_buf()),
            format: layout.format,
            dim: layout.dimensions,
            count: layout.count,
            data,
        };

        let off_norm = index.count_unnormalized(NORM_TOLERANCE);
        if off_norm > 0 {
            tracing::warn!(
                "{} of {} vectors in {:?} are not unit length; scores will not be cosine similarities for those rows",
                off_norm,
                index.count,
                path
            );
        }
        if let IndexFormat::FaissFlat(metric) = index.format {
            if metric != crate::faiss::FaissMetric::InnerProduct {
                tracing::warn!(
                    "FAISS index {:?} was built with metric {}; serving it by inner product",
                    path,
                    metric
                );
            }
        }

        tracing::info!(
            "Loaded {} index {:?}: {} vectors x {} dims",
            index.format,
            path,
            index.count,
            index.dim
        );

        Ok(index)
    }

    /// Build an in-memory index from row-major data.
    pub fn from_rows(dim: usize, data: Vec<f32>) -> Result<Self, IndexError> {
        if dim == 0 || data.len() % dim != 0 {
            return Err(IndexError::RaggedRows {
                len: data.len(),
                dim,
            });
        }
        Ok(Self {
            source: None,
            format: IndexFormat::Vdb,
            dim,
            count: data.len() / dim,
            data,
        })
    }

    /// Number of vectors
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn dimensions(&self) -> usize {
        self.dim
    }

    pub fn format(&self) -> IndexFormat {
        self.format
    }

    /// Bytes held by the decoded vectors
    pub fn memory_bytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }

    /// Vector stored at `row`
    pub fn get(&self, row: usize) -> Option<&[f32]> {
        if row >= self.count {
            return None;
        }
        let start = row * self.dim;
        Some(&self.data[start..start + self.dim])
    }

    fn count_unnormalized(&self, tolerance: f32) -> usize {
        self.data
            .par_chunks_exact(self.dim)
            .filter(|row| !is_normalized(row, tolerance))
            .count()
    }

    /// Top-`k` rows by inner product with `query`.
    ///
    /// Returns `min(k, len)` `(row, score)` pairs sorted by descending score,
    /// ties broken by ascending row.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>, IndexError> {
        if query.len() != self.dim {
            return Err(IndexError::DimensionMismatch {
                expected: self.dim,
                actual: query.len(),
            });
        }

        let k = k.min(self.count);
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = self
            .data
            .par_chunks_exact(self.dim)
            .enumerate()
            .map(|(row, v)| {
                let score = dot_product(query, v);
                // NaN rows sink below everything else; `+ 0.0` folds -0.0 into +0.0
                (row, if score.is_nan() { f32::NEG_INFINITY } else { score + 0.0 })
            })
            .collect();

        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, rank_order);
            scored.truncate(k);
        }
        scored.sort_unstable_by(rank_order);

        Ok(scored)
    }
}

/// Descending score, then ascending row. Signed zeros compare equal.
fn rank_order(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    (b.1 + 0.0)
        .total_cmp(&(a.1 + 0.0))
        .then_with(|| a.0.cmp(&b.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faiss::tests::encode_flat_ip;
    use crate::format::VdbWriter;
    use crate::simd::l2_normalized;
    use tempfile::tempdir;

    fn unit_rows() -> Vec<Vec<f32>> {
        vec![
            l2_normalized(&[1.0, 0.0, 0.0]),
            l2_normalized(&[0.0, 1.0, 0.0]),
            l2_normalized(&[1.0, 1.0, 0.0]),
            l2_normalized(&[-1.0, 0.0, 0.0]),
        ]
    }

    fn index_of(rows: &[Vec<f32>]) -> VectorIndex {
        let dim = rows[0].len();
        VectorIndex::from_rows(dim, rows.concat()).unwrap()
    }

    #[test]
    fn test_load_vdb() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("recipes.vdb");
        let mut writer = VdbWriter::new(&path, 3).unwrap();
        for row in unit_rows() {
            writer.write_vector(&row).unwrap();
        }
        writer.finish().unwrap();

        let index = VectorIndex::load(&path).unwrap();
        assert_eq!(index.len(), 4);
        assert_eq!(index.dimensions(), 3);
        assert_eq!(index.format(), IndexFormat::Vdb);
        assert_eq!(index.get(1).unwrap(), unit_rows()[1].as_slice());
        assert!(index.get(4).is_none());
    }

    #[test]
    fn test_load_faiss_flat_ip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("faiss_index.index");
        std::fs::write(&path, encode_flat_ip(3, &unit_rows())).unwrap();

        let index = VectorIndex::load(&path).unwrap();
        assert_eq!(index.len(), 4);
        assert_eq!(index.get(2).unwrap(), unit_rows()[2].as_slice());

        let hits = index.search(&[1.0, 0.0, 0.0], 1).unwrap();
        assert_eq!(hits[0].0, 0);
    }

    #[test]
    fn test_missing_file_names_path() {
        let err = VectorIndex::load("/nonexistent/faiss_index.index").unwrap_err();
        assert!(matches!(err, IndexError::Load { .. }));
        assert!(err.to_string().contains("/nonexistent/faiss_index.index"));
    }

    #[test]
    fn test_corrupt_file_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("garbage.index");
        std::fs::write(&path, b"definitely not vectors").unwrap();

        let err = VectorIndex::load(&path).unwrap_err();
        assert!(matches!(
            err,
            IndexError::Load {
                source: FormatError::UnknownFormat(_),
                ..
            }
        ));
    }

    #[test]
    fn test_search_descending() {
        let index = index_of(&unit_rows());
        let hits = index.search(&l2_normalized(&[1.0, 0.2, 0.0]), 4).unwrap();

        let rows: Vec<usize> = hits.iter().map(|h| h.0).collect();
        assert_eq!(rows, vec![0, 2, 1, 3]);
        for pair in hits.windows(2) {
            assert!(pair[0].1 >= pair[1].1);
        }
    }

    #[test]
    fn test_search_ties_break_by_lower_row() {
        let rows = vec![
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![1.0, 0.0],
        ];
        let index = index_of(&rows);

        let hits = index.search(&[1.0, 0.0], 3).unwrap();
        assert_eq!(hits.iter().map(|h| h.0).collect::<Vec<_>>(), vec![1, 3, 0]);
    }

    #[test]
    fn test_search_k_clamped_to_len() {
        let index = index_of(&unit_rows());
        assert_eq!(index.search(&[1.0, 0.0, 0.0], 50).unwrap().len(), 4);
        assert!(index.search(&[1.0, 0.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_search_dimension_mismatch() {
        let index = index_of(&unit_rows());
        let err = index.search(&[1.0, 0.0], 2).unwrap_err();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_signed_zero_scores_tie_by_row() {
        assert_eq!(rank_order(&(0, -0.0), &(1, 0.0)), Ordering::Less);
        assert_eq!(rank_order(&(1, 0.0), &(0, -0.0)), Ordering::Greater);

        // Zero rows score exactly zero against any query
        let index = index_of(&[vec![0.0, 0.0], vec![0.0, 0.0], vec![-1.0, 0.0]]);
        let hits = index.search(&[-0.6, -0.8], 3).unwrap();
        assert_eq!(hits.iter().map(|h| h.0).collect::<Vec<_>>(), vec![2, 0, 1]);
        assert!(hits[1].1.is_sign_positive() && hits[2].1.is_sign_positive());
    }

    #[test]
    fn test_from_rows_rejects_ragged() {
        assert!(VectorIndex::from_rows(3, vec![0.0; 7]).is_err());
        assert!(VectorIndex::from_rows(0, Vec::new()).is_err());
    }

    #[test]
    fn test_repeated_search_identical() {
        let index = index_of(&unit_rows());
        let q = l2_normalized(&[0.3, 0.7, 0.1]);
        assert_eq!(index.search(&q, 3).unwrap(), index.search(&q, 3).unwrap());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn partial_select_matches_full_sort(
                rows in prop::collection::vec(prop::collection::vec(-4i8..4, 4), 1..64),
                query in prop::collection::vec(-4i8..4, 4),
                k in 1usize..80,
            ) {
                // Small integer grid so ties are common
                let data: Vec<f32> = rows.iter().flatten().map(|&x| x as f32).collect();
                let query: Vec<f32> = query.iter().map(|&x| x as f32).collect();
                let index = VectorIndex::from_rows(4, data).unwrap();

                let mut expected: Vec<(usize, f32)> = (0..index.len())
                    .map(|row| (row, dot_product(&query, index.get(row).unwrap())))
                    .collect();
                expected.sort_by(rank_order);
                expected.truncate(k);

                prop_assert_eq!(index.search(&query, k).unwrap(), expected);
            }
        }
    }
}
