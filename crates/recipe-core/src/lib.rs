//! Recipe Core – vector index formats, exact inner-product search and the
//! row-aligned recipe metadata table
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │        VectorIndex (exact top-k by inner product)           │
//! │         .vdb native  ·  FAISS flat (IxFI / IxF2)             │
//! ├─────────────────────────────────────────────────────────────┤
//! │        MetadataStore (CSV, row i  <->  vector i)            │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod faiss;
pub mod format;
pub mod index;
pub mod metadata;
pub mod simd;

pub use format::{FormatError, IndexFormat, VdbWriter};
pub use index::{IndexError, VectorIndex};
pub use metadata::{MetadataError, MetadataStore, RecipeRecord};
pub use simd::{dot_product, l2_normalize, l2_normalized};

/// Parse only the header of an index file (fuzzing entry point)
pub fn fuzz_read_layout(bytes: &[u8]) -> Result<format::IndexLayout, FormatError> {
    format::read_layout(bytes)
}
