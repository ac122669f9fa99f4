//! Recipe metadata table
//!
//! Loads the comma-separated recipe table that sits next to the vector index.
//! Row `i` of the table describes vector `i` of the index; the loader keeps
//! rows in file order and never reorders, dedups or filters them.
//!
//! Required columns (any order): `id`, `title`, `ingredients`, `instructions`.
//! Every other named column is kept verbatim in [`RecipeRecord::extra`].
//! `ingredients` is usually a serialized list (`"['2 cups flour', ...]"`) and
//! is passed through untouched.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const REQUIRED_COLUMNS: [&str; 4] = ["id", "title", "ingredients", "instructions"];

/// Keys a ranked result writes next to the record fields; table columns with
/// these names are dropped so the serialized result has one of each.
const RESERVED_COLUMNS: [&str; 2] = ["similarity_score", "match_percent"];

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("failed to read metadata {path:?}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("metadata {path:?} is missing required column `{column}`")]
    MissingColumn { path: PathBuf, column: &'static str },

    #[error("metadata {path:?} line {line}: invalid id {value:?}")]
    InvalidId {
        path: PathBuf,
        line: u64,
        value: String,
    },

    #[error("Index out of bounds: {index} >= {count}")]
    IndexOutOfBounds { index: usize, count: usize },
}

/// One recipe row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeRecord {
    pub id: i64,
    pub title: String,
    /// Serialized ingredient list, verbatim from the source table
    pub ingredients: String,
    pub instructions: String,
    /// Any further columns of the table, by header name
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl RecipeRecord {
    pub fn new(
        id: i64,
        title: impl Into<String>,
        ingredients: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            ingredients: ingredients.into(),
            instructions: instructions.into(),
            extra: BTreeMap::new(),
        }
    }
}

struct Columns {
    id: usize,
    title: usize,
    ingredients: usize,
    instructions: usize,
    extra: Vec<(usize, String)>,
}

impl Columns {
    fn resolve(path: &Path, headers: &csv::StringRecord) -> Result<Self, MetadataError> {
        let names: Vec<&str> = headers
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim())
            .collect();
        let find = |column: &'static str| {
            names
                .iter()
                .position(|h| *h == column)
                .ok_or_else(|| MetadataError::MissingColumn {
                    path: path.to_path_buf(),
                    column,
                })
        };

        let mut extra = Vec::new();
        for (i, name) in names.iter().enumerate() {
            if name.is_empty() || REQUIRED_COLUMNS.contains(name) {
                continue;
            }
            if RESERVED_COLUMNS.contains(name) {
                tracing::warn!(
                    "metadata {:?}: dropping column `{}`, it collides with a result score field",
                    path,
                    name
                );
                continue;
            }
            extra.push((i, name.to_string()));
        }

        Ok(Self {
            id: find("id")?,
            title: find("title")?,
            ingredients: find("ingredients")?,
            instructions: find("instructions")?,
            extra,
        })
    }
}

/// In-memory, row-ordered recipe table
#[derive(Debug, Default)]
pub struct MetadataStore {
    records: Vec<RecipeRecord>,
}

impl MetadataStore {
    /// Load a CSV table with a header row.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, MetadataError> {
        let path = path.as_ref();
        let csv_err = |source: csv::Error| MetadataError::Csv {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)
            .map_err(csv_err)?;
        let headers = reader.headers().map_err(csv_err)?.clone();
        let columns = Columns::resolve(path, &headers)?;

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row.map_err(csv_err)?;
            let line = row.position().map(|p| p.line()).unwrap_or(0);
            let field = |i: usize| row.get(i).unwrap_or_default();

            let raw_id = field(columns.id).trim();
            let id = raw_id.parse::<i64>().map_err(|_| MetadataError::InvalidId {
                path: path.to_path_buf(),
                line,
                value: raw_id.to_string(),
            })?;

            records.push(RecipeRecord {
                id,
                title: field(columns.title).to_string(),
                ingredients: field(columns.ingredients).to_string(),
                instructions: field(columns.instructions).to_string(),
                extra: columns
                    .extra
                    .iter()
                    .map(|(i, name)| (name.clone(), field(*i).to_string()))
                    .collect(),
            });
        }

        tracing::info!("Loaded metadata {:?} with {} recipes", path, records.len());

        Ok(Self { records })
    }

    /// Build a store from records already in row order.
    pub fn from_records(records: Vec<RecipeRecord>) -> Self {
        Self { records }
    }

    /// Record at `row`
    pub fn get(&self, row: usize) -> Result<&RecipeRecord, MetadataError> {
        self.records
            .get(row)
            .ok_or(MetadataError::IndexOutOfBounds {
                index: row,
                count: self.records.len(),
            })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
