//! Shared fixtures: a keyword embedder and on-disk index/metadata writers

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use recipe_core::{l2_normalized, VdbWriter};
use recipe_neural::{InferenceError, TextEmbedder};

pub const VOCAB: &[&str] = &[
    "tomato", "garlic", "olive", "oil", "basil", "egg", "flour", "milk", "sugar", "avocado",
    "lime", "onion",
];

/// One axis per vocabulary word; unknown words are ignored
pub struct KeywordEmbedder;

impl TextEmbedder for KeywordEmbedder {
    fn dimensions(&self) -> usize {
        VOCAB.len()
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>, InferenceError> {
        let mut v = vec![0.0f32; VOCAB.len()];
        for word in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            if let Some(i) = VOCAB.iter().position(|w| *w == word) {
                v[i] += 1.0;
            }
        }
        // Keep unknown-only text off the zero vector
        if v.iter().all(|&x| x == 0.0) {
            v.iter_mut().for_each(|x| *x = 1.0);
        }
        Ok(l2_normalized(&v))
    }
}

pub struct Recipe {
    pub id: i64,
    pub title: &'static str,
    pub ingredients: &'static str,
    pub instructions: &'static str,
}

/// The three-recipe corpus: recipe 7 is the tomato/garlic/olive oil dish
pub fn corpus() -> Vec<Recipe> {
    vec![
        Recipe {
            id: 3,
            title: "Fluffy Pancakes",
            ingredients: "['1 cup flour', '1 egg', '1 cup milk', '2 tbsp sugar']",
            instructions: "Whisk and fry.",
        },
        Recipe {
            id: 7,
            title: "Pasta alla Marinara",
            ingredients: "['4 tomato', '3 cloves garlic', '2 tbsp olive oil', 'basil']",
            instructions: "Simmer the sauce, toss with pasta.",
        },
        Recipe {
            id: 11,
            title: "Guacamole",
            ingredients: "['2 avocado', '1 lime', 'onion', 'tomato']",
            instructions: "Mash, season, serve.",
        },
    ]
}

pub fn embed_corpus(recipes: &[Recipe]) -> Vec<Vec<f32>> {
    recipes
        .iter()
        .map(|r| KeywordEmbedder.encode(r.ingredients).unwrap())
        .collect()
}

pub fn write_vdb(path: &Path, vectors: &[Vec<f32>]) {
    let dim = vectors.first().map(|v| v.len()).unwrap_or(VOCAB.len());
    let mut writer = VdbWriter::new(path, dim).unwrap();
    for v in vectors {
        writer.write_vector(v).unwrap();
    }
    writer.finish().unwrap();
}

/// Same bytes `faiss.write_index(IndexFlatIP)` produces
pub fn write_faiss_flat_ip(path: &Path, vectors: &[Vec<f32>]) {
    let dim = vectors.first().map(|v| v.len()).unwrap_or(VOCAB.len());
    let mut buf = Vec::new();
    buf.extend_from_slice(b"IxFI");
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
    std::fs::write(path, buf).unwrap();
}

pub fn write_metadata(path: &Path, recipes: &[Recipe]) {
    let mut writer = csv::Writer::from_path(path).unwrap();
    writer
        .write_record(["id", "title", "ingredients", "instructions"])
        .unwrap();
    for r in recipes {
        writer
            .write_record([
                r.id.to_string().as_str(),
                r.title,
                r.ingredients,
                r.instructions,
            ])
            .unwrap();
    }
    writer.flush().unwrap();
}

pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub index: PathBuf,
    pub metadata: PathBuf,
}

/// Aligned `.vdb` + CSV for [`corpus`]
pub fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let index = dir.path().join("recipes.vdb");
    let metadata = dir.path().join("metadata.csv");
    let recipes = corpus();
    write_vdb(&index, &embed_corpus(&recipes));
    write_metadata(&metadata, &recipes);
    Fixture {
        dir,
        index,
        metadata,
    }
}
