//! Property tests for ranking order and score presentation

use proptest::prelude::*;

use recipe_recommender::{
    match_percent, MetadataStore, RecipeRecord, RecommendationEngine, TextEmbedder, VectorIndex,
};
use recipe_core::l2_normalized;
use recipe_neural::InferenceError;

const DIM: usize = 8;

/// Hashes bytes onto the axes so arbitrary text lands somewhere
struct ByteEmbedder;

impl TextEmbedder for ByteEmbedder {
    fn dimensions(&self) -> usize {
        DIM
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>, InferenceError> {
        let mut v = vec![0.0f32; DIM];
        for (i, b) in text.bytes().enumerate() {
            v[(b as usize + i) % DIM] += 1.0;
        }
        Ok(l2_normalized(&v))
    }
}

fn arb_rows() -> impl Strategy<Value = Vec<Vec<f32>>> {
    prop::collection::vec(prop::collection::vec(-1.0f32..1.0, DIM), 1..40)
        .prop_map(|rows| rows.iter().map(|r| l2_normalized(r)).collect())
}

fn engine_for(rows: &[Vec<f32>]) -> RecommendationEngine {
    let data: Vec<f32> = rows.iter().flatten().copied().collect();
    let index = VectorIndex::from_rows(DIM, data).unwrap();
    let metadata = MetadataStore::from_records(
        (0..rows.len())
            .map(|i| RecipeRecord::new(i as i64 * 10, format!("recipe {}", i), "", ""))
            .collect(),
    );
    RecommendationEngine::from_parts(index, metadata, Box::new(ByteEmbedder)).unwrap()
}

proptest! {
    #[test]
    fn results_sorted_and_sized(rows in arb_rows(), k in 1usize..60, text in "[a-z ]{1,30}") {
        prop_assume!(!text.trim().is_empty());
        let engine = engine_for(&rows);
        let results = engine.query(&text, k).unwrap();

        prop_assert_eq!(results.len(), k.min(rows.len()));
        for pair in results.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            prop_assert!(
                a.similarity_score > b.similarity_score
                    || (a.similarity_score == b.similarity_score && a.recipe.id < b.recipe.id)
            );
        }
    }

    #[test]
    fn top_result_is_exact_maximum(rows in arb_rows(), text in "[a-z]{1,20}") {
        let engine = engine_for(&rows);
        let query = ByteEmbedder.encode(&text).unwrap();
        let best = rows
            .iter()
            .map(|r| r.iter().zip(&query).map(|(a, b)| a * b).sum::<f32>())
            .fold(f32::NEG_INFINITY, f32::max);

        let results = engine.query(&text, 1).unwrap();
        prop_assert!((results[0].similarity_score - best).abs() < 1e-4);
    }

    #[test]
    fn match_percent_in_range(score in prop::num::f32::ANY) {
        let p = match_percent(score);
        prop_assert!((0.0..=100.0).contains(&p));
    }

    #[test]
    fn match_percent_monotone(a in -2.0f32..2.0, b in -2.0f32..2.0) {
        if a <= b {
            prop_assert!(match_percent(a) <= match_percent(b));
        }
    }
}
