use crate::models::{Chunk, DistanceMetric, RetrievedChunk};
use crate::RagError;
use chrono::{DateTime, Utc};

/// Brute-force nearest-neighbour index held in process memory.
#[derive(Debug, Clone)]
pub struct InMemoryIndex {
    metric: DistanceMetric,
    dimensions: Option<usize>,
    entries: Vec<(Vec<f32>, Chunk)>,
    built_at: DateTime<Utc>,
}

impl InMemoryIndex {
    pub fn new(metric: DistanceMetric) -> Self {
        Self {
            metric,
            dimensions: None,
            entries: Vec::new(),
            built_at: Utc::now(),
        }
    }

    pub fn insert_all(&mut self, chunks: Vec<Chunk>, embeddings: Vec<Vec<f32>>) -> Result<(), RagError> {
        if chunks.len() != embeddings.len() {
            return Err(RagError::InvalidArgument(format!(
                "embedding count {} doesn't match chunk count {}",
                embeddings.len(),
                chunks.len()
            )));
        }

        let mut dimensions = self.dimensions;
        for (chunk, embedding) in chunks.iter().zip(&embeddings) {
            if embedding.is_empty() {
                return Err(RagError::InvalidArgument(format!(
                    "empty embedding for chunk {}",
                    chunk.chunk_index
                )));
            }

            let expected = *dimensions.get_or_insert(embedding.len());
            if embedding.len() != expected {
                return Err(RagError::InvalidArgument(format!(
                    "embedding dimension {} != {}",
                    embedding.len(),
                    expected
                )));
            }
        }

        self.dimensions = dimensions;
        self.entries.extend(embeddings.into_iter().zip(chunks));
        self.built_at = Utc::now();
        Ok(())
    }

    /// Up to `k` chunks ordered by ascending distance; ties keep document
    /// order.
    pub fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<RetrievedChunk>, RagError> {
        if let Some(expected) = self.dimensions {
            if query.len() != expected {
                return Err(RagError::InvalidArgument(format!(
                    "query vector dim {} is not {}",
                    query.len(),
                    expected
                )));
            }
        }

        let mut scored = self
            .entries
            .iter()
            .map(|(embedding, chunk)| (distance(self.metric, query, embedding), chunk))
            .collect::<Vec<_>>();

        scored.sort_by(|left, right| {
            left.0
                .total_cmp(&right.0)
                .then_with(|| left.1.chunk_index.cmp(&right.1.chunk_index))
        });

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(distance, chunk)| RetrievedChunk {
                chunk: chunk.clone(),
                distance,
            })
            .collect())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }
}

fn distance(metric: DistanceMetric, left: &[f32], right: &[f32]) -> f32 {
    match metric {
        DistanceMetric::SquaredEuclidean => left
            .iter()
            .zip(right)
            .map(|(a, b)| (a - b) * (a - b))
            .sum(),
        DistanceMetric::Cosine => 1.0 - cosine_similarity(left, right),
    }
}

pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    if left.len() != right.len() {
        return 0.0;
    }

    let dot = left.iter().zip(right).map(|(a, b)| a * b).sum::<f32>();
    let norm_left = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let norm_right = right.iter().map(|value| value * value).sum::<f32>().sqrt();

    if norm_left > 0.0 && norm_right > 0.0 {
        dot / (norm_left * norm_right)
    } else {
        0.0
    }
}
