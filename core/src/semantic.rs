//! Embedding similarity between a query and individual documents.
//!
//! Document vectors are stored per kind in one contiguous array with precomputed
//! norms. The query vector is the TF-IDF weighted mean of the word vectors of its
//! terms. Kinds sharing an `EmbeddingScope` must share a dimension.

use crate::index::{DocId, DocKey, DocKind, EmbeddingScope};
use crate::persist::{load_json, load_json_optional, load_word_vectors, DataPaths};
use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use tracing::{info, warn};

struct EmbeddingTable {
    dim: usize,
    data: Vec<f32>,
    norms: Vec<f32>, // 0.0 marks a document without a vector
}

impl EmbeddingTable {
    fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self> {
        let dim = rows.iter().map(Vec::len).find(|&n| n > 0).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * dim);
        let mut norms = Vec::with_capacity(rows.len());
        for (id, row) in rows.into_iter().enumerate() {
            if row.is_empty() {
                data.extend(std::iter::repeat(0.0).take(dim));
                norms.push(0.0);
                continue;
            }
            if row.len() != dim {
                bail!("embedding for document {id} has {} components, expected {dim}", row.len());
            }
            norms.push(norm(&row));
            data.extend_from_slice(&row);
        }
        Ok(Self { dim, data, norms })
    }

    fn len(&self) -> usize {
        self.norms.len()
    }

    fn row(&self, id: DocId) -> Option<(&[f32], f32)> {
        let id = id as usize;
        let n = *self.norms.get(id)?;
        if n == 0.0 {
            return None;
        }
        Some((&self.data[id * self.dim..(id + 1) * self.dim], n))
    }
}

fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[derive(Debug, Clone)]
pub struct QueryVector {
    values: Vec<f32>,
    norm: f32,
}

pub struct SemanticEngine {
    idf: HashMap<String, f32>,
    dim: usize,
    word_vectors: Option<HashMap<String, Vec<f32>>>,
    tables: HashMap<DocKind, EmbeddingTable>,
}

impl SemanticEngine {
    /// The IDF map is mandatory. The word-vector model and per-kind embeddings are
    /// optional, but fatal if present and unreadable.
    pub fn open(paths: &DataPaths) -> Result<Self> {
        let idf: HashMap<String, f32> = load_json(&paths.idf_map()).context("IDF map is required")?;

        let model_path = paths.word_vectors();
        let (dim, word_vectors) = if model_path.exists() {
            let (dim, vectors) = load_word_vectors(&model_path)?;
            (dim, Some(vectors))
        } else {
            warn!(path = %model_path.display(), "no word vector model; semantic scoring disabled");
            (0, None)
        };

        let mut tables = HashMap::new();
        for kind in DocKind::ALL {
            let path = paths.embeddings(kind);
            let Some(rows) = load_json_optional::<Vec<Vec<f32>>>(&path)? else {
                continue;
            };
            let table = EmbeddingTable::from_rows(rows).with_context(|| format!("corrupt embeddings in {}", path.display()))?;
            if word_vectors.is_some() && table.dim != 0 && table.dim != dim {
                warn!(kind = kind.as_str(), table_dim = table.dim, model_dim = dim, "embedding dimension differs from word vectors; kind excluded");
                continue;
            }
            tables.insert(kind, table);
        }
        check_scopes(&tables)?;
        info!(terms = idf.len(), dim, kinds = tables.len(), "loaded semantic data");
        Ok(Self { idf, dim, word_vectors, tables })
    }

    pub fn idf(&self, term: &str) -> Option<f32> {
        self.idf.get(term).copied()
    }

    pub fn is_available(&self) -> bool {
        self.word_vectors.is_some() && !self.tables.is_empty()
    }

    /// TF-IDF weighted mean of the word vectors for `terms`. `None` when no term has a vector.
    pub fn query_vector(&self, terms: &[String]) -> Option<QueryVector> {
        let model = self.word_vectors.as_ref()?;
        if terms.is_empty() {
            return None;
        }
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for t in terms {
            *counts.entry(t.as_str()).or_insert(0) += 1;
        }
        let total = terms.len() as f32;
        let mut values = vec![0.0f32; self.dim];
        let mut weight_sum = 0.0f32;
        for (term, count) in counts {
            let Some(vector) = model.get(term) else { continue };
            let weight = (count as f32 / total) * self.idf(term).unwrap_or(0.0);
            for (acc, v) in values.iter_mut().zip(vector) {
                *acc += v * weight;
            }
            weight_sum += weight;
        }
        if weight_sum == 0.0 {
            return None;
        }
        for v in values.iter_mut() {
            *v /= weight_sum;
        }
        let n = norm(&values);
        (n > 0.0).then_some(QueryVector { values, norm: n })
    }

    /// Cosine similarity in `[-1, 1]`; zero when the document has no stored vector.
    pub fn similarity_to(&self, query: &QueryVector, key: DocKey) -> f32 {
        let Some(table) = self.tables.get(&key.kind) else { return 0.0 };
        let Some((row, row_norm)) = table.row(key.id) else { return 0.0 };
        (dot(row, &query.values) / (row_norm * query.norm)).clamp(-1.0, 1.0)
    }

    pub fn similarity(&self, terms: &[String], key: DocKey) -> f32 {
        self.query_vector(terms).map(|q| self.similarity_to(&q, key)).unwrap_or(0.0)
    }

    /// Every document with positive similarity. Touches the whole corpus.
    pub fn scan(&self, query: &QueryVector) -> Vec<(DocKey, f32)> {
        let mut out = Vec::new();
        for (kind, table) in &self.tables {
            for id in 0..table.len() as DocId {
                let key = DocKey::new(*kind, id);
                let sim = self.similarity_to(query, key);
                if sim > 0.0 {
                    out.push((key, sim));
                }
            }
        }
        out
    }

    pub fn dimension(&self) -> usize {
        self.dim
    }
}

fn check_scopes(tables: &HashMap<DocKind, EmbeddingTable>) -> Result<()> {
    let mut dims: HashMap<EmbeddingScope, (DocKind, usize)> = HashMap::new();
    for (kind, table) in tables {
        if table.dim == 0 {
            continue;
        }
        if let Some((other, dim)) = dims.insert(kind.scope(), (*kind, table.dim)) {
            if dim != table.dim {
                bail!("{:?} and {:?} share an embedding scope but have dimensions {} and {}", other, kind, dim, table.dim);
            }
        }
    }
    Ok(())
}
