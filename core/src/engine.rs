//! Query orchestration: resolves terms through the word cache and barrels, fuses
//! keyword, phrase, semantic and authority signals, and ranks the result.
//! Also the entry point for id allocation on indexing and for engine status.

use crate::authority::AuthorityStore;
use crate::autocomplete::Autocomplete;
use crate::barrel::BarrelReader;
use crate::cache::{CacheStats, WordCache};
use crate::config::EngineConfig;
use crate::document::extract_title;
use crate::error::IndexError;
use crate::ids::{Counters, IdAllocator};
use crate::index::{DocId, DocKey, DocKind, Posting, PostingList, ResultItem};
use crate::persist::{atomic_write, DataPaths};
use crate::semantic::SemanticEngine;
use crate::tokenizer::normalize_query;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, error, info};

pub struct SearchEngine {
    config: EngineConfig,
    paths: DataPaths,
    barrels: BarrelReader,
    authority: AuthorityStore,
    semantic: SemanticEngine,
    autocomplete: Autocomplete,
    cache: WordCache,
    ids: std::result::Result<IdAllocator, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexedDocument {
    pub document_id: String,
    pub kind: DocKind,
    pub id: DocId,
    pub title: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub last_id_per_type: BTreeMap<&'static str, Option<DocId>>,
    pub cache_size: usize,
    pub cache_max_size: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub semantic_available: bool,
    pub semantic_dimension: usize,
    pub indexing_available: bool,
    pub barrels: usize,
    pub barrels_available: usize,
}

/// Per-candidate accumulator while scoring one query.
struct Candidate<'a> {
    keyword: f32,
    positions: HashMap<&'a str, &'a [u32]>,
}

impl SearchEngine {
    /// Load every immutable reader and the mutable state. Fails on missing or
    /// corrupt mandatory artifacts. Unusable id counters only disable indexing.
    pub fn open(config: EngineConfig) -> Result<Self> {
        let paths = DataPaths::new(&config.data_dir);
        info!(data_dir = %paths.root.display(), "loading search engine");

        let authority = AuthorityStore::open(&paths).context("failed to load authority ranks")?;
        let barrels = BarrelReader::open(&paths)?;
        let semantic = SemanticEngine::open(&paths).context("failed to load semantic data")?;
        let autocomplete = Autocomplete::open(&paths)?;
        let cache = WordCache::open(&config.cache, paths.word_cache(), barrels.fingerprint());

        let floor = Counters {
            html_page: authority.max_id(DocKind::HtmlPage).map_or(0, |id| id.saturating_add(1)),
            json_paper: authority.max_id(DocKind::JsonPaper).map_or(0, |id| id.saturating_add(1)),
            pdf_paper: authority.max_id(DocKind::PdfPaper).map_or(0, |id| id.saturating_add(1)),
        };
        let ids = IdAllocator::open(&paths.engine_state(), floor).map_err(|e| {
            error!(error = %e, "id counters untrusted; indexing disabled, search stays available");
            e.to_string()
        });

        info!(semantic = semantic.is_available(), indexing = ids.is_ok(), "search engine ready");
        Ok(Self { config, paths, barrels, authority, semantic, autocomplete, cache, ids })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &WordCache {
        &self.cache
    }

    /// Posting list for one term, memoized in the word cache. Empty lists are not cached.
    fn resolve(&self, term: &str) -> Arc<PostingList> {
        if let Some(hit) = self.cache.get(term) {
            return hit;
        }
        let list = self.barrels.lookup(term);
        if list.is_empty() {
            debug!(term, "term not found in any barrel");
            return Arc::new(list);
        }
        let list = Arc::new(list);
        self.cache.put(term.to_string(), Arc::clone(&list));
        list
    }

    /// Rank every document matching at least one query term, best first, ties by document.
    pub fn search(&self, query: &str, use_semantic: bool, semantic_weight: f32) -> Vec<ResultItem> {
        let terms = normalize_query(query);
        if terms.is_empty() {
            return Vec::new();
        }
        let scoring = &self.config.scoring;

        let mut distinct: Vec<&str> = Vec::with_capacity(terms.len());
        for t in &terms {
            if !distinct.contains(&t.as_str()) {
                distinct.push(t);
            }
        }
        let resolved: Vec<(&str, Arc<PostingList>)> = distinct.iter().map(|t| (*t, self.resolve(t))).collect();

        let mut candidates: BTreeMap<DocKey, Candidate<'_>> = BTreeMap::new();
        for (term, list) in &resolved {
            let idf = self.semantic.idf(term).unwrap_or(scoring.default_idf);
            for Posting { doc, tf, positions } in list.iter() {
                let c = candidates.entry(*doc).or_insert_with(|| Candidate { keyword: 0.0, positions: HashMap::new() });
                c.keyword += *tf as f32 * idf;
                c.positions.insert(*term, positions.as_slice());
            }
        }

        let query_vector = if use_semantic && self.semantic.is_available() {
            self.semantic.query_vector(&terms)
        } else {
            None
        };

        let mut results: Vec<(DocKey, ResultItem)> = Vec::with_capacity(candidates.len());
        for (key, c) in &candidates {
            let adjacencies: usize = terms
                .windows(2)
                .map(|pair| match (c.positions.get(pair[0].as_str()), c.positions.get(pair[1].as_str())) {
                    (Some(a), Some(b)) => adjacent_count(a, b, scoring.phrase_max_gap),
                    _ => 0,
                })
                .sum();
            let phrase_bonus = adjacencies as f32 * scoring.phrase_bonus;
            let similarity = query_vector.as_ref().map_or(0.0, |q| self.semantic.similarity_to(q, *key));
            results.push((*key, self.result_item(*key, c.keyword, phrase_bonus, similarity, semantic_weight)));
        }

        if candidates.is_empty() && self.config.semantic.full_scan_fallback {
            if let Some(q) = &query_vector {
                for (key, similarity) in self.semantic.scan(q) {
                    results.push((key, self.result_item(key, 0.0, 0.0, similarity, semantic_weight)));
                }
            }
        }

        results.sort_by(|a, b| b.1.final_score.total_cmp(&a.1.final_score).then(a.0.cmp(&b.0)));
        results.into_iter().map(|(_, item)| item).collect()
    }

    fn result_item(&self, key: DocKey, keyword: f32, phrase_bonus: f32, similarity: f32, semantic_weight: f32) -> ResultItem {
        let weights = &self.config.scoring.authority;
        let ranks = self.authority.scores(key);
        let authority = weights.link_rank * ranks.link_rank
            + weights.domain_rank * ranks.domain_rank
            + weights.citation_rank * ranks.citation_rank;
        let meta = self.authority.meta(key);
        let url = meta.map(|m| m.url.clone()).unwrap_or_default();
        let title = match meta {
            Some(m) if !m.title.is_empty() => m.title.clone(),
            _ => url.clone(),
        };
        ResultItem {
            document_id: key.to_string(),
            kind: key.kind,
            title,
            url,
            final_score: keyword + phrase_bonus + semantic_weight * similarity + authority,
            keyword_score: keyword,
            semantic_score: similarity,
            phrase_bonus,
        }
    }

    pub fn autocomplete(&self, query: &str, limit: usize) -> Vec<String> {
        self.autocomplete.suggest_query(query, limit)
    }

    /// Accept a new document: validate the payload, allocate an id, and stage the
    /// payload under `uploads/` for the offline builders. An id allocated before a
    /// later failure is not reused.
    pub fn index_document(&self, kind: DocKind, payload: &[u8]) -> std::result::Result<IndexedDocument, IndexError> {
        let ids = self.ids.as_ref().map_err(|reason| IndexError::IndexingUnavailable(reason.clone()))?;
        let title = extract_title(kind, payload).map_err(|reason| IndexError::InvalidPayload { kind, reason })?;
        let id = ids.allocate(kind)?;
        let key = DocKey::new(kind, id);
        let document_id = key.to_string();

        let target = self.paths.uploads_dir().join(format!("{document_id}.{}", kind.extension()));
        atomic_write(&target, payload).map_err(|cause| IndexError::Staging { document_id: document_id.clone(), cause })?;
        info!(document_id = %document_id, kind = kind.as_str(), title = %title, "indexed document");
        Ok(IndexedDocument { document_id, kind, id, title })
    }

    pub fn status(&self) -> EngineStatus {
        let CacheStats { size, max_size, hits, misses } = self.cache.stats();
        let last_id_per_type = DocKind::ALL
            .iter()
            .map(|k| (k.as_str(), self.ids.as_ref().ok().and_then(|ids| ids.current(*k))))
            .collect();
        EngineStatus {
            last_id_per_type,
            cache_size: size,
            cache_max_size: max_size,
            cache_hits: hits,
            cache_misses: misses,
            semantic_available: self.semantic.is_available(),
            semantic_dimension: self.semantic.dimension(),
            indexing_available: self.ids.is_ok(),
            barrels: self.barrels.partition_count(),
            barrels_available: self.barrels.available_partitions(),
        }
    }

    /// Persist the word cache if enough mutations have accumulated. Meant for a
    /// background task; query threads never write the snapshot themselves.
    pub fn autosave(&self) -> Result<bool> {
        match self.cache.persist_if_due()? {
            Some(written) => {
                debug!(entries = written, "autosaved word cache");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Persist the word cache snapshot. Counters are already durable after each allocation.
    pub fn flush(&self) -> Result<()> {
        let written = self.cache.persist()?;
        debug!(entries = written, "flushed engine state");
        Ok(())
    }
}

/// Occurrences `p` in `a` followed by some `q` in `b` with `0 < q - p <= max_gap`.
/// Both slices are strictly ascending.
pub fn adjacent_count(a: &[u32], b: &[u32], max_gap: u32) -> usize {
    a.iter()
        .filter(|&&p| {
            let i = b.partition_point(|&q| q <= p);
            b.get(i).is_some_and(|&q| q - p <= max_gap)
        })
        .count()
}
