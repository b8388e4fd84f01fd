#![allow(dead_code)]

use bigsearch_core::persist::{save_barrels, save_json, save_word_vectors, DataPaths};
use bigsearch_core::{DocKey, DocKind, EngineConfig, Posting, PostingList, SearchEngine};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;

pub fn html(id: u32, tf: u32, positions: &[u32]) -> Posting {
    Posting { doc: DocKey::new(DocKind::HtmlPage, id), tf, positions: positions.to_vec() }
}

pub fn paper(id: u32, tf: u32, positions: &[u32]) -> Posting {
    Posting { doc: DocKey::new(DocKind::JsonPaper, id), tf, positions: positions.to_vec() }
}

/// A small corpus: two machine-learning pages, a Rust page and one Rust paper.
pub fn build_fixture(dir: &Path) {
    let paths = DataPaths::new(dir);

    let mut lists: BTreeMap<String, PostingList> = BTreeMap::new();
    lists.insert("machine".into(), vec![html(1, 3, &[0, 5]), html(2, 1, &[10])]);
    lists.insert("learning".into(), vec![html(1, 2, &[1, 6])]);
    lists.insert("rust".into(), vec![html(3, 1, &[2]), paper(0, 4, &[0, 3, 9, 12])]);
    lists.insert("language".into(), vec![paper(0, 1, &[1])]);
    save_barrels(&paths, 4, &lists).unwrap();

    save_json(&paths.idf_map(), &json!({ "machine": 1.5, "learning": 2.0, "rust": 1.0, "machinery": 1.0 })).unwrap();
    let mut vectors = BTreeMap::new();
    vectors.insert("machine".to_string(), vec![1.0, 0.0]);
    vectors.insert("machinery".to_string(), vec![1.0, 0.0]);
    vectors.insert("learning".to_string(), vec![0.8, 0.2]);
    vectors.insert("rust".to_string(), vec![0.0, 1.0]);
    save_word_vectors(&paths.word_vectors(), 2, &vectors).unwrap();
    save_json(&paths.embeddings(DocKind::HtmlPage), &json!([[], [1.0, 0.0], [0.0, 1.0], [0.0, 1.0]])).unwrap();
    save_json(&paths.embeddings(DocKind::JsonPaper), &json!([[0.0, 1.0]])).unwrap();

    save_json(&paths.page_rank(), &json!({})).unwrap();
    save_json(&paths.domain_rank(), &json!({})).unwrap();
    save_json(&paths.citation_rank(), &json!({ "the rust paper": 3.0 })).unwrap();
    save_json(
        &paths.html_urls(),
        &json!({ "1": "https://ml.example/intro", "2": "https://other.example/machines", "3": "https://rust-lang.org/" }),
    )
    .unwrap();
    save_json(&paths.paper_info(), &json!({ "0": ["The Rust Paper", "https://arxiv.org/abs/0000.0001"] })).unwrap();

    save_json(&paths.vocabulary(), &json!({ "machine": 50, "machinery": 5, "learning": 40, "rust": 30 })).unwrap();
}

pub fn config(dir: &Path) -> EngineConfig {
    EngineConfig::with_data_dir(dir)
}

pub fn open(dir: &Path) -> SearchEngine {
    SearchEngine::open(config(dir)).unwrap()
}
