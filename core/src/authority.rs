use crate::index::{DocId, DocKey, DocKind, DocMeta};
use crate::persist::{load_json, load_json_optional, DataPaths};
use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use tracing::info;

lazy_static! {
    static ref BRACKETED: Regex = Regex::new(r"\(.*?\)|\[.*?\]|\{.*?\}|<.*?>").expect("valid regex");
    static ref NON_LETTER: Regex = Regex::new(r"[^a-z\s]").expect("valid regex");
    static ref SPACES: Regex = Regex::new(r"\s+").expect("valid regex");
}

/// Static, offline-computed importance of one document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AuthorityScores {
    pub link_rank: f32,
    pub domain_rank: f32,
    pub citation_rank: f32,
}

/// Immutable document metadata and authority scores, resolved once at startup.
pub struct AuthorityStore {
    scores: HashMap<DocKey, AuthorityScores>,
    docs: HashMap<DocKey, DocMeta>,
}

/// Key used by the citation table.
pub fn normalize_title(title: &str) -> String {
    let lower = title.to_lowercase();
    let stripped = BRACKETED.replace_all(&lower, " ");
    let letters = NON_LETTER.replace_all(&stripped, " ");
    SPACES.replace_all(&letters, " ").trim().to_string()
}

fn host_of(url: &str) -> Option<String> {
    url::Url::parse(url).ok()?.host_str().map(str::to_string)
}

fn parse_ids<V>(table: HashMap<String, V>, what: &str) -> Result<Vec<(DocId, V)>> {
    table
        .into_iter()
        .map(|(k, v)| {
            let id = k.trim().parse::<DocId>().with_context(|| format!("bad document id {k:?} in {what}"))?;
            Ok((id, v))
        })
        .collect()
}

impl AuthorityStore {
    pub fn open(paths: &DataPaths) -> Result<Self> {
        let page_rank: HashMap<String, f32> = load_json(&paths.page_rank())?;
        let domain_rank: HashMap<String, f32> = load_json(&paths.domain_rank())?;
        let citations: HashMap<String, f32> = load_json(&paths.citation_rank())?;
        let html_urls: HashMap<String, String> = load_json(&paths.html_urls())?;
        let paper_info: HashMap<String, (String, String)> = load_json(&paths.paper_info())?;
        let pdf_info: HashMap<String, (String, String)> = load_json_optional(&paths.pdf_info())?.unwrap_or_default();

        let mut docs = HashMap::new();
        for (id, url) in parse_ids(html_urls, "ind_to_url.json")? {
            docs.insert(DocKey::new(DocKind::HtmlPage, id), DocMeta { title: String::new(), url });
        }
        for (id, (title, url)) in parse_ids(paper_info, "rps_info.json")? {
            docs.insert(DocKey::new(DocKind::JsonPaper, id), DocMeta { title, url });
        }
        for (id, (title, url)) in parse_ids(pdf_info, "pdf_info.json")? {
            docs.insert(DocKey::new(DocKind::PdfPaper, id), DocMeta { title, url });
        }

        let mut scores = HashMap::with_capacity(docs.len());
        for (key, meta) in &docs {
            let domain = host_of(&meta.url);
            let title = normalize_title(&meta.title);
            let s = AuthorityScores {
                link_rank: page_rank.get(&meta.url).copied().unwrap_or(0.0),
                domain_rank: domain.and_then(|d| domain_rank.get(&d).copied()).unwrap_or(0.0),
                citation_rank: if title.is_empty() { 0.0 } else { citations.get(&title).copied().unwrap_or(0.0) },
            };
            if s != AuthorityScores::default() {
                scores.insert(*key, s);
            }
        }
        info!(documents = docs.len(), scored = scores.len(), "loaded authority ranks");
        Ok(Self { scores, docs })
    }

    /// Zero for documents the offline ranking never saw.
    pub fn scores(&self, key: DocKey) -> AuthorityScores {
        self.scores.get(&key).copied().unwrap_or_default()
    }

    pub fn meta(&self, key: DocKey) -> Option<&DocMeta> {
        self.docs.get(&key)
    }

    /// Highest known id per kind, used to seed the id counters.
    pub fn max_id(&self, kind: DocKind) -> Option<DocId> {
        self.docs.keys().filter(|k| k.kind == kind).map(|k| k.id).max()
    }
}
