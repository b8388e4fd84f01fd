use serde::{Deserialize, Serialize};
use std::fmt;

pub type DocId = u32;

/// The kinds of document the engine knows how to score and index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocKind {
    HtmlPage,
    JsonPaper,
    PdfPaper,
}

/// Embedding vectors are only comparable inside one scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmbeddingScope {
    Web,
    Paper,
}

impl DocKind {
    pub const ALL: [DocKind; 3] = [DocKind::HtmlPage, DocKind::JsonPaper, DocKind::PdfPaper];

    pub fn prefix(self) -> char {
        match self {
            DocKind::HtmlPage => 'H',
            DocKind::JsonPaper => 'J',
            DocKind::PdfPaper => 'P',
        }
    }

    pub fn from_prefix(c: char) -> Option<Self> {
        match c {
            'H' => Some(DocKind::HtmlPage),
            'J' => Some(DocKind::JsonPaper),
            'P' => Some(DocKind::PdfPaper),
            _ => None,
        }
    }

    pub fn scope(self) -> EmbeddingScope {
        match self {
            DocKind::HtmlPage => EmbeddingScope::Web,
            DocKind::JsonPaper | DocKind::PdfPaper => EmbeddingScope::Paper,
        }
    }

    /// File extension used when staging an accepted payload for the offline builders.
    pub fn extension(self) -> &'static str {
        match self {
            DocKind::HtmlPage => "html",
            DocKind::JsonPaper => "json",
            DocKind::PdfPaper => "txt",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DocKind::HtmlPage => "html_page",
            DocKind::JsonPaper => "json_paper",
            DocKind::PdfPaper => "pdf_paper",
        }
    }

    /// Accepts both the snake_case name and the short route names (`html`, `json`, `pdf`).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "html" | "html_page" => Some(DocKind::HtmlPage),
            "json" | "json_paper" => Some(DocKind::JsonPaper),
            "pdf" | "pdf_paper" => Some(DocKind::PdfPaper),
            _ => None,
        }
    }
}

/// Identity of a document: ids are only unique within a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocKey {
    pub kind: DocKind,
    pub id: DocId,
}

impl DocKey {
    pub fn new(kind: DocKind, id: DocId) -> Self {
        Self { kind, id }
    }

    /// Parses the external form produced by `Display`, e.g. `H12`.
    pub fn parse(s: &str) -> Option<Self> {
        let mut chars = s.chars();
        let kind = DocKind::from_prefix(chars.next()?)?;
        let id = chars.as_str().parse().ok()?;
        Some(Self { kind, id })
    }
}

impl fmt::Display for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.prefix(), self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub doc: DocKey,
    pub tf: u32,
    pub positions: Vec<u32>, // strictly ascending token offsets
}

pub type PostingList = Vec<Posting>;

/// Checks the on-disk invariants of a decoded posting list.
pub fn validate_postings(list: &[Posting]) -> Result<(), String> {
    for pair in list.windows(2) {
        if pair[0].doc >= pair[1].doc {
            return Err(format!("postings not sorted by document at {}", pair[1].doc));
        }
    }
    for p in list {
        if p.positions.windows(2).any(|w| w[0] >= w[1]) {
            return Err(format!("positions not strictly ascending for {}", p.doc));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocMeta {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultItem {
    pub document_id: String,
    pub kind: DocKind,
    pub title: String,
    pub url: String,
    pub final_score: f32,
    pub keyword_score: f32,
    pub semantic_score: f32,
    pub phrase_bonus: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_key_display_and_parse() {
        let key = DocKey::new(DocKind::JsonPaper, 42);
        assert_eq!(key.to_string(), "J42");
        assert_eq!(DocKey::parse("J42"), Some(key));
        assert_eq!(DocKey::parse("X1"), None);
        assert_eq!(DocKey::parse("H"), None);
    }

    #[test]
    fn rejects_unsorted_positions() {
        let list = vec![Posting { doc: DocKey::new(DocKind::HtmlPage, 1), tf: 2, positions: vec![4, 4] }];
        assert!(validate_postings(&list).is_err());
    }

    #[test]
    fn rejects_unsorted_documents() {
        let list = vec![
            Posting { doc: DocKey::new(DocKind::HtmlPage, 3), tf: 1, positions: vec![0] },
            Posting { doc: DocKey::new(DocKind::HtmlPage, 1), tf: 1, positions: vec![0] },
        ];
        assert!(validate_postings(&list).is_err());
    }
}
