use crate::index::DocKind;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref HTML_TITLE: Regex = Regex::new(r"(?is)<title[^>]*>(.*?)</title\s*>").expect("valid regex");
    static ref SPACES: Regex = Regex::new(r"\s+").expect("valid regex");
}

const MAX_TITLE_CHARS: usize = 200;

fn clean(s: &str) -> String {
    let collapsed = SPACES.replace_all(s.trim(), " ");
    collapsed.chars().take(MAX_TITLE_CHARS).collect()
}

/// Validate a submitted payload and pull out its title.
///
/// HTML pages use `<title>`, JSON papers `metadata.title`, and PDF papers arrive as
/// already-extracted text whose first non-empty line is the title. A missing title
/// is not an error; an empty or unparsable payload is.
pub fn extract_title(kind: DocKind, payload: &[u8]) -> Result<String, String> {
    if payload.iter().all(u8::is_ascii_whitespace) {
        return Err("empty document".to_string());
    }
    let text = std::str::from_utf8(payload).map_err(|e| format!("not valid UTF-8: {e}"))?;
    match kind {
        DocKind::HtmlPage => Ok(HTML_TITLE.captures(text).map(|c| clean(&c[1])).unwrap_or_default()),
        DocKind::JsonPaper => {
            let doc: serde_json::Value = serde_json::from_str(text).map_err(|e| format!("invalid JSON: {e}"))?;
            if !doc.is_object() {
                return Err("expected a JSON object".to_string());
            }
            Ok(doc
                .pointer("/metadata/title")
                .and_then(serde_json::Value::as_str)
                .map(clean)
                .unwrap_or_default())
        }
        DocKind::PdfPaper => Ok(text.lines().map(str::trim).find(|l| !l.is_empty()).map(clean).unwrap_or_default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_title() {
        let html = b"<html><head><TITLE lang=\"en\">\n  Rust   Book </TITLE></head></html>";
        assert_eq!(extract_title(DocKind::HtmlPage, html).unwrap(), "Rust Book");
        assert_eq!(extract_title(DocKind::HtmlPage, b"<p>no title</p>").unwrap(), "");
    }

    #[test]
    fn json_title() {
        let json = br#"{ "metadata": { "title": "Attention Is All You Need" }, "body_text": [] }"#;
        assert_eq!(extract_title(DocKind::JsonPaper, json).unwrap(), "Attention Is All You Need");
        assert_eq!(extract_title(DocKind::JsonPaper, br#"{ "abstract": [] }"#).unwrap(), "");
        assert!(extract_title(DocKind::JsonPaper, b"{ broken").is_err());
        assert!(extract_title(DocKind::JsonPaper, b"[1, 2]").is_err());
    }

    #[test]
    fn pdf_title_is_first_line() {
        let text = b"\n\n  A Study of Things  \nBody text here";
        assert_eq!(extract_title(DocKind::PdfPaper, text).unwrap(), "A Study of Things");
    }

    #[test]
    fn empty_and_binary_payloads_rejected() {
        assert!(extract_title(DocKind::PdfPaper, b"  \n ").is_err());
        assert!(extract_title(DocKind::HtmlPage, &[0xff, 0xfe, 0x00]).is_err());
    }
}
