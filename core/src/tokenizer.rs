use lazy_static::lazy_static;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref RE: Regex = Regex::new(r"(?u)[\p{L}\p{N}]+").expect("valid regex");
    static ref APOSTROPHE: Regex = Regex::new(r"['\u{2019}]").expect("valid regex");
}

/// Normalize a query into ordered terms: NFKC, lowercase, punctuation stripped.
///
/// Apostrophes are dropped so `don't` matches the barrel term `dont`; every other
/// non-alphanumeric run separates terms. Whitespace-only input yields no terms.
pub fn normalize_query(text: &str) -> Vec<String> {
    let normalized = text.nfkc().collect::<String>().to_lowercase();
    let joined = APOSTROPHE.replace_all(&normalized, "");
    RE.find_iter(&joined).map(|m| m.as_str().to_string()).collect()
}
