use crate::barrel::term_hash;
use crate::index::PostingList;
use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{create_dir_all, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

pub const MANIFEST_VERSION: u32 = 1;

/// Files that may make up one barrel directory; the delta pair is optional.
pub const PARTITION_FILES: [&str; 4] = ["offsets.json", "postings.bin", "delta_offsets.json", "delta_postings.bin"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub partitions: Vec<PartitionEntry>,
}

/// One barrel: every term whose hash falls in `start..=end` lives in `path`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionEntry {
    pub id: u32,
    pub start: u32,
    pub end: u32,
    pub path: String,
}

/// (byte offset, byte length) of one encoded posting list.
pub type Span = (u64, u32);

/// Raw contents of one barrel directory, before any posting list is decoded.
pub struct PartitionFiles {
    pub offsets: HashMap<String, Span>,
    pub postings: Vec<u8>,
    pub delta_offsets: HashMap<String, Vec<Span>>,
    pub delta_postings: Vec<u8>,
}

/// Layout of everything the engine reads and writes under its data directory.
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub root: PathBuf,
}

impl DataPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn barrels_dir(&self) -> PathBuf { self.root.join("barrels") }
    pub fn manifest(&self) -> PathBuf { self.barrels_dir().join("manifest.json") }
    pub fn partition_dir(&self, entry: &PartitionEntry) -> PathBuf { self.barrels_dir().join(&entry.path) }
    pub fn page_rank(&self) -> PathBuf { self.root.join("rankings/page_rank_dict.json") }
    pub fn domain_rank(&self) -> PathBuf { self.root.join("rankings/domain_rank_dict.json") }
    pub fn citation_rank(&self) -> PathBuf { self.root.join("rankings/citation_ranks.json") }
    pub fn html_urls(&self) -> PathBuf { self.root.join("mappings/ind_to_url.json") }
    pub fn paper_info(&self) -> PathBuf { self.root.join("mappings/rps_info.json") }
    pub fn pdf_info(&self) -> PathBuf { self.root.join("mappings/pdf_info.json") }
    pub fn idf_map(&self) -> PathBuf { self.root.join("semantic/idf_map.json") }
    pub fn embeddings(&self, kind: crate::DocKind) -> PathBuf {
        let name = match kind {
            crate::DocKind::HtmlPage => "html_embeddings.json",
            crate::DocKind::JsonPaper => "json_embeddings.json",
            crate::DocKind::PdfPaper => "pdf_embeddings.json",
        };
        self.root.join("semantic").join(name)
    }
    pub fn word_vectors(&self) -> PathBuf { self.root.join("models/word_vectors.txt") }
    pub fn vocabulary(&self) -> PathBuf { self.root.join("autocomplete/vocabulary.json") }
    pub fn word_cache(&self) -> PathBuf { self.root.join("word_cache.bin") }
    pub fn engine_state(&self) -> PathBuf { self.root.join("engine_state.json") }
    pub fn uploads_dir(&self) -> PathBuf { self.root.join("uploads") }
}

/// Write `bytes` to `path` so readers only ever see the old or the new contents:
/// temp file in the same directory, fsync, rename over the target.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    create_dir_all(parent).with_context(|| format!("failed to create directory {}", parent.display()))?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .unwrap_or("state");
    let temp_path = parent.join(format!(".{file_name}.tmp"));

    let mut f = File::create(&temp_path).with_context(|| format!("failed to create {}", temp_path.display()))?;
    f.write_all(bytes).with_context(|| format!("failed to write {}", temp_path.display()))?;
    f.sync_all().with_context(|| format!("failed to fsync {}", temp_path.display()))?;
    std::fs::rename(&temp_path, path)
        .with_context(|| format!("failed to rename {} to {}", temp_path.display(), path.display()))?;
    Ok(())
}

pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let f = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let value = serde_json::from_reader(BufReader::new(f)).with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(value)
}

/// Like `load_json`, but a missing file is `Ok(None)`. A present but unreadable file is still an error.
pub fn load_json_optional<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    load_json(path).map(Some)
}

pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    atomic_write(path, &json)
}

pub fn load_manifest(paths: &DataPaths) -> Result<Manifest> {
    let manifest: Manifest = load_json(&paths.manifest())?;
    if manifest.version != MANIFEST_VERSION {
        bail!("unsupported barrel manifest version {}", manifest.version);
    }
    Ok(manifest)
}

pub fn load_partition(dir: &Path) -> Result<PartitionFiles> {
    let offsets = load_json(&dir.join("offsets.json"))?;
    let postings_path = dir.join("postings.bin");
    let postings = std::fs::read(&postings_path).with_context(|| format!("failed to read {}", postings_path.display()))?;
    let (delta_offsets, delta_postings) = match load_json_optional(&dir.join("delta_offsets.json"))? {
        Some(offsets) => {
            let delta_path = dir.join("delta_postings.bin");
            let bytes = std::fs::read(&delta_path).with_context(|| format!("failed to read {}", delta_path.display()))?;
            (offsets, bytes)
        }
        None => (HashMap::new(), Vec::new()),
    };
    Ok(PartitionFiles { offsets, postings, delta_offsets, delta_postings })
}

/// Write one barrel directory (`postings.bin` + `offsets.json`).
pub fn save_partition(dir: &Path, lists: &BTreeMap<String, PostingList>) -> Result<()> {
    let mut blob = Vec::new();
    let mut offsets: BTreeMap<&str, Span> = BTreeMap::new();
    for (term, list) in lists {
        let bytes = bincode::serialize(list)?;
        offsets.insert(term, (blob.len() as u64, bytes.len() as u32));
        blob.extend_from_slice(&bytes);
    }
    atomic_write(&dir.join("postings.bin"), &blob)?;
    save_json(&dir.join("offsets.json"), &offsets)
}

/// Write a delta segment next to a barrel. Each term gets a single delta span.
pub fn save_partition_delta(dir: &Path, lists: &BTreeMap<String, PostingList>) -> Result<()> {
    let mut blob = Vec::new();
    let mut offsets: BTreeMap<&str, Vec<Span>> = BTreeMap::new();
    for (term, list) in lists {
        let bytes = bincode::serialize(list)?;
        offsets.entry(term).or_default().push((blob.len() as u64, bytes.len() as u32));
        blob.extend_from_slice(&bytes);
    }
    atomic_write(&dir.join("delta_postings.bin"), &blob)?;
    save_json(&dir.join("delta_offsets.json"), &offsets)
}

/// Split the hash space into `num_partitions` equal ranges and write manifest plus barrels.
pub fn save_barrels(paths: &DataPaths, num_partitions: u32, lists: &BTreeMap<String, PostingList>) -> Result<Manifest> {
    if num_partitions == 0 {
        bail!("at least one partition is required");
    }
    let width = (u32::MAX / num_partitions).max(1);
    let partitions: Vec<PartitionEntry> = (0..num_partitions)
        .map(|i| PartitionEntry {
            id: i,
            start: i * width,
            end: if i + 1 == num_partitions { u32::MAX } else { (i + 1) * width - 1 },
            path: format!("barrel_{i}"),
        })
        .collect();
    let mut grouped: Vec<BTreeMap<String, PostingList>> = vec![BTreeMap::new(); partitions.len()];
    for (term, list) in lists {
        let hash = term_hash(term);
        let slot = partitions.iter().position(|p| p.start <= hash && hash <= p.end).unwrap_or(partitions.len() - 1);
        grouped[slot].insert(term.clone(), list.clone());
    }
    for (entry, group) in partitions.iter().zip(grouped.iter()) {
        save_partition(&paths.barrels_dir().join(&entry.path), group)?;
    }
    let manifest = Manifest { version: MANIFEST_VERSION, partitions };
    save_json(&paths.manifest(), &manifest)?;
    Ok(manifest)
}

/// Parse a word2vec text model: a `count dim` header, then `word v1 .. vdim` per line.
pub fn load_word_vectors(path: &Path) -> Result<(usize, HashMap<String, Vec<f32>>)> {
    let f = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut lines = BufReader::new(f).lines();
    let header = match lines.next() {
        Some(line) => line?,
        None => bail!("empty word vector model {}", path.display()),
    };
    let mut parts = header.split_whitespace();
    let count: usize = parts.next().context("missing vector count")?.parse().context("bad vector count")?;
    let dim: usize = parts.next().context("missing vector dimension")?.parse().context("bad vector dimension")?;

    let mut vectors = HashMap::with_capacity(count);
    for (lineno, line) in lines.enumerate() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        let mut fields = line.split_whitespace();
        let word = fields.next().context("missing word")?.to_string();
        let values = fields
            .map(|v| v.parse::<f32>())
            .collect::<Result<Vec<f32>, _>>()
            .with_context(|| format!("bad vector for {word:?} on line {}", lineno + 2))?;
        if values.len() != dim {
            bail!("vector for {word:?} has {} components, expected {dim}", values.len());
        }
        vectors.insert(word, values);
    }
    Ok((dim, vectors))
}

pub fn save_word_vectors(path: &Path, dim: usize, vectors: &BTreeMap<String, Vec<f32>>) -> Result<()> {
    let mut out = format!("{} {}\n", vectors.len(), dim);
    for (word, values) in vectors {
        out.push_str(word);
        for v in values {
            out.push(' ');
            out.push_str(&v.to_string());
        }
        out.push('\n');
    }
    atomic_write(path, out.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn atomic_write_replaces_and_leaves_no_temp() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/state.json");
        atomic_write(&path, b"one").unwrap();
        atomic_write(&path, b"two").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"two");
        assert!(!dir.path().join("nested/.state.json.tmp").exists());
    }

    #[test]
    fn optional_json_missing_is_none() {
        let dir = tempdir().unwrap();
        let v: Option<HashMap<String, f32>> = load_json_optional(&dir.path().join("nope.json")).unwrap();
        assert!(v.is_none());
    }

    #[test]
    fn word_vectors_roundtrip_and_dimension_check() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wv.txt");
        let mut vectors = BTreeMap::new();
        vectors.insert("rust".to_string(), vec![1.0, 0.5]);
        save_word_vectors(&path, 2, &vectors).unwrap();
        let (dim, loaded) = load_word_vectors(&path).unwrap();
        assert_eq!(dim, 2);
        assert_eq!(loaded["rust"], vec![1.0, 0.5]);

        std::fs::write(&path, "1 3\nrust 1 2\n").unwrap();
        assert!(load_word_vectors(&path).is_err());
    }

    #[test]
    fn partition_ranges_cover_hash_space() {
        let dir = tempdir().unwrap();
        let paths = DataPaths::new(dir.path());
        let manifest = save_barrels(&paths, 3, &BTreeMap::new()).unwrap();
        assert_eq!(manifest.partitions[0].start, 0);
        assert_eq!(manifest.partitions[2].end, u32::MAX);
        for pair in manifest.partitions.windows(2) {
            assert_eq!(pair[0].end + 1, pair[1].start);
        }
    }
}
