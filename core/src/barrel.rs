//! Read side of the partitioned inverted index.
//!
//! Terms are assigned to barrels by `crc32(term)` against the hash ranges in the
//! manifest. Barrel files are read into memory at startup and individual posting
//! lists are decoded on lookup; nothing here mutates after `open`.

use crate::index::{validate_postings, PostingList};
use crate::persist::{load_manifest, load_partition, DataPaths, PartitionEntry, PartitionFiles, Span, PARTITION_FILES};
use anyhow::{bail, Context, Result};
use std::path::Path;
use tracing::{info, warn};

pub fn term_hash(term: &str) -> u32 {
    crc32fast::hash(term.as_bytes())
}

struct Partition {
    entry: PartitionEntry,
    /// `None` when the barrel could not be read; its terms resolve empty.
    files: Option<PartitionFiles>,
}

pub struct BarrelReader {
    partitions: Vec<Partition>, // sorted by range start
    fingerprint: u32,
}

impl BarrelReader {
    /// Load the manifest and every barrel it names. An unreadable manifest is fatal,
    /// an unreadable barrel only disables that barrel.
    pub fn open(paths: &DataPaths) -> Result<Self> {
        let manifest = load_manifest(paths).context("barrel manifest is required")?;
        let mut entries = manifest.partitions;
        entries.sort_by_key(|e| e.start);
        for e in &entries {
            if e.start > e.end {
                bail!("barrel {} has an empty hash range {}..={}", e.id, e.start, e.end);
            }
        }
        for pair in entries.windows(2) {
            if pair[0].end >= pair[1].start {
                bail!("barrels {} and {} have overlapping hash ranges", pair[0].id, pair[1].id);
            }
            if pair[0].end + 1 != pair[1].start {
                warn!(after = pair[0].id, before = pair[1].id, "gap in barrel hash ranges");
            }
        }

        let fingerprint = fingerprint(paths, &entries);
        let mut partitions = Vec::with_capacity(entries.len());
        for entry in entries {
            let dir = paths.partition_dir(&entry);
            let files = match load_partition(&dir) {
                Ok(files) => {
                    info!(partition = entry.id, terms = files.offsets.len(), "loaded barrel");
                    Some(files)
                }
                Err(e) => {
                    warn!(partition = entry.id, path = %dir.display(), error = %format!("{e:#}"), "barrel unavailable");
                    None
                }
            };
            partitions.push(Partition { entry, files });
        }
        Ok(Self { partitions, fingerprint })
    }

    /// Identifies the barrel files this reader was opened on. Rebuilding any barrel
    /// or the manifest changes it.
    pub fn fingerprint(&self) -> u32 {
        self.fingerprint
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    pub fn available_partitions(&self) -> usize {
        self.partitions.iter().filter(|p| p.files.is_some()).count()
    }

    fn partition_for(&self, hash: u32) -> Option<&Partition> {
        let idx = self.partitions.partition_point(|p| p.entry.start <= hash);
        let p = self.partitions.get(idx.checked_sub(1)?)?;
        (hash <= p.entry.end).then_some(p)
    }

    /// Posting list for `term`, empty when the term is unknown or its barrel is damaged.
    pub fn lookup(&self, term: &str) -> PostingList {
        match self.try_lookup(term) {
            Ok(list) => list,
            Err(e) => {
                warn!(term, error = %format!("{e:#}"), "corrupt posting list");
                Vec::new()
            }
        }
    }

    fn try_lookup(&self, term: &str) -> Result<PostingList> {
        let Some(partition) = self.partition_for(term_hash(term)) else {
            return Ok(Vec::new());
        };
        let Some(files) = &partition.files else {
            return Ok(Vec::new());
        };
        let mut list = match files.offsets.get(term) {
            Some(span) => decode(&files.postings, *span)?,
            None => Vec::new(),
        };
        validate_postings(&list).map_err(anyhow::Error::msg)?;
        if let Some(spans) = files.delta_offsets.get(term) {
            for span in spans {
                let delta = decode(&files.delta_postings, *span)?;
                validate_postings(&delta).map_err(anyhow::Error::msg)?;
                merge_delta(&mut list, delta);
            }
        }
        Ok(list)
    }
}

fn fingerprint(paths: &DataPaths, entries: &[PartitionEntry]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    let mut feed = |path: &Path| match std::fs::read(path) {
        Ok(bytes) => {
            hasher.update(&(bytes.len() as u64).to_le_bytes());
            hasher.update(&bytes);
        }
        Err(_) => hasher.update(&u64::MAX.to_le_bytes()),
    };
    feed(&paths.manifest());
    for entry in entries {
        let dir = paths.partition_dir(entry);
        for name in PARTITION_FILES {
            feed(&dir.join(name));
        }
    }
    hasher.finalize()
}

fn decode(blob: &[u8], (offset, len): Span) -> Result<PostingList> {
    let start = usize::try_from(offset)?;
    let end = start.checked_add(len as usize).context("posting span overflows")?;
    let bytes = blob.get(start..end).context("posting span out of bounds")?;
    Ok(bincode::deserialize(bytes)?)
}

/// Fold a delta list into a sorted base list; a later posting for the same document replaces the earlier one.
fn merge_delta(base: &mut PostingList, delta: PostingList) {
    for p in delta {
        match base.binary_search_by(|b| b.doc.cmp(&p.doc)) {
            Ok(i) => base[i] = p,
            Err(i) => base.insert(i, p),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{DocKey, DocKind, Posting};
    use crate::persist::{save_barrels, save_json, save_partition_delta, Manifest, MANIFEST_VERSION};
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn posting(id: u32, positions: &[u32]) -> Posting {
        Posting { doc: DocKey::new(DocKind::HtmlPage, id), tf: positions.len() as u32, positions: positions.to_vec() }
    }

    fn fixture(num_partitions: u32) -> (tempfile::TempDir, DataPaths, Manifest) {
        let dir = tempdir().unwrap();
        let paths = DataPaths::new(dir.path());
        let mut lists = BTreeMap::new();
        lists.insert("alpha".to_string(), vec![posting(1, &[0, 4]), posting(3, &[2])]);
        lists.insert("beta".to_string(), vec![posting(2, &[7])]);
        lists.insert("gamma".to_string(), vec![posting(5, &[1])]);
        let manifest = save_barrels(&paths, num_partitions, &lists).unwrap();
        (dir, paths, manifest)
    }

    #[test]
    fn resolves_terms_across_partitions() {
        let (_dir, paths, _) = fixture(4);
        let reader = BarrelReader::open(&paths).unwrap();
        assert_eq!(reader.partition_count(), 4);
        assert_eq!(reader.lookup("alpha").len(), 2);
        assert_eq!(reader.lookup("beta")[0].doc, DocKey::new(DocKind::HtmlPage, 2));
        assert!(reader.lookup("missing").is_empty());
    }

    #[test]
    fn missing_manifest_is_fatal() {
        let dir = tempdir().unwrap();
        assert!(BarrelReader::open(&DataPaths::new(dir.path())).is_err());
    }

    #[test]
    fn overlapping_ranges_are_fatal() {
        let dir = tempdir().unwrap();
        let paths = DataPaths::new(dir.path());
        let manifest = Manifest {
            version: MANIFEST_VERSION,
            partitions: vec![
                PartitionEntry { id: 0, start: 0, end: 100, path: "a".into() },
                PartitionEntry { id: 1, start: 50, end: u32::MAX, path: "b".into() },
            ],
        };
        save_json(&paths.manifest(), &manifest).unwrap();
        assert!(BarrelReader::open(&paths).is_err());
    }

    #[test]
    fn damaged_barrel_degrades_to_empty() {
        let (_dir, paths, manifest) = fixture(1);
        std::fs::remove_file(paths.partition_dir(&manifest.partitions[0]).join("postings.bin")).unwrap();
        let reader = BarrelReader::open(&paths).unwrap();
        assert_eq!(reader.available_partitions(), 0);
        assert!(reader.lookup("alpha").is_empty());
    }

    #[test]
    fn truncated_postings_degrade_to_empty() {
        let (_dir, paths, manifest) = fixture(1);
        let file = paths.partition_dir(&manifest.partitions[0]).join("postings.bin");
        let bytes = std::fs::read(&file).unwrap();
        std::fs::write(&file, &bytes[..bytes.len() / 2]).unwrap();
        let reader = BarrelReader::open(&paths).unwrap();
        // at least the last term's span now points past the end
        let total: usize = ["alpha", "beta", "gamma"].iter().map(|t| reader.lookup(t).len()).sum();
        assert!(total < 4);
    }

    #[test]
    fn fingerprint_tracks_barrel_contents() {
        let (_dir, paths, manifest) = fixture(2);
        let first = BarrelReader::open(&paths).unwrap().fingerprint();
        assert_eq!(BarrelReader::open(&paths).unwrap().fingerprint(), first);

        let mut delta = BTreeMap::new();
        delta.insert("alpha".to_string(), vec![posting(9, &[0])]);
        save_partition_delta(&paths.partition_dir(&manifest.partitions[1]), &delta).unwrap();
        assert_ne!(BarrelReader::open(&paths).unwrap().fingerprint(), first);
    }

    #[test]
    fn delta_postings_merge_into_base() {
        let (_dir, paths, manifest) = fixture(1);
        let mut delta = BTreeMap::new();
        delta.insert("alpha".to_string(), vec![posting(2, &[9]), posting(3, &[1, 8])]);
        save_partition_delta(&paths.partition_dir(&manifest.partitions[0]), &delta).unwrap();
        let reader = BarrelReader::open(&paths).unwrap();
        let list = reader.lookup("alpha");
        let ids: Vec<u32> = list.iter().map(|p| p.doc.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(list[2].positions, vec![1, 8]);
    }
}
