use crate::error::CounterError;
use crate::index::{DocId, DocKind};
use crate::persist::atomic_write;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

const STATE_VERSION: u32 = 1;

/// Next id to hand out, per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub html_page: DocId,
    pub json_paper: DocId,
    pub pdf_paper: DocId,
}

impl Counters {
    pub fn get(&self, kind: DocKind) -> DocId {
        match kind {
            DocKind::HtmlPage => self.html_page,
            DocKind::JsonPaper => self.json_paper,
            DocKind::PdfPaper => self.pdf_paper,
        }
    }

    fn slot(&mut self, kind: DocKind) -> &mut DocId {
        match kind {
            DocKind::HtmlPage => &mut self.html_page,
            DocKind::JsonPaper => &mut self.json_paper,
            DocKind::PdfPaper => &mut self.pdf_paper,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct CounterState {
    version: u32,
    next_id: Counters,
}

/// Persisted, monotonically increasing id counters. Every allocation is written to
/// disk before the id is returned, under the same lock, so no id is issued twice.
pub struct IdAllocator {
    path: PathBuf,
    state: Mutex<Counters>,
}

impl IdAllocator {
    /// Restore counters from `path`. `floor` holds, per kind, the lowest id that is
    /// still free in the offline corpus; a missing file starts there, a persisted
    /// counter below it is rejected.
    pub fn open(path: &Path, floor: Counters) -> Result<Self, CounterError> {
        let counters = if path.exists() {
            let corrupt = |reason: String| CounterError::Corrupt { path: path.to_path_buf(), reason };
            let bytes = std::fs::read(path).map_err(|e| corrupt(e.to_string()))?;
            let state: CounterState = serde_json::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))?;
            if state.version != STATE_VERSION {
                return Err(corrupt(format!("unknown version {}", state.version)));
            }
            for kind in DocKind::ALL {
                let (persisted, floor) = (state.next_id.get(kind), floor.get(kind));
                if persisted < floor {
                    return Err(CounterError::Inconsistent { kind, persisted, floor });
                }
            }
            state.next_id
        } else {
            write_state(path, &floor)?;
            floor
        };
        info!(html = counters.html_page, json = counters.json_paper, pdf = counters.pdf_paper, "loaded id counters");
        Ok(Self { path: path.to_path_buf(), state: Mutex::new(counters) })
    }

    /// Issue the next id for `kind`. The counter only advances in memory once the
    /// new state is on disk.
    pub fn allocate(&self, kind: DocKind) -> Result<DocId, CounterError> {
        let mut counters = self.state.lock();
        let id = counters.get(kind);
        let mut next = *counters;
        *next.slot(kind) = id.checked_add(1).ok_or(CounterError::Exhausted(kind))?;
        write_state(&self.path, &next)?;
        *counters = next;
        Ok(id)
    }

    /// Last id issued for `kind`, if any.
    pub fn current(&self, kind: DocKind) -> Option<DocId> {
        self.state.lock().get(kind).checked_sub(1)
    }
}

fn write_state(path: &Path, counters: &Counters) -> Result<(), CounterError> {
    let state = CounterState { version: STATE_VERSION, next_id: *counters };
    let bytes = serde_json::to_vec_pretty(&state).map_err(|e| CounterError::Persist(e.into()))?;
    atomic_write(path, &bytes).map_err(CounterError::Persist)
}
