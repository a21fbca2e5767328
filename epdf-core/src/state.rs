use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::document::{AdjustMode, Document};
use crate::fingerprint::Fingerprint;

/// Viewing state remembered per document between sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewState {
    pub current_page: u32,
    pub zoom: f64,
    pub rotation: u32,
    pub adjust_mode: AdjustMode,
    pub page_offset: i32,
    pub position_x: f64,
    pub position_y: f64,
    pub pages_per_row: u32,
    pub first_page_column: u32,
    pub page_padding: u32,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            current_page: 0,
            zoom: 1.0,
            rotation: 0,
            adjust_mode: AdjustMode::None,
            page_offset: 0,
            position_x: 0.0,
            position_y: 0.0,
            pages_per_row: 1,
            first_page_column: 1,
            page_padding: 1,
        }
    }
}

impl Document {
    pub fn view_state(&self) -> ViewState {
        ViewState {
            current_page: self.current_page_number(),
            zoom: self.zoom(),
            rotation: self.rotation(),
            adjust_mode: self.adjust_mode(),
            page_offset: self.page_offset(),
            position_x: self.position_x(),
            position_y: self.position_y(),
            pages_per_row: self.pages_per_row(),
            first_page_column: self.first_page_column(),
            page_padding: self.page_padding(),
        }
    }

    /// Re-applies a stored state. The current page is clamped to the last page, so
    /// state saved for a longer revision of the file stays usable.
    pub fn restore_view_state(&mut self, state: &ViewState) {
        let last_page = self.number_of_pages().saturating_sub(1);
        self.set_current_page_number(state.current_page.min(last_page));
        self.set_zoom(state.zoom);
        self.set_rotation(i32::try_from(state.rotation).unwrap_or(0));
        self.set_adjust_mode(state.adjust_mode);
        self.set_page_offset(state.page_offset);
        self.set_position_x(state.position_x);
        self.set_position_y(state.position_y);
        self.set_page_layout(
            state.page_padding,
            state.pages_per_row,
            state.first_page_column,
        );
    }
}

pub trait StateStore: Send + Sync {
    fn load(&self, fingerprint: &Fingerprint) -> Result<Option<ViewState>>;
    fn save(&self, fingerprint: &Fingerprint, state: &ViewState) -> Result<()>;
}

/// One JSON file per document under `root`, named `<fingerprint hex>.json`. Writes
/// go to a temporary file in the same directory that is then persisted over the
/// previous state, so a crash never leaves a half-written state file behind.
pub struct FileStateStore {
    root: PathBuf,
}

impl FileStateStore {
    pub fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create state directory at {:?}", root))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.root.join(fingerprint.to_hex()).with_extension("json")
    }
}

impl StateStore for FileStateStore {
    fn load(&self, fingerprint: &Fingerprint) -> Result<Option<ViewState>> {
        let path = self.state_path(fingerprint);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read state file {:?}", path))
            }
        };
        let state = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to decode state file {:?}", path))?;
        debug!(%fingerprint, "restored view state");
        Ok(Some(state))
    }

    fn save(&self, fingerprint: &Fingerprint, state: &ViewState) -> Result<()> {
        let path = self.state_path(fingerprint);
        let mut staged = NamedTempFile::new_in(&self.root)
            .with_context(|| format!("failed to stage state in {:?}", self.root))?;
        serde_json::to_writer_pretty(staged.as_file_mut(), state)?;
        staged.as_file().sync_all()?;
        staged
            .persist(&path)
            .with_context(|| format!("failed to replace state file {:?}", path))?;
        debug!(%fingerprint, "stored view state");
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStateStore {
    inner: Mutex<HashMap<Fingerprint, ViewState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self, fingerprint: &Fingerprint) -> Result<Option<ViewState>> {
        Ok(self.inner.lock().get(fingerprint).cloned())
    }

    fn save(&self, fingerprint: &Fingerprint, state: &ViewState) -> Result<()> {
        self.inner.lock().insert(*fingerprint, state.clone());
        Ok(())
    }
}
