//! Notebook model: an ordered, owned cell sequence plus document metadata.
//!
//! # Responsibility
//! - Own cells, dispose them when they leave the document.
//! - Create cells, optionally cloning fields from an existing cell.
//! - Track unsaved changes and expose the document-model capability.
//!
//! # Invariants
//! - A removed or replaced cell is disposed exactly once; the incoming cell
//!   of a replacement is never disposed.
//! - `kernelspec`, `language_info` and `orig_nbformat` are typed fields and
//!   never reachable as metadata namespaces.
//! - Any content edit of the notebook or of an owned cell marks it dirty.
//!
//! # See also
//! - src/cell.rs (owned cells)
//! - src/snapshot.rs (document-model JSON)

use crate::cell::{CellModel, CellType};
use crate::config::NotebookConfig;
use crate::error::{ModelError, ModelResult};
use crate::metadata::{ensure_namespace_allowed, MetadataCursor, MetadataStore};
use crate::outputs::{OutputAreaModel, OutputsChanged};
use crate::property::{clear_property_data, ChangedArgs, Property};
use crate::signal::{
    clear_signal_data, disconnect_receiver, handler, new_object_id, Identified, ObjectId, Signal,
};
use crate::snapshot::{CellSnapshot, NotebookSnapshot};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cell::Cell;
use std::rc::Rc;

const NOTEBOOK_RESERVED: &[&str] = &["kernelspec", "language_info", "orig_nbformat"];

/// Kernel the notebook was last run with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelSpec {
    pub name: String,
    pub display_name: String,
}

/// Language description published by the kernel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codemirror_mode: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_extension: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Kernel-specific keys kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LanguageInfo {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            codemirror_mode: None,
            file_extension: None,
            mimetype: None,
            version: None,
            extra: Map::new(),
        }
    }
}

/// Structural change of the cell sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellsChanged {
    Added {
        index: usize,
        id: ObjectId,
    },
    Removed {
        index: usize,
        id: ObjectId,
    },
    Replaced {
        index: usize,
        old_id: ObjectId,
        new_id: ObjectId,
    },
    Moved {
        from: usize,
        to: usize,
        id: ObjectId,
    },
    Cleared {
        ids: Vec<ObjectId>,
    },
}

/// Persistence-facing surface of an editable document.
pub trait DocumentModel {
    /// Whether the document changed since it was last marked clean.
    fn dirty(&self) -> bool;
    fn set_dirty(&self, dirty: bool) -> bool;
    /// Advisory flag for views; the model does not enforce it.
    fn read_only(&self) -> bool;
    fn set_read_only(&self, read_only: bool) -> bool;
    fn to_json(&self) -> ModelResult<Value>;
    /// Replaces the document content. Leaves the document clean.
    fn from_json(&mut self, value: &Value) -> ModelResult<()>;
}

const KERNELSPEC: Property<NotebookModel, Option<KernelSpec>> =
    Property::new("kernelspec", Option::default).notify(NotebookModel::STATE_CHANGED);
const LANGUAGE_INFO: Property<NotebookModel, Option<LanguageInfo>> =
    Property::new("language_info", Option::default).notify(NotebookModel::STATE_CHANGED);
const ORIG_NBFORMAT: Property<NotebookModel, Option<u32>> =
    Property::new("orig_nbformat", Option::default).notify(NotebookModel::STATE_CHANGED);
const READ_ONLY: Property<NotebookModel, bool> =
    Property::new("read_only", bool::default).notify(NotebookModel::STATE_CHANGED);

/// Notebook document model.
#[derive(Debug)]
pub struct NotebookModel {
    id: ObjectId,
    cells: Vec<CellModel>,
    metadata: MetadataStore,
    config: NotebookConfig,
    nbformat: Cell<u32>,
    nbformat_minor: Cell<u32>,
    dirty: Rc<Cell<bool>>,
    disposed: Cell<bool>,
}

impl Identified for NotebookModel {
    fn object_id(&self) -> ObjectId {
        self.id
    }
}

impl Default for NotebookModel {
    fn default() -> Self {
        Self::new()
    }
}

impl NotebookModel {
    pub const STATE_CHANGED: Signal<NotebookModel, ChangedArgs> = Signal::new("state_changed");
    pub const CONTENT_CHANGED: Signal<NotebookModel, ()> = Signal::new("content_changed");
    pub const METADATA_CHANGED: Signal<NotebookModel, String> = Signal::new("metadata_changed");
    pub const CELLS_CHANGED: Signal<NotebookModel, CellsChanged> = Signal::new("cells_changed");
    pub const DISPOSED: Signal<NotebookModel, ()> = Signal::new("disposed");

    pub fn new() -> Self {
        Self::with_config(NotebookConfig::default())
    }

    pub fn with_config(config: NotebookConfig) -> Self {
        let notebook = Self {
            id: new_object_id(),
            cells: Vec::new(),
            metadata: MetadataStore::new(),
            nbformat: Cell::new(config.nbformat),
            nbformat_minor: Cell::new(config.nbformat_minor),
            config,
            dirty: Rc::new(Cell::new(false)),
            disposed: Cell::new(false),
        };
        debug!("event=notebook_create module=notebook status=ok id={}", notebook.id);
        notebook
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn config(&self) -> &NotebookConfig {
        &self.config
    }

    pub fn cells(&self) -> &[CellModel] {
        &self.cells
    }

    pub fn cell(&self, index: usize) -> Option<&CellModel> {
        self.cells.get(index)
    }

    /// Position of the cell with `id`.
    pub fn cell_index(&self, id: ObjectId) -> Option<usize> {
        self.cells.iter().position(|cell| cell.id() == id)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn nbformat(&self) -> u32 {
        self.nbformat.get()
    }

    pub fn nbformat_minor(&self) -> u32 {
        self.nbformat_minor.get()
    }

    pub fn push_cell(&mut self, cell: CellModel) -> ModelResult<usize> {
        let index = self.cells.len();
        self.insert_cell(index, cell)?;
        Ok(index)
    }

    /// Inserts `cell` before `index`; `index == len` appends.
    pub fn insert_cell(&mut self, index: usize, cell: CellModel) -> ModelResult<()> {
        self.ensure_live()?;
        if index > self.cells.len() {
            return Err(ModelError::IndexOutOfRange {
                index,
                len: self.cells.len(),
            });
        }
        if cell.is_disposed() {
            return Err(ModelError::Disposed);
        }
        self.adopt(&cell);
        let id = cell.id();
        self.cells.insert(index, cell);
        self.cells_changed(CellsChanged::Added { index, id });
        Ok(())
    }

    /// Removes and disposes the cell at `index`, returning its id.
    pub fn remove_cell(&mut self, index: usize) -> ModelResult<ObjectId> {
        self.ensure_live()?;
        self.ensure_index(index)?;
        let removed = self.cells.remove(index);
        let id = removed.id();
        self.cells_changed(CellsChanged::Removed { index, id });
        removed.dispose();
        Ok(id)
    }

    /// Replaces the cell at `index`. Only the outgoing cell is disposed.
    pub fn set_cell(&mut self, index: usize, cell: CellModel) -> ModelResult<()> {
        self.ensure_live()?;
        self.ensure_index(index)?;
        if cell.is_disposed() {
            return Err(ModelError::Disposed);
        }
        self.adopt(&cell);
        let new_id = cell.id();
        let old = std::mem::replace(&mut self.cells[index], cell);
        let old_id = old.id();
        self.cells_changed(CellsChanged::Replaced {
            index,
            old_id,
            new_id,
        });
        old.dispose();
        Ok(())
    }

    pub fn move_cell(&mut self, from: usize, to: usize) -> ModelResult<()> {
        self.ensure_live()?;
        self.ensure_index(from)?;
        self.ensure_index(to)?;
        if from == to {
            return Ok(());
        }
        let cell = self.cells.remove(from);
        let id = cell.id();
        self.cells.insert(to, cell);
        self.cells_changed(CellsChanged::Moved { from, to, id });
        Ok(())
    }

    /// Removes and disposes every cell. Returns how many were removed.
    pub fn clear_cells(&mut self) -> ModelResult<usize> {
        self.ensure_live()?;
        if self.cells.is_empty() {
            return Ok(0);
        }
        let removed = std::mem::take(&mut self.cells);
        let ids = removed.iter().map(CellModel::id).collect();
        self.cells_changed(CellsChanged::Cleared { ids });
        for cell in &removed {
            cell.dispose();
        }
        Ok(removed.len())
    }

    /// New code cell, cloning from `source` when given.
    ///
    /// Shared fields are always copied. Execution count, display flags and
    /// outputs are copied only from another code cell.
    pub fn create_code_cell(&self, source: Option<&CellModel>) -> ModelResult<CellModel> {
        let cell = self.create_cell(CellType::Code, source)?;
        if let (Some(target), Some(origin)) = (cell.as_code(), source.and_then(CellModel::as_code))
        {
            target.set_execution_count(origin.execution_count());
            target.set_collapsed(origin.collapsed());
            target.set_scrolled(origin.scrolled());
            for output in origin.outputs().to_vec() {
                target.outputs().add(output)?;
            }
        }
        Ok(cell)
    }

    pub fn create_markdown_cell(&self, source: Option<&CellModel>) -> ModelResult<CellModel> {
        let cell = self.create_cell(CellType::Markdown, source)?;
        if let (Some(target), Some(origin)) = (
            cell.as_markdown(),
            source.and_then(CellModel::as_markdown),
        ) {
            target.set_rendered(origin.rendered());
        }
        Ok(cell)
    }

    pub fn create_raw_cell(&self, source: Option<&CellModel>) -> ModelResult<CellModel> {
        let cell = self.create_cell(CellType::Raw, source)?;
        if let (Some(target), Some(origin)) = (cell.as_raw(), source.and_then(CellModel::as_raw)) {
            target.set_format(origin.format());
        }
        Ok(cell)
    }

    fn create_cell(&self, cell_type: CellType, source: Option<&CellModel>) -> ModelResult<CellModel> {
        self.ensure_live()?;
        if let Some(source) = source.filter(|source| source.is_disposed()) {
            warn!(
                "event=cell_clone module=notebook status=rejected from={} reason=disposed",
                source.id()
            );
            return Err(ModelError::Disposed);
        }
        let cell = CellModel::new(cell_type);
        if let Some(source) = source {
            cell.copy_shared_from(source)?;
            debug!(
                "event=cell_clone module=notebook status=ok from={} to={} source_type={} target_type={}",
                source.id(),
                cell.id(),
                source.cell_type().as_str(),
                cell_type.as_str()
            );
        }
        Ok(cell)
    }

    pub fn kernelspec(&self) -> Option<KernelSpec> {
        KERNELSPEC.get(self)
    }

    pub fn set_kernelspec(&self, kernelspec: Option<KernelSpec>) -> bool {
        self.update_content(&KERNELSPEC, kernelspec)
    }

    pub fn language_info(&self) -> Option<LanguageInfo> {
        LANGUAGE_INFO.get(self)
    }

    pub fn set_language_info(&self, language_info: Option<LanguageInfo>) -> bool {
        self.update_content(&LANGUAGE_INFO, language_info)
    }

    /// nbformat major version the document was loaded from, when it differs.
    pub fn orig_nbformat(&self) -> Option<u32> {
        ORIG_NBFORMAT.get(self)
    }

    pub fn set_orig_nbformat(&self, orig_nbformat: Option<u32>) -> bool {
        self.update_content(&ORIG_NBFORMAT, orig_nbformat)
    }

    /// Kernel name from `kernelspec`, else the configured default.
    pub fn default_kernel_name(&self) -> String {
        self.kernelspec()
            .map(|spec| spec.name)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.config.default_kernel_name.clone())
    }

    /// Language from `language_info`, else the configured default.
    pub fn default_kernel_language(&self) -> String {
        self.language_info()
            .map(|info| info.name)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.config.default_language.clone())
    }

    /// Cursor over the notebook metadata namespace `name`.
    pub fn metadata(&self, name: &str) -> ModelResult<MetadataCursor<'_>> {
        self.ensure_live()?;
        ensure_namespace_allowed(name, NOTEBOOK_RESERVED)?;
        Ok(self.metadata.cursor(name, move |namespace: &str| {
            self.dirty.set(true);
            Self::METADATA_CHANGED.emit(self, &namespace.to_string());
        }))
    }

    pub fn list_metadata(&self) -> Vec<String> {
        self.metadata.names()
    }

    pub fn reserved_metadata_keys(&self) -> &'static [&'static str] {
        NOTEBOOK_RESERVED
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    /// Disposes every cell and releases the notebook. Idempotent.
    pub fn dispose(&mut self) {
        if self.disposed.replace(true) {
            return;
        }
        let cells = std::mem::take(&mut self.cells);
        for cell in &cells {
            cell.dispose();
        }
        Self::DISPOSED.emit(self, &());
        let receivers = disconnect_receiver(self.id);
        clear_signal_data(self.id);
        clear_property_data(self.id);
        self.metadata.clear();
        debug!(
            "event=notebook_dispose module=notebook status=ok id={} cells={} receivers={}",
            self.id,
            cells.len(),
            receivers
        );
    }

    // Routes owned-cell edits into the dirty flag. Registrations use the
    // notebook id as context and die with the cell or the notebook.
    fn adopt(&self, cell: &CellModel) {
        let dirty = Rc::clone(&self.dirty);
        CellModel::CONTENT_CHANGED.connect(
            cell,
            handler(move |_: &CellModel, _: &()| dirty.set(true)),
            Some(self.id),
        );
        let dirty = Rc::clone(&self.dirty);
        CellModel::METADATA_CHANGED.connect(
            cell,
            handler(move |_: &CellModel, _: &String| dirty.set(true)),
            Some(self.id),
        );
        if let Some(code) = cell.as_code() {
            let dirty = Rc::clone(&self.dirty);
            OutputAreaModel::CHANGED.connect(
                code.outputs(),
                handler(move |_: &OutputAreaModel, _: &OutputsChanged| dirty.set(true)),
                Some(self.id),
            );
        }
    }

    fn cells_changed(&self, change: CellsChanged) {
        self.dirty.set(true);
        Self::CELLS_CHANGED.emit(self, &change);
        Self::CONTENT_CHANGED.emit(self, &());
    }

    fn update_content<V>(&self, property: &Property<NotebookModel, V>, value: V) -> bool
    where
        V: Clone + PartialEq + Serialize + 'static,
    {
        if self.disposed.get() {
            warn!(
                "event=set_on_disposed module=notebook status=ignored id={} field={}",
                self.id,
                property.name()
            );
            return false;
        }
        let changed = property.set(self, value);
        if changed {
            self.dirty.set(true);
            Self::CONTENT_CHANGED.emit(self, &());
        }
        changed
    }

    fn ensure_live(&self) -> ModelResult<()> {
        if self.disposed.get() {
            return Err(ModelError::Disposed);
        }
        Ok(())
    }

    fn ensure_index(&self, index: usize) -> ModelResult<()> {
        if index >= self.cells.len() {
            return Err(ModelError::IndexOutOfRange {
                index,
                len: self.cells.len(),
            });
        }
        Ok(())
    }

    fn to_snapshot(&self) -> ModelResult<NotebookSnapshot> {
        let mut metadata = self.metadata.to_json_map();
        if let Some(kernelspec) = self.kernelspec() {
            metadata.insert("kernelspec".to_string(), serde_json::to_value(kernelspec)?);
        }
        if let Some(language_info) = self.language_info() {
            metadata.insert(
                "language_info".to_string(),
                serde_json::to_value(language_info)?,
            );
        }
        if let Some(orig_nbformat) = self.orig_nbformat() {
            metadata.insert("orig_nbformat".to_string(), Value::from(orig_nbformat));
        }
        Ok(NotebookSnapshot {
            metadata,
            nbformat: self.nbformat(),
            nbformat_minor: self.nbformat_minor(),
            cells: self.cells.iter().map(CellModel::to_snapshot).collect(),
        })
    }
}

impl DocumentModel for NotebookModel {
    fn dirty(&self) -> bool {
        self.dirty.get()
    }

    fn set_dirty(&self, dirty: bool) -> bool {
        self.dirty.replace(dirty) != dirty
    }

    fn read_only(&self) -> bool {
        READ_ONLY.get(self)
    }

    fn set_read_only(&self, read_only: bool) -> bool {
        if self.disposed.get() {
            warn!(
                "event=set_on_disposed module=notebook status=ignored id={} field=read_only",
                self.id
            );
            return false;
        }
        READ_ONLY.set(self, read_only)
    }

    fn to_json(&self) -> ModelResult<Value> {
        Ok(serde_json::to_value(self.to_snapshot()?)?)
    }

    fn from_json(&mut self, value: &Value) -> ModelResult<()> {
        self.ensure_live()?;
        let snapshot: NotebookSnapshot = serde_json::from_value(value.clone())?;
        let kernelspec = typed_entry::<KernelSpec>(&snapshot.metadata, "kernelspec")?;
        let language_info = typed_entry::<LanguageInfo>(&snapshot.metadata, "language_info")?;
        let orig_nbformat = typed_entry::<u32>(&snapshot.metadata, "orig_nbformat")?;
        let cells = snapshot
            .cells
            .iter()
            .map(CellModel::from_snapshot)
            .collect::<ModelResult<Vec<_>>>()?;

        self.clear_cells()?;
        for cell in cells {
            self.push_cell(cell)?;
        }
        self.metadata.clear();
        self.metadata.load_json_map(&snapshot.metadata, NOTEBOOK_RESERVED);
        self.set_kernelspec(kernelspec);
        self.set_language_info(language_info);

        if snapshot.nbformat == self.config.nbformat {
            self.set_orig_nbformat(orig_nbformat);
            self.nbformat_minor
                .set(snapshot.nbformat_minor.max(self.config.nbformat_minor));
        } else {
            warn!(
                "event=notebook_load module=notebook status=converted from={} to={}",
                snapshot.nbformat, self.config.nbformat
            );
            self.set_orig_nbformat(orig_nbformat.or(Some(snapshot.nbformat)));
            self.nbformat_minor.set(self.config.nbformat_minor);
        }
        self.nbformat.set(self.config.nbformat);

        self.dirty.set(false);
        info!(
            "event=notebook_load module=notebook status=ok id={} cells={}",
            self.id,
            self.cells.len()
        );
        Ok(())
    }
}

impl Drop for NotebookModel {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn typed_entry<T: serde::de::DeserializeOwned>(
    metadata: &Map<String, Value>,
    key: &str,
) -> ModelResult<Option<T>> {
    match metadata.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
    }
}

/// Builds a detached cell from one serialized cell record.
pub fn cell_from_json(value: &Value) -> ModelResult<CellModel> {
    let snapshot: CellSnapshot = serde_json::from_value(value.clone())?;
    CellModel::from_snapshot(&snapshot)
}

#[cfg(test)]
mod tests {
    use super::{CellsChanged, DocumentModel, KernelSpec, LanguageInfo, NotebookModel};
    use crate::cell::{CellModel, CellType};
    use crate::config::NotebookConfig;
    use crate::error::ModelError;
    use crate::signal::handler;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn structural_edits_emit_cell_changes() {
        let mut notebook = NotebookModel::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        NotebookModel::CELLS_CHANGED.connect(
            &notebook,
            handler(move |_: &NotebookModel, change: &CellsChanged| {
                sink.borrow_mut().push(change.clone())
            }),
            None,
        );

        let first = CellModel::markdown();
        let first_id = first.id();
        let second = CellModel::raw();
        let second_id = second.id();
        notebook.push_cell(first).expect("push");
        notebook.push_cell(second).expect("push");
        notebook.move_cell(1, 0).expect("move");
        assert_eq!(notebook.cell_index(second_id), Some(0));

        assert_eq!(
            *log.borrow(),
            vec![
                CellsChanged::Added { index: 0, id: first_id },
                CellsChanged::Added { index: 1, id: second_id },
                CellsChanged::Moved { from: 1, to: 0, id: second_id },
            ]
        );
    }

    #[test]
    fn out_of_range_and_disposed_edits_fail() {
        let mut notebook = NotebookModel::new();
        assert_eq!(
            notebook.remove_cell(0),
            Err(ModelError::IndexOutOfRange { index: 0, len: 0 })
        );
        assert!(notebook.insert_cell(1, CellModel::raw()).is_err());

        notebook.dispose();
        assert_eq!(
            notebook.push_cell(CellModel::raw()),
            Err(ModelError::Disposed)
        );
        assert!(notebook.create_code_cell(None).is_err());
        assert!(!notebook.set_kernelspec(None));
    }

    #[test]
    fn owned_cell_edits_mark_dirty() {
        let mut notebook = NotebookModel::new();
        let cell = notebook.create_code_cell(None).expect("create");
        let index = notebook.push_cell(cell).expect("push");
        notebook.set_dirty(false);

        let cell = notebook.cell(index).expect("cell");
        cell.set_source("1 + 1");
        assert!(notebook.dirty());

        notebook.set_dirty(false);
        cell.metadata("myext")
            .expect("free")
            .set_value(&json!({"a": 1}));
        assert!(notebook.dirty());

        notebook.set_dirty(false);
        cell.as_code()
            .expect("code")
            .outputs()
            .add(crate::outputs::OutputRecord::stream("stdout", "2"))
            .expect("add");
        assert!(notebook.dirty());
    }

    #[test]
    fn kernel_defaults_fall_back_to_config() {
        let notebook = NotebookModel::with_config(NotebookConfig {
            default_language: "julia".to_string(),
            default_kernel_name: "julia-1.10".to_string(),
            ..NotebookConfig::default()
        });
        assert_eq!(notebook.default_kernel_name(), "julia-1.10");
        assert_eq!(notebook.default_kernel_language(), "julia");

        notebook.set_kernelspec(Some(KernelSpec {
            name: "python3".to_string(),
            display_name: "Python 3".to_string(),
        }));
        notebook.set_language_info(Some(LanguageInfo::named("python")));
        assert_eq!(notebook.default_kernel_name(), "python3");
        assert_eq!(notebook.default_kernel_language(), "python");
    }

    #[test]
    fn typed_document_fields_are_not_metadata_namespaces() {
        let notebook = NotebookModel::new();
        for key in ["kernelspec", "language_info", "orig_nbformat"] {
            assert_eq!(
                notebook.metadata(key).err(),
                Some(ModelError::ReservedMetadataKey(key.to_string()))
            );
        }
        assert!(notebook.metadata("authors").is_ok());
    }

    #[test]
    fn older_major_version_is_recorded() {
        let mut notebook = NotebookModel::new();
        notebook
            .from_json(&json!({
                "metadata": {},
                "nbformat": 3,
                "nbformat_minor": 0,
                "cells": [{"cell_type": "raw", "source": "x", "metadata": {}}]
            }))
            .expect("loads");
        assert_eq!(notebook.orig_nbformat(), Some(3));
        assert_eq!(notebook.nbformat(), 4);
        assert_eq!(notebook.len(), 1);
        assert!(!notebook.dirty());
        assert_eq!(notebook.cell(0).map(CellModel::cell_type), Some(CellType::Raw));
    }
}
