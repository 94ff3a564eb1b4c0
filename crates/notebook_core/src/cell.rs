//! Cell model hierarchy.
//!
//! # Responsibility
//! - Own the shared cell state (source, tags, trust, name, metadata) and the
//!   variant state of code, markdown and raw cells.
//! - Announce content edits, metadata edits and teardown through signals.
//!
//! # Invariants
//! - Tags are trimmed, non-empty, comma-free and unique, first occurrence
//!   wins. Inner spaces are kept.
//! - A code cell's outputs carry the same trust flag as the cell.
//! - Metadata namespaces never shadow a typed field of the variant.
//! - `dispose` runs once: outputs first, then `DISPOSED`, then every
//!   subscription, stored property and metadata namespace is released.
//!
//! # See also
//! - src/notebook.rs (owner, factories)
//! - src/outputs.rs (code cell outputs)

use crate::error::{ModelError, ModelResult};
use crate::metadata::{ensure_namespace_allowed, MetadataCursor, MetadataStore};
use crate::outputs::OutputAreaModel;
use crate::property::{clear_property_data, ChangedArgs, Property};
use crate::signal::{clear_signal_data, new_object_id, Identified, ObjectId, Signal};
use crate::snapshot::CellSnapshot;
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::Cell;
use std::collections::HashSet;
use std::ops::Deref;

static CELL_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_-]{1,64}$").expect("valid cell name regex"));
// nbformat tag rule.
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^,]+$").expect("valid tag regex"));

const SHARED_RESERVED: &[&str] = &["name", "tags", "trusted"];
const CODE_RESERVED: &[&str] = &["name", "tags", "trusted", "collapsed", "scrolled"];
const RAW_RESERVED: &[&str] = &["name", "tags", "trusted", "format"];

/// Cell variant discriminator, spelled as in nbformat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellType {
    Code,
    Markdown,
    Raw,
}

impl CellType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Markdown => "markdown",
            Self::Raw => "raw",
        }
    }
}

/// Output scrolling preference of a code cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollMode {
    #[default]
    Auto,
    Scrolled,
    Unscrolled,
}

impl ScrollMode {
    /// nbformat encoding: `true`, `false` or `"auto"`.
    pub fn to_metadata(self) -> Value {
        match self {
            Self::Auto => Value::String("auto".to_string()),
            Self::Scrolled => Value::Bool(true),
            Self::Unscrolled => Value::Bool(false),
        }
    }

    pub fn from_metadata(value: &Value) -> Self {
        match value {
            Value::Bool(true) => Self::Scrolled,
            Value::Bool(false) => Self::Unscrolled,
            _ => Self::Auto,
        }
    }
}

fn rendered_default() -> bool {
    true
}

const SOURCE: Property<CellModel, String> =
    Property::new("source", String::new).notify(CellModel::STATE_CHANGED);
const TAGS: Property<CellModel, Vec<String>> =
    Property::new("tags", Vec::new).notify(CellModel::STATE_CHANGED);
const TRUSTED: Property<CellModel, bool> =
    Property::new("trusted", bool::default).notify(CellModel::STATE_CHANGED);
const NAME: Property<CellModel, Option<String>> =
    Property::new("name", Option::default).notify(CellModel::STATE_CHANGED);
const EXECUTION_COUNT: Property<CellModel, Option<u32>> =
    Property::new("execution_count", Option::default).notify(CellModel::STATE_CHANGED);
const COLLAPSED: Property<CellModel, bool> =
    Property::new("collapsed", bool::default).notify(CellModel::STATE_CHANGED);
const SCROLLED: Property<CellModel, ScrollMode> =
    Property::new("scrolled", ScrollMode::default).notify(CellModel::STATE_CHANGED);
const RENDERED: Property<CellModel, bool> =
    Property::new("rendered", rendered_default).notify(CellModel::STATE_CHANGED);
const FORMAT: Property<CellModel, String> =
    Property::new("format", String::new).notify(CellModel::STATE_CHANGED);

#[derive(Debug)]
enum CellPayload {
    Code(OutputAreaModel),
    Markdown,
    Raw,
}

/// One notebook cell. Variant state is reached through [`CellModel::as_code`],
/// [`CellModel::as_markdown`] and [`CellModel::as_raw`].
#[derive(Debug)]
pub struct CellModel {
    id: ObjectId,
    metadata: MetadataStore,
    payload: CellPayload,
    disposed: Cell<bool>,
}

impl Identified for CellModel {
    fn object_id(&self) -> ObjectId {
        self.id
    }
}

impl CellModel {
    pub const STATE_CHANGED: Signal<CellModel, ChangedArgs> = Signal::new("state_changed");
    /// Fired after any persisted field changed.
    pub const CONTENT_CHANGED: Signal<CellModel, ()> = Signal::new("content_changed");
    /// Carries the namespace written through a metadata cursor.
    pub const METADATA_CHANGED: Signal<CellModel, String> = Signal::new("metadata_changed");
    pub const DISPOSED: Signal<CellModel, ()> = Signal::new("disposed");

    /// Code cell over `outputs`; the outputs adopt the cell's trust flag.
    pub fn code(outputs: OutputAreaModel) -> Self {
        outputs.set_trusted(false);
        Self::with_payload(CellPayload::Code(outputs))
    }

    pub fn markdown() -> Self {
        Self::with_payload(CellPayload::Markdown)
    }

    pub fn raw() -> Self {
        Self::with_payload(CellPayload::Raw)
    }

    /// Empty cell of `cell_type`.
    pub fn new(cell_type: CellType) -> Self {
        match cell_type {
            CellType::Code => Self::code(OutputAreaModel::new()),
            CellType::Markdown => Self::markdown(),
            CellType::Raw => Self::raw(),
        }
    }

    fn with_payload(payload: CellPayload) -> Self {
        let cell = Self {
            id: new_object_id(),
            metadata: MetadataStore::new(),
            payload,
            disposed: Cell::new(false),
        };
        debug!(
            "event=cell_create module=cell status=ok id={} type={}",
            cell.id,
            cell.cell_type().as_str()
        );
        cell
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn cell_type(&self) -> CellType {
        match self.payload {
            CellPayload::Code(_) => CellType::Code,
            CellPayload::Markdown => CellType::Markdown,
            CellPayload::Raw => CellType::Raw,
        }
    }

    pub fn is_code(&self) -> bool {
        matches!(self.payload, CellPayload::Code(_))
    }

    pub fn is_markdown(&self) -> bool {
        matches!(self.payload, CellPayload::Markdown)
    }

    pub fn is_raw(&self) -> bool {
        matches!(self.payload, CellPayload::Raw)
    }

    pub fn as_code(&self) -> Option<CodeCell<'_>> {
        match &self.payload {
            CellPayload::Code(outputs) => Some(CodeCell {
                cell: self,
                outputs,
            }),
            _ => None,
        }
    }

    pub fn as_markdown(&self) -> Option<MarkdownCell<'_>> {
        self.is_markdown().then_some(MarkdownCell { cell: self })
    }

    pub fn as_raw(&self) -> Option<RawCell<'_>> {
        self.is_raw().then_some(RawCell { cell: self })
    }

    pub fn source(&self) -> String {
        SOURCE.get(self)
    }

    pub fn set_source(&self, source: impl Into<String>) -> bool {
        self.update_content(&SOURCE, source.into())
    }

    pub fn tags(&self) -> Vec<String> {
        TAGS.get(self)
    }

    /// Replaces the tag list after normalizing it.
    pub fn set_tags<I, T>(&self, tags: I) -> ModelResult<bool>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let normalized = normalize_tags(tags)?;
        Ok(self.update_content(&TAGS, normalized))
    }

    pub fn add_tag(&self, tag: &str) -> ModelResult<bool> {
        let mut tags = self.tags();
        tags.push(tag.to_string());
        self.set_tags(tags)
    }

    pub fn remove_tag(&self, tag: &str) -> bool {
        let tags: Vec<String> = self
            .tags()
            .into_iter()
            .filter(|existing| existing != tag.trim())
            .collect();
        self.update_content(&TAGS, tags)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags().iter().any(|existing| existing == tag.trim())
    }

    pub fn trusted(&self) -> bool {
        TRUSTED.get(self)
    }

    /// Updates trust; code outputs are updated before any listener hears
    /// about it.
    pub fn set_trusted(&self, trusted: bool) -> bool {
        if !self.disposed.get() && self.trusted() != trusted {
            if let CellPayload::Code(outputs) = &self.payload {
                outputs.set_trusted(trusted);
            }
        }
        self.update_content(&TRUSTED, trusted)
    }

    pub fn name(&self) -> Option<String> {
        NAME.get(self)
    }

    /// Sets or clears the cell name. Names match `[a-zA-Z0-9_-]{1,64}`.
    pub fn set_name(&self, name: Option<String>) -> ModelResult<bool> {
        if let Some(candidate) = &name {
            if !CELL_NAME_RE.is_match(candidate) {
                return Err(ModelError::InvalidName(candidate.clone()));
            }
        }
        Ok(self.update_content(&NAME, name))
    }

    /// Cursor over the metadata namespace `name`.
    ///
    /// Writes through the cursor emit `METADATA_CHANGED` with the namespace.
    pub fn metadata(&self, name: &str) -> ModelResult<MetadataCursor<'_>> {
        if self.disposed.get() {
            return Err(ModelError::Disposed);
        }
        ensure_namespace_allowed(name, self.reserved_metadata_keys())?;
        Ok(self.metadata.cursor(name, move |namespace: &str| {
            Self::METADATA_CHANGED.emit(self, &namespace.to_string());
        }))
    }

    /// Stored namespace names, sorted.
    pub fn list_metadata(&self) -> Vec<String> {
        self.metadata.names()
    }

    /// Namespaces owned by typed fields of this variant.
    pub fn reserved_metadata_keys(&self) -> &'static [&'static str] {
        match self.payload {
            CellPayload::Code(_) => CODE_RESERVED,
            CellPayload::Markdown => SHARED_RESERVED,
            CellPayload::Raw => RAW_RESERVED,
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    /// Releases the cell. Idempotent; observers see `DISPOSED` exactly once.
    pub fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        if let CellPayload::Code(outputs) = &self.payload {
            outputs.dispose();
        }
        Self::DISPOSED.emit(self, &());
        clear_signal_data(self.id);
        clear_property_data(self.id);
        self.metadata.clear();
        debug!(
            "event=cell_dispose module=cell status=ok id={} type={}",
            self.id,
            self.cell_type().as_str()
        );
    }

    /// nbformat v4 representation of this cell.
    pub fn to_snapshot(&self) -> CellSnapshot {
        let mut metadata = self.metadata.to_json_map();
        let tags = self.tags();
        if !tags.is_empty() {
            metadata.insert("tags".to_string(), Value::from(tags));
        }
        if self.trusted() {
            metadata.insert("trusted".to_string(), Value::Bool(true));
        }

        let mut execution_count = None;
        let mut outputs = Vec::new();
        if let Some(code) = self.as_code() {
            if code.collapsed() {
                metadata.insert("collapsed".to_string(), Value::Bool(true));
            }
            if code.scrolled() != ScrollMode::Auto {
                metadata.insert("scrolled".to_string(), code.scrolled().to_metadata());
            }
            execution_count = code.execution_count();
            outputs = code.outputs().to_vec();
        }
        if let Some(raw) = self.as_raw() {
            let format = raw.format();
            if !format.is_empty() {
                metadata.insert("format".to_string(), Value::String(format));
            }
        }

        CellSnapshot {
            cell_type: self.cell_type(),
            id: self.name(),
            source: self.source(),
            metadata,
            execution_count,
            outputs,
        }
    }

    /// Builds a cell from its nbformat v4 representation.
    pub fn from_snapshot(snapshot: &CellSnapshot) -> ModelResult<CellModel> {
        let cell = CellModel::new(snapshot.cell_type);
        cell.set_source(snapshot.source.clone());
        cell.set_name(snapshot.id.clone())?;
        if let Some(tags) = snapshot.metadata.get("tags") {
            let tags: Vec<String> = serde_json::from_value(tags.clone())?;
            cell.set_tags(tags)?;
        }
        if let Some(Value::Bool(trusted)) = snapshot.metadata.get("trusted") {
            cell.set_trusted(*trusted);
        }
        cell.metadata
            .load_json_map(&snapshot.metadata, cell.reserved_metadata_keys());

        if let Some(code) = cell.as_code() {
            code.set_execution_count(snapshot.execution_count);
            if let Some(Value::Bool(collapsed)) = snapshot.metadata.get("collapsed") {
                code.set_collapsed(*collapsed);
            }
            if let Some(scrolled) = snapshot.metadata.get("scrolled") {
                code.set_scrolled(ScrollMode::from_metadata(scrolled));
            }
            for output in &snapshot.outputs {
                code.outputs().add(output.clone())?;
            }
        }
        if let Some(raw) = cell.as_raw() {
            if let Some(Value::String(format)) = snapshot.metadata.get("format") {
                raw.set_format(format.clone());
            }
        }
        Ok(cell)
    }

    /// Copies source, tags, trust and free metadata from `source`.
    pub(crate) fn copy_shared_from(&self, source: &CellModel) -> ModelResult<()> {
        self.set_source(source.source());
        self.set_tags(source.tags())?;
        self.set_trusted(source.trusted());
        self.metadata
            .copy_from(&source.metadata, self.reserved_metadata_keys());
        Ok(())
    }

    // Persisted fields: a change also fires CONTENT_CHANGED.
    fn update_content<V>(&self, property: &Property<CellModel, V>, value: V) -> bool
    where
        V: Clone + PartialEq + Serialize + 'static,
    {
        let changed = self.update_state(property, value);
        if changed {
            Self::CONTENT_CHANGED.emit(self, &());
        }
        changed
    }

    fn update_state<V>(&self, property: &Property<CellModel, V>, value: V) -> bool
    where
        V: Clone + PartialEq + Serialize + 'static,
    {
        if self.disposed.get() {
            warn!(
                "event=set_on_disposed module=cell status=ignored id={} field={}",
                self.id,
                property.name()
            );
            return false;
        }
        property.set(self, value)
    }
}

impl Drop for CellModel {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn normalize_tags<I, T>(tags: I) -> ModelResult<Vec<String>>
where
    I: IntoIterator<Item = T>,
    T: Into<String>,
{
    let mut seen = HashSet::new();
    let mut normalized = Vec::new();
    for tag in tags {
        let tag = tag.into();
        let trimmed = tag.trim();
        if !TAG_RE.is_match(trimmed) {
            return Err(ModelError::InvalidTag(tag));
        }
        if seen.insert(trimmed.to_string()) {
            normalized.push(trimmed.to_string());
        }
    }
    Ok(normalized)
}

/// Code-cell view: execution count, outputs and display flags.
#[derive(Debug, Clone, Copy)]
pub struct CodeCell<'a> {
    cell: &'a CellModel,
    outputs: &'a OutputAreaModel,
}

impl<'a> CodeCell<'a> {
    pub fn outputs(&self) -> &'a OutputAreaModel {
        self.outputs
    }

    pub fn execution_count(&self) -> Option<u32> {
        EXECUTION_COUNT.get(self.cell)
    }

    pub fn set_execution_count(&self, count: Option<u32>) -> bool {
        self.cell.update_content(&EXECUTION_COUNT, count)
    }

    /// Input prompt label, `In [ ]:` before the first execution.
    pub fn prompt(&self) -> String {
        match self.execution_count() {
            Some(count) => format!("In [{count}]:"),
            None => "In [ ]:".to_string(),
        }
    }

    pub fn collapsed(&self) -> bool {
        COLLAPSED.get(self.cell)
    }

    pub fn set_collapsed(&self, collapsed: bool) -> bool {
        self.cell.update_content(&COLLAPSED, collapsed)
    }

    pub fn scrolled(&self) -> ScrollMode {
        SCROLLED.get(self.cell)
    }

    pub fn set_scrolled(&self, scrolled: ScrollMode) -> bool {
        self.cell.update_content(&SCROLLED, scrolled)
    }

    /// Drops every output and resets the execution count.
    pub fn clear_outputs(&self) -> usize {
        let cleared = self.outputs.clear();
        self.set_execution_count(None);
        cleared
    }
}

impl Deref for CodeCell<'_> {
    type Target = CellModel;

    fn deref(&self) -> &CellModel {
        self.cell
    }
}

/// Markdown-cell view.
#[derive(Debug, Clone, Copy)]
pub struct MarkdownCell<'a> {
    cell: &'a CellModel,
}

impl MarkdownCell<'_> {
    /// Whether the cell shows rendered output instead of its source.
    pub fn rendered(&self) -> bool {
        RENDERED.get(self.cell)
    }

    pub fn set_rendered(&self, rendered: bool) -> bool {
        self.cell.update_state(&RENDERED, rendered)
    }
}

impl Deref for MarkdownCell<'_> {
    type Target = CellModel;

    fn deref(&self) -> &CellModel {
        self.cell
    }
}

/// Raw-cell view.
#[derive(Debug, Clone, Copy)]
pub struct RawCell<'a> {
    cell: &'a CellModel,
}

impl RawCell<'_> {
    /// Target conversion format, e.g. `text/latex`. Empty when unset.
    pub fn format(&self) -> String {
        FORMAT.get(self.cell)
    }

    pub fn set_format(&self, format: impl Into<String>) -> bool {
        self.cell.update_content(&FORMAT, format.into())
    }
}

impl Deref for RawCell<'_> {
    type Target = CellModel;

    fn deref(&self) -> &CellModel {
        self.cell
    }
}

#[cfg(test)]
mod tests {
    use super::{CellModel, CellType, ScrollMode};
    use crate::error::ModelError;
    use crate::outputs::{OutputAreaModel, OutputRecord};
    use crate::property::ChangedArgs;
    use crate::signal::handler;
    use serde_json::json;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn content_counter(cell: &CellModel) -> Rc<Cell<usize>> {
        let count = Rc::new(Cell::new(0));
        let sink = Rc::clone(&count);
        CellModel::CONTENT_CHANGED.connect(
            cell,
            handler(move |_: &CellModel, _: &()| sink.set(sink.get() + 1)),
            None,
        );
        count
    }

    #[test]
    fn tags_are_trimmed_and_deduplicated() {
        let cell = CellModel::markdown();
        assert!(cell
            .set_tags([" a ", "b", "a", "c"])
            .expect("valid tags"));
        assert_eq!(cell.tags(), vec!["a", "b", "c"]);
        assert!(cell.has_tag("b"));
        assert!(cell.remove_tag("b"));
        assert!(!cell.remove_tag("b"));
        assert!(!cell.add_tag("a").expect("duplicate is normalized away"));
    }

    #[test]
    fn invalid_tags_leave_previous_value() {
        let cell = CellModel::raw();
        cell.set_tags(["keep"]).expect("valid");
        assert_eq!(
            cell.set_tags(["a,b"]),
            Err(ModelError::InvalidTag("a,b".to_string()))
        );
        assert!(matches!(cell.set_tags(["   "]), Err(ModelError::InvalidTag(_))));
        assert!(matches!(cell.set_tags([""]), Err(ModelError::InvalidTag(_))));
        assert_eq!(cell.tags(), vec!["keep"]);
    }

    #[test]
    fn tags_may_contain_inner_spaces() {
        let cell = CellModel::markdown();
        assert!(cell
            .set_tags([" needs review ", "needs review"])
            .expect("spaces are legal"));
        assert_eq!(cell.tags(), vec!["needs review"]);
        assert!(cell.has_tag("needs review"));
    }

    #[test]
    fn names_are_validated() {
        let cell = CellModel::markdown();
        assert!(cell.set_name(Some("intro_1".to_string())).expect("valid"));
        assert!(matches!(
            cell.set_name(Some("has space".to_string())),
            Err(ModelError::InvalidName(_))
        ));
        assert_eq!(cell.name().as_deref(), Some("intro_1"));
        assert!(cell.set_name(None).expect("clearing is valid"));
    }

    #[test]
    fn content_changes_fire_once_per_effective_set() {
        let cell = CellModel::markdown();
        let count = content_counter(&cell);
        cell.set_source("x");
        cell.set_source("x");
        cell.set_trusted(true);
        assert_eq!(count.get(), 2);

        let markdown = cell.as_markdown().expect("markdown view");
        assert!(markdown.rendered());
        assert!(markdown.set_rendered(false));
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn trust_propagates_to_outputs() {
        let outputs = OutputAreaModel::new();
        outputs.set_trusted(true);
        let cell = CellModel::code(outputs);
        let code = cell.as_code().expect("code view");
        assert!(!code.outputs().trusted());

        cell.set_trusted(true);
        assert!(code.outputs().trusted());
    }

    #[test]
    fn listeners_see_output_trust_already_updated() {
        let cell = CellModel::new(CellType::Code);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        CellModel::CONTENT_CHANGED.connect(
            &cell,
            handler(move |cell: &CellModel, _: &()| {
                let trusted = cell.as_code().map(|code| code.outputs().trusted());
                sink.borrow_mut().push(("content", trusted));
            }),
            None,
        );
        let sink = Rc::clone(&seen);
        CellModel::STATE_CHANGED.connect(
            &cell,
            handler(move |cell: &CellModel, args: &ChangedArgs| {
                let trusted = cell.as_code().map(|code| code.outputs().trusted());
                sink.borrow_mut().push((args.name, trusted));
            }),
            None,
        );

        assert!(cell.set_trusted(true));
        assert_eq!(
            *seen.borrow(),
            vec![("trusted", Some(true)), ("content", Some(true))]
        );
        assert!(!cell.set_trusted(true));
        assert_eq!(seen.borrow().len(), 2);
    }

    #[test]
    fn prompt_follows_execution_count() {
        let cell = CellModel::new(CellType::Code);
        let code = cell.as_code().expect("code view");
        assert_eq!(code.prompt(), "In [ ]:");
        code.set_execution_count(Some(5));
        assert_eq!(code.prompt(), "In [5]:");

        code.outputs()
            .add(OutputRecord::plain_result(Some(5), "10"))
            .expect("add");
        assert_eq!(code.clear_outputs(), 1);
        assert_eq!(code.prompt(), "In [ ]:");
    }

    #[test]
    fn reserved_namespaces_depend_on_variant() {
        let code = CellModel::new(CellType::Code);
        let markdown = CellModel::markdown();
        assert!(matches!(
            code.metadata("collapsed"),
            Err(ModelError::ReservedMetadataKey(_))
        ));
        assert!(markdown.metadata("collapsed").is_ok());
        assert!(matches!(
            markdown.metadata("tags"),
            Err(ModelError::ReservedMetadataKey(_))
        ));
        assert!(matches!(
            CellModel::raw().metadata("format"),
            Err(ModelError::ReservedMetadataKey(_))
        ));
    }

    #[test]
    fn metadata_writes_report_namespace() {
        let cell = CellModel::markdown();
        let seen = Rc::new(std::cell::RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        CellModel::METADATA_CHANGED.connect(
            &cell,
            handler(move |_: &CellModel, ns: &String| sink.borrow_mut().push(ns.clone())),
            None,
        );
        let cursor = cell.metadata("myext").expect("free namespace");
        cursor.set_value(&json!({"k": 1}));
        cursor.set_value(&json!({"k": 1}));
        assert_eq!(*seen.borrow(), vec!["myext".to_string()]);
        assert_eq!(cell.list_metadata(), vec!["myext".to_string()]);
    }

    #[test]
    fn dispose_is_idempotent_and_silences_setters() {
        let cell = CellModel::new(CellType::Code);
        let disposed = Rc::new(Cell::new(0));
        let sink = Rc::clone(&disposed);
        CellModel::DISPOSED.connect(
            &cell,
            handler(move |_: &CellModel, _: &()| sink.set(sink.get() + 1)),
            None,
        );
        cell.dispose();
        cell.dispose();
        assert_eq!(disposed.get(), 1);
        assert!(cell.is_disposed());
        assert!(cell.as_code().expect("code view").outputs().is_disposed());
        assert!(!cell.set_source("late"));
        assert_eq!(cell.metadata("myext").err(), Some(ModelError::Disposed));
    }

    #[test]
    fn snapshot_carries_typed_fields_in_metadata() {
        let cell = CellModel::new(CellType::Code);
        let code = cell.as_code().expect("code view");
        cell.set_source("print(1)");
        cell.set_tags(["t"]).expect("valid");
        code.set_collapsed(true);
        code.set_scrolled(ScrollMode::Unscrolled);
        code.set_execution_count(Some(2));
        code.outputs()
            .add(OutputRecord::stream("stdout", "1\n"))
            .expect("add");
        cell.metadata("myext")
            .expect("free")
            .set_value(&json!(null));

        let snapshot = cell.to_snapshot();
        assert_eq!(snapshot.metadata["tags"], json!(["t"]));
        assert_eq!(snapshot.metadata["collapsed"], json!(true));
        assert_eq!(snapshot.metadata["scrolled"], json!(false));
        assert_eq!(snapshot.metadata["myext"], json!(null));

        let restored = CellModel::from_snapshot(&snapshot).expect("restores");
        let restored_code = restored.as_code().expect("code view");
        assert_eq!(restored.tags(), vec!["t"]);
        assert_eq!(restored_code.scrolled(), ScrollMode::Unscrolled);
        assert_eq!(restored_code.prompt(), "In [2]:");
        assert_eq!(restored_code.outputs().len(), 1);
        assert_eq!(restored.list_metadata(), vec!["myext".to_string()]);
        assert_eq!(restored.to_snapshot(), snapshot);
    }
}
