//! Output collection owned by a code cell.
//!
//! # Responsibility
//! - Keep execution results in emission order.
//! - Carry the trust flag that decides which MIME types may be rendered.
//!
//! # Invariants
//! - A stream output directly following a stream output with the same name
//!   is merged into it instead of appended.
//! - Untrusted outputs never select HTML, JavaScript or SVG for display.
//! - A disposed collection is empty and rejects additions.

use crate::error::{ModelError, ModelResult};
use crate::property::{clear_property_data, ChangedArgs, Property};
use crate::signal::{clear_signal_data, new_object_id, Identified, ObjectId, Signal};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

/// MIME type → payload bundle.
pub type MimeBundle = BTreeMap<String, Value>;

/// One execution result record, shaped like nbformat v4 outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "output_type", rename_all = "snake_case")]
pub enum OutputRecord {
    ExecuteResult {
        execution_count: Option<u32>,
        data: MimeBundle,
        #[serde(default)]
        metadata: Map<String, Value>,
    },
    DisplayData {
        data: MimeBundle,
        #[serde(default)]
        metadata: Map<String, Value>,
    },
    Stream {
        name: String,
        #[serde(deserialize_with = "crate::snapshot::multiline_string")]
        text: String,
    },
    Error {
        ename: String,
        evalue: String,
        traceback: Vec<String>,
    },
}

impl OutputRecord {
    pub fn stream(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Stream {
            name: name.into(),
            text: text.into(),
        }
    }

    /// `text/plain` execute result.
    pub fn plain_result(execution_count: Option<u32>, text: impl Into<String>) -> Self {
        let mut data = MimeBundle::new();
        data.insert("text/plain".to_string(), Value::String(text.into()));
        Self::ExecuteResult {
            execution_count,
            data,
            metadata: Map::new(),
        }
    }

    pub fn output_type(&self) -> &'static str {
        match self {
            Self::ExecuteResult { .. } => "execute_result",
            Self::DisplayData { .. } => "display_data",
            Self::Stream { .. } => "stream",
            Self::Error { .. } => "error",
        }
    }
}

// Most preferred first.
const DISPLAY_ORDER: &[&str] = &[
    "application/javascript",
    "text/html",
    "image/svg+xml",
    "image/png",
    "image/jpeg",
    "text/markdown",
    "text/latex",
    "text/plain",
];

const UNSAFE_WHEN_UNTRUSTED: &[&str] = &["application/javascript", "text/html", "image/svg+xml"];

/// Structural change notification for output collections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputsChanged {
    Added { index: usize },
    Merged { index: usize },
    Cleared { count: usize },
}

const TRUSTED: Property<OutputAreaModel, bool> =
    Property::new("trusted", bool::default).notify(OutputAreaModel::STATE_CHANGED);

/// Ordered, appendable output collection.
#[derive(Debug)]
pub struct OutputAreaModel {
    id: ObjectId,
    outputs: RefCell<Vec<OutputRecord>>,
    disposed: Cell<bool>,
}

impl Identified for OutputAreaModel {
    fn object_id(&self) -> ObjectId {
        self.id
    }
}

impl Default for OutputAreaModel {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputAreaModel {
    pub const CHANGED: Signal<OutputAreaModel, OutputsChanged> = Signal::new("changed");
    pub const STATE_CHANGED: Signal<OutputAreaModel, ChangedArgs> = Signal::new("state_changed");

    pub fn new() -> Self {
        Self {
            id: new_object_id(),
            outputs: RefCell::new(Vec::new()),
            disposed: Cell::new(false),
        }
    }

    pub fn len(&self) -> usize {
        self.outputs.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.borrow().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<OutputRecord> {
        self.outputs.borrow().get(index).cloned()
    }

    /// Snapshot of every output in order.
    pub fn to_vec(&self) -> Vec<OutputRecord> {
        self.outputs.borrow().clone()
    }

    /// Appends `output` and returns its index.
    ///
    /// Consecutive streams with the same name are merged; the returned index
    /// is then the index of the merged record.
    pub fn add(&self, output: OutputRecord) -> ModelResult<usize> {
        if self.disposed.get() {
            return Err(ModelError::Disposed);
        }

        let change = {
            let mut outputs = self.outputs.borrow_mut();
            let merges = matches!(
                (outputs.last(), &output),
                (
                    Some(OutputRecord::Stream { name, .. }),
                    OutputRecord::Stream { name: next_name, .. },
                ) if name == next_name
            );
            if merges {
                if let (
                    Some(OutputRecord::Stream { text, .. }),
                    OutputRecord::Stream {
                        text: next_text, ..
                    },
                ) = (outputs.last_mut(), &output)
                {
                    text.push_str(next_text);
                }
                OutputsChanged::Merged {
                    index: outputs.len() - 1,
                }
            } else {
                outputs.push(output);
                OutputsChanged::Added {
                    index: outputs.len() - 1,
                }
            }
        };

        let index = match change {
            OutputsChanged::Added { index } | OutputsChanged::Merged { index } => index,
            OutputsChanged::Cleared { .. } => 0,
        };
        Self::CHANGED.emit(self, &change);
        Ok(index)
    }

    /// Removes every output and returns how many were removed.
    pub fn clear(&self) -> usize {
        let count = {
            let mut outputs = self.outputs.borrow_mut();
            let count = outputs.len();
            outputs.clear();
            count
        };
        if count > 0 {
            Self::CHANGED.emit(self, &OutputsChanged::Cleared { count });
        }
        count
    }

    pub fn trusted(&self) -> bool {
        TRUSTED.get(self)
    }

    pub fn set_trusted(&self, trusted: bool) -> bool {
        if self.disposed.get() {
            warn!("event=set_on_disposed module=outputs status=ignored field=trusted");
            return false;
        }
        TRUSTED.set(self, trusted)
    }

    /// MIME type a renderer should use for the output at `index`.
    ///
    /// Streams and errors render as plain text. Rich bundles pick the most
    /// preferred type present, skipping active content when untrusted.
    pub fn preferred_mime_type(&self, index: usize) -> Option<String> {
        let outputs = self.outputs.borrow();
        let data = match outputs.get(index)? {
            OutputRecord::ExecuteResult { data, .. } | OutputRecord::DisplayData { data, .. } => {
                data
            }
            OutputRecord::Stream { .. } | OutputRecord::Error { .. } => {
                return Some("text/plain".to_string());
            }
        };
        let trusted = self.trusted();
        DISPLAY_ORDER
            .iter()
            .filter(|mime| trusted || !UNSAFE_WHEN_UNTRUSTED.contains(*mime))
            .find(|mime| data.contains_key(**mime))
            .map(|mime| (*mime).to_string())
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    /// Releases outputs, subscriptions and stored properties. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        let dropped = std::mem::take(&mut *self.outputs.borrow_mut());
        debug!(
            "event=outputs_dispose module=outputs status=ok id={} outputs={}",
            self.id,
            dropped.len()
        );
        clear_signal_data(self.id);
        clear_property_data(self.id);
    }
}

impl Drop for OutputAreaModel {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::{OutputAreaModel, OutputRecord, OutputsChanged};
    use crate::error::ModelError;
    use crate::signal::handler;
    use serde_json::{json, Map};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn html_result() -> OutputRecord {
        let mut data = super::MimeBundle::new();
        data.insert("text/html".to_string(), json!("<b>x</b>"));
        data.insert("text/plain".to_string(), json!("x"));
        OutputRecord::DisplayData {
            data,
            metadata: Map::new(),
        }
    }

    #[test]
    fn consecutive_streams_with_same_name_merge() {
        let outputs = OutputAreaModel::new();
        let changes = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&changes);
        OutputAreaModel::CHANGED.connect(
            &outputs,
            handler(move |_: &OutputAreaModel, change: &OutputsChanged| {
                sink.borrow_mut().push(change.clone())
            }),
            None,
        );

        outputs.add(OutputRecord::stream("stdout", "a")).expect("add");
        outputs.add(OutputRecord::stream("stdout", "b")).expect("merge");
        outputs.add(OutputRecord::stream("stderr", "c")).expect("add");

        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs.get(0), Some(OutputRecord::stream("stdout", "ab")));
        assert_eq!(
            *changes.borrow(),
            vec![
                OutputsChanged::Added { index: 0 },
                OutputsChanged::Merged { index: 0 },
                OutputsChanged::Added { index: 1 },
            ]
        );
    }

    #[test]
    fn untrusted_outputs_fall_back_to_safe_mime_types() {
        let outputs = OutputAreaModel::new();
        outputs.add(html_result()).expect("add");
        assert_eq!(outputs.preferred_mime_type(0).as_deref(), Some("text/plain"));

        assert!(outputs.set_trusted(true));
        assert_eq!(outputs.preferred_mime_type(0).as_deref(), Some("text/html"));
        assert_eq!(outputs.preferred_mime_type(5), None);
    }

    #[test]
    fn clear_reports_count_and_dispose_rejects_adds() {
        let outputs = OutputAreaModel::new();
        outputs.add(OutputRecord::plain_result(Some(1), "2")).expect("add");
        assert_eq!(outputs.clear(), 1);
        assert_eq!(outputs.clear(), 0);

        outputs.dispose();
        outputs.dispose();
        assert!(outputs.is_disposed());
        assert_eq!(
            outputs.add(OutputRecord::stream("stdout", "late")),
            Err(ModelError::Disposed)
        );
        assert!(!outputs.set_trusted(true));
    }

    #[test]
    fn stream_text_accepts_line_lists() {
        let record: OutputRecord = serde_json::from_value(json!({
            "output_type": "stream",
            "name": "stdout",
            "text": ["1\n", "2\n"]
        }))
        .expect("line list decodes");
        assert_eq!(record, OutputRecord::stream("stdout", "1\n2\n"));
    }

    #[test]
    fn records_use_nbformat_output_type_tag() {
        let value = serde_json::to_value(OutputRecord::stream("stdout", "hi")).expect("encode");
        assert_eq!(value["output_type"], "stream");
        assert_eq!(
            OutputRecord::plain_result(None, "x").output_type(),
            "execute_result"
        );
    }
}
