//! Observable data model for notebook documents.
//! This crate is the single source of truth for notebook/cell invariants.

pub mod cell;
pub mod config;
pub mod editor;
pub mod error;
pub mod logging;
pub mod metadata;
pub mod notebook;
pub mod outputs;
pub mod property;
pub mod signal;
pub mod snapshot;

pub use cell::{CellModel, CellType, CodeCell, MarkdownCell, RawCell, ScrollMode};
pub use config::{ConfigError, NotebookConfig};
pub use editor::{CellMode, EditorModel, FocusCallback, InputAreaModel, TextEditorModel};
pub use error::{ModelError, ModelResult};
pub use logging::{
    default_log_level, init_logging, init_logging_from_config, logging_status, LoggingError,
};
pub use metadata::MetadataCursor;
pub use notebook::{
    cell_from_json, CellsChanged, DocumentModel, KernelSpec, LanguageInfo, NotebookModel,
};
pub use outputs::{MimeBundle, OutputAreaModel, OutputRecord, OutputsChanged};
pub use property::{ChangedArgs, Property};
pub use signal::{handler, Handler, Identified, ObjectId, Signal};
pub use snapshot::{CellSnapshot, NotebookSnapshot};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
