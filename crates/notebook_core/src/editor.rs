//! Editor boundary and input-area model.
//!
//! The text-editing widget lives outside this crate; `EditorModel` is the
//! surface the input area delegates to. `TextEditorModel` is the in-memory
//! implementation used when no widget is attached.
//!
//! # Invariants
//! - Every editor focus transition reaches `InputAreaModel::MODE_CHANGED`,
//!   whether it went through the input area or straight to the editor.
//! - An input area's focus subscription dies with the input area.

use crate::property::{clear_property_data, ChangedArgs, Property};
use crate::signal::{
    clear_signal_data, disconnect_receiver, handler, new_object_id, Identified, ObjectId, Signal,
};
use serde::Serialize;
use std::rc::{Rc, Weak};

/// Callback receiving the editor's new focus state.
pub type FocusCallback = Rc<dyn Fn(bool)>;

/// State an editor widget exposes to the model layer.
pub trait EditorModel {
    fn dirty(&self) -> bool;
    fn set_dirty(&self, dirty: bool) -> bool;
    fn read_only(&self) -> bool;
    fn set_read_only(&self, read_only: bool) -> bool;
    fn focused(&self) -> bool;
    fn set_focused(&self, focused: bool) -> bool;
    /// Registers `on_focus` for every focus transition, tagged with
    /// `context` so the receiver can drop it via `disconnect_receiver`.
    fn connect_focus_changed(&self, on_focus: FocusCallback, context: ObjectId) -> bool;
}

impl<E: EditorModel + ?Sized> EditorModel for Rc<E> {
    fn dirty(&self) -> bool {
        (**self).dirty()
    }

    fn set_dirty(&self, dirty: bool) -> bool {
        (**self).set_dirty(dirty)
    }

    fn read_only(&self) -> bool {
        (**self).read_only()
    }

    fn set_read_only(&self, read_only: bool) -> bool {
        (**self).set_read_only(read_only)
    }

    fn focused(&self) -> bool {
        (**self).focused()
    }

    fn set_focused(&self, focused: bool) -> bool {
        (**self).set_focused(focused)
    }

    fn connect_focus_changed(&self, on_focus: FocusCallback, context: ObjectId) -> bool {
        (**self).connect_focus_changed(on_focus, context)
    }
}

const EDITOR_DIRTY: Property<TextEditorModel, bool> =
    Property::new("dirty", bool::default).notify(TextEditorModel::STATE_CHANGED);
const EDITOR_READ_ONLY: Property<TextEditorModel, bool> =
    Property::new("read_only", bool::default).notify(TextEditorModel::STATE_CHANGED);
const EDITOR_FOCUSED: Property<TextEditorModel, bool> =
    Property::new("focused", bool::default).notify(TextEditorModel::STATE_CHANGED);

/// Headless editor state.
#[derive(Debug)]
pub struct TextEditorModel {
    id: ObjectId,
}

impl TextEditorModel {
    pub const STATE_CHANGED: Signal<TextEditorModel, ChangedArgs> = Signal::new("state_changed");

    pub fn new() -> Self {
        Self {
            id: new_object_id(),
        }
    }
}

impl Default for TextEditorModel {
    fn default() -> Self {
        Self::new()
    }
}

impl Identified for TextEditorModel {
    fn object_id(&self) -> ObjectId {
        self.id
    }
}

impl EditorModel for TextEditorModel {
    fn dirty(&self) -> bool {
        EDITOR_DIRTY.get(self)
    }

    fn set_dirty(&self, dirty: bool) -> bool {
        EDITOR_DIRTY.set(self, dirty)
    }

    fn read_only(&self) -> bool {
        EDITOR_READ_ONLY.get(self)
    }

    fn set_read_only(&self, read_only: bool) -> bool {
        EDITOR_READ_ONLY.set(self, read_only)
    }

    fn focused(&self) -> bool {
        EDITOR_FOCUSED.get(self)
    }

    fn set_focused(&self, focused: bool) -> bool {
        EDITOR_FOCUSED.set(self, focused)
    }

    fn connect_focus_changed(&self, on_focus: FocusCallback, context: ObjectId) -> bool {
        Self::STATE_CHANGED.connect(
            self,
            handler(move |_: &TextEditorModel, args: &ChangedArgs| {
                if args.name == EDITOR_FOCUSED.name() {
                    on_focus(args.new_value.as_bool().unwrap_or(false));
                }
            }),
            Some(context),
        )
    }
}

impl Drop for TextEditorModel {
    fn drop(&mut self) {
        clear_signal_data(self.id);
        clear_property_data(self.id);
    }
}

/// Interaction mode of a cell: keyboard goes to the editor or the notebook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CellMode {
    Command,
    Edit,
}

impl CellMode {
    fn from_focus(focused: bool) -> Self {
        if focused {
            CellMode::Edit
        } else {
            CellMode::Command
        }
    }
}

const PROMPT: Property<InputAreaModel, String> =
    Property::new("prompt", String::new).notify(InputAreaModel::STATE_CHANGED);
const COLLAPSED: Property<InputAreaModel, bool> =
    Property::new("collapsed", bool::default).notify(InputAreaModel::STATE_CHANGED);

/// Cell input state layered over an editor.
pub struct InputAreaModel {
    id: ObjectId,
    editor: Box<dyn EditorModel>,
}

impl InputAreaModel {
    pub const STATE_CHANGED: Signal<InputAreaModel, ChangedArgs> = Signal::new("state_changed");
    pub const MODE_CHANGED: Signal<InputAreaModel, CellMode> = Signal::new("mode_changed");

    /// Wraps `editor` and follows its focus so mode changes are reported
    /// no matter who moved the focus.
    pub fn new(editor: Box<dyn EditorModel>) -> Rc<Self> {
        let input = Rc::new(Self {
            id: new_object_id(),
            editor,
        });
        let weak: Weak<Self> = Rc::downgrade(&input);
        let on_focus: FocusCallback = Rc::new(move |focused| {
            if let Some(input) = weak.upgrade() {
                Self::MODE_CHANGED.emit(&input, &CellMode::from_focus(focused));
            }
        });
        if !input.editor.connect_focus_changed(on_focus, input.id) {
            log::warn!(
                "event=focus_subscribe module=editor status=skipped input={}",
                input.id
            );
        }
        input
    }

    pub fn editor(&self) -> &dyn EditorModel {
        self.editor.as_ref()
    }

    pub fn dirty(&self) -> bool {
        self.editor.dirty()
    }

    pub fn set_dirty(&self, dirty: bool) -> bool {
        self.editor.set_dirty(dirty)
    }

    pub fn read_only(&self) -> bool {
        self.editor.read_only()
    }

    pub fn set_read_only(&self, read_only: bool) -> bool {
        self.editor.set_read_only(read_only)
    }

    pub fn mode(&self) -> CellMode {
        CellMode::from_focus(self.editor.focused())
    }

    /// Forwards focus to the editor; the mode change arrives through the
    /// editor's focus subscription.
    pub fn set_focused(&self, focused: bool) -> bool {
        self.editor.set_focused(focused)
    }

    pub fn prompt(&self) -> String {
        PROMPT.get(self)
    }

    pub fn set_prompt(&self, prompt: impl Into<String>) -> bool {
        PROMPT.set(self, prompt.into())
    }

    pub fn collapsed(&self) -> bool {
        COLLAPSED.get(self)
    }

    pub fn set_collapsed(&self, collapsed: bool) -> bool {
        COLLAPSED.set(self, collapsed)
    }
}

impl Identified for InputAreaModel {
    fn object_id(&self) -> ObjectId {
        self.id
    }
}

impl Drop for InputAreaModel {
    fn drop(&mut self) {
        disconnect_receiver(self.id);
        clear_signal_data(self.id);
        clear_property_data(self.id);
    }
}
