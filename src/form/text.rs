use std::sync::{Arc, RwLock};

use gpui::SharedString;

use super::controller::AutovalidateMode;
use super::error::{FormResult, read_lock, write_lock};
use super::field::{FieldController, FieldOptions};
use super::focus::FocusNode;
use super::lifecycle::Finalizer;
use super::observable::{Observable, Subscription};
use super::registration::{FieldHandle, FormContext};
use super::validation::FieldValidator;

/// Char offsets into a text value. Passed through untouched apart from
/// clamping to the text length.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct TextRange {
    pub start: usize,
    pub end: usize,
}

impl TextRange {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub const fn collapsed(offset: usize) -> Self {
        Self::new(offset, offset)
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }

    pub fn clamp(self, len: usize) -> Self {
        let start = self.start.min(len);
        Self::new(start, self.end.min(len).max(start))
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TextEditingValue {
    pub text: String,
    pub selection: TextRange,
    pub composing: Option<TextRange>,
}

impl TextEditingValue {
    /// Caret collapsed at the end, nothing composing.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let end = text.chars().count();
        Self {
            text,
            selection: TextRange::collapsed(end),
            composing: None,
        }
    }

    pub fn with_selection(mut self, selection: TextRange) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_composing(mut self, composing: Option<TextRange>) -> Self {
        self.composing = composing;
        self
    }
}

#[derive(Default)]
struct EditingRanges {
    selection: TextRange,
    composing: Option<TextRange>,
}

/// Text specialisation of [`FieldController`].
///
/// Keeps the selection and composing ranges of the text control next to the
/// field's value. Updates that leave the text unchanged only notify, so a
/// caret move never counts as an edit.
#[derive(Clone)]
pub struct TextFieldController {
    field: FieldController<String>,
    ranges: Arc<RwLock<EditingRanges>>,
}

impl TextFieldController {
    pub fn new(name: impl Into<SharedString>, initial: impl Into<String>) -> Self {
        Self::with_options(name, initial, FieldOptions::default())
    }

    pub fn with_options(
        name: impl Into<SharedString>,
        initial: impl Into<String>,
        options: FieldOptions,
    ) -> Self {
        let initial = initial.into();
        let end = initial.chars().count();
        Self {
            field: FieldController::with_options(name, initial, options),
            ranges: Arc::new(RwLock::new(EditingRanges {
                selection: TextRange::collapsed(end),
                composing: None,
            })),
        }
    }

    pub fn field(&self) -> &FieldController<String> {
        &self.field
    }

    pub fn name(&self) -> SharedString {
        self.field.name()
    }

    pub fn text(&self) -> FormResult<String> {
        self.field.value()
    }

    pub fn editing_value(&self) -> FormResult<TextEditingValue> {
        let text = self.field.value()?;
        let len = text.chars().count();
        let ranges = read_lock(&self.ranges, "reading editing ranges")?;
        Ok(TextEditingValue {
            text,
            selection: ranges.selection.clamp(len),
            composing: ranges.composing.map(|range| range.clamp(len)),
        })
    }

    pub fn selection(&self) -> FormResult<TextRange> {
        Ok(self.editing_value()?.selection)
    }

    /// Replaces the text programmatically, leaving the caret at the end.
    pub fn set_text(&self, text: impl Into<String>) -> FormResult<()> {
        self.update_editing_value(TextEditingValue::new(text))
    }

    /// Entry point for the text control. Content changes go through the
    /// field's dirty/validation pipeline; selection or composing changes
    /// alone only notify observers.
    pub fn update_editing_value(&self, value: TextEditingValue) -> FormResult<()> {
        self.field.check_active()?;
        let current = self.field.value()?;
        {
            let mut ranges = write_lock(&self.ranges, "writing editing ranges")?;
            ranges.selection = value.selection;
            ranges.composing = value.composing;
        }
        if value.text == current {
            tracing::trace!(field = %self.field.name(), "selection-only change");
            self.field.notify();
            return Ok(());
        }
        self.field.set_value(value.text)
    }

    pub fn register_validator<V>(&self, validator: V) -> FormResult<()>
    where
        V: FieldValidator<String> + 'static,
    {
        self.field.register_validator(validator)
    }

    pub fn validate(&self, is_submission: bool) -> FormResult<bool> {
        self.field.validate(is_submission)
    }

    pub fn reset(&self) -> FormResult<()> {
        {
            let initial_len = self.field.initial_value()?.chars().count();
            let mut ranges = write_lock(&self.ranges, "resetting editing ranges")?;
            ranges.selection = TextRange::collapsed(initial_len);
            ranges.composing = None;
        }
        self.field.reset()
    }

    pub fn error(&self) -> Option<SharedString> {
        self.field.error()
    }

    pub fn is_valid(&self) -> bool {
        self.field.is_valid()
    }

    pub fn is_dirty(&self) -> bool {
        self.field.is_dirty()
    }

    pub fn is_enabled(&self) -> FormResult<bool> {
        self.field.is_enabled()
    }

    pub fn is_read_only(&self) -> FormResult<bool> {
        self.field.is_read_only()
    }

    pub fn set_error(&self, error: Option<SharedString>) -> FormResult<()> {
        self.field.set_error(error)
    }

    pub fn set_autovalidate(&self, mode: Option<AutovalidateMode>) -> FormResult<()> {
        self.field.set_autovalidate(mode)
    }

    pub fn focus_node(&self) -> FormResult<FocusNode> {
        self.field.focus_node()
    }

    pub fn materialize(&self, context: &FormContext) -> FormResult<()> {
        self.field.materialize(context)
    }
}

impl FieldHandle for TextFieldController {
    fn name(&self) -> SharedString {
        self.field.name()
    }

    fn materialize(&self, context: &FormContext) -> FormResult<()> {
        self.field.materialize(context)
    }

    fn retain(&self) -> FormResult<usize> {
        self.field.retain()
    }

    fn release(&self) -> FormResult<Option<Finalizer>> {
        self.field.release()
    }
}

impl Observable for TextFieldController {
    fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.field.subscribe(listener)
    }

    fn notify(&self) {
        self.field.notify();
    }

    fn listener_count(&self) -> usize {
        self.field.listener_count()
    }
}
