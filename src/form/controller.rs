use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use gpui::SharedString;

use super::error::{FormError, FormResult, read_lock, write_lock};
use super::field::{FieldId, FormField, Validatable};
use super::lifecycle::Finalizer;
use super::observable::{Notifier, Observable, Subscription};
use super::submission::{SubmissionState, SubmitAction, SubmitPhase, transition_submission};

static FORM_ID_ALLOCATOR: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FormId(pub u64);

impl FormId {
    pub fn next() -> Self {
        Self(FORM_ID_ALLOCATOR.fetch_add(1, Ordering::SeqCst))
    }
}

/// When a field re-runs its validators without an explicit `validate` call.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum AutovalidateMode {
    #[default]
    Disabled,
    /// Validate on every content change.
    OnUserInteraction,
    /// Validate when the field loses focus.
    OnFocusLoss,
    /// Validate on every content change and after every form reset.
    Always,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FormOptions {
    pub autovalidate_mode: AutovalidateMode,
    pub auto_focus_on_first_error: bool,
    /// Construction-time enable override, restored by `reset`.
    pub enabled: Option<bool>,
    /// Construction-time read-only override, restored by `reset`.
    pub read_only: Option<bool>,
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            autovalidate_mode: AutovalidateMode::Disabled,
            auto_focus_on_first_error: true,
            enabled: None,
            read_only: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FormSnapshot {
    pub id: FormId,
    pub submission: SubmissionState,
    pub submit_count: u32,
    pub is_valid: bool,
    pub is_dirty: bool,
    pub is_enabled: bool,
    pub is_read_only: bool,
    pub autovalidate_mode: AutovalidateMode,
    pub field_names: Vec<SharedString>,
}

pub(super) struct FormState {
    pub(super) options: FormOptions,
    pub(super) autovalidate_mode: AutovalidateMode,
    pub(super) fields: Vec<Arc<dyn FormField>>,
    pub(super) enabled: Option<bool>,
    pub(super) read_only: Option<bool>,
    pub(super) submission: SubmissionState,
    pub(super) submit_count: u32,
    pub(super) submit_action: Option<SubmitAction>,
    /// Held from the start of `submit` (before validation) until it returns.
    pub(super) submit_in_flight: bool,
    pub(super) disposed: bool,
}

pub(super) struct FormInner {
    pub(super) id: FormId,
    pub(super) state: RwLock<FormState>,
    pub(super) notifier: Notifier,
}

/// Owns an ordered set of fields and the submission state machine.
///
/// Fields are kept in registration order; validation, reset and
/// focus-on-first-error all walk them in that order.
#[derive(Clone)]
pub struct FormController {
    pub(super) inner: Arc<FormInner>,
}

/// Non-owning reference to a form, held by fields and retry handles.
#[derive(Clone)]
pub struct WeakForm {
    id: FormId,
    inner: Weak<FormInner>,
}

impl WeakForm {
    pub fn id(&self) -> FormId {
        self.id
    }

    pub fn upgrade(&self) -> Option<FormController> {
        self.inner.upgrade().map(|inner| FormController { inner })
    }
}

/// Returned by [`FormController::add_field`]; removes the field again.
#[derive(Clone)]
pub struct FieldRegistration {
    form: WeakForm,
    field: FieldId,
    removed: Arc<AtomicBool>,
}

impl FieldRegistration {
    pub fn field_id(&self) -> FieldId {
        self.field
    }

    pub fn form_id(&self) -> FormId {
        self.form.id()
    }

    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::SeqCst)
    }

    /// Safe to call more than once and after the field left the form by
    /// other means. Returns whether this call removed it.
    pub fn remove(&self) -> FormResult<bool> {
        if self.removed.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }
        match self.form.upgrade() {
            Some(form) => form.remove_field(self.field),
            None => Ok(false),
        }
    }
}

impl FormController {
    pub fn new(options: FormOptions) -> Self {
        let id = FormId::next();
        tracing::debug!(form = id.0, ?options, "form created");
        Self {
            inner: Arc::new(FormInner {
                id,
                state: RwLock::new(FormState {
                    options,
                    autovalidate_mode: options.autovalidate_mode,
                    fields: Vec::new(),
                    enabled: options.enabled,
                    read_only: options.read_only,
                    submission: SubmissionState::Idle,
                    submit_count: 0,
                    submit_action: None,
                    submit_in_flight: false,
                    disposed: false,
                }),
                notifier: Notifier::new(),
            }),
        }
    }

    pub fn id(&self) -> FormId {
        self.inner.id
    }

    pub fn downgrade(&self) -> WeakForm {
        WeakForm {
            id: self.inner.id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn options(&self) -> FormResult<FormOptions> {
        Ok(read_lock(&self.inner.state, "reading form options")?.options)
    }

    /// Default action used by `submit(None)`.
    pub fn set_submit_action(&self, action: SubmitAction) -> FormResult<()> {
        let mut state = write_lock(&self.inner.state, "setting submit action")?;
        self.ensure_active(&state)?;
        state.submit_action = Some(action);
        Ok(())
    }

    pub fn add_field(&self, field: Arc<dyn FormField>) -> FormResult<FieldRegistration> {
        let field_id = field.id();
        {
            let mut state = write_lock(&self.inner.state, "adding field")?;
            self.ensure_active(&state)?;
            if !state.fields.iter().any(|existing| existing.id() == field_id) {
                tracing::debug!(form = self.inner.id.0, field = %field.name(), "field added");
                state.fields.push(field);
            }
        }
        Ok(FieldRegistration {
            form: self.downgrade(),
            field: field_id,
            removed: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn remove_field(&self, field: FieldId) -> FormResult<bool> {
        let mut state = write_lock(&self.inner.state, "removing field")?;
        let before = state.fields.len();
        state.fields.retain(|existing| existing.id() != field);
        let removed = state.fields.len() != before;
        if removed {
            tracing::debug!(form = self.inner.id.0, field = field.0, "field removed");
        }
        Ok(removed)
    }

    pub fn fields(&self) -> FormResult<Vec<Arc<dyn FormField>>> {
        Ok(read_lock(&self.inner.state, "reading fields")?
            .fields
            .clone())
    }

    pub fn field_count(&self) -> FormResult<usize> {
        Ok(read_lock(&self.inner.state, "counting fields")?.fields.len())
    }

    /// Runs every field's validators, in registration order, without
    /// stopping at the first failure. Field observers are notified so all
    /// errors become visible at once.
    pub fn validate(&self) -> FormResult<bool> {
        let fields = self.active_fields("validating form")?;
        let mut first_invalid = None;
        for field in &fields {
            if !field.validate(true)? && first_invalid.is_none() {
                first_invalid = Some(field.clone());
            }
        }
        self.finish_validation(&fields, first_invalid)
    }

    /// Like [`FormController::validate`], including async validators of
    /// fields whose sync validators passed.
    pub async fn validate_async(&self) -> FormResult<bool> {
        let fields = self.active_fields("validating form asynchronously")?;
        let mut first_invalid = None;
        for field in &fields {
            if !field.validate_async(true).await? && first_invalid.is_none() {
                first_invalid = Some(field.clone());
            }
        }
        self.finish_validation(&fields, first_invalid)
    }

    fn finish_validation(
        &self,
        fields: &[Arc<dyn FormField>],
        first_invalid: Option<Arc<dyn FormField>>,
    ) -> FormResult<bool> {
        for field in fields {
            field.notify_observers();
        }
        let Some(first_invalid) = first_invalid else {
            tracing::trace!(form = self.inner.id.0, "form valid");
            return Ok(true);
        };
        tracing::trace!(
            form = self.inner.id.0,
            field = %first_invalid.name(),
            "form invalid"
        );
        if self.options()?.auto_focus_on_first_error {
            first_invalid.focus_node()?.request_focus()?;
        }
        Ok(false)
    }

    pub fn is_valid(&self) -> FormResult<bool> {
        Ok(self.fields()?.iter().all(|field| field.is_valid()))
    }

    pub fn is_dirty(&self) -> FormResult<bool> {
        Ok(self.fields()?.iter().any(|field| field.is_dirty()))
    }

    pub fn first_error_field(&self) -> FormResult<Option<Arc<dyn FormField>>> {
        Ok(self
            .fields()?
            .into_iter()
            .find(|field| field.error().is_some()))
    }

    /// Requests focus on the first field carrying an error, whoever set it.
    pub fn focus_first_error(&self) -> FormResult<bool> {
        let Some(field) = self.first_error_field()? else {
            return Ok(false);
        };
        field.focus_node()?.request_focus()?;
        Ok(true)
    }

    /// The first registered field flagged for auto focus.
    pub fn auto_focus_field(&self) -> FormResult<Option<Arc<dyn FormField>>> {
        Ok(self
            .fields()?
            .into_iter()
            .find(|field| field.is_auto_focus()))
    }

    /// Fails with [`FormError::AlreadySubmitting`] while a submission is in
    /// flight; the running submission owns the submission state until it
    /// completes.
    pub fn reset(&self) -> FormResult<()> {
        let fields = {
            let state = read_lock(&self.inner.state, "resetting form")?;
            self.ensure_active(&state)?;
            ensure_not_submitting(&state)?;
            state.fields.clone()
        };
        for field in &fields {
            field.reset()?;
        }
        if let Some(field) = fields.iter().find(|field| field.is_auto_focus()) {
            field.focus_node()?.request_focus()?;
        }

        let mode = {
            let mut state = write_lock(&self.inner.state, "restoring form overrides")?;
            ensure_not_submitting(&state)?;
            state.enabled = state.options.enabled;
            state.read_only = state.options.read_only;
            transition_submission(&mut state, SubmissionState::Idle)?;
            state.autovalidate_mode
        };
        tracing::debug!(form = self.inner.id.0, "form reset");

        if mode == AutovalidateMode::Always {
            let _ = self.validate()?;
        }
        self.inner.notifier.notify();
        Ok(())
    }

    pub fn is_enabled(&self) -> FormResult<bool> {
        Ok(read_lock(&self.inner.state, "reading form enabled")?
            .enabled
            .unwrap_or(true))
    }

    pub fn is_read_only(&self) -> FormResult<bool> {
        Ok(read_lock(&self.inner.state, "reading form read-only")?
            .read_only
            .unwrap_or(false))
    }

    pub fn set_enabled(&self, enabled: bool) -> FormResult<()> {
        {
            let mut state = write_lock(&self.inner.state, "setting form enabled")?;
            self.ensure_active(&state)?;
            state.enabled = Some(enabled);
        }
        self.notify_all()
    }

    pub fn set_read_only(&self, read_only: bool) -> FormResult<()> {
        {
            let mut state = write_lock(&self.inner.state, "setting form read-only")?;
            self.ensure_active(&state)?;
            state.read_only = Some(read_only);
        }
        self.notify_all()
    }

    pub fn autovalidate_mode(&self) -> FormResult<AutovalidateMode> {
        Ok(read_lock(&self.inner.state, "reading autovalidate mode")?.autovalidate_mode)
    }

    /// Affects fields materialized from now on and the reset behavior.
    pub fn set_autovalidate_mode(&self, mode: AutovalidateMode) -> FormResult<()> {
        let mut state = write_lock(&self.inner.state, "setting autovalidate mode")?;
        self.ensure_active(&state)?;
        state.autovalidate_mode = mode;
        Ok(())
    }

    pub fn submission_state(&self) -> FormResult<SubmissionState> {
        Ok(read_lock(&self.inner.state, "reading submission state")?
            .submission
            .clone())
    }

    pub fn submit_phase(&self) -> FormResult<SubmitPhase> {
        Ok(read_lock(&self.inner.state, "reading submit phase")?
            .submission
            .phase())
    }

    pub fn submit_count(&self) -> FormResult<u32> {
        Ok(read_lock(&self.inner.state, "reading submit count")?.submit_count)
    }

    pub fn snapshot(&self) -> FormResult<FormSnapshot> {
        let fields = self.fields()?;
        let state = read_lock(&self.inner.state, "creating form snapshot")?;
        Ok(FormSnapshot {
            id: self.inner.id,
            submission: state.submission.clone(),
            submit_count: state.submit_count,
            is_valid: fields.iter().all(|field| field.is_valid()),
            is_dirty: fields.iter().any(|field| field.is_dirty()),
            is_enabled: state.enabled.unwrap_or(true),
            is_read_only: state.read_only.unwrap_or(false),
            autovalidate_mode: state.autovalidate_mode,
            field_names: fields.iter().map(|field| field.name()).collect(),
        })
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.state.read().map_or(true, |state| state.disposed)
    }

    /// Tears the form down. Fields nobody retains any more are detached; their
    /// finalizers are returned for the host to run after the current
    /// dispatch cycle.
    pub fn dispose(&self) -> FormResult<Vec<Finalizer>> {
        let fields = {
            let mut state = write_lock(&self.inner.state, "disposing form")?;
            self.ensure_active(&state)?;
            state.disposed = true;
            state.submit_action = None;
            std::mem::take(&mut state.fields)
        };
        self.inner.notifier.close();

        let mut finalizers = Vec::new();
        for field in fields {
            if field.ref_count() == 0 {
                finalizers.push(field.detach()?);
            }
        }
        tracing::debug!(
            form = self.inner.id.0,
            detached = finalizers.len(),
            "form disposed"
        );
        Ok(finalizers)
    }

    pub(super) fn ensure_active(&self, state: &FormState) -> FormResult<()> {
        if state.disposed {
            return Err(FormError::FormDisposed(self.inner.id));
        }
        Ok(())
    }

    fn active_fields(&self, context: &'static str) -> FormResult<Vec<Arc<dyn FormField>>> {
        let state = read_lock(&self.inner.state, context)?;
        self.ensure_active(&state)?;
        Ok(state.fields.clone())
    }

    fn notify_all(&self) -> FormResult<()> {
        self.inner.notifier.notify();
        for field in self.fields()? {
            field.notify_observers();
        }
        Ok(())
    }
}

fn ensure_not_submitting(state: &FormState) -> FormResult<()> {
    if state.submit_in_flight {
        return Err(FormError::AlreadySubmitting);
    }
    Ok(())
}

impl Observable for FormController {
    fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.inner.notifier.subscribe(move |_: &()| listener())
    }

    fn notify(&self) {
        self.inner.notifier.notify();
    }

    fn listener_count(&self) -> usize {
        self.inner.notifier.listener_count()
    }
}

impl std::fmt::Debug for FormController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormController")
            .field("id", &self.inner.id)
            .finish_non_exhaustive()
    }
}
