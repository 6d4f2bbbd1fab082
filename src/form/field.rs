use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures_timer::Delay;
use gpui::SharedString;

use super::controller::{AutovalidateMode, FieldRegistration, FormController, WeakForm};
use super::error::{FormError, FormResult, read_lock, read_recover, write_lock};
use super::focus::FocusNode;
use super::lifecycle::{FieldPhase, Finalizer};
use super::observable::{Notifier, Observable, Subscription};
use super::registration::{FieldHandle, FormContext};
use super::validation::{AsyncFieldValidator, FieldValidator, FieldValue};

static FIELD_ID_ALLOCATOR: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FieldId(pub u64);

impl FieldId {
    pub fn next() -> Self {
        Self(FIELD_ID_ALLOCATOR.fetch_add(1, Ordering::SeqCst))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FieldOptions {
    /// `None` inherits from the owning form.
    pub autovalidate: Option<AutovalidateMode>,
    /// `None` inherits from the owning form.
    pub enabled: Option<bool>,
    /// `None` inherits from the owning form.
    pub read_only: Option<bool>,
    pub auto_focus: bool,
    pub auto_dispose: bool,
}

impl Default for FieldOptions {
    fn default() -> Self {
        Self {
            autovalidate: None,
            enabled: None,
            read_only: None,
            auto_focus: false,
            auto_dispose: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldSnapshot<T> {
    pub name: SharedString,
    pub value: T,
    pub initial_value: T,
    pub error: Option<SharedString>,
    pub is_dirty: bool,
    pub is_enabled: bool,
    pub is_read_only: bool,
    pub validated_for_submission: bool,
}

pub type BoxedFieldFuture<'a> = Pin<Box<dyn Future<Output = FormResult<bool>> + Send + 'a>>;

/// Validation half of a field: run rules, reset, report state.
///
/// `validate` stores the result but never notifies; callers batch
/// notification.
pub trait Validatable: Send + Sync {
    fn validate(&self, is_submission: bool) -> FormResult<bool>;

    fn validate_async(&self, is_submission: bool) -> BoxedFieldFuture<'_>;

    fn reset(&self) -> FormResult<()>;

    fn error(&self) -> Option<SharedString>;

    fn is_valid(&self) -> bool {
        self.error().is_none()
    }

    fn is_dirty(&self) -> bool;
}

/// What a [`FormController`] needs from each field it owns.
pub trait FormField: Validatable {
    fn id(&self) -> FieldId;

    fn name(&self) -> SharedString;

    fn focus_node(&self) -> FormResult<FocusNode>;

    fn is_auto_focus(&self) -> bool;

    /// Clears the dirty flag and makes the current value the new baseline.
    fn commit_baseline(&self) -> FormResult<()>;

    fn notify_observers(&self);

    fn ref_count(&self) -> usize;

    fn detach(&self) -> FormResult<Finalizer>;
}

#[derive(Clone)]
struct AsyncValidatorEntry<T> {
    debounce: Duration,
    validator: Arc<dyn AsyncFieldValidator<T>>,
}

pub(super) struct FieldState<T> {
    value: T,
    initial_value: T,
    baseline: T,
    error: Option<SharedString>,
    is_dirty: bool,
    enabled: Option<bool>,
    read_only: Option<bool>,
    autovalidate: Option<AutovalidateMode>,
    inherited_autovalidate: Option<AutovalidateMode>,
    auto_focus: bool,
    pub(super) auto_dispose: bool,
    pub(super) focus: Option<FocusNode>,
    pub(super) focus_subscription: Option<Subscription>,
    owner: Option<WeakForm>,
    pub(super) registration: Option<FieldRegistration>,
    form_is_set: bool,
    pub(super) ref_count: usize,
    pub(super) phase: FieldPhase,
    validated_for_submission: bool,
    validation_ticket: u64,
}

impl<T> FieldState<T> {
    fn effective_autovalidate(&self) -> AutovalidateMode {
        self.autovalidate
            .or(self.inherited_autovalidate)
            .unwrap_or_default()
    }

    fn focus_node(&mut self) -> FocusNode {
        self.focus.get_or_insert_with(FocusNode::new).clone()
    }
}

pub(super) struct FieldInner<T> {
    pub(super) id: FieldId,
    pub(super) name: SharedString,
    pub(super) state: RwLock<FieldState<T>>,
    validators: RwLock<Vec<Arc<dyn FieldValidator<T>>>>,
    async_validators: RwLock<Vec<AsyncValidatorEntry<T>>>,
    pub(super) notifier: Notifier,
}

/// Observable state of one input: value, validation result, dirty tracking
/// and enable/read-only overrides.
pub struct FieldController<T> {
    pub(super) inner: Arc<FieldInner<T>>,
}

impl<T> Clone for FieldController<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: FieldValue> FieldController<T> {
    pub fn new(name: impl Into<SharedString>, initial: T) -> Self {
        Self::with_options(name, initial, FieldOptions::default())
    }

    pub fn with_options(name: impl Into<SharedString>, initial: T, options: FieldOptions) -> Self {
        Self {
            inner: Arc::new(FieldInner {
                id: FieldId::next(),
                name: name.into(),
                state: RwLock::new(FieldState {
                    value: initial.clone(),
                    initial_value: initial.clone(),
                    baseline: initial,
                    error: None,
                    is_dirty: false,
                    enabled: options.enabled,
                    read_only: options.read_only,
                    autovalidate: options.autovalidate,
                    inherited_autovalidate: None,
                    auto_focus: options.auto_focus,
                    auto_dispose: options.auto_dispose,
                    focus: None,
                    focus_subscription: None,
                    owner: None,
                    registration: None,
                    form_is_set: false,
                    ref_count: 0,
                    phase: FieldPhase::Active,
                    validated_for_submission: false,
                    validation_ticket: 0,
                }),
                validators: RwLock::new(Vec::new()),
                async_validators: RwLock::new(Vec::new()),
                notifier: Notifier::new(),
            }),
        }
    }

    pub fn id(&self) -> FieldId {
        self.inner.id
    }

    pub fn name(&self) -> SharedString {
        self.inner.name.clone()
    }

    /// Rules run in registration order; the first failure wins.
    pub fn register_validator<V>(&self, validator: V) -> FormResult<()>
    where
        V: FieldValidator<T> + 'static,
    {
        let mut validators = write_lock(&self.inner.validators, "registering field validator")?;
        validators.push(Arc::new(validator));
        Ok(())
    }

    pub fn register_async_validator<V>(&self, validator: V) -> FormResult<()>
    where
        V: AsyncFieldValidator<T> + 'static,
    {
        self.register_async_validator_with_debounce(0, validator)
    }

    pub fn register_async_validator_with_debounce<V>(
        &self,
        debounce_ms: u64,
        validator: V,
    ) -> FormResult<()>
    where
        V: AsyncFieldValidator<T> + 'static,
    {
        let mut validators = write_lock(
            &self.inner.async_validators,
            "registering async field validator",
        )?;
        validators.push(AsyncValidatorEntry {
            debounce: Duration::from_millis(debounce_ms),
            validator: Arc::new(validator),
        });
        Ok(())
    }

    pub fn value(&self) -> FormResult<T> {
        Ok(read_lock(&self.inner.state, "reading field value")?
            .value
            .clone())
    }

    pub fn initial_value(&self) -> FormResult<T> {
        Ok(read_lock(&self.inner.state, "reading initial value")?
            .initial_value
            .clone())
    }

    pub fn error(&self) -> Option<SharedString> {
        read_recover(&self.inner.state).error.clone()
    }

    pub fn is_valid(&self) -> bool {
        read_recover(&self.inner.state).error.is_none()
    }

    pub fn is_dirty(&self) -> bool {
        read_recover(&self.inner.state).is_dirty
    }

    pub fn owner(&self) -> Option<FormController> {
        read_recover(&self.inner.state)
            .owner
            .as_ref()
            .and_then(WeakForm::upgrade)
    }

    pub fn is_enabled(&self) -> FormResult<bool> {
        let (explicit, owner) = {
            let state = read_lock(&self.inner.state, "reading field enabled")?;
            (state.enabled, state.owner.clone())
        };
        if let Some(enabled) = explicit {
            return Ok(enabled);
        }
        match owner.as_ref().and_then(WeakForm::upgrade) {
            Some(form) => form.is_enabled(),
            None => Ok(true),
        }
    }

    pub fn is_read_only(&self) -> FormResult<bool> {
        let (explicit, owner) = {
            let state = read_lock(&self.inner.state, "reading field read-only")?;
            (state.read_only, state.owner.clone())
        };
        if let Some(read_only) = explicit {
            return Ok(read_only);
        }
        match owner.as_ref().and_then(WeakForm::upgrade) {
            Some(form) => form.is_read_only(),
            None => Ok(false),
        }
    }

    pub fn autovalidate_mode(&self) -> FormResult<AutovalidateMode> {
        Ok(read_lock(&self.inner.state, "reading field autovalidate mode")?
            .effective_autovalidate())
    }

    pub fn snapshot(&self) -> FormResult<FieldSnapshot<T>> {
        let is_enabled = self.is_enabled()?;
        let is_read_only = self.is_read_only()?;
        let state = read_lock(&self.inner.state, "creating field snapshot")?;
        Ok(FieldSnapshot {
            name: self.inner.name.clone(),
            value: state.value.clone(),
            initial_value: state.initial_value.clone(),
            error: state.error.clone(),
            is_dirty: state.is_dirty,
            is_enabled,
            is_read_only,
            validated_for_submission: state.validated_for_submission,
        })
    }

    /// Stores a new value, updates dirtiness and, depending on the effective
    /// autovalidate mode, validates. Observers are always notified.
    pub fn set_value(&self, value: T) -> FormResult<()> {
        if let Some(mode) = self.apply_value(value)? {
            if validates_on_change(mode) {
                let _ = self.validate(false)?;
            }
        }
        self.inner.notifier.notify();
        Ok(())
    }

    /// [`FieldController::set_value`] followed by async validators when the
    /// effective mode validates on change.
    pub async fn set_value_async(&self, value: T) -> FormResult<()> {
        if let Some(mode) = self.apply_value(value)? {
            if validates_on_change(mode) {
                let _ = self.validate_async(false).await?;
            }
        }
        self.inner.notifier.notify();
        Ok(())
    }

    /// Returns the effective mode when the content changed, `None` when the
    /// new value equals the stored one.
    fn apply_value(&self, value: T) -> FormResult<Option<AutovalidateMode>> {
        let mut state = write_lock(&self.inner.state, "writing field value")?;
        self.ensure_active(&state)?;
        if state.value == value {
            return Ok(None);
        }
        state.value = value;
        state.is_dirty = !state.value.same_content(&state.baseline);
        tracing::trace!(field = %self.inner.name, dirty = state.is_dirty, "field value changed");
        Ok(Some(state.effective_autovalidate()))
    }

    pub fn validate(&self, is_submission: bool) -> FormResult<bool> {
        let value = {
            let state = read_lock(&self.inner.state, "reading value for validation")?;
            self.ensure_active(&state)?;
            state.value.clone()
        };
        let validators = read_lock(&self.inner.validators, "reading field validators")?.clone();
        let error = validators
            .iter()
            .find_map(|validator| validator.validate(&value));

        let mut state = write_lock(&self.inner.state, "writing validation result")?;
        tracing::trace!(field = %self.inner.name, ?error, is_submission, "field validated");
        state.error = error;
        state.validated_for_submission = is_submission;
        Ok(state.error.is_none())
    }

    /// Sync validators first; async validators only run when those pass.
    /// A newer validation run supersedes an older one still waiting.
    pub async fn validate_async(&self, is_submission: bool) -> FormResult<bool> {
        if !self.validate(is_submission)? {
            return Ok(false);
        }
        let entries = read_lock(&self.inner.async_validators, "reading async validators")?.clone();
        if entries.is_empty() {
            return Ok(true);
        }

        let (ticket, value) = {
            let mut state = write_lock(&self.inner.state, "starting async validation")?;
            state.validation_ticket += 1;
            (state.validation_ticket, state.value.clone())
        };

        for entry in entries {
            if !entry.debounce.is_zero() {
                Delay::new(entry.debounce).await;
                if !self.is_latest_ticket(ticket)? {
                    return Ok(self.is_valid());
                }
            }
            let result = entry.validator.validate(value.clone()).await;

            let mut state = write_lock(&self.inner.state, "finishing async validation")?;
            if state.validation_ticket != ticket {
                return Ok(state.error.is_none());
            }
            if let Some(error) = result {
                tracing::trace!(field = %self.inner.name, %error, "async validation failed");
                state.error = Some(error);
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn is_latest_ticket(&self, ticket: u64) -> FormResult<bool> {
        let state = read_lock(&self.inner.state, "checking latest validation ticket")?;
        Ok(state.validation_ticket == ticket)
    }

    /// Restores the initial value, clears error and dirtiness, and requests
    /// focus again when this field is the auto-focus target.
    pub fn reset(&self) -> FormResult<()> {
        let focus = {
            let mut state = write_lock(&self.inner.state, "resetting field")?;
            self.ensure_active(&state)?;
            state.value = state.initial_value.clone();
            state.baseline = state.initial_value.clone();
            state.error = None;
            state.is_dirty = false;
            state.validated_for_submission = false;
            state.validation_ticket += 1;
            state.auto_focus.then(|| state.focus_node())
        };
        if let Some(focus) = focus {
            focus.request_focus()?;
        }
        self.inner.notifier.notify();
        Ok(())
    }

    /// Sets an error from outside the validators, e.g. a server response.
    pub fn set_error(&self, error: Option<SharedString>) -> FormResult<()> {
        {
            let mut state = write_lock(&self.inner.state, "setting field error")?;
            self.ensure_active(&state)?;
            state.error = error;
        }
        self.inner.notifier.notify();
        Ok(())
    }

    pub fn commit_baseline(&self) -> FormResult<()> {
        let mut state = write_lock(&self.inner.state, "committing field baseline")?;
        self.ensure_active(&state)?;
        state.baseline = state.value.clone();
        state.is_dirty = false;
        Ok(())
    }

    pub fn set_enabled(&self, enabled: Option<bool>) -> FormResult<()> {
        {
            let mut state = write_lock(&self.inner.state, "setting field enabled")?;
            self.ensure_active(&state)?;
            state.enabled = enabled;
        }
        self.inner.notifier.notify();
        Ok(())
    }

    pub fn set_read_only(&self, read_only: Option<bool>) -> FormResult<()> {
        {
            let mut state = write_lock(&self.inner.state, "setting field read-only")?;
            self.ensure_active(&state)?;
            state.read_only = read_only;
        }
        self.inner.notifier.notify();
        Ok(())
    }

    pub fn set_autovalidate(&self, mode: Option<AutovalidateMode>) -> FormResult<()> {
        let in_form = {
            let mut state = write_lock(&self.inner.state, "setting field autovalidate mode")?;
            self.ensure_active(&state)?;
            state.autovalidate = mode;
            state.owner.is_some()
        };
        if in_form {
            self.ensure_focus_validation()?;
        }
        Ok(())
    }

    pub fn focus_node(&self) -> FormResult<FocusNode> {
        let mut state = write_lock(&self.inner.state, "creating focus node")?;
        self.ensure_active(&state)?;
        Ok(state.focus_node())
    }

    pub fn is_auto_focus(&self) -> bool {
        read_recover(&self.inner.state).auto_focus
    }

    /// Attaches the field to the form occupying `context`'s registration
    /// slot, if any. Only the first call reads the slot; later calls are
    /// no-ops, so a field never changes owner.
    ///
    /// Inside a form, a field without an explicit autovalidate mode resolves
    /// to `Always` when the form is in `Always` mode and to `OnFocusLoss`
    /// otherwise.
    pub fn materialize(&self, context: &FormContext) -> FormResult<()> {
        {
            let mut state = write_lock(&self.inner.state, "materializing field")?;
            self.ensure_active(&state)?;
            if state.form_is_set {
                return Ok(());
            }
            state.form_is_set = true;
        }

        let Some(form) = context.current_form()? else {
            tracing::trace!(field = %self.inner.name, "materialized outside of a form");
            return Ok(());
        };
        let registration = form.add_field(Arc::new(self.clone()))?;
        let form_mode = form.autovalidate_mode()?;
        {
            let mut state = write_lock(&self.inner.state, "binding field to form")?;
            state.owner = Some(form.downgrade());
            state.registration = Some(registration);
            if state.autovalidate.is_none() {
                state.inherited_autovalidate = Some(match form_mode {
                    AutovalidateMode::Always => AutovalidateMode::Always,
                    _ => AutovalidateMode::OnFocusLoss,
                });
            }
        }
        tracing::debug!(form = form.id().0, field = %self.inner.name, "field materialized");
        self.ensure_focus_validation()
    }

    fn ensure_focus_validation(&self) -> FormResult<()> {
        let node = {
            let mut state = write_lock(&self.inner.state, "wiring focus validation")?;
            if state.focus_subscription.is_some()
                || state.effective_autovalidate() != AutovalidateMode::OnFocusLoss
            {
                return Ok(());
            }
            state.focus_node()
        };

        let weak = Arc::downgrade(&self.inner);
        let subscription = node.add_focus_listener(move |focused| {
            if focused {
                return;
            }
            if let Some(inner) = weak.upgrade() {
                FieldController { inner }.validate_on_focus_loss();
            }
        })?;
        write_lock(&self.inner.state, "storing focus subscription")?.focus_subscription =
            Some(subscription);
        Ok(())
    }

    fn validate_on_focus_loss(&self) {
        let applies = self.inner.state.read().is_ok_and(|state| {
            state.phase == FieldPhase::Active
                && state.effective_autovalidate() == AutovalidateMode::OnFocusLoss
        });
        if !applies {
            return;
        }
        match self.validate(false) {
            Ok(_) => self.inner.notifier.notify(),
            Err(error) => {
                tracing::warn!(field = %self.inner.name, %error, "focus-loss validation failed")
            }
        }
    }

    pub(super) fn check_active(&self) -> FormResult<()> {
        let state = read_lock(&self.inner.state, "checking field phase")?;
        self.ensure_active(&state)
    }

    pub(super) fn ensure_active(&self, state: &FieldState<T>) -> FormResult<()> {
        if state.phase != FieldPhase::Active {
            return Err(FormError::FieldDisposed(self.inner.name.clone()));
        }
        Ok(())
    }
}

fn validates_on_change(mode: AutovalidateMode) -> bool {
    matches!(
        mode,
        AutovalidateMode::OnUserInteraction | AutovalidateMode::Always
    )
}

impl<T: FieldValue> Validatable for FieldController<T> {
    fn validate(&self, is_submission: bool) -> FormResult<bool> {
        FieldController::validate(self, is_submission)
    }

    fn validate_async(&self, is_submission: bool) -> BoxedFieldFuture<'_> {
        Box::pin(FieldController::validate_async(self, is_submission))
    }

    fn reset(&self) -> FormResult<()> {
        FieldController::reset(self)
    }

    fn error(&self) -> Option<SharedString> {
        FieldController::error(self)
    }

    fn is_dirty(&self) -> bool {
        FieldController::is_dirty(self)
    }
}

impl<T: FieldValue> FormField for FieldController<T> {
    fn id(&self) -> FieldId {
        self.inner.id
    }

    fn name(&self) -> SharedString {
        self.inner.name.clone()
    }

    fn focus_node(&self) -> FormResult<FocusNode> {
        FieldController::focus_node(self)
    }

    fn is_auto_focus(&self) -> bool {
        FieldController::is_auto_focus(self)
    }

    fn commit_baseline(&self) -> FormResult<()> {
        FieldController::commit_baseline(self)
    }

    fn notify_observers(&self) {
        self.inner.notifier.notify();
    }

    fn ref_count(&self) -> usize {
        FieldController::ref_count(self)
    }

    fn detach(&self) -> FormResult<Finalizer> {
        FieldController::detach(self)
    }
}

impl<T: FieldValue> FieldHandle for FieldController<T> {
    fn name(&self) -> SharedString {
        self.inner.name.clone()
    }

    fn materialize(&self, context: &FormContext) -> FormResult<()> {
        FieldController::materialize(self, context)
    }

    fn retain(&self) -> FormResult<usize> {
        FieldController::retain(self)
    }

    fn release(&self) -> FormResult<Option<Finalizer>> {
        FieldController::release(self)
    }
}

impl<T: FieldValue> Observable for FieldController<T> {
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

impl<T: FieldValue + std::fmt::Debug> std::fmt::Debug for FieldController<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = read_recover(&self.inner.state);
        f.debug_struct("FieldController")
            .field("name", &self.inner.name)
            .field("value", &state.value)
            .field("error", &state.error)
            .field("dirty", &state.is_dirty)
            .finish_non_exhaustive()
    }
}
