use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use gpui::SharedString;

use super::controller::{FormController, FormState, WeakForm};
use super::error::{FormError, FormResult, write_lock, write_recover};
use super::field::FormField;
use super::observable::Observable;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SubmitPhase {
    Idle,
    Submitting,
    Succeeded,
    Failed,
}

/// Failure raised by a submit action. Carried by
/// [`SubmissionState::Failed`] instead of being propagated.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SubmitError {
    message: SharedString,
}

impl SubmitError {
    pub fn new(message: impl Into<SharedString>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn from_error(error: &dyn std::error::Error) -> Self {
        Self::new(error.to_string())
    }

    pub fn message(&self) -> &SharedString {
        &self.message
    }
}

impl Display for SubmitError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for SubmitError {}

impl From<&'static str> for SubmitError {
    fn from(value: &'static str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SubmitError {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<FormError> for SubmitError {
    fn from(value: FormError) -> Self {
        Self::from_error(&value)
    }
}

pub type BoxedSubmitFuture = Pin<Box<dyn Future<Output = Result<(), SubmitError>> + Send>>;

/// Submission logic. A form holds one as its default; `submit` may be given
/// another per call.
#[derive(Clone)]
pub struct SubmitAction(Arc<dyn Fn() -> BoxedSubmitFuture + Send + Sync>);

impl SubmitAction {
    pub fn new<F, Fut>(action: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), SubmitError>> + Send + 'static,
    {
        Self(Arc::new(move || Box::pin(action())))
    }

    pub fn sync(action: impl Fn() -> Result<(), SubmitError> + Send + Sync + 'static) -> Self {
        Self::new(move || std::future::ready(action()))
    }

    fn invoke(&self) -> BoxedSubmitFuture {
        (self.0)()
    }
}

/// Re-runs a failed submission with the arguments it was first given.
#[derive(Clone)]
pub struct RetryHandle {
    form: WeakForm,
    action: Option<SubmitAction>,
}

impl RetryHandle {
    pub async fn retry(&self) -> FormResult<SubmitOutcome> {
        let form = self
            .form
            .upgrade()
            .ok_or(FormError::FormDisposed(self.form.id()))?;
        form.submit(self.action.clone()).await
    }
}

impl std::fmt::Debug for RetryHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryHandle")
            .field("form", &self.form.id())
            .field("override", &self.action.is_some())
            .finish()
    }
}

#[derive(Clone, Debug)]
pub enum SubmissionState {
    Idle,
    Submitting,
    Succeeded,
    Failed {
        error: SubmitError,
        retry: RetryHandle,
    },
}

impl SubmissionState {
    pub fn phase(&self) -> SubmitPhase {
        match self {
            SubmissionState::Idle => SubmitPhase::Idle,
            SubmissionState::Submitting => SubmitPhase::Submitting,
            SubmissionState::Succeeded => SubmitPhase::Succeeded,
            SubmissionState::Failed { .. } => SubmitPhase::Failed,
        }
    }

    pub fn is_submitting(&self) -> bool {
        matches!(self, SubmissionState::Submitting)
    }

    pub fn error(&self) -> Option<&SubmitError> {
        match self {
            SubmissionState::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn retry_handle(&self) -> Option<&RetryHandle> {
        match self {
            SubmissionState::Failed { retry, .. } => Some(retry),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SubmitOutcome {
    /// Validation failed; the submission state was left untouched.
    Invalid,
    Succeeded,
    Failed,
}

pub(super) fn transition_submission(
    state: &mut FormState,
    next: SubmissionState,
) -> FormResult<()> {
    let current = state.submission.phase();
    let target = next.phase();
    let allowed = matches!(
        (current, target),
        (
            SubmitPhase::Idle | SubmitPhase::Succeeded | SubmitPhase::Failed,
            SubmitPhase::Submitting
        ) | (
            SubmitPhase::Submitting,
            SubmitPhase::Succeeded | SubmitPhase::Failed
        ) | (_, SubmitPhase::Idle)
    );
    if !allowed {
        return Err(FormError::InvalidStateTransition {
            from: current,
            to: target,
        });
    }
    state.submission = next;
    Ok(())
}

impl FormController {
    /// Validates, then runs `action` (or the default submit action) and
    /// records the result as the submission state.
    ///
    /// An invalid form returns [`SubmitOutcome::Invalid`] without any state
    /// transition. A failing action does not surface as `Err`; it becomes
    /// [`SubmissionState::Failed`] with a retry handle. The form is reserved
    /// before validation starts, so a call made while another submission is
    /// validating or running is rejected with
    /// [`FormError::AlreadySubmitting`].
    pub async fn submit(&self, action: Option<SubmitAction>) -> FormResult<SubmitOutcome> {
        let _reservation = SubmitReservation::acquire(self)?;

        if !self.validate_async().await? {
            tracing::debug!(form = self.id().0, "submit skipped, form invalid");
            return Ok(SubmitOutcome::Invalid);
        }

        let default_action = {
            let mut state = write_lock(&self.inner.state, "starting submit")?;
            self.ensure_active(&state)?;
            transition_submission(&mut state, SubmissionState::Submitting)?;
            state.submit_count = state.submit_count.saturating_add(1);
            state.submit_action.clone()
        };
        tracing::debug!(form = self.id().0, "submitting");
        self.notify();

        let result = match action.as_ref().or(default_action.as_ref()) {
            Some(submit) => submit.invoke().await,
            None => Ok(()),
        };

        match result {
            Ok(()) => self.complete_submit(action),
            Err(error) => self.fail_submit(error, action),
        }
    }

    /// Baselines are rebased before the state moves, so a failure there
    /// records the submission as failed instead of a half-applied success.
    fn complete_submit(&self, action: Option<SubmitAction>) -> FormResult<SubmitOutcome> {
        let fields = self.fields()?;
        let committed = fields.iter().try_for_each(|field| field.commit_baseline());
        if let Err(error) = committed {
            return self.fail_submit(SubmitError::from(error), action);
        }

        {
            let mut state = write_lock(&self.inner.state, "completing submit")?;
            transition_submission(&mut state, SubmissionState::Succeeded)?;
        }
        tracing::debug!(form = self.id().0, "submit succeeded");
        self.notify();
        notify_fields(&fields);

        if self.options()?.auto_focus_on_first_error {
            if let Err(error) = self.focus_first_error() {
                tracing::warn!(form = self.id().0, %error, "could not focus first error");
            }
        }
        Ok(SubmitOutcome::Succeeded)
    }

    fn fail_submit(
        &self,
        error: SubmitError,
        action: Option<SubmitAction>,
    ) -> FormResult<SubmitOutcome> {
        tracing::debug!(form = self.id().0, %error, "submit failed");
        {
            let mut state = write_lock(&self.inner.state, "failing submit")?;
            let retry = RetryHandle {
                form: self.downgrade(),
                action,
            };
            transition_submission(&mut state, SubmissionState::Failed { error, retry })?;
        }
        self.notify();
        Ok(SubmitOutcome::Failed)
    }
}

/// Marks the form as having a submission in flight for as long as it lives.
/// A submission dropped before it finished leaves the form `Idle` again.
struct SubmitReservation<'a> {
    form: &'a FormController,
}

impl<'a> SubmitReservation<'a> {
    fn acquire(form: &'a FormController) -> FormResult<Self> {
        let mut state = write_lock(&form.inner.state, "reserving submit")?;
        form.ensure_active(&state)?;
        if state.submit_in_flight {
            tracing::warn!(form = form.id().0, "submit rejected, already submitting");
            return Err(FormError::AlreadySubmitting);
        }
        state.submit_in_flight = true;
        Ok(Self { form })
    }
}

impl Drop for SubmitReservation<'_> {
    fn drop(&mut self) {
        let abandoned = {
            let mut state = write_recover(&self.form.inner.state);
            state.submit_in_flight = false;
            let abandoned = state.submission.is_submitting();
            if abandoned {
                state.submission = SubmissionState::Idle;
            }
            abandoned
        };
        if abandoned {
            tracing::debug!(form = self.form.id().0, "unfinished submit abandoned");
            self.form.notify();
        }
    }
}

fn notify_fields(fields: &[Arc<dyn FormField>]) {
    for field in fields {
        field.notify_observers();
    }
}
