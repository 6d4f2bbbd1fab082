use std::sync::{Arc, RwLock};

use gpui::SharedString;

use super::controller::{FormController, FormId};
use super::error::{FormError, FormResult, read_lock, write_lock, write_recover};
use super::lifecycle::{DisposalQueue, Finalizer};

/// Scoped registration context.
///
/// Fields are declared next to their form rather than inside it, so they
/// find their owner through a single slot that holds the form currently
/// being built. Each context owns its own slot, which keeps separate forms
/// (and separate tests) from seeing each other.
#[derive(Clone, Default)]
pub struct FormContext {
    slot: Arc<RwLock<Option<FormController>>>,
    disposals: DisposalQueue,
}

impl FormContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Puts `form` in the slot until the guard drops.
    pub fn enter(&self, form: &FormController) -> FormResult<RegistrationGuard> {
        let mut slot = write_lock(&self.slot, "entering registration scope")?;
        if let Some(occupant) = slot.as_ref() {
            return Err(FormError::RegistrationSlotOccupied {
                occupant: occupant.id(),
                requested: form.id(),
            });
        }
        *slot = Some(form.clone());
        tracing::trace!(form = form.id().0, "registration scope entered");
        Ok(RegistrationGuard {
            slot: self.slot.clone(),
            form: form.id(),
        })
    }

    pub fn current_form(&self) -> FormResult<Option<FormController>> {
        Ok(read_lock(&self.slot, "reading registration slot")?.clone())
    }

    pub fn scoped<R>(
        &self,
        form: &FormController,
        build: impl FnOnce(&Self) -> FormResult<R>,
    ) -> FormResult<R> {
        let _guard = self.enter(form)?;
        build(self)
    }

    /// Materializes every field of `fields` inside `form`, in declaration
    /// order.
    pub fn build<F>(&self, form: &FormController, fields: &F) -> FormResult<()>
    where
        F: FormFields,
    {
        self.scoped(form, |context| fields.materialize_all(context))
    }

    /// Drops a UI reference to `field`. A finalizer produced by the release
    /// is queued until [`FormContext::flush_disposals`].
    pub fn release(&self, field: &impl FieldHandle) -> FormResult<bool> {
        let Some(finalizer) = field.release()? else {
            return Ok(false);
        };
        self.disposals.defer(finalizer);
        Ok(true)
    }

    /// Queues finalizers returned by [`FormController::dispose`].
    pub fn defer_all(&self, finalizers: impl IntoIterator<Item = Finalizer>) {
        for finalizer in finalizers {
            self.disposals.defer(finalizer);
        }
    }

    /// To be called by the host once its current dispatch cycle is over.
    pub fn flush_disposals(&self) -> FormResult<usize> {
        self.disposals.flush()
    }

    pub fn disposals(&self) -> &DisposalQueue {
        &self.disposals
    }
}

pub struct RegistrationGuard {
    slot: Arc<RwLock<Option<FormController>>>,
    form: FormId,
}

impl RegistrationGuard {
    pub fn form_id(&self) -> FormId {
        self.form
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        let mut slot = write_recover(&self.slot);
        if slot.as_ref().is_some_and(|form| form.id() == self.form) {
            *slot = None;
        }
    }
}

/// A field as the UI layer sees it: something to materialize, retain and
/// release.
pub trait FieldHandle {
    fn name(&self) -> SharedString;

    fn materialize(&self, context: &FormContext) -> FormResult<()>;

    fn retain(&self) -> FormResult<usize>;

    fn release(&self) -> FormResult<Option<Finalizer>>;
}

/// A group of fields declared together, usually through
/// `#[derive(FormFields)]`.
pub trait FormFields {
    fn field_names() -> &'static [&'static str];

    fn materialize_all(&self, context: &FormContext) -> FormResult<()>;
}
