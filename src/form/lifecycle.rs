//! Explicit teardown for fields.
//!
//! UI bindings call `retain` when they start showing a field and `release`
//! when they stop. When the last reference goes away on an auto-disposable
//! field it is detached right away: it leaves its form and drops its
//! listeners. Releasing its focus node is the second phase, a [`Finalizer`]
//! the host runs once its current dispatch cycle is over, since the widget
//! may still be unhooking itself from that node.

use std::sync::{Arc, RwLock};

use gpui::SharedString;

use super::error::{FormError, FormResult, read_recover, write_lock, write_recover};
use super::field::FieldController;
use super::focus::FocusNode;
use super::validation::FieldValue;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldPhase {
    Active,
    Detached,
    Finalized,
}

/// Second teardown phase of a detached field.
#[must_use = "a detached field keeps its focus node until finalized"]
pub struct Finalizer {
    field: SharedString,
    focus: Option<FocusNode>,
    mark_finalized: Box<dyn FnOnce() + Send + Sync>,
}

impl Finalizer {
    pub fn field_name(&self) -> &SharedString {
        &self.field
    }

    pub fn finalize(self) -> FormResult<()> {
        if let Some(focus) = self.focus {
            if !focus.is_disposed() {
                focus.dispose()?;
            }
        }
        (self.mark_finalized)();
        tracing::debug!(field = %self.field, "field finalized");
        Ok(())
    }
}

impl std::fmt::Debug for Finalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Finalizer")
            .field("field", &self.field)
            .field("has_focus_node", &self.focus.is_some())
            .finish()
    }
}

/// Finalizers waiting for the end of the host's dispatch cycle.
#[derive(Clone, Default)]
pub struct DisposalQueue {
    pending: Arc<RwLock<Vec<Finalizer>>>,
}

impl DisposalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn defer(&self, finalizer: Finalizer) {
        write_recover(&self.pending).push(finalizer);
    }

    pub fn len(&self) -> usize {
        read_recover(&self.pending).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs every queued finalizer in the order they were deferred. All of
    /// them run even if one fails; the first error is returned.
    pub fn flush(&self) -> FormResult<usize> {
        let pending = std::mem::take(&mut *write_recover(&self.pending));
        let count = pending.len();
        let mut first_error = None;
        for finalizer in pending {
            if let Err(error) = finalizer.finalize() {
                first_error.get_or_insert(error);
            }
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok(count),
        }
    }
}

impl<T: FieldValue> FieldController<T> {
    pub fn phase(&self) -> FieldPhase {
        read_recover(&self.inner.state).phase
    }

    pub fn ref_count(&self) -> usize {
        read_recover(&self.inner.state).ref_count
    }

    pub fn retain(&self) -> FormResult<usize> {
        let mut state = write_lock(&self.inner.state, "retaining field")?;
        self.ensure_active(&state)?;
        state.ref_count += 1;
        Ok(state.ref_count)
    }

    /// Drops one reference. Returns the finalizer when this detached the
    /// field; non-auto-disposable fields stay attached at zero references.
    /// Releasing a field nobody retains is an error and changes nothing.
    pub fn release(&self) -> FormResult<Option<Finalizer>> {
        let detach = {
            let mut state = write_lock(&self.inner.state, "releasing field")?;
            self.ensure_active(&state)?;
            if state.ref_count == 0 {
                return Err(FormError::FieldNotRetained(self.inner.name.clone()));
            }
            state.ref_count -= 1;
            state.ref_count == 0 && state.auto_dispose
        };
        if detach {
            self.detach().map(Some)
        } else {
            Ok(None)
        }
    }

    /// First teardown phase: leave the owning form, stop focus validation
    /// and drop every observer. Fails on a field that is already detached.
    pub fn detach(&self) -> FormResult<Finalizer> {
        let (registration, subscription, focus) = {
            let mut state = write_lock(&self.inner.state, "detaching field")?;
            self.ensure_active(&state)?;
            state.phase = FieldPhase::Detached;
            (
                state.registration.take(),
                state.focus_subscription.take(),
                state.focus.clone(),
            )
        };
        if let Some(registration) = registration {
            let _ = registration.remove()?;
        }
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
        }
        self.inner.notifier.close();
        tracing::debug!(field = %self.inner.name, "field detached");

        let weak = Arc::downgrade(&self.inner);
        Ok(Finalizer {
            field: self.inner.name.clone(),
            focus,
            mark_finalized: Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    write_recover(&inner.state).phase = FieldPhase::Finalized;
                }
            }),
        })
    }
}
