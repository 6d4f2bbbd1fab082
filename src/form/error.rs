use std::fmt::{Display, Formatter};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use gpui::SharedString;

use super::controller::FormId;
use super::submission::SubmitPhase;

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum FormError {
    StatePoisoned(&'static str),
    InvalidStateTransition { from: SubmitPhase, to: SubmitPhase },
    AlreadySubmitting,
    FieldDisposed(SharedString),
    FieldNotRetained(SharedString),
    FormDisposed(FormId),
    FocusNodeDisposed,
    RegistrationSlotOccupied { occupant: FormId, requested: FormId },
}

impl Display for FormError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FormError::StatePoisoned(context) => {
                write!(f, "form state lock poisoned while {context}")
            }
            FormError::InvalidStateTransition { from, to } => {
                write!(f, "invalid submit state transition: {from:?} -> {to:?}")
            }
            FormError::AlreadySubmitting => f.write_str("form submit is already in progress"),
            FormError::FieldDisposed(name) => write!(f, "field `{name}` is already disposed"),
            FormError::FieldNotRetained(name) => {
                write!(f, "field `{name}` was released more often than it was retained")
            }
            FormError::FormDisposed(id) => write!(f, "form {} is already disposed", id.0),
            FormError::FocusNodeDisposed => f.write_str("focus node is already disposed"),
            FormError::RegistrationSlotOccupied {
                occupant,
                requested,
            } => write!(
                f,
                "registration slot is held by form {} while form {} tried to enter it",
                occupant.0, requested.0
            ),
        }
    }
}

impl std::error::Error for FormError {}

pub type FormResult<T> = Result<T, FormError>;

pub(super) fn read_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| FormError::StatePoisoned(context))
}

pub(super) fn write_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| FormError::StatePoisoned(context))
}

/// Lock access for bookkeeping that must never fail, such as listener lists
/// being torn down.
pub(super) fn read_recover<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub(super) fn write_recover<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
