mod binding;
mod controller;
mod error;
mod field;
mod focus;
mod lifecycle;
mod observable;
mod registration;
mod submission;
mod text;
mod validation;

#[cfg(test)]
mod tests;

pub use binding::{FocusBridge, RebuildSignal};
pub use calm_forms_derive::FormFields;
pub use controller::{
    AutovalidateMode, FieldRegistration, FormController, FormId, FormOptions, FormSnapshot,
    WeakForm,
};
pub use error::{FormError, FormResult};
pub use field::{
    BoxedFieldFuture, FieldController, FieldId, FieldOptions, FieldSnapshot, FormField,
    Validatable,
};
pub use focus::FocusNode;
pub use lifecycle::{DisposalQueue, FieldPhase, Finalizer};
pub use observable::{Listener, Notifier, Observable, Subscription};
pub use registration::{FieldHandle, FormContext, FormFields, RegistrationGuard};
pub use submission::{
    BoxedSubmitFuture, RetryHandle, SubmissionState, SubmitAction, SubmitError, SubmitOutcome,
    SubmitPhase,
};
pub use text::{TextEditingValue, TextFieldController, TextRange};
pub use validation::{
    AsyncFieldValidator, BoxedValidationFuture, FieldValidator, FieldValue, validators,
};
