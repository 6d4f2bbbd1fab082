pub use crate::form::{
    AutovalidateMode, FieldController, FieldHandle, FieldOptions, FocusBridge, FocusNode,
    FormContext, FormController, FormError, FormFields, FormOptions, FormResult, Observable,
    RebuildSignal, SubmitAction, SubmitOutcome, SubmitPhase, TextFieldController, Validatable,
    validators,
};
