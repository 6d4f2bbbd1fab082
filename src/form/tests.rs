use super::*;
use futures::channel::oneshot;
use futures::executor::block_on;
use gpui::SharedString;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn required(value: &String) -> Option<SharedString> {
    value.trim().is_empty().then(|| "required".into())
}

fn count_notifications(target: &impl Observable) -> (Arc<AtomicUsize>, Subscription) {
    let count = Arc::new(AtomicUsize::new(0));
    let subscription = {
        let count = count.clone();
        target.subscribe(move || {
            count.fetch_add(1, Ordering::SeqCst);
        })
    };
    (count, subscription)
}

struct SignupForm {
    context: FormContext,
    form: FormController,
    email: TextFieldController,
    password: TextFieldController,
}

fn signup_form(options: FormOptions) -> SignupForm {
    let context = FormContext::new();
    let form = FormController::new(options);
    let email = TextFieldController::new("email", "");
    email
        .register_validator(validators::required::<String>("email required"))
        .expect("register email validator");
    let password = TextFieldController::new("password", "secret-pass");
    password
        .register_validator(validators::min_length::<String>(8, "password too short"))
        .expect("register password validator");
    context
        .scoped(&form, |context| {
            email.materialize(context)?;
            password.materialize(context)
        })
        .expect("fields materialize inside the form");
    SignupForm {
        context,
        form,
        email,
        password,
    }
}

#[test]
fn field_without_validators_is_always_valid() {
    let field = FieldController::new("nickname", String::new());
    for value in ["", "   ", "anything"] {
        field.set_value(value.to_string()).expect("set value");
        assert!(field.validate(false).expect("validate"));
        assert!(field.is_valid());
    }
}

#[test]
fn first_failing_validator_in_declared_order_wins() {
    let field = FieldController::new("code", "ab".to_string());
    field
        .register_validator(validators::min_length::<String>(3, "too short"))
        .expect("register first");
    field
        .register_validator(validators::predicate::<String, _>(
            |value: &String| value.chars().all(|c| c.is_ascii_digit()),
            "digits only",
        ))
        .expect("register second");

    assert!(!field.validate(false).expect("validate"));
    assert_eq!(field.error(), Some(SharedString::from("too short")));

    field.set_value("abcd".into()).expect("set value");
    assert!(!field.validate(false).expect("validate"));
    assert_eq!(field.error(), Some(SharedString::from("digits only")));

    field.set_value("1234".into()).expect("set value");
    assert!(field.validate(false).expect("validate"));
    assert_eq!(field.error(), None);
}

#[test]
fn email_field_validates_after_each_value() {
    let email = FieldController::new("email", String::new());
    email.register_validator(required).expect("register validator");

    email.set_value(String::new()).expect("set empty");
    assert!(!email.validate(false).expect("validate empty"));
    assert!(email.error().is_some());

    email.set_value("a@b.com".into()).expect("set address");
    assert!(email.validate(false).expect("validate address"));
    assert!(email.error().is_none());
}

#[test]
fn validate_stores_error_without_notifying() {
    let field = FieldController::new("email", String::new());
    field.register_validator(required).expect("register validator");
    let (count, _subscription) = count_notifications(&field);

    assert!(!field.validate(false).expect("validate"));
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[test]
fn dirty_flag_compares_trimmed_text_with_baseline() {
    let field = FieldController::new("name", "Ada".to_string());
    field.set_value("Ada  ".into()).expect("set padded");
    assert!(!field.is_dirty());

    field.set_value("Adam".into()).expect("set changed");
    assert!(field.is_dirty());

    field.set_value(" Ada".into()).expect("set back");
    assert!(!field.is_dirty());
}

#[test]
fn unchanged_value_notifies_without_validating() {
    let calls = Arc::new(AtomicUsize::new(0));
    let field = FieldController::with_options(
        "name",
        "Ada".to_string(),
        FieldOptions {
            autovalidate: Some(AutovalidateMode::OnUserInteraction),
            ..FieldOptions::default()
        },
    );
    {
        let calls = calls.clone();
        field
            .register_validator(move |_value: &String| {
                calls.fetch_add(1, Ordering::SeqCst);
                None
            })
            .expect("register validator");
    }
    let (count, _subscription) = count_notifications(&field);

    field.set_value("Ada".into()).expect("set same value");
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!field.is_dirty());

    field.set_value("Bob".into()).expect("set new value");
    assert_eq!(count.load(Ordering::SeqCst), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn on_user_interaction_validates_each_change() {
    let field = FieldController::with_options(
        "email",
        "a@b.com".to_string(),
        FieldOptions {
            autovalidate: Some(AutovalidateMode::OnUserInteraction),
            ..FieldOptions::default()
        },
    );
    field.register_validator(required).expect("register validator");

    field.set_value(" ".into()).expect("set blank");
    assert_eq!(field.error(), Some(SharedString::from("required")));
    field.set_value("c@d.com".into()).expect("set valid");
    assert_eq!(field.error(), None);
}

#[test]
fn selection_only_change_notifies_but_keeps_content_state() {
    let calls = Arc::new(AtomicUsize::new(0));
    let email = TextFieldController::with_options(
        "email",
        "hello",
        FieldOptions {
            autovalidate: Some(AutovalidateMode::OnUserInteraction),
            ..FieldOptions::default()
        },
    );
    {
        let calls = calls.clone();
        email
            .register_validator(move |_value: &String| {
                calls.fetch_add(1, Ordering::SeqCst);
                None
            })
            .expect("register validator");
    }
    let (count, _subscription) = count_notifications(&email);

    email
        .update_editing_value(
            TextEditingValue::new("hello").with_selection(TextRange::new(1, 3)),
        )
        .expect("move selection");

    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!email.is_dirty());
    assert_eq!(email.selection().expect("selection"), TextRange::new(1, 3));
}

#[test]
fn set_text_runs_content_pipeline_and_moves_caret_to_end() {
    let email = TextFieldController::new("email", "a");
    email.set_text("abc").expect("set text");

    let value = email.editing_value().expect("editing value");
    assert_eq!(value.text, "abc");
    assert_eq!(value.selection, TextRange::collapsed(3));
    assert!(email.is_dirty());
}

#[test]
fn selection_is_clamped_after_reset_shortens_text() {
    let email = TextFieldController::new("email", "ab");
    email
        .update_editing_value(
            TextEditingValue::new("abcdef").with_selection(TextRange::new(4, 6)),
        )
        .expect("edit text");
    email.field().reset().expect("reset through the field");

    let value = email.editing_value().expect("editing value");
    assert_eq!(value.text, "ab");
    assert_eq!(value.selection, TextRange::new(2, 2));
}

#[test]
fn field_registers_with_the_form_in_scope_only_once() {
    let context = FormContext::new();
    let first = FormController::new(FormOptions::default());
    let second = FormController::new(FormOptions::default());
    let field = FieldController::new("email", String::new());

    context
        .scoped(&first, |context| field.materialize(context))
        .expect("materialize in first form");
    context
        .scoped(&second, |context| field.materialize(context))
        .expect("second materialize is a no-op");

    assert_eq!(first.field_count().expect("count"), 1);
    assert_eq!(second.field_count().expect("count"), 0);
    assert_eq!(field.owner().map(|form| form.id()), Some(first.id()));
}

#[test]
fn slot_is_read_once_even_when_empty() {
    let context = FormContext::new();
    let form = FormController::new(FormOptions::default());
    let field = FieldController::new("email", String::new());

    field.materialize(&context).expect("materialize with empty slot");
    context
        .scoped(&form, |context| field.materialize(context))
        .expect("later materialize");

    assert_eq!(form.field_count().expect("count"), 0);
    assert!(field.owner().is_none());
}

#[test]
fn registration_slot_holds_one_form_at_a_time() {
    let context = FormContext::new();
    let first = FormController::new(FormOptions::default());
    let second = FormController::new(FormOptions::default());

    let guard = context.enter(&first).expect("enter first");
    let rejected = context.enter(&second).err();
    assert_eq!(
        rejected,
        Some(FormError::RegistrationSlotOccupied {
            occupant: first.id(),
            requested: second.id(),
        })
    );
    drop(guard);

    assert!(context.current_form().expect("slot").is_none());
    let _guard = context.enter(&second).expect("enter second");
    assert_eq!(
        context.current_form().expect("slot").map(|form| form.id()),
        Some(second.id())
    );
}

#[test]
fn contexts_do_not_share_their_slot() {
    let first = FormContext::new();
    let second = FormContext::new();
    let form = FormController::new(FormOptions::default());

    let _guard = first.enter(&form).expect("enter");
    assert!(second.current_form().expect("slot").is_none());
}

#[test]
fn fields_in_a_form_default_to_focus_loss_validation() {
    let signup = signup_form(FormOptions::default());
    assert_eq!(
        signup.email.field().autovalidate_mode().expect("mode"),
        AutovalidateMode::OnFocusLoss
    );

    signup.email.set_text("  ").expect("set blank");
    assert!(signup.email.error().is_none());

    let (count, _subscription) = count_notifications(&signup.email);
    let focus = signup.email.focus_node().expect("focus node");
    focus.set_focused(true).expect("focus");
    assert!(signup.email.error().is_none());
    focus.set_focused(false).expect("blur");

    assert_eq!(signup.email.error(), Some(SharedString::from("email required")));
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn always_mode_form_validates_fields_on_change() {
    let signup = signup_form(FormOptions {
        autovalidate_mode: AutovalidateMode::Always,
        ..FormOptions::default()
    });
    assert_eq!(
        signup.password.field().autovalidate_mode().expect("mode"),
        AutovalidateMode::Always
    );

    signup.password.set_text("short").expect("set short password");
    assert_eq!(
        signup.password.error(),
        Some(SharedString::from("password too short"))
    );
}

#[test]
fn explicit_field_mode_overrides_the_form() {
    let context = FormContext::new();
    let form = FormController::new(FormOptions::default());
    let field = FieldController::with_options(
        "email",
        "x".to_string(),
        FieldOptions {
            autovalidate: Some(AutovalidateMode::OnUserInteraction),
            ..FieldOptions::default()
        },
    );
    field.register_validator(required).expect("register validator");
    context
        .scoped(&form, |context| field.materialize(context))
        .expect("materialize");

    field.set_value(String::new()).expect("clear");
    assert_eq!(field.error(), Some(SharedString::from("required")));
}

#[test]
fn form_validate_checks_every_field_and_focuses_first_error() {
    let signup = signup_form(FormOptions::default());
    signup.password.set_text("short").expect("set short password");

    assert!(!signup.form.validate().expect("validate"));
    assert!(signup.email.error().is_some());
    assert!(signup.password.error().is_some());
    assert!(!signup.form.is_valid().expect("is valid"));

    let email_focus = signup.email.focus_node().expect("email focus");
    let password_focus = signup.password.focus_node().expect("password focus");
    assert!(email_focus.is_focus_requested());
    assert!(!password_focus.is_focus_requested());
}

#[test]
fn only_the_invalid_field_gets_focus() {
    let signup = signup_form(FormOptions::default());
    let password_focus = signup.password.focus_node().expect("password focus");

    assert!(!signup.form.validate().expect("validate"));
    assert!(signup.password.is_valid());
    assert!(signup.email.focus_node().expect("email focus").is_focus_requested());
    assert_eq!(password_focus.focus_request_count(), 0);
}

#[test]
fn form_validate_respects_disabled_auto_focus() {
    let signup = signup_form(FormOptions {
        auto_focus_on_first_error: false,
        ..FormOptions::default()
    });
    assert!(!signup.form.validate().expect("validate"));
    assert!(!signup.email.focus_node().expect("focus").is_focus_requested());
}

#[test]
fn form_validate_notifies_every_field() {
    let signup = signup_form(FormOptions::default());
    let (email_count, _email) = count_notifications(&signup.email);
    let (password_count, _password) = count_notifications(&signup.password);
    let (form_count, _form) = count_notifications(&signup.form);

    let _ = signup.form.validate().expect("validate");
    assert_eq!(email_count.load(Ordering::SeqCst), 1);
    assert_eq!(password_count.load(Ordering::SeqCst), 1);
    assert_eq!(form_count.load(Ordering::SeqCst), 0);
}

#[test]
fn form_is_dirty_when_any_field_is_dirty() {
    let signup = signup_form(FormOptions::default());
    assert!(!signup.form.is_dirty().expect("dirty"));
    signup.password.set_text("another-pass").expect("edit password");
    assert!(signup.form.is_dirty().expect("dirty"));
}

#[test]
fn form_reset_restores_fields_and_overrides() {
    let context = FormContext::new();
    let form = FormController::new(FormOptions {
        enabled: Some(false),
        ..FormOptions::default()
    });
    let email = TextFieldController::with_options(
        "email",
        "a@b.com",
        FieldOptions {
            auto_focus: true,
            ..FieldOptions::default()
        },
    );
    email
        .register_validator(validators::required::<String>("required"))
        .expect("register validator");
    context
        .scoped(&form, |context| email.materialize(context))
        .expect("materialize");

    email.set_text("").expect("clear email");
    assert!(!form.validate().expect("validate"));
    form.set_enabled(true).expect("enable form");
    form.set_read_only(true).expect("read-only form");
    let focus = email.focus_node().expect("focus");
    let _ = focus.take_focus_request();

    form.reset().expect("reset");

    assert_eq!(email.text().expect("text"), "a@b.com");
    assert!(!email.is_dirty());
    assert!(email.error().is_none());
    assert!(!form.is_enabled().expect("enabled"));
    assert!(!form.is_read_only().expect("read-only"));
    assert!(focus.is_focus_requested());
    assert_eq!(form.submit_phase().expect("phase"), SubmitPhase::Idle);
}

#[test]
fn form_reset_in_always_mode_revalidates() {
    let context = FormContext::new();
    let form = FormController::new(FormOptions {
        autovalidate_mode: AutovalidateMode::Always,
        ..FormOptions::default()
    });
    let email = TextFieldController::new("email", "");
    email
        .register_validator(validators::required::<String>("required"))
        .expect("register validator");
    context
        .scoped(&form, |context| email.materialize(context))
        .expect("materialize");

    email.set_text("a@b.com").expect("fill email");
    assert!(email.error().is_none());
    form.reset().expect("reset");
    assert_eq!(email.error(), Some(SharedString::from("required")));
}

#[test]
fn field_enable_state_inherits_from_form_unless_overridden() {
    let signup = signup_form(FormOptions::default());
    assert!(signup.email.is_enabled().expect("enabled"));
    assert!(!signup.email.is_read_only().expect("read-only"));

    let (count, _subscription) = count_notifications(&signup.email);
    signup.form.set_enabled(false).expect("disable form");
    assert!(!signup.email.is_enabled().expect("enabled"));
    assert_eq!(count.load(Ordering::SeqCst), 1);

    signup
        .password
        .field()
        .set_enabled(Some(true))
        .expect("override password");
    assert!(signup.password.is_enabled().expect("enabled"));
}

#[test]
fn submit_on_invalid_form_changes_nothing() {
    let signup = signup_form(FormOptions::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let (form_count, _subscription) = count_notifications(&signup.form);
    let action = {
        let calls = calls.clone();
        SubmitAction::sync(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    };

    let outcome = block_on(signup.form.submit(Some(action))).expect("submit");

    assert_eq!(outcome, SubmitOutcome::Invalid);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(signup.form.submit_phase().expect("phase"), SubmitPhase::Idle);
    assert_eq!(signup.form.submit_count().expect("count"), 0);
    assert_eq!(form_count.load(Ordering::SeqCst), 0);
}

#[test]
fn successful_submit_rebases_dirty_tracking() {
    let signup = signup_form(FormOptions::default());
    signup.email.set_text("a@b.com").expect("fill email");
    assert!(signup.form.is_dirty().expect("dirty"));
    let (form_count, _subscription) = count_notifications(&signup.form);

    let outcome = block_on(signup.form.submit(None)).expect("submit");

    assert_eq!(outcome, SubmitOutcome::Succeeded);
    assert_eq!(
        signup.form.submit_phase().expect("phase"),
        SubmitPhase::Succeeded
    );
    assert_eq!(signup.form.submit_count().expect("count"), 1);
    assert_eq!(form_count.load(Ordering::SeqCst), 2);
    assert!(!signup.form.is_dirty().expect("dirty"));

    signup.email.set_text("").expect("clear email");
    assert!(signup.email.is_dirty());
    signup.email.set_text("a@b.com").expect("restore email");
    assert!(!signup.email.is_dirty());
}

#[test]
fn submit_override_replaces_default_action() {
    let signup = signup_form(FormOptions::default());
    signup.email.set_text("a@b.com").expect("fill email");
    let default_calls = Arc::new(AtomicUsize::new(0));
    let override_calls = Arc::new(AtomicUsize::new(0));
    {
        let default_calls = default_calls.clone();
        signup
            .form
            .set_submit_action(SubmitAction::sync(move || {
                default_calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
            .expect("set default action");
    }
    let action = {
        let override_calls = override_calls.clone();
        SubmitAction::new(move || {
            let override_calls = override_calls.clone();
            async move {
                override_calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    };

    block_on(signup.form.submit(Some(action))).expect("submit override");
    assert_eq!(default_calls.load(Ordering::SeqCst), 0);
    assert_eq!(override_calls.load(Ordering::SeqCst), 1);

    block_on(signup.form.submit(None)).expect("submit default");
    assert_eq!(default_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn failed_submit_records_error_and_retry_repeats_the_call() {
    let signup = signup_form(FormOptions::default());
    signup.email.set_text("a@b.com").expect("fill email");
    let default_calls = Arc::new(AtomicUsize::new(0));
    let failing_calls = Arc::new(AtomicUsize::new(0));
    {
        let default_calls = default_calls.clone();
        signup
            .form
            .set_submit_action(SubmitAction::sync(move || {
                default_calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
            .expect("set default action");
    }
    let action = {
        let failing_calls = failing_calls.clone();
        SubmitAction::sync(move || {
            failing_calls.fetch_add(1, Ordering::SeqCst);
            Err("Invalid-Email".into())
        })
    };

    let outcome = block_on(signup.form.submit(Some(action))).expect("submit");
    assert_eq!(outcome, SubmitOutcome::Failed);
    assert!(signup.email.is_dirty());

    let state = signup.form.submission_state().expect("state");
    assert_eq!(state.phase(), SubmitPhase::Failed);
    assert_eq!(
        state.error().map(|error| error.message().clone()),
        Some(SharedString::from("Invalid-Email"))
    );

    let retry = state.retry_handle().expect("retry handle").clone();
    let retried = block_on(retry.retry()).expect("retry");
    assert_eq!(retried, SubmitOutcome::Failed);
    assert_eq!(failing_calls.load(Ordering::SeqCst), 2);
    assert_eq!(default_calls.load(Ordering::SeqCst), 0);
    assert_eq!(signup.form.submit_count().expect("count"), 2);
}

#[test]
fn retry_after_form_is_gone_reports_disposal() {
    let signup = signup_form(FormOptions::default());
    signup.email.set_text("a@b.com").expect("fill email");
    let form_id = signup.form.id();
    block_on(
        signup
            .form
            .submit(Some(SubmitAction::sync(|| Err("offline".into())))),
    )
    .expect("submit");
    let retry = signup
        .form
        .submission_state()
        .expect("state")
        .retry_handle()
        .cloned()
        .expect("retry handle");

    let SignupForm {
        context, form, ..
    } = signup;
    drop(context);
    drop(form);

    assert_eq!(
        block_on(retry.retry()).err(),
        Some(FormError::FormDisposed(form_id))
    );
}

#[test]
fn server_side_errors_focus_the_first_failing_field_after_success() {
    let signup = signup_form(FormOptions::default());
    signup.email.set_text("taken@b.com").expect("fill email");
    let email = signup.email.clone();
    let action = SubmitAction::sync(move || {
        email
            .set_error(Some("address already registered".into()))
            .map_err(SubmitError::from)
    });

    let outcome = block_on(signup.form.submit(Some(action))).expect("submit");

    assert_eq!(outcome, SubmitOutcome::Succeeded);
    assert!(signup.email.focus_node().expect("focus").is_focus_requested());
    assert_eq!(
        signup
            .form
            .first_error_field()
            .expect("first error")
            .map(|field| field.name()),
        Some(SharedString::from("email"))
    );
}

#[test]
fn concurrent_submit_is_rejected() {
    let signup = signup_form(FormOptions::default());
    signup.email.set_text("a@b.com").expect("fill email");
    let (release, gate) = oneshot::channel::<()>();
    let gate = Arc::new(Mutex::new(Some(gate)));
    let action = SubmitAction::new(move || {
        let gate = gate.lock().ok().and_then(|mut gate| gate.take());
        async move {
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            Ok(())
        }
    });

    block_on(async {
        let mut first = Box::pin(signup.form.submit(Some(action)));
        assert!(futures::poll!(first.as_mut()).is_pending());
        assert!(
            signup
                .form
                .submission_state()
                .expect("state")
                .is_submitting()
        );

        let second = signup.form.submit(None).await;
        assert_eq!(second.err(), Some(FormError::AlreadySubmitting));

        release.send(()).expect("release first submit");
        assert_eq!(first.await.expect("first submit"), SubmitOutcome::Succeeded);
    });
}

fn gated_action(result: Result<(), SubmitError>) -> (oneshot::Sender<()>, SubmitAction) {
    let (release, gate) = oneshot::channel::<()>();
    let gate = Arc::new(Mutex::new(Some(gate)));
    let action = SubmitAction::new(move || {
        let gate = gate.lock().ok().and_then(|mut gate| gate.take());
        let result = result.clone();
        async move {
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            result
        }
    });
    (release, action)
}

#[test]
fn submit_while_validating_is_rejected() {
    let signup = signup_form(FormOptions::default());
    signup.email.set_text("a@b.com").expect("fill email");
    let (release, gate) = oneshot::channel::<()>();
    let gate = Arc::new(Mutex::new(Some(gate)));
    signup
        .email
        .field()
        .register_async_validator(move |_value: String| -> BoxedValidationFuture {
            let gate = gate.lock().ok().and_then(|mut gate| gate.take());
            Box::pin(async move {
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                None
            })
        })
        .expect("register async validator");

    block_on(async {
        let mut first = Box::pin(signup.form.submit(None));
        assert!(futures::poll!(first.as_mut()).is_pending());
        assert_eq!(signup.form.submit_phase().expect("phase"), SubmitPhase::Idle);

        let second = signup.form.submit(None).await;
        assert_eq!(second.err(), Some(FormError::AlreadySubmitting));

        release.send(()).expect("finish validation");
        assert_eq!(first.await.expect("first submit"), SubmitOutcome::Succeeded);
    });
    assert_eq!(signup.form.submit_count().expect("count"), 1);
}

#[test]
fn reset_is_refused_while_a_submission_runs() {
    let signup = signup_form(FormOptions::default());
    signup.email.set_text("a@b.com").expect("fill email");
    let (release, action) = gated_action(Err(SubmitError::from("Invalid-Email")));

    block_on(async {
        let mut first = Box::pin(signup.form.submit(Some(action)));
        assert!(futures::poll!(first.as_mut()).is_pending());

        assert_eq!(signup.form.reset().err(), Some(FormError::AlreadySubmitting));
        assert_eq!(signup.email.text().expect("text"), "a@b.com");
        assert_eq!(
            signup.form.submit_phase().expect("phase"),
            SubmitPhase::Submitting
        );
        let second = signup.form.submit(None).await;
        assert_eq!(second.err(), Some(FormError::AlreadySubmitting));

        release.send(()).expect("release first submit");
        assert_eq!(first.await.expect("first submit"), SubmitOutcome::Failed);
    });

    let state = signup.form.submission_state().expect("state");
    assert_eq!(
        state.error().map(|error| error.message().clone()),
        Some(SharedString::from("Invalid-Email"))
    );
    assert_eq!(signup.form.submit_count().expect("count"), 1);

    signup.form.reset().expect("reset after submit finished");
    assert_eq!(signup.form.submit_phase().expect("phase"), SubmitPhase::Idle);
}

#[test]
fn dropped_submit_leaves_the_form_idle() {
    let signup = signup_form(FormOptions::default());
    signup.email.set_text("a@b.com").expect("fill email");
    let (_release, action) = gated_action(Ok(()));

    block_on(async {
        let mut first = Box::pin(signup.form.submit(Some(action)));
        assert!(futures::poll!(first.as_mut()).is_pending());
        assert!(
            signup
                .form
                .submission_state()
                .expect("state")
                .is_submitting()
        );
        drop(first);
    });

    assert_eq!(signup.form.submit_phase().expect("phase"), SubmitPhase::Idle);
    let outcome = block_on(signup.form.submit(None)).expect("submit again");
    assert_eq!(outcome, SubmitOutcome::Succeeded);
    assert_eq!(signup.form.submit_count().expect("count"), 2);
}

#[test]
fn success_is_recorded_when_the_error_field_cannot_take_focus() {
    let signup = signup_form(FormOptions::default());
    signup.email.set_text("taken@b.com").expect("fill email");
    signup
        .email
        .focus_node()
        .expect("focus")
        .dispose()
        .expect("dispose focus node");
    let email = signup.email.clone();
    let action = SubmitAction::sync(move || {
        email
            .set_error(Some("address already registered".into()))
            .map_err(SubmitError::from)
    });
    let (form_count, _subscription) = count_notifications(&signup.form);

    let outcome = block_on(signup.form.submit(Some(action))).expect("submit");

    assert_eq!(outcome, SubmitOutcome::Succeeded);
    assert_eq!(
        signup.form.submit_phase().expect("phase"),
        SubmitPhase::Succeeded
    );
    assert!(!signup.form.is_dirty().expect("dirty"));
    assert_eq!(form_count.load(Ordering::SeqCst), 2);
}

#[test]
fn async_validators_run_after_sync_validators_pass() {
    let signup = signup_form(FormOptions::default());
    let lookups = Arc::new(AtomicUsize::new(0));
    {
        let lookups = lookups.clone();
        signup
            .email
            .field()
            .register_async_validator(move |value: String| -> BoxedValidationFuture {
                lookups.fetch_add(1, Ordering::SeqCst);
                Box::pin(async move {
                    value
                        .ends_with("@taken.com")
                        .then(|| SharedString::from("address taken"))
                })
            })
            .expect("register async validator");
    }

    assert!(!block_on(signup.form.validate_async()).expect("validate empty"));
    assert_eq!(lookups.load(Ordering::SeqCst), 0);

    signup.email.set_text("me@taken.com").expect("fill email");
    let outcome = block_on(signup.form.submit(None)).expect("submit");
    assert_eq!(outcome, SubmitOutcome::Invalid);
    assert_eq!(lookups.load(Ordering::SeqCst), 1);
    assert_eq!(signup.email.error(), Some(SharedString::from("address taken")));
}

#[test]
fn debounced_async_validation_keeps_latest_result() {
    let field = FieldController::new("email", "bad@example.com".to_string());
    field
        .register_async_validator_with_debounce(20, |value: String| -> BoxedValidationFuture {
            Box::pin(async move {
                value
                    .contains("bad")
                    .then(|| SharedString::from("email invalid"))
            })
        })
        .expect("register async validator");

    let (first, second) = block_on(async {
        futures::join!(field.validate_async(false), async {
            field
                .set_value("good@example.com".into())
                .expect("set value");
            field.validate_async(false).await
        })
    });

    assert!(first.expect("first run"));
    assert!(second.expect("second run"));
    assert!(field.error().is_none());
}

#[test]
fn field_registration_removal_is_idempotent() {
    let form = FormController::new(FormOptions::default());
    let field = FieldController::new("email", String::new());
    let registration = form.add_field(Arc::new(field.clone())).expect("add field");
    let again = form.add_field(Arc::new(field)).expect("add again");

    assert_eq!(form.field_count().expect("count"), 1);
    assert!(registration.remove().expect("remove"));
    assert!(!registration.remove().expect("remove again"));
    assert!(!again.remove().expect("remove through second handle"));
    assert_eq!(form.field_count().expect("count"), 0);
}

#[test]
fn released_field_detaches_then_finalizes_on_flush() {
    let signup = signup_form(FormOptions::default());
    let focus = signup.email.focus_node().expect("focus");
    signup.email.field().retain().expect("retain by widget");
    signup.email.field().retain().expect("retain by label");

    assert!(!signup.context.release(&signup.email).expect("first release"));
    assert_eq!(signup.form.field_count().expect("count"), 2);

    assert!(signup.context.release(&signup.email).expect("last release"));
    assert_eq!(signup.form.field_count().expect("count"), 1);
    assert_eq!(signup.email.field().phase(), FieldPhase::Detached);
    assert_eq!(signup.email.listener_count(), 0);
    assert!(!focus.is_disposed());

    assert_eq!(signup.context.flush_disposals().expect("flush"), 1);
    assert!(focus.is_disposed());
    assert_eq!(signup.email.field().phase(), FieldPhase::Finalized);
    assert!(signup.context.disposals().is_empty());
}

#[test]
fn detached_field_rejects_further_use() {
    let field = FieldController::new("email", String::new());
    let finalizer = field.detach().expect("detach");

    assert_eq!(
        field.set_value("x".into()).err(),
        Some(FormError::FieldDisposed("email".into()))
    );
    assert!(field.detach().is_err());
    finalizer.finalize().expect("finalize");
    assert!(field.validate(false).is_err());
}

#[test]
fn releasing_an_unretained_field_fails() {
    let field = FieldController::new("email", String::new());

    assert_eq!(
        field.release().err(),
        Some(FormError::FieldNotRetained("email".into()))
    );
    assert_eq!(field.phase(), FieldPhase::Active);
    assert_eq!(field.ref_count(), 0);
}

#[test]
fn non_auto_disposable_field_survives_zero_references() {
    let field = FieldController::with_options(
        "email",
        String::new(),
        FieldOptions {
            auto_dispose: false,
            ..FieldOptions::default()
        },
    );
    field.retain().expect("retain");
    assert!(field.release().expect("release").is_none());
    assert_eq!(field.phase(), FieldPhase::Active);
    assert_eq!(field.ref_count(), 0);
}

#[test]
fn disposing_form_detaches_only_unretained_fields() {
    let signup = signup_form(FormOptions::default());
    signup.password.field().retain().expect("retain password");

    let finalizers = signup.form.dispose().expect("dispose");

    assert_eq!(finalizers.len(), 1);
    assert_eq!(finalizers[0].field_name(), &SharedString::from("email"));
    assert_eq!(signup.email.field().phase(), FieldPhase::Detached);
    assert_eq!(signup.password.field().phase(), FieldPhase::Active);
    assert!(signup.form.is_disposed());
    assert_eq!(
        signup.form.validate().err(),
        Some(FormError::FormDisposed(signup.form.id()))
    );

    signup.context.defer_all(finalizers);
    assert_eq!(signup.context.flush_disposals().expect("flush"), 1);
}

#[test]
fn focus_node_reports_changes_and_requests() {
    let node = FocusNode::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let subscription = {
        let seen = seen.clone();
        node.add_focus_listener(move |focused| {
            if let Ok(mut seen) = seen.lock() {
                seen.push(focused);
            }
        })
        .expect("listen")
    };

    node.request_focus().expect("request");
    assert!(node.take_focus_request());
    assert!(!node.take_focus_request());

    node.set_focused(true).expect("focus");
    node.set_focused(true).expect("focus again");
    node.set_focused(false).expect("blur");
    subscription.unsubscribe();
    node.set_focused(true).expect("focus after unsubscribe");

    assert_eq!(*seen.lock().expect("seen"), vec![true, false]);

    node.dispose().expect("dispose");
    assert_eq!(node.request_focus().err(), Some(FormError::FocusNodeDisposed));
    assert!(node.dispose().is_err());
}

#[test]
fn notifier_unsubscribe_and_close() {
    let notifier = Notifier::<()>::new();
    let count = Arc::new(AtomicUsize::new(0));
    let subscription = {
        let count = count.clone();
        notifier.subscribe(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        })
    };
    notifier.notify();
    subscription.unsubscribe();
    notifier.notify();
    assert_eq!(count.load(Ordering::SeqCst), 1);

    notifier.close();
    let late = notifier.subscribe(|_| {});
    assert!(!late.is_active());
    assert_eq!(notifier.listener_count(), 0);
}

#[test]
fn rebuild_signal_tracks_notifications() {
    let field = FieldController::new("email", String::new());
    let signal = RebuildSignal::new();
    let _subscription = signal.observe(&field);

    assert!(!signal.take());
    field.set_value("a".into()).expect("set value");
    assert!(signal.is_pending());
    assert!(signal.take());
    assert!(!signal.take());
}

#[test]
fn builtin_validators_work_on_shared_strings() {
    let required = validators::required::<SharedString>("required");
    let max = validators::max_length::<SharedString>(3, "too long");

    assert_eq!(required(&SharedString::from(" ")), Some("required".into()));
    assert_eq!(required(&SharedString::from("x")), None);
    assert_eq!(max(&SharedString::from("abcd")), Some("too long".into()));
    assert_eq!(max(&SharedString::from("abc")), None);
}

#[test]
fn composite_values_compare_by_content() {
    assert!(Some(" a ".to_string()).same_content(&Some("a".to_string())));
    assert!(!Some("a".to_string()).same_content(&None));
    assert!(vec!["x ".to_string()].same_content(&vec!["x".to_string()]));
    assert!(!vec![1_i64].same_content(&vec![1, 2]));
}

#[derive(FormFields)]
struct LoginFields {
    username: TextFieldController,
    remember_me: FieldController<bool>,
    #[form_field(skip)]
    #[allow(dead_code)]
    title: String,
}

#[test]
fn derived_fields_register_in_declaration_order() {
    let context = FormContext::new();
    let form = FormController::new(FormOptions::default());
    let fields = LoginFields {
        username: TextFieldController::new("username", ""),
        remember_me: FieldController::new("remember_me", false),
        title: "Sign in".into(),
    };

    context.build(&form, &fields).expect("build form");

    assert_eq!(LoginFields::field_names(), &["username", "remember_me"]);
    let names = form
        .fields()
        .expect("fields")
        .iter()
        .map(|field| field.name())
        .collect::<Vec<_>>();
    assert_eq!(
        names,
        vec![
            SharedString::from("username"),
            SharedString::from("remember_me")
        ]
    );
    assert!(fields.remember_me.owner().is_some());
}
