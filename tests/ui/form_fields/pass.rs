use calm_forms::form::{
    FieldController, FormContext, FormController, FormFields, FormOptions, TextFieldController,
};

#[derive(calm_forms::form::FormFields)]
struct ProfileFields {
    display_name: TextFieldController,
    age: FieldController<u32>,
    #[form_field(skip)]
    heading: &'static str,
}

fn main() {
    let context = FormContext::new();
    let form = FormController::new(FormOptions::default());
    let fields = ProfileFields {
        display_name: TextFieldController::new("display_name", "Ada"),
        age: FieldController::new("age", 36),
        heading: "Profile",
    };

    context.build(&form, &fields).expect("build form");

    assert_eq!(ProfileFields::field_names(), &["display_name", "age"]);
    assert_eq!(form.field_count().expect("field count"), 2);
    assert_eq!(fields.heading, "Profile");
}
