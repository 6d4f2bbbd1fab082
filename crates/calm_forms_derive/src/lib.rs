use proc_macro::TokenStream;
use proc_macro2::{Ident, Span, TokenStream as TokenStream2};
use proc_macro_crate::{FoundCrate, crate_name};
use quote::quote;
use syn::{Data, DeriveInput, Fields, parse_macro_input};

/// Implements `FormFields` for a struct whose named fields are field
/// controllers. Fields materialize in declaration order, which becomes their
/// registration order in the form.
#[proc_macro_derive(FormFields, attributes(form_field))]
pub fn derive_form_fields(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    if !input.generics.params.is_empty() {
        return syn::Error::new_spanned(
            input.ident,
            "FormFields derive currently supports only non-generic structs",
        )
        .to_compile_error()
        .into();
    }

    let fields_ident = input.ident;

    let named_fields = match input.data {
        Data::Struct(data) => match data.fields {
            Fields::Named(fields) => fields.named,
            _ => {
                return syn::Error::new(
                    Span::call_site(),
                    "FormFields derive requires a struct with named fields",
                )
                .to_compile_error()
                .into();
            }
        },
        _ => {
            return syn::Error::new(
                Span::call_site(),
                "FormFields derive is only supported on structs",
            )
            .to_compile_error()
            .into();
        }
    };

    let calm_forms = calm_forms_path();
    let mut names = Vec::new();
    let mut materialize_calls = Vec::new();

    for field in named_fields {
        if has_skip_attribute(&field.attrs) {
            continue;
        }
        let Some(field_ident) = field.ident else {
            continue;
        };
        names.push(field_ident.to_string());
        materialize_calls.push(quote! {
            #calm_forms::form::FieldHandle::materialize(&self.#field_ident, context)?;
        });
    }

    quote! {
        impl #calm_forms::form::FormFields for #fields_ident {
            fn field_names() -> &'static [&'static str] {
                &[#(#names),*]
            }

            fn materialize_all(
                &self,
                context: &#calm_forms::form::FormContext,
            ) -> #calm_forms::form::FormResult<()> {
                #(#materialize_calls)*
                Ok(())
            }
        }
    }
    .into()
}

/// `#[form_field(skip)]` leaves a struct member out of registration.
fn has_skip_attribute(attrs: &[syn::Attribute]) -> bool {
    attrs
        .iter()
        .filter(|attr| attr.path().is_ident("form_field"))
        .any(|attr| {
            let mut skip = false;
            let _ = attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("skip") {
                    skip = true;
                }
                Ok(())
            });
            skip
        })
}

fn calm_forms_path() -> TokenStream2 {
    match crate_name("calm_forms") {
        Ok(FoundCrate::Name(name)) => {
            let ident = Ident::new(&name, Span::call_site());
            quote!(::#ident)
        }
        Ok(FoundCrate::Itself) => quote!(crate),
        Err(_) => quote!(::calm_forms),
    }
}
