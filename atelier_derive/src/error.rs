use darling::FromDeriveInput;
use darling::FromVariant;
use darling::ast::Data;
use darling::ast::Fields;
use darling::ast::Style;
use proc_macro2::TokenStream;
use quote::quote;
use syn::DeriveInput;
use syn::Ident;

const DEFAULT_STATUS: u16 = 500;

#[derive(FromDeriveInput)]
#[darling(attributes(atelier_error), supports(enum_any))]
struct ErrorOptions {
    ident: Ident,
    data: Data<ErrorVariant, ()>,
    base_id: String,
}

#[derive(FromVariant)]
#[darling(attributes(atelier_error))]
struct ErrorVariant {
    ident: Ident,
    fields: Fields<syn::Field>,
    #[darling(default)]
    status: Option<u16>,
}

pub(crate) fn expand_atelier_error(input: &DeriveInput) -> darling::Result<TokenStream> {
    let ErrorOptions {
        ident,
        data,
        base_id,
    } = ErrorOptions::from_derive_input(input)?;
    let variants = data
        .take_enum()
        .expect("darling should have rejected non-enum inputs");

    let mut status_arms = Vec::new();
    let mut type_arms = Vec::new();
    let mut context_arms = Vec::new();

    for ErrorVariant {
        ident: variant,
        fields,
        status,
    } in &variants
    {
        let status = status.unwrap_or(DEFAULT_STATUS);
        let error_type = format!("atelier:{base_id}:{variant}");
        let pattern = match fields.style {
            Style::Unit => quote! { Self::#variant },
            Style::Tuple => quote! { Self::#variant(..) },
            Style::Struct => quote! { Self::#variant { .. } },
        };
        status_arms.push(quote! {
            #pattern => axum::http::StatusCode::from_u16(#status)
                .expect("status codes are checked at compile time"),
        });
        type_arms.push(quote! {
            #pattern => #error_type,
        });

        // only named fields carry context, tuple variants wrap source errors
        if fields.style == Style::Struct {
            let field_idents = fields
                .iter()
                .map(|field| field.ident.as_ref().expect("struct variants have named fields"))
                .collect::<Vec<_>>();
            let entries = field_idents.iter().map(|field| {
                let key = field.to_string();
                quote! {
                    context.insert(
                        #key.to_owned(),
                        serde_json::to_value(#field).unwrap_or_default(),
                    );
                }
            });
            context_arms.push(quote! {
                Self::#variant { #(#field_idents),* } => {
                    let mut context = std::collections::HashMap::new();
                    #(#entries)*
                    context
                }
            });
        } else {
            context_arms.push(quote! {
                #pattern => Default::default(),
            });
        }
    }

    Ok(quote! {
        impl crate::error::AtelierError for #ident {
            fn get_status(&self) -> axum::http::StatusCode {
                match self {
                    #(#status_arms)*
                }
            }

            fn get_type(&self) -> &str {
                match self {
                    #(#type_arms)*
                }
            }

            fn context(&self) -> std::collections::HashMap<String, serde_json::Value> {
                match self {
                    #(#context_arms)*
                }
            }
        }
    })
}
