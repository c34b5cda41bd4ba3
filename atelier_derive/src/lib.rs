mod error;

use darling::Error;
use proc_macro::TokenStream;
use syn::DeriveInput;
use syn::parse_macro_input;

/// Derives the `AtelierError` trait for an error enum
///
/// Each variant maps to an HTTP status code and a stable error type
/// identifier of the form `atelier:<base_id>:<VariantName>`. Named fields of
/// a variant are collected into the error context so that clients get the
/// relevant ids and values back in the JSON body.
///
/// ```ignore
/// #[derive(Debug, Error, AtelierError)]
/// #[atelier_error(base_id = "project")]
/// enum ProjectError {
///     #[error("Project '{project_id}', could not be found")]
///     #[atelier_error(status = 404)]
///     NotFound { project_id: i64 },
///     #[error(transparent)]
///     #[atelier_error(status = 500)]
///     Database(atelier_models::Error),
/// }
/// ```
#[proc_macro_derive(AtelierError, attributes(atelier_error))]
pub fn atelier_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    error::expand_atelier_error(&input)
        .unwrap_or_else(Error::write_errors)
        .into()
}
