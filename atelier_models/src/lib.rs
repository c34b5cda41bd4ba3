pub mod document;
pub mod prelude;
pub mod tags;

// Export all Model at crate root
pub use document::Document;
pub use tags::Tags;

use std::sync::LazyLock;

use database::DatabaseError;
use diesel::result::DatabaseErrorInformation;
use diesel::result::DatabaseErrorKind;
use regex::Regex;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    #[error(
        "unique constraint violation \"{constraint}\" on column \"{column}\" with value \"{value}\""
    )]
    UniqueViolation {
        constraint: String,
        column: String,
        value: String,
    },
    #[error("check constraint violation of \"{constraint}\"")]
    CheckViolation { constraint: String },
    #[error("foreign key constraint violation of \"{constraint}\"")]
    ForeignKeyViolation { constraint: String },
    #[error(transparent)]
    DatabaseError(#[from] DatabaseError),
}

fn try_parse_unique_violation(e: &(dyn DatabaseErrorInformation + Send + Sync)) -> Option<Error> {
    static RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r#"duplicate key value violates unique constraint"#).unwrap());
    if !RE.is_match(e.message()) {
        return None;
    }
    static DETAILS: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r#"Key \(([^)]+)\)=\(([^)]+)\) already exists\."#).unwrap());
    DETAILS
        .captures(e.details().expect("PostgreSQL should provide details"))
        .map(|captures| Error::UniqueViolation {
            constraint: e
                .constraint_name()
                .expect("PostgreSQL should provide the constraint name")
                .to_owned(),
            column: captures.get(1).unwrap().as_str().to_owned(),
            value: captures.get(2).unwrap().as_str().to_owned(),
        })
}

fn try_parse_check_violation(e: &(dyn DatabaseErrorInformation + Send + Sync)) -> Option<Error> {
    static RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"new row for relation .* violates check constraint"#).unwrap()
    });
    RE.is_match(e.message()).then(|| Error::CheckViolation {
        constraint: e
            .constraint_name()
            .expect("PostgreSQL should provide the constraint name")
            .to_owned(),
    })
}

fn try_parse_foreign_key_violation(
    e: &(dyn DatabaseErrorInformation + Send + Sync),
) -> Option<Error> {
    static RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r#"(insert or update on|update or delete on) table .* violates foreign key constraint"#,
        )
        .unwrap()
    });
    RE.is_match(e.message()).then(|| Error::ForeignKeyViolation {
        constraint: e
            .constraint_name()
            .expect("PostgreSQL should provide the constraint name")
            .to_owned(),
    })
}

impl From<diesel::result::Error> for Error {
    fn from(e: diesel::result::Error) -> Self {
        use diesel::result::Error::DatabaseError as Inner;

        let parsed = match &e {
            Inner(DatabaseErrorKind::UniqueViolation, inner) => {
                try_parse_unique_violation(inner.as_ref())
            }
            Inner(DatabaseErrorKind::CheckViolation, inner) => {
                try_parse_check_violation(inner.as_ref())
            }
            Inner(DatabaseErrorKind::ForeignKeyViolation, inner) => {
                try_parse_foreign_key_violation(inner.as_ref())
            }
            _ => return Self::DatabaseError(e.into()),
        };
        parsed.unwrap_or_else(|| {
            // falling back to the generic error is still semantically correct,
            // logging is enough
            tracing::error!(error = %e, "failed to parse PostgreSQL details message");
            Self::DatabaseError(e.into())
        })
    }
}
