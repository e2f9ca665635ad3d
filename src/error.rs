// Copyright 2023 Remi Bernotavicius

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;

/// Failures surfaced by the entity store, association manager and recipe service.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("storage failure: {0}")]
    Storage(DieselError),

    #[error("connection pool failure: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
}

impl From<DieselError> for StoreError {
    fn from(error: DieselError) -> Self {
        match error {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                Self::Conflict(info.message().to_owned())
            }
            error => Self::Storage(error),
        }
    }
}

impl StoreError {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{what} not found"))
    }

    /// Replaces the driver message of a unique violation with a readable one.
    pub fn with_conflict_message(self, message: impl Into<String>) -> Self {
        match self {
            Self::Conflict(_) => Self::Conflict(message.into()),
            other => other,
        }
    }
}

/// Trims `value` and fails with a validation error naming `field` when nothing is left.
pub fn require_text(value: &str, field: &str) -> Result<String, StoreError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(StoreError::Validation(format!("{field} cannot be empty")));
    }
    Ok(value.to_owned())
}

#[test]
fn unique_violation_becomes_conflict() {
    #[derive(Debug)]
    struct Info;

    impl diesel::result::DatabaseErrorInformation for Info {
        fn message(&self) -> &str {
            "UNIQUE constraint failed: recipe_types.name"
        }
        fn details(&self) -> Option<&str> {
            None
        }
        fn hint(&self) -> Option<&str> {
            None
        }
        fn table_name(&self) -> Option<&str> {
            None
        }
        fn column_name(&self) -> Option<&str> {
            None
        }
        fn constraint_name(&self) -> Option<&str> {
            None
        }
        fn statement_position(&self) -> Option<i32> {
            None
        }
    }

    let error = StoreError::from(DieselError::DatabaseError(
        DatabaseErrorKind::UniqueViolation,
        Box::new(Info),
    ));
    assert!(matches!(&error, StoreError::Conflict(m) if m.contains("recipe_types.name")));

    let error = error.with_conflict_message("Recipe type 'Soup' already exists");
    assert_eq!(error.to_string(), "Recipe type 'Soup' already exists");

    assert!(matches!(
        StoreError::from(DieselError::NotFound),
        StoreError::Storage(DieselError::NotFound)
    ));
}

#[test]
fn require_text_trims() {
    assert_eq!(require_text("  Pancakes ", "Recipe name").unwrap(), "Pancakes");
    let error = require_text(" \n", "Recipe name").unwrap_err();
    assert!(matches!(error, StoreError::Validation(_)));
    assert_eq!(error.to_string(), "Recipe name cannot be empty");
}
