use thiserror::Error;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Signals a storage backend reports to the registry.
///
/// Constraint violations are kept apart from genuine faults so the registry
/// can turn them into domain outcomes.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    #[error("foreign key constraint violated: {constraint}")]
    ForeignKeyViolation { constraint: String },

    #[error("storage operation timed out")]
    Timeout,

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// PostgreSQL SQLSTATE codes the registry cares about.
const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const QUERY_CANCELED: &str = "57014";

impl StoreError {
    /// Classify a sqlx error, attaching `context` to anything that is not a
    /// recognised constraint or timeout signal.
    pub fn from_sqlx(error: sqlx::Error, context: &'static str) -> Self {
        match &error {
            sqlx::Error::PoolTimedOut => return StoreError::Timeout,
            sqlx::Error::Database(db_error) => {
                let constraint = db_error.constraint().unwrap_or("unknown").to_string();
                match db_error.code().as_deref() {
                    Some(UNIQUE_VIOLATION) => return StoreError::UniqueViolation { constraint },
                    Some(FOREIGN_KEY_VIOLATION) => {
                        return StoreError::ForeignKeyViolation { constraint }
                    }
                    Some(QUERY_CANCELED) => return StoreError::Timeout,
                    _ => {}
                }
            }
            _ => {}
        }
        StoreError::Backend(anyhow::Error::new(error).context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::fmt;

    /// A server-side error carrying only a SQLSTATE and constraint name.
    #[derive(Debug)]
    struct PgServerError {
        code: &'static str,
        constraint: Option<&'static str>,
    }

    impl fmt::Display for PgServerError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "server error {}", self.code)
        }
    }

    impl std::error::Error for PgServerError {}

    impl DatabaseError for PgServerError {
        fn message(&self) -> &str {
            "server error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed(self.code))
        }

        fn constraint(&self) -> Option<&str> {
            self.constraint
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            match self.code {
                UNIQUE_VIOLATION => ErrorKind::UniqueViolation,
                FOREIGN_KEY_VIOLATION => ErrorKind::ForeignKeyViolation,
                _ => ErrorKind::Other,
            }
        }
    }

    fn server_error(code: &'static str, constraint: Option<&'static str>) -> sqlx::Error {
        sqlx::Error::Database(Box::new(PgServerError { code, constraint }))
    }

    #[test]
    fn test_unique_violation_keeps_constraint() {
        let error = StoreError::from_sqlx(
            server_error("23505", Some("service_instances_service_id_org_id_space_id_key")),
            "Failed to insert service instance",
        );
        match error {
            StoreError::UniqueViolation { constraint } => {
                assert_eq!(constraint, "service_instances_service_id_org_id_space_id_key");
            }
            other => panic!("expected unique violation, got {:?}", other),
        }
    }

    #[test]
    fn test_foreign_key_violation() {
        let error = StoreError::from_sqlx(
            server_error("23503", Some("service_bindings_instance_id_fkey")),
            "Failed to clear service instances",
        );
        assert!(matches!(
            error,
            StoreError::ForeignKeyViolation { ref constraint } if constraint == "service_bindings_instance_id_fkey"
        ));
    }

    #[test]
    fn test_statement_timeout_is_timeout() {
        let error = StoreError::from_sqlx(server_error("57014", None), "Failed to fetch service instance");
        assert!(matches!(error, StoreError::Timeout));
    }

    #[test]
    fn test_unknown_constraint_name() {
        let error = StoreError::from_sqlx(server_error("23505", None), "Failed to insert service binding");
        assert!(matches!(error, StoreError::UniqueViolation { ref constraint } if constraint == "unknown"));
    }

    #[test]
    fn test_other_sqlstate_is_backend_fault() {
        let error = StoreError::from_sqlx(server_error("42P01", None), "Failed to fetch service instance");
        assert!(matches!(error, StoreError::Backend(_)));
    }

    #[test]
    fn test_pool_timeout_is_timeout() {
        let error = StoreError::from_sqlx(sqlx::Error::PoolTimedOut, "Failed to fetch");
        assert!(matches!(error, StoreError::Timeout));
    }

    #[test]
    fn test_other_errors_keep_context() {
        let error = StoreError::from_sqlx(sqlx::Error::RowNotFound, "Failed to fetch service instance");
        match error {
            StoreError::Backend(inner) => {
                assert_eq!(inner.to_string(), "Failed to fetch service instance");
            }
            other => panic!("expected backend fault, got {:?}", other),
        }
    }
}
