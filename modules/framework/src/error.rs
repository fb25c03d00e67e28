#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Not found")]
    NotFound,
    #[error("Permissions denied")]
    PermissionsDenied,
    #[error("Unauthenticated")]
    Unauthenticated,
    #[error("Invalid input")]
    InvalidInput,
    /// A uniqueness or optimistic-concurrency check failed in storage.
    #[error("Conflict")]
    Conflict,
    #[error("Database error: {0}")]
    SqlxError(sqlx::Error),
    #[error("Business panic: {0}")]
    BusinessPanic(anyhow::Error),
}

impl From<sqlx::Error> for Error {
    fn from(value: sqlx::Error) -> Self {
        match &value {
            sqlx::Error::RowNotFound => Error::NotFound,
            sqlx::Error::Database(db_error) if db_error.is_unique_violation() => Error::Conflict,
            _ => Error::SqlxError(value),
        }
    }
}

impl Error {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_maps_to_not_found() {
        let error = Error::from(sqlx::Error::RowNotFound);
        assert!(matches!(error, Error::NotFound));
    }

    #[test]
    fn other_sqlx_errors_are_wrapped() {
        let error = Error::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(error, Error::SqlxError(sqlx::Error::PoolTimedOut)));
        assert!(!error.is_conflict());
    }
}
