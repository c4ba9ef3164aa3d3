use actix_web::{error::ResponseError, HttpResponse};
use derive_more::Display;
use std::convert::From;

/// postgres error codes we translate into client errors
const UNIQUE_VIOLATION: &str = "23505";
const EXCLUSION_VIOLATION: &str = "23P01";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const CHECK_VIOLATION: &str = "23514";

#[derive(Debug, Display, PartialEq)]
pub enum ServiceError {
    #[display(fmt = "Internal Server Error")]
    InternalServerError,

    #[display(fmt = "BadRequest: {}", _0)]
    BadRequest(String),

    #[display(fmt = "Conflict: {}", _0)]
    Conflict(String),

    #[display(fmt = "Unauthorized")]
    Unauthorized,

    #[display(fmt = "Forbidden: {}", _0)]
    Forbidden(String),

    #[display(fmt = "Not Found")]
    NotFound,
}

#[derive(Serialize, Debug)]
struct ErrorResponse {
    error: String,
}

impl ErrorResponse {
    fn new<S: Into<String>>(error: S) -> Self {
        ErrorResponse {
            error: error.into(),
        }
    }
}

// impl ResponseError trait allows to convert our errors into http responses with appropriate data
impl ResponseError for ServiceError {
    fn error_response(&self) -> HttpResponse {
        match self {
            ServiceError::InternalServerError => HttpResponse::InternalServerError()
                .json(ErrorResponse::new("Internal Server Error, Please try later")),
            ServiceError::BadRequest(ref message) => {
                HttpResponse::BadRequest().json(ErrorResponse::new(message.as_str()))
            }
            ServiceError::Unauthorized => {
                HttpResponse::Unauthorized().json(ErrorResponse::new("Unauthorized"))
            }
            ServiceError::Forbidden(ref message) => {
                HttpResponse::Forbidden().json(ErrorResponse::new(message.as_str()))
            }
            ServiceError::NotFound => HttpResponse::NotFound().json(ErrorResponse::new("Not Found")),
            ServiceError::Conflict(ref message) => {
                HttpResponse::Conflict().json(ErrorResponse::new(message.as_str()))
            }
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<sqlx::Error> for ServiceError {
    fn from(error: sqlx::Error) -> ServiceError {
        match error {
            sqlx::Error::RowNotFound => ServiceError::NotFound,
            sqlx::Error::Database(ref err) => {
                let code = err.code().map(|code| code.to_string());
                match code.as_deref() {
                    Some(EXCLUSION_VIOLATION) => {
                        debug!("exclusion violation: {}", err);
                        ServiceError::Conflict(
                            "the court is already booked for (part of) this time range"
                                .to_string(),
                        )
                    }
                    Some(UNIQUE_VIOLATION) => {
                        debug!("unique violation: {}", err);
                        ServiceError::Conflict(err.message().to_string())
                    }
                    Some(FOREIGN_KEY_VIOLATION) | Some(CHECK_VIOLATION) => {
                        debug!("constraint violation: {}", err);
                        ServiceError::BadRequest(err.message().to_string())
                    }
                    _ => {
                        error!("db error: {}", err);
                        ServiceError::InternalServerError
                    }
                }
            }
            _ => {
                error!("db error: {}", error);
                ServiceError::InternalServerError
            }
        }
    }
}

impl From<sqlx::migrate::MigrateError> for ServiceError {
    fn from(error: sqlx::migrate::MigrateError) -> ServiceError {
        error!("migration error: {}", error);
        ServiceError::InternalServerError
    }
}

impl From<argon2::Error> for ServiceError {
    fn from(error: argon2::Error) -> ServiceError {
        error!("argon2 error: {}", error);
        ServiceError::InternalServerError
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(error: serde_json::Error) -> ServiceError {
        error!("json error: {}", error);
        ServiceError::InternalServerError
    }
}

impl From<actix::MailboxError> for ServiceError {
    fn from(error: actix::MailboxError) -> ServiceError {
        error!("actix mailbox error: {}", error);
        ServiceError::InternalServerError
    }
}

impl From<redis::RedisError> for ServiceError {
    fn from(error: redis::RedisError) -> ServiceError {
        error!("redis error: {}", error);
        ServiceError::InternalServerError
    }
}

impl From<actix_web::Error> for ServiceError {
    fn from(error: actix_web::Error) -> ServiceError {
        error!("actix error: {}", error);
        ServiceError::InternalServerError
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;

    #[test]
    fn errors_map_to_status_codes() {
        let cases = vec![
            (ServiceError::InternalServerError, StatusCode::INTERNAL_SERVER_ERROR),
            (ServiceError::BadRequest("nope".into()), StatusCode::BAD_REQUEST),
            (ServiceError::Conflict("taken".into()), StatusCode::CONFLICT),
            (ServiceError::Unauthorized, StatusCode::UNAUTHORIZED),
            (ServiceError::Forbidden("owners only".into()), StatusCode::FORBIDDEN),
            (ServiceError::NotFound, StatusCode::NOT_FOUND),
        ];

        for (error, status) in cases {
            assert_eq!(error.error_response().status(), status, "{}", error);
        }
    }

    #[test]
    fn missing_rows_are_not_found() {
        let error: ServiceError = sqlx::Error::RowNotFound.into();
        assert_eq!(error, ServiceError::NotFound);
    }

    /// a postgres error with only a SQLSTATE and a message
    #[derive(Debug)]
    struct PgError {
        code: &'static str,
        message: &'static str,
    }

    impl std::fmt::Display for PgError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.message)
        }
    }

    impl std::error::Error for PgError {}

    impl sqlx::error::DatabaseError for PgError {
        fn message(&self) -> &str {
            self.message
        }

        fn code(&self) -> Option<std::borrow::Cow<'_, str>> {
            Some(self.code.into())
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
    }

    fn database_error(code: &'static str, message: &'static str) -> ServiceError {
        sqlx::Error::Database(Box::new(PgError { code, message })).into()
    }

    #[test]
    fn overlapping_bookings_are_conflicts() {
        let error = database_error(
            EXCLUSION_VIOLATION,
            "conflicting key value violates exclusion constraint \"bookings_no_overlap\"",
        );

        match error {
            ServiceError::Conflict(message) => assert!(message.contains("already booked")),
            other => panic!("expected a conflict, got {:?}", other),
        }
    }

    #[test]
    fn duplicates_are_conflicts() {
        let error = database_error(UNIQUE_VIOLATION, "duplicate key value violates unique constraint");
        assert_eq!(
            error,
            ServiceError::Conflict("duplicate key value violates unique constraint".to_string())
        );
    }

    #[test]
    fn broken_references_and_checks_are_bad_requests() {
        for code in &[FOREIGN_KEY_VIOLATION, CHECK_VIOLATION] {
            match database_error(*code, "violates constraint") {
                ServiceError::BadRequest(message) => assert_eq!(message, "violates constraint"),
                other => panic!("expected a bad request for {}, got {:?}", code, other),
            }
        }
    }

    #[test]
    fn unknown_database_errors_are_internal_errors() {
        assert_eq!(
            database_error("40001", "could not serialize access"),
            ServiceError::InternalServerError
        );
    }

    #[test]
    fn pool_timeouts_are_internal_errors() {
        let error: ServiceError = sqlx::Error::PoolTimedOut.into();
        assert_eq!(error, ServiceError::InternalServerError);
    }
}
