use crate::errors::ServiceError;
use regex::Regex;
use serde::de::DeserializeOwned;

/// Wraps a request body so it can only be used after it has been validated
#[derive(Deserialize, Debug)]
pub struct Validator<T>(T);

pub trait Validate<T> {
    fn validate(&self) -> Result<(), ServiceError>;
}

impl<T> Validator<T> {
    pub fn new(i: T) -> Validator<T> {
        Validator::<T>(i)
    }
}

impl<T> Validator<T>
where
    T: Validate<T>,
    T: DeserializeOwned,
{
    pub fn validate(self) -> Result<T, ServiceError> {
        self.0.validate()?;
        Ok(self.0)
    }
}

lazy_static! {
    static ref EMAIL_PATTERN: Regex =
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("invalid email regex");
}

/// checks the shape of an email address, not whether it exists
pub fn is_email(value: &str) -> bool {
    EMAIL_PATTERN.is_match(value)
}

/// returns a BadRequest when a trimmed text field is empty or longer than `max` characters
pub fn text_length(field: &str, value: &str, max: usize) -> Result<(), ServiceError> {
    let length = value.trim().chars().count();

    if length == 0 {
        bad_request!(format!("{} is too short", field));
    }

    if length > max {
        bad_request!(format!("{} is too long, maximum {} characters", field, max));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Flag(bool);

    impl Validate<Flag> for Flag {
        fn validate(&self) -> Result<(), ServiceError> {
            if self.0 {
                return Ok(());
            }
            Err(ServiceError::BadRequest("invalid input".to_string()))
        }
    }

    #[test]
    fn invalid_value() {
        let invalid = Validator::new(Flag(false));

        assert!(invalid.validate().is_err());
    }

    #[test]
    fn valid_value() {
        let valid = Validator::new(Flag(true));

        assert!(valid.validate().is_ok());
    }

    #[test]
    fn emails() {
        assert!(is_email("dink@court.be"));
        assert!(!is_email("dink"));
        assert!(!is_email("dink@court"));
        assert!(!is_email("di nk@court.be"));
        assert!(!is_email("@court.be"));
    }

    #[test]
    fn text_lengths() {
        assert!(text_length("name", "center court", 60).is_ok());
        assert!(text_length("name", "   ", 60).is_err());
        assert!(text_length("name", &"a".repeat(61), 60).is_err());
    }
}
