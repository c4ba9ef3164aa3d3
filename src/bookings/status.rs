use std::fmt;
use std::str::FromStr;

use crate::errors::ServiceError;

/// The lifecycle of a booking.
///
/// ```text
/// pending ──> confirmed ──> completed
///    │            │
///    └────────────┴──> cancelled
/// ```
///
/// Only pending and confirmed bookings claim their court, the database
/// refuses two of those that overlap.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }

    /// active bookings occupy the court
    pub fn is_active(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    /// returns the new status when moving from `self` to `to` is allowed
    pub fn transition(self, to: BookingStatus) -> Result<BookingStatus, ServiceError> {
        use BookingStatus::*;

        match (self, to) {
            (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Completed)
            | (Confirmed, Cancelled) => Ok(to),
            (from, to) => Err(ServiceError::Conflict(format!(
                "a {} booking can't become {}",
                from, to
            ))),
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = ServiceError;

    fn from_str(status: &str) -> Result<Self, Self::Err> {
        match status {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            "completed" => Ok(BookingStatus::Completed),
            unknown => {
                error!("unknown booking status: {}", unknown);
                Err(ServiceError::InternalServerError)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::BookingStatus::*;
    use super::*;

    #[test]
    fn allowed_transitions() {
        assert_eq!(Pending.transition(Confirmed), Ok(Confirmed));
        assert_eq!(Pending.transition(Cancelled), Ok(Cancelled));
        assert_eq!(Confirmed.transition(Completed), Ok(Completed));
        assert_eq!(Confirmed.transition(Cancelled), Ok(Cancelled));
    }

    #[test]
    fn forbidden_transitions() {
        let forbidden = vec![
            (Pending, Pending),
            (Pending, Completed),
            (Confirmed, Pending),
            (Confirmed, Confirmed),
            (Cancelled, Pending),
            (Cancelled, Confirmed),
            (Cancelled, Completed),
            (Cancelled, Cancelled),
            (Completed, Pending),
            (Completed, Cancelled),
        ];

        for (from, to) in forbidden {
            assert!(from.transition(to).is_err(), "{} -> {}", from, to);
        }
    }

    #[test]
    fn only_pending_and_confirmed_are_active() {
        assert!(Pending.is_active());
        assert!(Confirmed.is_active());
        assert!(!Cancelled.is_active());
        assert!(!Completed.is_active());
    }

    #[test]
    fn parses_database_values() {
        for status in &[Pending, Confirmed, Cancelled, Completed] {
            assert_eq!(status.as_str().parse::<BookingStatus>(), Ok(*status));
        }
        assert!("booked".parse::<BookingStatus>().is_err());
    }
}
