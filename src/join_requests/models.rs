use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::bookings::{Booking, BookingStatus};
use crate::db;
use crate::errors::ServiceError;

/// Whether the booker let someone join, turned them down or the
/// requester changed their mind.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JoinStatus {
    Pending,
    Accepted,
    Declined,
    Cancelled,
}

impl JoinStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinStatus::Pending => "pending",
            JoinStatus::Accepted => "accepted",
            JoinStatus::Declined => "declined",
            JoinStatus::Cancelled => "cancelled",
        }
    }

    /// an accepted player can still back out, everything else is final
    pub fn transition(self, to: JoinStatus) -> Result<JoinStatus, ServiceError> {
        use JoinStatus::*;

        match (self, to) {
            (Pending, Accepted) | (Pending, Declined) | (Pending, Cancelled)
            | (Accepted, Cancelled) => Ok(to),
            (from, to) => Err(ServiceError::Conflict(format!(
                "a {} join request can't become {}",
                from, to
            ))),
        }
    }
}

impl fmt::Display for JoinStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JoinStatus {
    type Err = ServiceError;

    fn from_str(status: &str) -> Result<Self, Self::Err> {
        match status {
            "pending" => Ok(JoinStatus::Pending),
            "accepted" => Ok(JoinStatus::Accepted),
            "declined" => Ok(JoinStatus::Declined),
            "cancelled" => Ok(JoinStatus::Cancelled),
            unknown => {
                error!("unknown join request status: {}", unknown);
                Err(ServiceError::InternalServerError)
            }
        }
    }
}

/// A user asking to play along in someone else's booking
#[derive(Serialize, Deserialize, Debug, Clone, sqlx::FromRow)]
pub struct JoinRequest {
    pub id: i64,
    pub booking_id: i64,
    pub user_id: i64,
    pub status: String,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// **POST /api/bookings/{id}/join-requests**
///
/// ``` shell
/// curl --location --request POST 'localhost:8080/api/bookings/1/join-requests' \
///     --header 'Content-Type: application/json' \
///     --data-raw '{ "message": "I bring the balls" }'
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct JoinMessage {
    pub message: Option<String>,
}

/// Check if a user can ask to join a booking
pub fn check_joinable(
    booking: &Booking,
    requester_id: i64,
    max_players: i16,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    if !booking.allows_join {
        bad_request!("this booking doesn't take other players");
    }

    if !booking.status()?.is_active() {
        bad_request!(format!("you can't join a {} booking", booking.status));
    }

    if booking.has_started(now) {
        bad_request!("this booking already started");
    }

    if booking.user_id == requester_id {
        bad_request!("you can't join your own booking");
    }

    if booking.player_count >= max_players {
        conflict!("this booking is full");
    }

    Ok(())
}

impl JoinRequest {
    pub fn status(&self) -> Result<JoinStatus, ServiceError> {
        self.status.parse()
    }

    /// Store a join request.
    ///
    /// A declined or cancelled request of the same user is reopened.
    #[tracing::instrument(name = "JoinRequest::create", skip(message, db))]
    pub async fn create(
        booking_id: i64,
        user_id: i64,
        message: Option<String>,
        db: &db::Pool,
    ) -> Result<JoinRequest, ServiceError> {
        let request = sqlx::query_as::<_, JoinRequest>(
            "INSERT INTO join_requests (booking_id, user_id, message) VALUES ($1, $2, $3)
             ON CONFLICT (booking_id, user_id) DO UPDATE
             SET status = 'pending', message = EXCLUDED.message, updated_at = NOW()
             WHERE join_requests.status IN ('declined', 'cancelled')
             RETURNING *",
        )
        .bind(booking_id)
        .bind(user_id)
        .bind(message)
        .fetch_optional(db)
        .await?;

        match request {
            Some(request) => Ok(request),
            None => conflict!("you already asked to join this booking"),
        }
    }

    pub async fn find(id: i64, db: &db::Pool) -> Result<JoinRequest, ServiceError> {
        let request = sqlx::query_as::<_, JoinRequest>("SELECT * FROM join_requests WHERE id = $1")
            .bind(id)
            .fetch_one(db)
            .await?;

        Ok(request)
    }

    #[tracing::instrument(name = "JoinRequest::find_by_booking", skip(db))]
    pub async fn find_by_booking(booking_id: i64, db: &db::Pool) -> Result<Vec<JoinRequest>, ServiceError> {
        let requests = sqlx::query_as::<_, JoinRequest>(
            "SELECT * FROM join_requests WHERE booking_id = $1 ORDER BY created_at",
        )
        .bind(booking_id)
        .fetch_all(db)
        .await?;

        Ok(requests)
    }

    #[tracing::instrument(name = "JoinRequest::find_by_user", skip(db))]
    pub async fn find_by_user(user_id: i64, db: &db::Pool) -> Result<Vec<JoinRequest>, ServiceError> {
        let requests = sqlx::query_as::<_, JoinRequest>(
            "SELECT * FROM join_requests WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(db)
        .await?;

        Ok(requests)
    }

    /// returns true if the user plays along in the booking
    pub async fn is_accepted(booking_id: i64, user_id: i64, db: &db::Pool) -> Result<bool, ServiceError> {
        let accepted: (bool,) = sqlx::query_as(
            "SELECT EXISTS (
                SELECT 1 FROM join_requests
                WHERE booking_id = $1 AND user_id = $2 AND status = 'accepted'
            )",
        )
        .bind(booking_id)
        .bind(user_id)
        .fetch_one(db)
        .await?;

        Ok(accepted.0)
    }

    /// guarded status update, Conflict when the request changed in the meantime
    async fn change_status(
        &self,
        to: JoinStatus,
        tx: &mut db::Transaction<'_>,
    ) -> Result<JoinRequest, ServiceError> {
        let from = self.status()?;
        let to = from.transition(to)?;

        let request = sqlx::query_as::<_, JoinRequest>(
            "UPDATE join_requests SET status = $3, updated_at = NOW()
             WHERE id = $1 AND status = $2 RETURNING *",
        )
        .bind(self.id)
        .bind(from.to_string())
        .bind(to.to_string())
        .fetch_optional(&mut *tx)
        .await?;

        match request {
            Some(request) => Ok(request),
            None => conflict!("this join request was changed in the meantime, try again"),
        }
    }

    /// Accept the request and count the player in the booking.
    ///
    /// The player count only goes up while the court has room left.
    #[tracing::instrument(name = "JoinRequest::accept", skip(self, db), fields(request_id = self.id))]
    pub async fn accept(&self, db: &db::Pool) -> Result<JoinRequest, ServiceError> {
        let mut tx = db.begin().await?;

        let seat: Option<(i64,)> = sqlx::query_as(
            "UPDATE bookings SET player_count = player_count + 1, updated_at = NOW()
             WHERE id = $1
             AND status IN ('pending', 'confirmed')
             AND player_count < (SELECT max_players FROM courts WHERE courts.id = bookings.court_id)
             RETURNING id",
        )
        .bind(self.booking_id)
        .fetch_optional(&mut tx)
        .await?;

        if seat.is_none() {
            conflict!("this booking is full or no longer active");
        }

        let request = self.change_status(JoinStatus::Accepted, &mut tx).await?;
        tx.commit().await?;

        Ok(request)
    }

    #[tracing::instrument(name = "JoinRequest::decline", skip(self, db), fields(request_id = self.id))]
    pub async fn decline(&self, db: &db::Pool) -> Result<JoinRequest, ServiceError> {
        let mut tx = db.begin().await?;
        let request = self.change_status(JoinStatus::Declined, &mut tx).await?;
        tx.commit().await?;

        Ok(request)
    }

    /// Withdraw the request, an accepted player frees their spot again
    #[tracing::instrument(name = "JoinRequest::cancel", skip(self, db), fields(request_id = self.id))]
    pub async fn cancel(&self, db: &db::Pool) -> Result<JoinRequest, ServiceError> {
        let mut tx = db.begin().await?;
        let request = self.change_status(JoinStatus::Cancelled, &mut tx).await?;

        let (booking_status,): (String,) =
            sqlx::query_as("SELECT status FROM bookings WHERE id = $1 FOR UPDATE")
                .bind(self.booking_id)
                .fetch_one(&mut tx)
                .await?;

        if frees_a_seat(self.status()?, booking_status.parse()?) {
            sqlx::query(
                "UPDATE bookings SET player_count = GREATEST(player_count - 1, 1), updated_at = NOW()
                 WHERE id = $1 AND status IN ('pending', 'confirmed')",
            )
            .bind(self.booking_id)
            .execute(&mut tx)
            .await?;
        }

        tx.commit().await?;

        Ok(request)
    }
}

/// only accepted players of a booking that's still ahead give their spot back
fn frees_a_seat(request: JoinStatus, booking: BookingStatus) -> bool {
    request == JoinStatus::Accepted && booking.is_active()
}

#[cfg(test)]
mod tests {
    use super::JoinStatus::*;
    use super::*;
    use crate::bookings::BookingStatus;
    use chrono::{Duration, TimeZone};

    #[test]
    fn only_active_bookings_get_their_seat_back() {
        assert!(frees_a_seat(Accepted, BookingStatus::Confirmed));
        assert!(frees_a_seat(Accepted, BookingStatus::Pending));
        assert!(!frees_a_seat(Accepted, BookingStatus::Completed));
        assert!(!frees_a_seat(Accepted, BookingStatus::Cancelled));
        assert!(!frees_a_seat(Pending, BookingStatus::Confirmed));
    }

    fn now() -> DateTime<Utc> {
        Utc.ymd(2026, 10, 18).and_hms(12, 0, 0)
    }

    fn open_booking() -> Booking {
        let start = Utc.ymd(2026, 10, 24).and_hms(9, 0, 0);
        Booking {
            id: 1,
            court_id: 2,
            user_id: 3,
            start_time: start,
            end_time: start + Duration::hours(2),
            status: BookingStatus::Confirmed.to_string(),
            player_count: 2,
            allows_join: true,
            base_price: 3000,
            discount: 0,
            points_redeemed: 0,
            total_price: 3000,
            promotion_id: None,
            notes: None,
            created_at: now(),
            updated_at: now(),
        }
    }

    #[test]
    fn transitions() {
        assert_eq!(Pending.transition(Accepted), Ok(Accepted));
        assert_eq!(Pending.transition(Declined), Ok(Declined));
        assert_eq!(Accepted.transition(Cancelled), Ok(Cancelled));

        assert!(Accepted.transition(Declined).is_err());
        assert!(Declined.transition(Accepted).is_err());
        assert!(Cancelled.transition(Pending).is_err());
    }

    #[test]
    fn open_bookings_can_be_joined() {
        assert!(check_joinable(&open_booking(), 9, 4, now()).is_ok());
    }

    #[test]
    fn bookings_that_cannot_be_joined() {
        let mut closed = open_booking();
        closed.allows_join = false;
        assert!(check_joinable(&closed, 9, 4, now()).is_err());

        let mut cancelled = open_booking();
        cancelled.status = BookingStatus::Cancelled.to_string();
        assert!(check_joinable(&cancelled, 9, 4, now()).is_err());

        let started = open_booking();
        assert!(check_joinable(&started, 9, 4, started.start_time).is_err());

        // the booker is already playing
        assert!(check_joinable(&open_booking(), 3, 4, now()).is_err());
    }

    #[test]
    fn full_bookings_are_a_conflict() {
        let mut full = open_booking();
        full.player_count = 4;

        match check_joinable(&full, 9, 4, now()) {
            Err(ServiceError::Conflict(_)) => {}
            other => panic!("expected a conflict, got {:?}", other),
        }
    }
}
