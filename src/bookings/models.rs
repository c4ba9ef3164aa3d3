use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::auth::SessionUser;
use crate::bookings::pricing;
use crate::bookings::BookingStatus;
use crate::courts::{Court, Timeslot};
use crate::db;
use crate::errors::ServiceError;
use crate::payments::Payment;
use crate::promotions::Promotion;
use crate::rewards::{self, RewardKind, RewardTransaction};
use crate::server::State;
use crate::websocket::{self, BookingEvent};

const MIN_DURATION_MINUTES: i64 = 30;
const MAX_DURATION_HOURS: i64 = 4;
pub const MAX_DAYS_AHEAD: i64 = 90;

#[derive(Serialize, Deserialize, Debug, Clone, sqlx::FromRow)]
pub struct Booking {
    pub id: i64,
    pub court_id: i64,
    pub user_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: String,
    pub player_count: i16,
    pub allows_join: bool,
    pub base_price: i64,
    pub discount: i64,
    pub points_redeemed: i64,
    pub total_price: i64,
    pub promotion_id: Option<i64>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Used to book a court.
///
/// **POST /api/bookings**
///
/// ``` shell
/// curl --location --request POST 'localhost:8080/api/bookings' \
///     --header 'Content-Type: application/json' \
///     --data-raw '{
///         "court_id": 1,
///         "start_time": "2026-10-24T09:00:00Z",
///         "end_time": "2026-10-24T11:00:00Z",
///         "player_count": 2,
///         "allows_join": true,
///         "promo_code": "SPRING-DINK",
///         "redeem_points": 200
///     }'
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct NewBooking {
    pub court_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default = "default_player_count")]
    pub player_count: i16,
    #[serde(default)]
    pub allows_join: bool,
    pub promo_code: Option<String>,
    #[serde(default)]
    pub redeem_points: i64,
    pub notes: Option<String>,
}

fn default_player_count() -> i16 {
    1
}

#[derive(Debug, Default, Deserialize)]
pub struct BookingFilter {
    pub status: Option<BookingStatus>,
    /// ignored when listing the bookings of a single court
    pub court_id: Option<i64>,
    pub user_id: Option<i64>,
    /// bookings that end after this moment
    pub from: Option<DateTime<Utc>>,
    /// bookings that start before this moment
    pub to: Option<DateTime<Utc>>,
}

impl NewBooking {
    /// checks the parts of a booking that don't need the database
    pub fn check(&self, now: DateTime<Utc>) -> Result<(), ServiceError> {
        if self.start_time >= self.end_time {
            bad_request!("a booking has to end after it starts");
        }

        if self.start_time <= now {
            bad_request!("you can't book a court in the past");
        }

        let duration = self.end_time - self.start_time;
        if duration < Duration::minutes(MIN_DURATION_MINUTES) {
            bad_request!(format!(
                "a booking takes at least {} minutes",
                MIN_DURATION_MINUTES
            ));
        }
        if duration > Duration::hours(MAX_DURATION_HOURS) {
            bad_request!(format!(
                "a booking takes at most {} hours",
                MAX_DURATION_HOURS
            ));
        }

        if self.start_time > now + Duration::days(MAX_DAYS_AHEAD) {
            bad_request!(format!(
                "courts can be booked at most {} days ahead",
                MAX_DAYS_AHEAD
            ));
        }

        if self.player_count < 1 {
            bad_request!("a booking needs at least 1 player");
        }

        if self.redeem_points < 0 {
            bad_request!("you can't redeem a negative amount of points");
        }

        if let Some(notes) = self.notes.as_ref() {
            if notes.chars().count() > 1000 {
                bad_request!("notes are too long, maximum 1000 characters");
            }
        }

        Ok(())
    }
}

impl crate::validator::Validate<NewBooking> for NewBooking {
    fn validate(&self) -> Result<(), ServiceError> {
        self.check(Utc::now())
    }
}

impl From<&Booking> for BookingEvent {
    fn from(booking: &Booking) -> Self {
        BookingEvent {
            booking_id: booking.id,
            court_id: booking.court_id,
            user_id: booking.user_id,
            status: booking.status.clone(),
            start_time: booking.start_time,
            end_time: booking.end_time,
        }
    }
}

impl Booking {
    pub fn status(&self) -> Result<BookingStatus, ServiceError> {
        self.status.parse()
    }

    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        self.start_time <= now
    }

    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.end_time <= now
    }

    /// let the admin websocket sessions know this booking changed
    pub fn broadcast(&self, state: &State) {
        state
            .notifier
            .do_send(websocket::Notification::BookingEvent(self.into()));
    }

    /// Book a court.
    ///
    /// The promotion use, the redeemed points and the booking itself are
    /// stored in one transaction. The database refuses overlapping active
    /// bookings, which ends up as a Conflict.
    #[tracing::instrument(name = "Booking::create", skip(user, booking, db), fields(user_id = user.id))]
    pub async fn create(
        user: &SessionUser,
        booking: NewBooking,
        db: &db::Pool,
    ) -> Result<(Booking, Court), ServiceError> {
        let court = Court::find_by_id(booking.court_id, db).await?;

        if !court.is_active {
            bad_request!("this court can't be booked at the moment");
        }

        if booking.player_count > court.max_players {
            bad_request!(format!(
                "this court has room for at most {} players",
                court.max_players
            ));
        }

        let date = booking.start_time.naive_utc().date();
        let slots = Timeslot::find_for_date(court.id, date, db).await?;
        let quote = pricing::quote(&slots, booking.start_time, booking.end_time)?;

        let now = Utc::now();
        let mut tx = db.begin().await?;

        // a court can't be deleted while it's being booked
        let bookable = sqlx::query("SELECT id FROM courts WHERE id = $1 AND is_active FOR SHARE")
            .bind(court.id)
            .fetch_optional(&mut tx)
            .await?;

        if bookable.is_none() {
            bad_request!("this court can't be booked at the moment");
        }

        let promotion = match booking.promo_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => Some(Promotion::claim(code, now, &mut tx).await?),
            _ => None,
        };

        let balance = if booking.redeem_points > 0 {
            RewardTransaction::locked_balance(user.id, &mut tx).await?
        } else {
            0
        };

        let price = pricing::apply_reductions(
            quote.base_price,
            promotion.as_ref(),
            booking.redeem_points,
            balance,
        )?;

        let created = sqlx::query_as::<_, Booking>(
            "INSERT INTO bookings
                (court_id, user_id, start_time, end_time, player_count, allows_join,
                 base_price, discount, points_redeemed, total_price, promotion_id, notes)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) RETURNING *",
        )
        .bind(court.id)
        .bind(user.id)
        .bind(booking.start_time)
        .bind(booking.end_time)
        .bind(booking.player_count)
        .bind(booking.allows_join)
        .bind(price.base_price)
        .bind(price.discount)
        .bind(price.points_redeemed)
        .bind(price.total_price)
        .bind(promotion.as_ref().map(|promotion| promotion.id))
        .bind(booking.notes)
        .fetch_one(&mut tx)
        .await?;
        debug!(
            "booking {} covers timeslots {:?}",
            created.id, quote.timeslot_ids
        );

        if price.points_redeemed > 0 {
            RewardTransaction::record(
                user.id,
                Some(created.id),
                RewardKind::Redeemed,
                price.points_redeemed,
                &format!("redeemed for booking #{}", created.id),
                &mut tx,
            )
            .await?;
        }

        tx.commit().await?;

        Ok((created, court))
    }

    #[tracing::instrument(name = "Booking::find", skip(db))]
    pub async fn find(id: i64, db: &db::Pool) -> Result<Booking, ServiceError> {
        let booking = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1")
            .bind(id)
            .fetch_one(db)
            .await?;

        Ok(booking)
    }

    /// the bookings a user made or joined
    #[tracing::instrument(name = "Booking::find_by_user", skip(db))]
    pub async fn find_by_user(user_id: i64, db: &db::Pool) -> Result<Vec<Booking>, ServiceError> {
        let bookings = sqlx::query_as::<_, Booking>(
            "SELECT * FROM bookings
             WHERE user_id = $1
             OR id IN (SELECT booking_id FROM join_requests WHERE user_id = $1 AND status = 'accepted')
             ORDER BY start_time DESC",
        )
        .bind(user_id)
        .fetch_all(db)
        .await?;

        Ok(bookings)
    }

    #[tracing::instrument(name = "Booking::find_by_court", skip(db))]
    pub async fn find_by_court(
        court_id: i64,
        filter: BookingFilter,
        db: &db::Pool,
    ) -> Result<Vec<Booking>, ServiceError> {
        Booking::find_all(
            BookingFilter {
                court_id: Some(court_id),
                ..filter
            },
            db,
        )
        .await
    }

    #[tracing::instrument(name = "Booking::find_all", skip(db))]
    pub async fn find_all(filter: BookingFilter, db: &db::Pool) -> Result<Vec<Booking>, ServiceError> {
        let bookings = sqlx::query_as::<_, Booking>(
            "SELECT * FROM bookings
             WHERE ($1::VARCHAR IS NULL OR status = $1)
             AND ($2::BIGINT IS NULL OR court_id = $2)
             AND ($3::BIGINT IS NULL OR user_id = $3)
             AND ($4::TIMESTAMPTZ IS NULL OR end_time > $4)
             AND ($5::TIMESTAMPTZ IS NULL OR start_time < $5)
             ORDER BY start_time DESC
             LIMIT 500",
        )
        .bind(filter.status.map(|status| status.to_string()))
        .bind(filter.court_id)
        .bind(filter.user_id)
        .bind(filter.from)
        .bind(filter.to)
        .fetch_all(db)
        .await?;

        Ok(bookings)
    }

    /// the ranges occupied by active bookings of a court on a date
    #[tracing::instrument(name = "Booking::active_ranges", skip(db))]
    pub async fn active_ranges(
        court_id: i64,
        date: NaiveDate,
        db: &db::Pool,
    ) -> Result<Vec<(DateTime<Utc>, DateTime<Utc>)>, ServiceError> {
        let day_start = DateTime::<Utc>::from_utc(date.and_hms(0, 0, 0), Utc);
        let day_end = day_start
            .checked_add_signed(Duration::days(1))
            .ok_or_else(|| ServiceError::BadRequest(format!("{} is out of range", date)))?;

        let ranges = sqlx::query_as::<_, (DateTime<Utc>, DateTime<Utc>)>(
            "SELECT start_time, end_time FROM bookings
             WHERE court_id = $1 AND status IN ('pending', 'confirmed')
             AND start_time < $3 AND end_time > $2",
        )
        .bind(court_id)
        .bind(day_start)
        .bind(day_end)
        .fetch_all(db)
        .await?;

        Ok(ranges)
    }

    /// confirmed bookings whose time is up
    pub async fn find_finished(db: &db::Pool) -> Result<Vec<Booking>, ServiceError> {
        let bookings = sqlx::query_as::<_, Booking>(
            "SELECT * FROM bookings WHERE status = 'confirmed' AND end_time <= NOW()
             ORDER BY end_time",
        )
        .fetch_all(db)
        .await?;

        Ok(bookings)
    }

    /// Booker, court owner, accepted players and admins can see a booking
    pub async fn is_visible_to(
        &self,
        user: &SessionUser,
        court: &Court,
        db: &db::Pool,
    ) -> Result<bool, ServiceError> {
        if self.user_id == user.id || court.is_managed_by(user) {
            return Ok(true);
        }

        crate::join_requests::JoinRequest::is_accepted(self.id, user.id, db).await
    }

    /// Move the booking to another status.
    ///
    /// The update only happens when the status is still the one this
    /// booking was loaded with, a concurrent change ends up as a Conflict.
    async fn change_status(
        &self,
        to: BookingStatus,
        tx: &mut db::Transaction<'_>,
    ) -> Result<Booking, ServiceError> {
        let from = self.status()?;
        let to = from.transition(to)?;

        let booking = sqlx::query_as::<_, Booking>(
            "UPDATE bookings SET status = $3, updated_at = NOW()
             WHERE id = $1 AND status = $2 RETURNING *",
        )
        .bind(self.id)
        .bind(from.to_string())
        .bind(to.to_string())
        .fetch_optional(&mut *tx)
        .await?;

        match booking {
            Some(booking) => Ok(booking),
            None => conflict!("this booking was changed in the meantime, try again"),
        }
    }

    #[tracing::instrument(name = "Booking::confirm", skip(self, db), fields(booking_id = self.id))]
    pub async fn confirm(&self, db: &db::Pool) -> Result<Booking, ServiceError> {
        let mut tx = db.begin().await?;
        let booking = self.change_status(BookingStatus::Confirmed, &mut tx).await?;
        tx.commit().await?;

        Ok(booking)
    }

    /// Cancel the booking.
    ///
    /// Redeemed points go back to the booker, a paid payment is refunded
    /// and pending join requests are cancelled.
    #[tracing::instrument(name = "Booking::cancel", skip(self, db), fields(booking_id = self.id))]
    pub async fn cancel(&self, db: &db::Pool) -> Result<(Booking, Option<Payment>), ServiceError> {
        let mut tx = db.begin().await?;
        let booking = self.change_status(BookingStatus::Cancelled, &mut tx).await?;

        if booking.points_redeemed > 0 {
            RewardTransaction::record(
                booking.user_id,
                Some(booking.id),
                RewardKind::Earned,
                booking.points_redeemed,
                &format!("refund for cancelled booking #{}", booking.id),
                &mut tx,
            )
            .await?;
        }

        let refund = Payment::refund_for_booking(booking.id, &mut tx).await?;

        sqlx::query(
            "UPDATE join_requests SET status = 'cancelled', updated_at = NOW()
             WHERE booking_id = $1 AND status = 'pending'",
        )
        .bind(booking.id)
        .execute(&mut tx)
        .await?;

        tx.commit().await?;

        Ok((booking, refund))
    }

    /// Complete the booking, the booker earns points for it.
    ///
    /// Returns the completed booking and the amount of earned points.
    #[tracing::instrument(name = "Booking::complete", skip(self, db), fields(booking_id = self.id))]
    pub async fn complete(&self, db: &db::Pool) -> Result<(Booking, i64), ServiceError> {
        let mut tx = db.begin().await?;
        let booking = self.change_status(BookingStatus::Completed, &mut tx).await?;

        let points = rewards::points_for(booking.total_price);
        if points > 0 {
            RewardTransaction::record(
                booking.user_id,
                Some(booking.id),
                RewardKind::Earned,
                points,
                &format!("earned with booking #{}", booking.id),
                &mut tx,
            )
            .await?;
        }

        tx.commit().await?;

        Ok((booking, points))
    }

    /// Confirm a pending booking after it's been paid, within the payment transaction
    pub(crate) async fn confirm_paid(
        id: i64,
        tx: &mut db::Transaction<'_>,
    ) -> Result<(), ServiceError> {
        sqlx::query(
            "UPDATE bookings SET status = 'confirmed', updated_at = NOW()
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        Ok(())
    }

    /// returns the amount of pending and confirmed bookings
    pub async fn count_active(db: &db::Pool) -> Result<i64, ServiceError> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM bookings WHERE status IN ('pending', 'confirmed')",
        )
        .fetch_one(db)
        .await?;

        Ok(count.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.ymd(2026, 10, 18).and_hms(12, 0, 0)
    }

    fn booking(start: DateTime<Utc>, end: DateTime<Utc>) -> NewBooking {
        NewBooking {
            court_id: 1,
            start_time: start,
            end_time: end,
            player_count: 2,
            allows_join: false,
            promo_code: None,
            redeem_points: 0,
            notes: None,
        }
    }

    #[test]
    fn valid_booking() {
        let start = Utc.ymd(2026, 10, 24).and_hms(9, 0, 0);
        assert!(booking(start, start + Duration::hours(2)).check(now()).is_ok());
    }

    #[test]
    fn defaults() {
        let booking: NewBooking = serde_json::from_str(
            r#"{
                "court_id": 1,
                "start_time": "2026-10-24T09:00:00Z",
                "end_time": "2026-10-24T10:00:00Z"
            }"#,
        )
        .unwrap();

        assert_eq!(booking.player_count, 1);
        assert_eq!(booking.redeem_points, 0);
        assert!(!booking.allows_join);
        assert!(booking.promo_code.is_none());
    }

    #[test]
    fn time_rules() {
        let start = Utc.ymd(2026, 10, 24).and_hms(9, 0, 0);

        // backwards
        assert!(booking(start, start - Duration::hours(1)).check(now()).is_err());
        // in the past
        let past = now() - Duration::hours(2);
        assert!(booking(past, past + Duration::hours(1)).check(now()).is_err());
        // too short
        assert!(booking(start, start + Duration::minutes(15)).check(now()).is_err());
        // too long
        assert!(booking(start, start + Duration::hours(5)).check(now()).is_err());
        // too far ahead
        let far = now() + Duration::days(91);
        assert!(booking(far, far + Duration::hours(1)).check(now()).is_err());
    }

    #[test]
    fn player_rules() {
        let start = Utc.ymd(2026, 10, 24).and_hms(9, 0, 0);

        let mut nobody = booking(start, start + Duration::hours(1));
        nobody.player_count = 0;
        assert!(nobody.check(now()).is_err());

        let mut negative = booking(start, start + Duration::hours(1));
        negative.redeem_points = -5;
        assert!(negative.check(now()).is_err());
    }

    #[test]
    fn booking_events() {
        let start = Utc.ymd(2026, 10, 24).and_hms(9, 0, 0);
        let booking = Booking {
            id: 12,
            court_id: 3,
            user_id: 4,
            start_time: start,
            end_time: start + Duration::hours(1),
            status: BookingStatus::Confirmed.to_string(),
            player_count: 2,
            allows_join: true,
            base_price: 1500,
            discount: 0,
            points_redeemed: 0,
            total_price: 1500,
            promotion_id: None,
            notes: None,
            created_at: now(),
            updated_at: now(),
        };

        let event = BookingEvent::from(&booking);
        assert_eq!(event.booking_id, 12);
        assert_eq!(event.status, "confirmed");

        assert!(booking.has_started(start));
        assert!(!booking.has_ended(start));
        assert!(booking.has_ended(start + Duration::hours(1)));
        assert_eq!(booking.status(), Ok(BookingStatus::Confirmed));
    }
}
