use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc};

use sqlx::Done;

use crate::db;
use crate::errors::ServiceError;

/// A bookable unit of a court's schedule.
///
/// A timeslot repeats every week on `day_of_week` (0 is sunday), or
/// it only applies to `specific_date`. Exactly one of them is set.
/// Times are in UTC.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Timeslot {
    pub id: i64,
    pub court_id: i64,
    pub day_of_week: Option<i16>,
    pub specific_date: Option<NaiveDate>,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    /// in cents
    pub price: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// **POST /api/courts/{id}/timeslots**
///
/// ``` shell
/// curl --location --request POST 'localhost:8080/api/courts/1/timeslots' \
///     --header 'Content-Type: application/json' \
///     --data-raw '{
///         "day_of_week": 6,
///         "start_time": "09:00:00",
///         "end_time": "10:00:00",
///         "price": 1500
///     }'
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct TimeslotMessage {
    pub day_of_week: Option<i16>,
    pub specific_date: Option<NaiveDate>,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub price: i64,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// day of the week the way timeslots store it, 0 is sunday
pub fn weekday_index(date: NaiveDate) -> i16 {
    date.weekday().num_days_from_sunday() as i16
}

/// Pick the timeslots that apply to a date, sorted by start time.
///
/// Active slots for that specific date replace the weekly schedule.
pub fn resolve_schedule(slots: &[Timeslot], date: NaiveDate) -> Vec<&Timeslot> {
    let specific: Vec<&Timeslot> = slots
        .iter()
        .filter(|slot| slot.is_active && slot.specific_date == Some(date))
        .collect();

    let mut resolved = if specific.is_empty() {
        let weekday = weekday_index(date);
        slots
            .iter()
            .filter(|slot| slot.is_active && slot.day_of_week == Some(weekday))
            .collect()
    } else {
        specific
    };

    resolved.sort_by_key(|slot| slot.start_time);
    resolved
}

/// two timeslot schedules share a day when they repeat on the same weekday or are on the same date
fn same_day(a: (Option<i16>, Option<NaiveDate>), b: (Option<i16>, Option<NaiveDate>)) -> bool {
    match (a, b) {
        ((Some(left), _), (Some(right), _)) => left == right,
        ((_, Some(left)), (_, Some(right))) => left == right,
        _ => false,
    }
}

impl Timeslot {
    /// the absolute range this slot covers on a date, `[start, end)`
    pub fn occurrence(&self, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            Utc.from_utc_datetime(&date.and_time(self.start_time)),
            Utc.from_utc_datetime(&date.and_time(self.end_time)),
        )
    }

    /// returns the first existing slot that overlaps the new one on the same day
    pub fn find_conflict<'a>(
        existing: &'a [Timeslot],
        candidate: &TimeslotMessage,
        ignore_id: Option<i64>,
    ) -> Option<&'a Timeslot> {
        existing.iter().find(|slot| {
            Some(slot.id) != ignore_id
                && slot.is_active
                && candidate.is_active
                && same_day(
                    (slot.day_of_week, slot.specific_date),
                    (candidate.day_of_week, candidate.specific_date),
                )
                && slot.start_time < candidate.end_time
                && candidate.start_time < slot.end_time
        })
    }

    #[tracing::instrument(name = "Timeslot::find_by_court", skip(db))]
    pub async fn find_by_court(court_id: i64, db: &db::Pool) -> Result<Vec<Timeslot>, ServiceError> {
        let slots = sqlx::query_as::<_, Timeslot>(
            "SELECT * FROM timeslots WHERE court_id = $1
             ORDER BY day_of_week NULLS LAST, specific_date, start_time",
        )
        .bind(court_id)
        .fetch_all(db)
        .await?;

        Ok(slots)
    }

    /// the timeslots of a court that could apply to a date
    #[tracing::instrument(name = "Timeslot::find_for_date", skip(db))]
    pub async fn find_for_date(
        court_id: i64,
        date: NaiveDate,
        db: &db::Pool,
    ) -> Result<Vec<Timeslot>, ServiceError> {
        let slots = sqlx::query_as::<_, Timeslot>(
            "SELECT * FROM timeslots
             WHERE court_id = $1 AND is_active AND (specific_date = $2 OR day_of_week = $3)",
        )
        .bind(court_id)
        .bind(date)
        .bind(weekday_index(date))
        .fetch_all(db)
        .await?;

        Ok(slots)
    }

    /// Store a new timeslot.
    ///
    /// The court row is locked while checking for overlapping slots, so two
    /// concurrent requests can't both pass the check.
    #[tracing::instrument(name = "Timeslot::create", skip(slot, db))]
    pub async fn create(court_id: i64, slot: TimeslotMessage, db: &db::Pool) -> Result<Timeslot, ServiceError> {
        let mut tx = db.begin().await?;
        let existing = Timeslot::lock_court_slots(court_id, &mut tx).await?;

        if let Some(conflict) = Timeslot::find_conflict(&existing, &slot, None) {
            conflict!(format!(
                "this timeslot overlaps with timeslot {} ({} - {})",
                conflict.id, conflict.start_time, conflict.end_time
            ));
        }

        let slot = sqlx::query_as::<_, Timeslot>(
            "INSERT INTO timeslots (court_id, day_of_week, specific_date, start_time, end_time, price, is_active)
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *",
        )
        .bind(court_id)
        .bind(slot.day_of_week)
        .bind(slot.specific_date)
        .bind(slot.start_time)
        .bind(slot.end_time)
        .bind(slot.price)
        .bind(slot.is_active)
        .fetch_one(&mut tx)
        .await?;

        tx.commit().await?;

        Ok(slot)
    }

    #[tracing::instrument(name = "Timeslot::update", skip(slot, db))]
    pub async fn update(
        court_id: i64,
        id: i64,
        slot: TimeslotMessage,
        db: &db::Pool,
    ) -> Result<Timeslot, ServiceError> {
        let mut tx = db.begin().await?;
        let existing = Timeslot::lock_court_slots(court_id, &mut tx).await?;

        if !existing.iter().any(|existing| existing.id == id) {
            return Err(ServiceError::NotFound);
        }

        if let Some(conflict) = Timeslot::find_conflict(&existing, &slot, Some(id)) {
            conflict!(format!(
                "this timeslot overlaps with timeslot {} ({} - {})",
                conflict.id, conflict.start_time, conflict.end_time
            ));
        }

        let slot = sqlx::query_as::<_, Timeslot>(
            "UPDATE timeslots
             SET day_of_week = $3, specific_date = $4, start_time = $5, end_time = $6,
                 price = $7, is_active = $8, updated_at = NOW()
             WHERE id = $1 AND court_id = $2 RETURNING *",
        )
        .bind(id)
        .bind(court_id)
        .bind(slot.day_of_week)
        .bind(slot.specific_date)
        .bind(slot.start_time)
        .bind(slot.end_time)
        .bind(slot.price)
        .bind(slot.is_active)
        .fetch_one(&mut tx)
        .await?;

        tx.commit().await?;

        Ok(slot)
    }

    #[tracing::instrument(name = "Timeslot::delete", skip(db))]
    pub async fn delete(court_id: i64, id: i64, db: &db::Pool) -> Result<(), ServiceError> {
        let result = sqlx::query("DELETE FROM timeslots WHERE id = $1 AND court_id = $2")
            .bind(id)
            .bind(court_id)
            .execute(db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound);
        }

        Ok(())
    }

    async fn lock_court_slots(
        court_id: i64,
        tx: &mut db::Transaction<'_>,
    ) -> Result<Vec<Timeslot>, ServiceError> {
        sqlx::query("SELECT id FROM courts WHERE id = $1 FOR UPDATE")
            .bind(court_id)
            .fetch_one(&mut *tx)
            .await?;

        let slots = sqlx::query_as::<_, Timeslot>("SELECT * FROM timeslots WHERE court_id = $1")
            .bind(court_id)
            .fetch_all(&mut *tx)
            .await?;

        Ok(slots)
    }
}

impl crate::validator::Validate<TimeslotMessage> for TimeslotMessage {
    fn validate(&self) -> Result<(), ServiceError> {
        match (self.day_of_week, self.specific_date) {
            (Some(_), Some(_)) | (None, None) => {
                bad_request!("a timeslot needs either a day of the week or a specific date");
            }
            (Some(day), None) if !(0..=6).contains(&day) => {
                bad_request!("the day of the week should be within [0-6], 0 is sunday");
            }
            _ => {}
        }

        if self.start_time >= self.end_time {
            bad_request!("a timeslot has to end after it starts");
        }

        if self.price <= 0 {
            bad_request!("the price has to be above 0");
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::validator::Validator;

    pub(crate) fn weekly(id: i64, day: i16, start: (u32, u32), end: (u32, u32), price: i64) -> Timeslot {
        Timeslot {
            id,
            court_id: 1,
            day_of_week: Some(day),
            specific_date: None,
            start_time: NaiveTime::from_hms(start.0, start.1, 0),
            end_time: NaiveTime::from_hms(end.0, end.1, 0),
            price,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub(crate) fn on_date(id: i64, date: NaiveDate, start: (u32, u32), end: (u32, u32), price: i64) -> Timeslot {
        Timeslot {
            day_of_week: None,
            specific_date: Some(date),
            ..weekly(id, 0, start, end, price)
        }
    }

    fn message(day: Option<i16>, date: Option<NaiveDate>, start: u32, end: u32) -> TimeslotMessage {
        TimeslotMessage {
            day_of_week: day,
            specific_date: date,
            start_time: NaiveTime::from_hms(start, 0, 0),
            end_time: NaiveTime::from_hms(end, 0, 0),
            price: 1500,
            is_active: true,
        }
    }

    #[test]
    fn sunday_is_zero() {
        // 2026-10-18 is a sunday
        assert_eq!(weekday_index(NaiveDate::from_ymd(2026, 10, 18)), 0);
        assert_eq!(weekday_index(NaiveDate::from_ymd(2026, 10, 24)), 6);
    }

    #[test]
    fn weekly_schedule_is_sorted() {
        let saturday = NaiveDate::from_ymd(2026, 10, 24);
        let slots = vec![
            weekly(1, 6, (10, 0), (11, 0), 1500),
            weekly(2, 6, (9, 0), (10, 0), 1500),
            weekly(3, 5, (9, 0), (10, 0), 1500),
        ];

        let resolved = resolve_schedule(&slots, saturday);
        let ids: Vec<i64> = resolved.iter().map(|slot| slot.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn specific_dates_replace_the_weekly_schedule() {
        let saturday = NaiveDate::from_ymd(2026, 10, 24);
        let slots = vec![
            weekly(1, 6, (9, 0), (10, 0), 1500),
            on_date(2, saturday, (12, 0), (14, 0), 4000),
        ];

        let resolved = resolve_schedule(&slots, saturday);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].id, 2);

        // the next saturday falls back to the weekly schedule
        let next = resolve_schedule(&slots, NaiveDate::from_ymd(2026, 10, 31));
        assert_eq!(next[0].id, 1);
    }

    #[test]
    fn inactive_slots_are_ignored() {
        let saturday = NaiveDate::from_ymd(2026, 10, 24);
        let mut special = on_date(2, saturday, (12, 0), (14, 0), 4000);
        special.is_active = false;
        let slots = vec![weekly(1, 6, (9, 0), (10, 0), 1500), special];

        let resolved = resolve_schedule(&slots, saturday);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].id, 1);
    }

    #[test]
    fn occurrence_is_utc() {
        let slot = weekly(1, 6, (9, 30), (10, 30), 1500);
        let (start, end) = slot.occurrence(NaiveDate::from_ymd(2026, 10, 24));
        assert_eq!(start.to_rfc3339(), "2026-10-24T09:30:00+00:00");
        assert_eq!(end.to_rfc3339(), "2026-10-24T10:30:00+00:00");
    }

    #[test]
    fn overlapping_slots_conflict() {
        let date = NaiveDate::from_ymd(2026, 10, 24);
        let existing = vec![
            weekly(1, 6, (9, 0), (10, 0), 1500),
            on_date(2, date, (9, 0), (10, 0), 1500),
        ];

        let overlapping = message(Some(6), None, 9, 11);
        assert_eq!(Timeslot::find_conflict(&existing, &overlapping, None).unwrap().id, 1);

        // touching slots don't overlap
        let adjacent = message(Some(6), None, 10, 11);
        assert!(Timeslot::find_conflict(&existing, &adjacent, None).is_none());

        // other days don't matter
        let other_day = message(Some(5), None, 9, 10);
        assert!(Timeslot::find_conflict(&existing, &other_day, None).is_none());

        let same_date = message(None, Some(date), 9, 10);
        assert_eq!(Timeslot::find_conflict(&existing, &same_date, None).unwrap().id, 2);

        // updating a slot doesn't conflict with itself
        assert!(Timeslot::find_conflict(&existing, &overlapping, Some(1)).is_none());
    }

    #[test]
    fn validation() {
        assert!(Validator::new(message(Some(6), None, 9, 10)).validate().is_ok());
        assert!(Validator::new(message(None, Some(NaiveDate::from_ymd(2026, 1, 1)), 9, 10))
            .validate()
            .is_ok());

        assert!(Validator::new(message(None, None, 9, 10)).validate().is_err());
        assert!(Validator::new(message(Some(6), Some(NaiveDate::from_ymd(2026, 1, 1)), 9, 10))
            .validate()
            .is_err());
        assert!(Validator::new(message(Some(7), None, 9, 10)).validate().is_err());
        assert!(Validator::new(message(Some(6), None, 10, 9)).validate().is_err());

        let mut free = message(Some(6), None, 9, 10);
        free.price = 0;
        assert!(Validator::new(free).validate().is_err());
    }
}
