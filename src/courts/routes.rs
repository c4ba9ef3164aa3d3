use actix_identity::Identity;
use actix_web::web::{Data, Json, Path, Query};
use actix_web::{delete, get, post, put, web, HttpResponse};
use chrono::{Duration, NaiveDate, Utc};

use crate::auth::{self, SessionUser};
use crate::bookings::availability::availability;
use crate::bookings::{Booking, MAX_DAYS_AHEAD};
use crate::courts::{Court, CourtFilter, CourtMessage, Timeslot, TimeslotMessage};
use crate::errors::ServiceError;
use crate::server::{Response, State};
use crate::validator::Validator;

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub date: NaiveDate,
}

impl AvailabilityQuery {
    /// only dates that can still be booked, give or take a day
    fn check(&self, today: NaiveDate) -> Result<NaiveDate, ServiceError> {
        let first = today - Duration::days(1);
        let last = today + Duration::days(MAX_DAYS_AHEAD + 1);

        if self.date < first || self.date > last {
            bad_request!(format!(
                "availability is only known between {} and {}",
                first, last
            ));
        }

        Ok(self.date)
    }
}

/// the court, when the user is allowed to manage it
async fn managed_court(court_id: i64, user: &SessionUser, state: &State) -> Result<Court, ServiceError> {
    let court = Court::find_by_id(court_id, &state.db).await?;

    if !court.is_managed_by(user) {
        forbidden!("only the owner of this court can change it");
    }

    Ok(court)
}

#[get("/courts")]
async fn find_all(filter: Query<CourtFilter>, state: Data<State>) -> Response {
    let courts = Court::find_all(filter.into_inner(), &state.db).await?;

    http_ok_json!(courts);
}

#[get("/courts/{id}")]
async fn find_by_id(court_id: Path<i64>, state: Data<State>) -> Response {
    let court = Court::find_by_id(*court_id, &state.db).await?;

    http_ok_json!(court);
}

#[post("/courts")]
async fn create(court: Json<Validator<CourtMessage>>, state: Data<State>, id: Identity) -> Response {
    let user = auth::verify_court_owner(&id, &state.db).await?;
    let court = court.into_inner().validate()?;

    let court = Court::create(user.id, court, &state.db).await?;
    info!("{} created court {} ({})", user.username, court.name, court.id);

    http_created_json!(court);
}

#[put("/courts/{id}")]
async fn update(
    court_id: Path<i64>,
    court: Json<Validator<CourtMessage>>,
    state: Data<State>,
    id: Identity,
) -> Response {
    let user = auth::get_user(&id, &state.db).await?;
    let message = court.into_inner().validate()?;

    let court = managed_court(*court_id, &user, &state).await?;
    let court = Court::update(court.id, message, &state.db).await?;

    http_ok_json!(court);
}

#[delete("/courts/{id}")]
async fn delete(court_id: Path<i64>, state: Data<State>, id: Identity) -> Response {
    let user = auth::get_user(&id, &state.db).await?;

    let court = managed_court(*court_id, &user, &state).await?;
    Court::delete(court.id, &state.db).await?;
    info!("{} deleted court {}", user.username, court.id);

    Ok(HttpResponse::NoContent().finish())
}

#[get("/courts/{id}/timeslots")]
async fn find_timeslots(court_id: Path<i64>, state: Data<State>) -> Response {
    let court = Court::find_by_id(*court_id, &state.db).await?;

    let slots = Timeslot::find_by_court(court.id, &state.db).await?;

    http_ok_json!(slots);
}

#[post("/courts/{id}/timeslots")]
async fn create_timeslot(
    court_id: Path<i64>,
    slot: Json<Validator<TimeslotMessage>>,
    state: Data<State>,
    id: Identity,
) -> Response {
    let user = auth::get_user(&id, &state.db).await?;
    let slot = slot.into_inner().validate()?;

    let court = managed_court(*court_id, &user, &state).await?;
    let slot = Timeslot::create(court.id, slot, &state.db).await?;

    http_created_json!(slot);
}

#[put("/courts/{id}/timeslots/{slot_id}")]
async fn update_timeslot(
    path: Path<(i64, i64)>,
    slot: Json<Validator<TimeslotMessage>>,
    state: Data<State>,
    id: Identity,
) -> Response {
    let user = auth::get_user(&id, &state.db).await?;
    let (court_id, slot_id) = path.into_inner();
    let slot = slot.into_inner().validate()?;

    let court = managed_court(court_id, &user, &state).await?;
    let slot = Timeslot::update(court.id, slot_id, slot, &state.db).await?;

    http_ok_json!(slot);
}

#[delete("/courts/{id}/timeslots/{slot_id}")]
async fn delete_timeslot(path: Path<(i64, i64)>, state: Data<State>, id: Identity) -> Response {
    let user = auth::get_user(&id, &state.db).await?;
    let (court_id, slot_id) = path.into_inner();

    let court = managed_court(court_id, &user, &state).await?;
    Timeslot::delete(court.id, slot_id, &state.db).await?;

    Ok(HttpResponse::NoContent().finish())
}

/// **GET /api/courts/{id}/availability?date=2026-10-24**
///
/// The schedule of the court on that date, with the slots that can still be booked
#[get("/courts/{id}/availability")]
async fn find_availability(
    court_id: Path<i64>,
    query: Query<AvailabilityQuery>,
    state: Data<State>,
) -> Response {
    let now = Utc::now();
    let date = query.check(now.naive_utc().date())?;

    let court = Court::find_by_id(*court_id, &state.db).await?;
    if !court.is_active {
        http_ok_json!(Vec::<()>::new());
    }

    let slots = Timeslot::find_for_date(court.id, date, &state.db).await?;
    let booked = Booking::active_ranges(court.id, date, &state.db).await?;

    http_ok_json!(availability(&slots, &booked, date, now));
}

pub fn register(cfg: &mut web::ServiceConfig) {
    cfg.service(find_all);
    cfg.service(create);
    cfg.service(find_by_id);
    cfg.service(update);
    cfg.service(delete);
    cfg.service(find_timeslots);
    cfg.service(create_timeslot);
    cfg.service(update_timeslot);
    cfg.service(delete_timeslot);
    cfg.service(find_availability);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(raw: &str) -> AvailabilityQuery {
        Query::<AvailabilityQuery>::from_query(raw).unwrap().into_inner()
    }

    #[test]
    fn dates_far_away_are_rejected() {
        let today = NaiveDate::from_ymd(2026, 10, 18);

        match query("date=%2B262142-12-31").check(today) {
            Err(ServiceError::BadRequest(_)) => (),
            other => panic!("expected a bad request, got {:?}", other),
        }
        assert!(query("date=2020-01-01").check(today).is_err());
    }

    #[test]
    fn bookable_dates_are_accepted() {
        let today = NaiveDate::from_ymd(2026, 10, 18);

        assert_eq!(query("date=2026-10-17").check(today).unwrap(), NaiveDate::from_ymd(2026, 10, 17));
        assert!(query("date=2026-10-18").check(today).is_ok());
        assert!(query("date=2027-01-16").check(today).is_ok());
    }
}
