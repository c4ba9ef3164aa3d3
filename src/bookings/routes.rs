use actix_identity::Identity;
use actix_web::web::{Data, Json, Path, Query};
use actix_web::{get, post, put, web};
use chrono::Utc;

use crate::auth;
use crate::bookings::{agent, Booking, BookingFilter, NewBooking};
use crate::courts::Court;
use crate::notifications::{Kind, NewNotification};
use crate::server::{Response, State};
use crate::validator::Validator;

#[post("/bookings")]
async fn create(booking: Json<Validator<NewBooking>>, state: Data<State>, id: Identity) -> Response {
    let user = auth::get_user(&id, &state.db).await?;
    let booking = booking.into_inner().validate()?;

    let (booking, court) = Booking::create(&user, booking, &state.db).await?;
    info!(
        "{} booked {} from {} until {}",
        user.username, court.name, booking.start_time, booking.end_time
    );

    booking.broadcast(&state);

    if court.owner_id != user.id {
        NewNotification::new(
            court.owner_id,
            Kind::BookingCreated,
            "New booking",
            format!(
                "{} booked {} on {}",
                user.username,
                court.name,
                booking.start_time.format("%Y-%m-%d %H:%M")
            ),
        )
        .deliver(&state)
        .await;
    }

    http_created_json!(booking);
}

#[get("/bookings/me")]
async fn find_mine(state: Data<State>, id: Identity) -> Response {
    let user = auth::get_user(&id, &state.db).await?;

    let bookings = Booking::find_by_user(user.id, &state.db).await?;

    http_ok_json!(bookings);
}

#[get("/bookings/{id}")]
async fn find_by_id(booking_id: Path<i64>, state: Data<State>, id: Identity) -> Response {
    let user = auth::get_user(&id, &state.db).await?;

    let booking = Booking::find(*booking_id, &state.db).await?;
    let court = Court::find_by_id(booking.court_id, &state.db).await?;

    if !booking.is_visible_to(&user, &court, &state.db).await? {
        forbidden!("you don't have access to this booking");
    }

    http_ok_json!(booking);
}

#[put("/bookings/{id}/confirm")]
async fn confirm(booking_id: Path<i64>, state: Data<State>, id: Identity) -> Response {
    let user = auth::get_user(&id, &state.db).await?;

    let booking = Booking::find(*booking_id, &state.db).await?;
    let court = Court::find_by_id(booking.court_id, &state.db).await?;

    if !court.is_managed_by(&user) {
        forbidden!("only the owner of the court can confirm this booking");
    }

    let booking = booking.confirm(&state.db).await?;
    booking.broadcast(&state);

    NewNotification::new(
        booking.user_id,
        Kind::BookingConfirmed,
        "Booking confirmed",
        format!(
            "your booking of {} on {} is confirmed",
            court.name,
            booking.start_time.format("%Y-%m-%d %H:%M")
        ),
    )
    .deliver(&state)
    .await;

    http_ok_json!(booking);
}

#[put("/bookings/{id}/cancel")]
async fn cancel(booking_id: Path<i64>, state: Data<State>, id: Identity) -> Response {
    let user = auth::get_user(&id, &state.db).await?;

    let booking = Booking::find(*booking_id, &state.db).await?;
    let court = Court::find_by_id(booking.court_id, &state.db).await?;

    let manager = court.is_managed_by(&user);
    if booking.user_id != user.id && !manager {
        forbidden!("you can't cancel somebody else's booking");
    }

    if !manager && booking.has_started(Utc::now()) {
        bad_request!("a booking can't be cancelled after it started");
    }

    let (booking, refund) = booking.cancel(&state.db).await?;
    info!("{} cancelled booking {}", user.username, booking.id);
    booking.broadcast(&state);

    let (recipient, message) = if booking.user_id == user.id {
        (
            court.owner_id,
            format!(
                "{} cancelled the booking of {} on {}",
                user.username,
                court.name,
                booking.start_time.format("%Y-%m-%d %H:%M")
            ),
        )
    } else {
        (
            booking.user_id,
            format!(
                "your booking of {} on {} was cancelled",
                court.name,
                booking.start_time.format("%Y-%m-%d %H:%M")
            ),
        )
    };

    NewNotification::new(recipient, Kind::BookingCancelled, "Booking cancelled", message)
        .deliver(&state)
        .await;

    if let Some(payment) = refund {
        NewNotification::new(
            payment.user_id,
            Kind::PaymentRefunded,
            "Payment refunded",
            format!(
                "the payment of {:.2} for booking #{} was refunded",
                payment.amount as f64 / 100.0,
                booking.id
            ),
        )
        .deliver(&state)
        .await;
    }

    http_ok_json!(booking);
}

#[put("/bookings/{id}/complete")]
async fn complete(booking_id: Path<i64>, state: Data<State>, id: Identity) -> Response {
    let user = auth::get_user(&id, &state.db).await?;

    let booking = Booking::find(*booking_id, &state.db).await?;
    let court = Court::find_by_id(booking.court_id, &state.db).await?;

    if !court.is_managed_by(&user) {
        forbidden!("only the owner of the court can complete this booking");
    }

    if !booking.has_ended(Utc::now()) {
        bad_request!("a booking can only be completed after it ended");
    }

    let booking = agent::complete(&booking, &state).await?;

    http_ok_json!(booking);
}

#[get("/courts/{id}/bookings")]
async fn find_by_court(
    court_id: Path<i64>,
    filter: Query<BookingFilter>,
    state: Data<State>,
    id: Identity,
) -> Response {
    let user = auth::get_user(&id, &state.db).await?;

    let court = Court::find_by_id(*court_id, &state.db).await?;
    if !court.is_managed_by(&user) {
        forbidden!("only the owner of the court can see all of its bookings");
    }

    let bookings = Booking::find_by_court(court.id, filter.into_inner(), &state.db).await?;

    http_ok_json!(bookings);
}

pub fn register(cfg: &mut web::ServiceConfig) {
    cfg.service(create);
    cfg.service(find_mine);
    cfg.service(find_by_id);
    cfg.service(confirm);
    cfg.service(cancel);
    cfg.service(complete);
    cfg.service(find_by_court);
}
