use actix_identity::Identity;
use actix_web::web::{Data, Json, Path};
use actix_web::{get, post, put, web};
use chrono::Utc;

use crate::auth::{self, SessionUser};
use crate::bookings::Booking;
use crate::courts::Court;
use crate::errors::ServiceError;
use crate::join_requests::{check_joinable, JoinMessage, JoinRequest};
use crate::notifications::{Kind, NewNotification};
use crate::server::{Response, State};

/// the request and its booking, when the user is the one who booked
async fn as_booker(
    request_id: i64,
    user: &SessionUser,
    state: &State,
) -> Result<(JoinRequest, Booking), ServiceError> {
    let request = JoinRequest::find(request_id, &state.db).await?;
    let booking = Booking::find(request.booking_id, &state.db).await?;

    if booking.user_id != user.id && !user.is_admin() {
        forbidden!("only the booker can answer join requests");
    }

    Ok((request, booking))
}

#[post("/bookings/{id}/join-requests")]
async fn create(
    booking_id: Path<i64>,
    message: Option<Json<JoinMessage>>,
    state: Data<State>,
    id: Identity,
) -> Response {
    let user = auth::get_user(&id, &state.db).await?;
    let message = message.map(|message| message.into_inner()).unwrap_or_default();

    if let Some(text) = message.message.as_ref() {
        if text.chars().count() > 500 {
            bad_request!("the message is too long, maximum 500 characters");
        }
    }

    let booking = Booking::find(*booking_id, &state.db).await?;
    let court = Court::find_by_id(booking.court_id, &state.db).await?;
    check_joinable(&booking, user.id, court.max_players, Utc::now())?;

    let request = JoinRequest::create(booking.id, user.id, message.message, &state.db).await?;

    NewNotification::new(
        booking.user_id,
        Kind::JoinRequested,
        "Someone wants to play",
        format!(
            "{} asked to join your booking on {}",
            user.username,
            booking.start_time.format("%Y-%m-%d %H:%M")
        ),
    )
    .deliver(&state)
    .await;

    http_created_json!(request);
}

#[get("/bookings/{id}/join-requests")]
async fn find_by_booking(booking_id: Path<i64>, state: Data<State>, id: Identity) -> Response {
    let user = auth::get_user(&id, &state.db).await?;

    let booking = Booking::find(*booking_id, &state.db).await?;
    if booking.user_id != user.id && !user.is_admin() {
        forbidden!("only the booker can see the join requests");
    }

    let requests = JoinRequest::find_by_booking(booking.id, &state.db).await?;

    http_ok_json!(requests);
}

#[get("/join-requests/me")]
async fn find_mine(state: Data<State>, id: Identity) -> Response {
    let user = auth::get_user(&id, &state.db).await?;

    let requests = JoinRequest::find_by_user(user.id, &state.db).await?;

    http_ok_json!(requests);
}

#[put("/join-requests/{id}/accept")]
async fn accept(request_id: Path<i64>, state: Data<State>, id: Identity) -> Response {
    let user = auth::get_user(&id, &state.db).await?;
    let (request, booking) = as_booker(*request_id, &user, &state).await?;

    let request = request.accept(&state.db).await?;

    NewNotification::new(
        request.user_id,
        Kind::JoinAccepted,
        "You're in",
        format!(
            "{} accepted you for the booking on {}",
            user.username,
            booking.start_time.format("%Y-%m-%d %H:%M")
        ),
    )
    .deliver(&state)
    .await;

    http_ok_json!(request);
}

#[put("/join-requests/{id}/decline")]
async fn decline(request_id: Path<i64>, state: Data<State>, id: Identity) -> Response {
    let user = auth::get_user(&id, &state.db).await?;
    let (request, booking) = as_booker(*request_id, &user, &state).await?;

    let request = request.decline(&state.db).await?;

    NewNotification::new(
        request.user_id,
        Kind::JoinDeclined,
        "Join request declined",
        format!(
            "your request to join the booking on {} was declined",
            booking.start_time.format("%Y-%m-%d %H:%M")
        ),
    )
    .deliver(&state)
    .await;

    http_ok_json!(request);
}

#[put("/join-requests/{id}/cancel")]
async fn cancel(request_id: Path<i64>, state: Data<State>, id: Identity) -> Response {
    let user = auth::get_user(&id, &state.db).await?;

    let request = JoinRequest::find(*request_id, &state.db).await?;
    if request.user_id != user.id {
        forbidden!("only the requester can cancel a join request");
    }

    let booking = Booking::find(request.booking_id, &state.db).await?;
    let request = request.cancel(&state.db).await?;

    NewNotification::new(
        booking.user_id,
        Kind::JoinCancelled,
        "Join request withdrawn",
        format!(
            "{} won't join your booking on {}",
            user.username,
            booking.start_time.format("%Y-%m-%d %H:%M")
        ),
    )
    .deliver(&state)
    .await;

    http_ok_json!(request);
}

pub fn register(cfg: &mut web::ServiceConfig) {
    cfg.service(create);
    cfg.service(find_by_booking);
    cfg.service(find_mine);
    cfg.service(accept);
    cfg.service(decline);
    cfg.service(cancel);
}
