use actix_identity::Identity;
use actix_web::web::{Data, Json, Path, Query};
use actix_web::{get, post, put, web};

use crate::auth;
use crate::bookings::Booking;
use crate::courts::Court;
use crate::notifications::{Kind, NewNotification};
use crate::payments::{NewPayment, Payment, PaymentFilter};
use crate::server::{Response, State};

#[post("/bookings/{id}/payments")]
async fn pay(
    booking_id: Path<i64>,
    payment: Json<NewPayment>,
    state: Data<State>,
    id: Identity,
) -> Response {
    let user = auth::get_user(&id, &state.db).await?;

    let booking = Booking::find(*booking_id, &state.db).await?;
    if booking.user_id != user.id {
        forbidden!("only the booker can pay for a booking");
    }

    let payment = Payment::create(&booking, payment.method, state.gateway.as_ref(), &state.db).await?;
    info!(
        "{} paid booking {} with {} ({})",
        user.username, booking.id, payment.method, payment.status
    );

    if payment.is_paid() {
        let court = Court::find_by_id(booking.court_id, &state.db).await?;
        let booking = Booking::find(booking.id, &state.db).await?;
        booking.broadcast(&state);

        NewNotification::new(
            court.owner_id,
            Kind::PaymentReceived,
            "Payment received",
            format!(
                "{} paid {:.2} for booking #{}",
                user.username,
                payment.amount as f64 / 100.0,
                booking.id
            ),
        )
        .deliver(&state)
        .await;
    }

    http_created_json!(payment);
}

#[put("/payments/{id}/mark-paid")]
async fn mark_paid(payment_id: Path<i64>, state: Data<State>, id: Identity) -> Response {
    let user = auth::get_user(&id, &state.db).await?;

    let payment = Payment::find(*payment_id, &state.db).await?;
    let booking = Booking::find(payment.booking_id, &state.db).await?;
    let court = Court::find_by_id(booking.court_id, &state.db).await?;

    if !court.is_managed_by(&user) {
        forbidden!("only the owner of the court can mark a payment as paid");
    }

    let payment = payment.mark_paid(&state.db).await?;

    let booking = Booking::find(booking.id, &state.db).await?;
    booking.broadcast(&state);

    NewNotification::new(
        payment.user_id,
        Kind::PaymentReceived,
        "Payment received",
        format!(
            "your cash payment for booking #{} was received",
            booking.id
        ),
    )
    .deliver(&state)
    .await;

    http_ok_json!(payment);
}

#[get("/payments/me")]
async fn find_mine(state: Data<State>, id: Identity) -> Response {
    let user = auth::get_user(&id, &state.db).await?;

    let payments = Payment::find_by_user(user.id, &state.db).await?;

    http_ok_json!(payments);
}

#[get("/admin/payments")]
async fn find_all(filter: Query<PaymentFilter>, state: Data<State>, id: Identity) -> Response {
    auth::verify_admin(&id, &state.db).await?;

    let payments = Payment::find_all(filter.into_inner(), &state.db).await?;

    http_ok_json!(payments);
}

pub fn register(cfg: &mut web::ServiceConfig) {
    cfg.service(pay);
    cfg.service(mark_paid);
    cfg.service(find_mine);
    cfg.service(find_all);
}
