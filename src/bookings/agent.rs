use std::time::Duration;

use tracing_futures::Instrument;

use crate::bookings::Booking;
use crate::config::Config;
use crate::errors::ServiceError;
use crate::notifications::{Kind, NewNotification};
use crate::server::State;

/// Completes confirmed bookings once they are over
#[derive(Debug)]
pub struct CompletionAgent {
    state: State,
}

impl CompletionAgent {
    pub fn new(state: State) -> Self {
        CompletionAgent { state }
    }

    pub(crate) fn start(self) {
        actix_rt::spawn(async move {
            debug!("starting the booking completion agent");
            let interval = Duration::from_secs(Config::booking_completion_interval());

            loop {
                actix_rt::time::delay_for(interval).await;
                self.run().await;
            }
        }
        .instrument(tracing::info_span!("booking_completion_agent")));
    }

    #[tracing::instrument(name = "CompletionAgent::run", skip(self))]
    async fn run(&self) {
        let bookings = match Booking::find_finished(&self.state.db).await {
            Ok(bookings) => bookings,
            Err(e) => {
                error!("unable to load the finished bookings: {}", e);
                return;
            }
        };

        for booking in bookings {
            if let Err(e) = complete(&booking, &self.state).await {
                // a conflict means someone else got there first
                if !matches!(e, ServiceError::Conflict(_)) {
                    error!("unable to complete booking {}: {}", booking.id, e);
                }
            }
        }
    }
}

/// Complete a booking and let the booker know how many points it earned
pub(crate) async fn complete(booking: &Booking, state: &State) -> Result<Booking, ServiceError> {
    let (booking, points) = booking.complete(&state.db).await?;
    info!("booking {} completed, {} points earned", booking.id, points);

    booking.broadcast(state);

    NewNotification::new(
        booking.user_id,
        Kind::BookingCompleted,
        "Booking completed",
        format!("Thanks for playing! Booking #{} is completed", booking.id),
    )
    .deliver(state)
    .await;

    if points > 0 {
        NewNotification::new(
            booking.user_id,
            Kind::PointsEarned,
            "Points earned",
            format!("booking #{} earned you {} points", booking.id, points),
        )
        .deliver(state)
        .await;
    }

    Ok(booking)
}
