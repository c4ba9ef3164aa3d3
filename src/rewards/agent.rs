use std::time::{Duration, Instant};

use tracing_futures::Instrument;

use crate::config::Config;
use crate::errors::ServiceError;
use crate::notifications::{Kind, NewNotification};
use crate::rewards::RewardTransaction;
use crate::server::State;

/// Periodically expires reward points that are too old
#[derive(Debug)]
pub struct ExpiryAgent {
    state: State,
}

impl ExpiryAgent {
    pub fn new(state: State) -> Self {
        ExpiryAgent { state }
    }

    /// Start the periodic sweep.
    ///
    /// The interval is read again after every sweep, so administrators
    /// can change it while the server is running.
    pub(crate) fn start(self) {
        actix_rt::spawn(async move {
            debug!("starting the reward expiry agent");

            loop {
                actix_rt::time::delay_for(ExpiryAgent::interval()).await;

                if let Err(e) = ExpiryAgent::sweep(&self.state).await {
                    error!("unable to expire reward points: {}", e);
                }
            }
        }
        .instrument(tracing::info_span!("reward_expiry_agent")));
    }

    /// Expire the old points of every user and let them know.
    ///
    /// Returns the amount of users whose points expired.
    #[tracing::instrument(name = "ExpiryAgent::sweep", skip(state))]
    pub async fn sweep(state: &State) -> Result<usize, ServiceError> {
        let start = Instant::now();
        let expiry_days = Config::reward_expiry_days();

        let expired = RewardTransaction::expire(expiry_days, &state.db).await?;
        info!(
            "expired the points of {} user(s) in {:?}",
            expired.len(),
            start.elapsed()
        );

        for (user_id, points) in &expired {
            NewNotification::new(
                *user_id,
                Kind::PointsExpired,
                "Reward points expired",
                format!(
                    "{} of your points were older than {} days and expired",
                    points, expiry_days
                ),
            )
            .deliver(state)
            .await;
        }

        Ok(expired.len())
    }

    /// the current sweep interval
    pub(crate) fn interval() -> Duration {
        Duration::from_secs(Config::reward_sweep_interval())
    }
}
