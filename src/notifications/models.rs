use std::fmt;

use chrono::{DateTime, Utc};

use sqlx::Done;

use crate::db;
use crate::errors::ServiceError;
use crate::server::State;
use crate::websocket;

/// What happened, lets the frontend pick an icon
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Kind {
    LoginCode,
    BookingCreated,
    BookingConfirmed,
    BookingCancelled,
    BookingCompleted,
    JoinRequested,
    JoinAccepted,
    JoinDeclined,
    JoinCancelled,
    PaymentReceived,
    PaymentRefunded,
    PointsEarned,
    PointsExpired,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::LoginCode => "login_code",
            Kind::BookingCreated => "booking_created",
            Kind::BookingConfirmed => "booking_confirmed",
            Kind::BookingCancelled => "booking_cancelled",
            Kind::BookingCompleted => "booking_completed",
            Kind::JoinRequested => "join_requested",
            Kind::JoinAccepted => "join_accepted",
            Kind::JoinDeclined => "join_declined",
            Kind::JoinCancelled => "join_cancelled",
            Kind::PaymentReceived => "payment_received",
            Kind::PaymentRefunded => "payment_refunded",
            Kind::PointsEarned => "points_earned",
            Kind::PointsExpired => "points_expired",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, sqlx::FromRow)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct NotificationFilter {
    /// only show unread notifications when true
    pub unread: Option<bool>,
}

/// A notification that still has to be stored and relayed
#[derive(Debug)]
pub struct NewNotification {
    pub user_id: i64,
    pub kind: Kind,
    pub title: String,
    pub message: String,
}

impl NewNotification {
    pub fn new<T: Into<String>, M: Into<String>>(
        user_id: i64,
        kind: Kind,
        title: T,
        message: M,
    ) -> Self {
        NewNotification {
            user_id,
            kind,
            title: title.into(),
            message: message.into(),
        }
    }

    #[tracing::instrument(name = "NewNotification::save", skip(self, db), fields(user_id = self.user_id))]
    pub async fn save(&self, db: &db::Pool) -> Result<Notification, ServiceError> {
        let notification = sqlx::query_as::<_, Notification>(
            "INSERT INTO notifications (user_id, kind, title, message)
             VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(self.user_id)
        .bind(self.kind.to_string())
        .bind(&self.title)
        .bind(&self.message)
        .fetch_one(db)
        .await?;

        Ok(notification)
    }

    /// Store the notification and push it to the websocket sessions of the user
    pub async fn send(&self, state: &State) -> Result<Notification, ServiceError> {
        let notification = self.save(&state.db).await?;

        state
            .notifier
            .do_send(websocket::Notification::UserNotification(
                notification.clone(),
            ));

        Ok(notification)
    }

    /// Like `send`, but a failure is only logged.
    ///
    /// Used after the actual work has been committed, a lost notification
    /// shouldn't turn a successful request into an error.
    pub async fn deliver(self, state: &State) {
        if let Err(e) = self.send(state).await {
            error!(
                "unable to notify user {} about {}: {}",
                self.user_id, self.kind, e
            );
        }
    }
}

impl Notification {
    #[tracing::instrument(name = "Notification::find_by_user", skip(db))]
    pub async fn find_by_user(
        user_id: i64,
        filter: NotificationFilter,
        db: &db::Pool,
    ) -> Result<Vec<Notification>, ServiceError> {
        let notifications = sqlx::query_as::<_, Notification>(
            "SELECT * FROM notifications
             WHERE user_id = $1 AND ($2 = FALSE OR NOT is_read)
             ORDER BY created_at DESC
             LIMIT 100",
        )
        .bind(user_id)
        .bind(filter.unread.unwrap_or(false))
        .fetch_all(db)
        .await?;

        Ok(notifications)
    }

    /// mark a notification of the user as read
    #[tracing::instrument(name = "Notification::mark_read", skip(db))]
    pub async fn mark_read(id: i64, user_id: i64, db: &db::Pool) -> Result<Notification, ServiceError> {
        let notification = sqlx::query_as::<_, Notification>(
            "UPDATE notifications SET is_read = TRUE
             WHERE id = $1 AND user_id = $2 RETURNING *",
        )
        .bind(id)
        .bind(user_id)
        .fetch_one(db)
        .await?;

        Ok(notification)
    }

    /// returns the amount of notifications that were marked as read
    #[tracing::instrument(name = "Notification::mark_all_read", skip(db))]
    pub async fn mark_all_read(user_id: i64, db: &db::Pool) -> Result<u64, ServiceError> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE WHERE user_id = $1 AND NOT is_read",
        )
        .bind(user_id)
        .execute(db)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_snake_case() {
        assert_eq!(Kind::BookingConfirmed.to_string(), "booking_confirmed");
        assert_eq!(Kind::LoginCode.to_string(), "login_code");
    }

    #[test]
    fn websocket_payload_is_tagged() {
        let notification = Notification {
            id: 3,
            user_id: 7,
            kind: Kind::JoinRequested.to_string(),
            title: "Someone wants to play".to_string(),
            message: "ricky asked to join".to_string(),
            is_read: false,
            created_at: Utc::now(),
        };

        let json = serde_json::to_value(&websocket::Notification::UserNotification(
            notification,
        ))
        .unwrap();

        assert_eq!(json["type"], "user_notification");
        assert_eq!(json["data"]["user_id"], 7);
        assert_eq!(json["data"]["kind"], "join_requested");
    }
}
