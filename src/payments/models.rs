use std::fmt;

use chrono::{DateTime, Utc};

use crate::bookings::{Booking, BookingStatus};
use crate::db;
use crate::errors::ServiceError;
use crate::payments::{ManualGateway, PaymentGateway};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Card,
    Cash,
    Wallet,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::Cash => "cash",
            PaymentMethod::Wallet => "wallet",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, sqlx::FromRow)]
pub struct Payment {
    pub id: i64,
    pub booking_id: i64,
    pub user_id: i64,
    /// in cents
    pub amount: i64,
    pub method: String,
    pub status: String,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// **POST /api/bookings/{id}/payments**
///
/// ``` shell
/// curl --location --request POST 'localhost:8080/api/bookings/1/payments' \
///     --header 'Content-Type: application/json' \
///     --data-raw '{ "method": "card" }'
/// ```
#[derive(Debug, Deserialize)]
pub struct NewPayment {
    pub method: PaymentMethod,
}

#[derive(Debug, Deserialize)]
pub struct PaymentFilter {
    pub status: Option<PaymentStatus>,
    pub booking_id: Option<i64>,
}

impl Payment {
    pub fn is_paid(&self) -> bool {
        self.status == PaymentStatus::Paid.as_str()
    }

    /// Pay for a booking.
    ///
    /// A booking only has one open or paid payment at a time. A settled
    /// payment confirms a pending booking.
    #[tracing::instrument(name = "Payment::create", skip(booking, gateway, db), fields(booking_id = booking.id))]
    pub async fn create(
        booking: &Booking,
        method: PaymentMethod,
        gateway: &dyn PaymentGateway,
        db: &db::Pool,
    ) -> Result<Payment, ServiceError> {
        let mut tx = db.begin().await?;

        // payments and cancellations of the same booking wait for each other
        let (status,): (String,) =
            sqlx::query_as("SELECT status FROM bookings WHERE id = $1 FOR UPDATE")
                .bind(booking.id)
                .fetch_one(&mut tx)
                .await?;

        ensure_payable(status.parse()?)?;

        let open: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM payments WHERE booking_id = $1 AND status IN ('pending', 'paid')",
        )
        .bind(booking.id)
        .fetch_one(&mut tx)
        .await?;

        if open.0 > 0 {
            conflict!("this booking already has a payment");
        }

        let settlement = gateway.charge(method, booking.total_price).await?;

        let payment = sqlx::query_as::<_, Payment>(
            "INSERT INTO payments (booking_id, user_id, amount, method, status, reference)
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
        )
        .bind(booking.id)
        .bind(booking.user_id)
        .bind(booking.total_price)
        .bind(method.to_string())
        .bind(settlement.status.to_string())
        .bind(settlement.reference)
        .fetch_one(&mut tx)
        .await?;

        if payment.is_paid() {
            Booking::confirm_paid(booking.id, &mut tx).await?;
        }

        tx.commit().await?;

        Ok(payment)
    }

    /// Settle a pending cash payment, this confirms its booking
    #[tracing::instrument(name = "Payment::mark_paid", skip(self, db), fields(payment_id = self.id))]
    pub async fn mark_paid(&self, db: &db::Pool) -> Result<Payment, ServiceError> {
        if self.method != PaymentMethod::Cash.as_str() {
            bad_request!("only cash payments can be marked as paid");
        }

        let mut tx = db.begin().await?;

        let payment = sqlx::query_as::<_, Payment>(
            "UPDATE payments SET status = 'paid', reference = $2, updated_at = NOW()
             WHERE id = $1 AND status = 'pending' RETURNING *",
        )
        .bind(self.id)
        .bind(ManualGateway::reference())
        .fetch_optional(&mut tx)
        .await?;

        let payment = match payment {
            Some(payment) => payment,
            None => conflict!(format!("this payment is {}, not pending", self.status)),
        };

        Booking::confirm_paid(payment.booking_id, &mut tx).await?;
        tx.commit().await?;

        Ok(payment)
    }

    /// Refund the paid payment of a cancelled booking, part of the cancellation.
    ///
    /// Open cash payments of the booking are marked as failed.
    pub async fn refund_for_booking(
        booking_id: i64,
        tx: &mut db::Transaction<'_>,
    ) -> Result<Option<Payment>, ServiceError> {
        sqlx::query(
            "UPDATE payments SET status = 'failed', updated_at = NOW()
             WHERE booking_id = $1 AND status = 'pending'",
        )
        .bind(booking_id)
        .execute(&mut *tx)
        .await?;

        let refund = sqlx::query_as::<_, Payment>(
            "UPDATE payments SET status = 'refunded', updated_at = NOW()
             WHERE booking_id = $1 AND status = 'paid' RETURNING *",
        )
        .bind(booking_id)
        .fetch_optional(&mut *tx)
        .await?;

        Ok(refund)
    }

    pub async fn find(id: i64, db: &db::Pool) -> Result<Payment, ServiceError> {
        let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1")
            .bind(id)
            .fetch_one(db)
            .await?;

        Ok(payment)
    }

    #[tracing::instrument(name = "Payment::find_by_user", skip(db))]
    pub async fn find_by_user(user_id: i64, db: &db::Pool) -> Result<Vec<Payment>, ServiceError> {
        let payments = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(db)
        .await?;

        Ok(payments)
    }

    #[tracing::instrument(name = "Payment::find_all", skip(db))]
    pub async fn find_all(filter: PaymentFilter, db: &db::Pool) -> Result<Vec<Payment>, ServiceError> {
        let payments = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments
             WHERE ($1::VARCHAR IS NULL OR status = $1)
             AND ($2::BIGINT IS NULL OR booking_id = $2)
             ORDER BY created_at DESC
             LIMIT 500",
        )
        .bind(filter.status.map(|status| status.to_string()))
        .bind(filter.booking_id)
        .fetch_all(db)
        .await?;

        Ok(payments)
    }
}

/// only bookings that still hold their court can be paid
fn ensure_payable(status: BookingStatus) -> Result<(), ServiceError> {
    if !status.is_active() {
        conflict!(format!("a {} booking can't be paid", status));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_active_bookings_are_payable() {
        assert!(ensure_payable(BookingStatus::Pending).is_ok());
        assert!(ensure_payable(BookingStatus::Confirmed).is_ok());

        for status in &[BookingStatus::Cancelled, BookingStatus::Completed] {
            match ensure_payable(*status) {
                Err(ServiceError::Conflict(_)) => (),
                other => panic!("expected a conflict, got {:?}", other),
            }
        }
    }

    #[test]
    fn methods_and_statuses_match_the_database() {
        assert_eq!(PaymentMethod::Wallet.to_string(), "wallet");
        assert_eq!(PaymentStatus::Refunded.to_string(), "refunded");

        let payment: NewPayment = serde_json::from_str(r#"{ "method": "cash" }"#).unwrap();
        assert_eq!(payment.method, PaymentMethod::Cash);

        assert!(serde_json::from_str::<NewPayment>(r#"{ "method": "iou" }"#).is_err());
    }

    #[test]
    fn paid() {
        let mut payment = Payment {
            id: 1,
            booking_id: 2,
            user_id: 3,
            amount: 1500,
            method: PaymentMethod::Card.to_string(),
            status: PaymentStatus::Paid.to_string(),
            reference: Some(ManualGateway::reference()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(payment.is_paid());

        payment.status = PaymentStatus::Refunded.to_string();
        assert!(!payment.is_paid());
    }
}
