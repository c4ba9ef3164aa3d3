use std::fmt;

use chrono::{DateTime, Duration, Utc};

use crate::db;
use crate::errors::ServiceError;

/// 1 point is earned for every 100 cents of a completed booking
pub const CENTS_PER_POINT_EARNED: i64 = 100;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum RewardKind {
    Earned,
    Redeemed,
    Expired,
}

impl RewardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RewardKind::Earned => "earned",
            RewardKind::Redeemed => "redeemed",
            RewardKind::Expired => "expired",
        }
    }
}

impl fmt::Display for RewardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One entry of the points ledger.
///
/// Earned points are positive, redeemed and expired points are negative,
/// the balance of a user is the sum of all of them.
#[derive(Serialize, Deserialize, Debug, Clone, sqlx::FromRow)]
pub struct RewardTransaction {
    pub id: i64,
    pub user_id: i64,
    pub booking_id: Option<i64>,
    pub kind: String,
    pub points: i64,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Debug)]
pub struct RewardSummary {
    pub balance: i64,
    pub transactions: Vec<RewardTransaction>,
}

/// points earned with a booking of `total_price` cents
pub fn points_for(total_price: i64) -> i64 {
    total_price.max(0) / CENTS_PER_POINT_EARNED
}

/// Points that have to expire for a user.
///
/// `old_earned` are the points earned before the expiry cutoff, `spent`
/// is everything already redeemed or expired (as a positive number).
/// Spending consumes the oldest points first.
pub fn points_to_expire(old_earned: i64, spent: i64) -> i64 {
    (old_earned - spent).max(0)
}

/// ledger totals of one user, read by the expiry sweep under the user lock
#[derive(Debug, sqlx::FromRow)]
struct ExpiryTotals {
    old_earned: i64,
    spent: i64,
}

impl RewardTransaction {
    /// Append an entry to the ledger, part of the caller's transaction.
    ///
    /// The sign of `points` is derived from the kind.
    #[tracing::instrument(name = "RewardTransaction::record", skip(description, tx))]
    pub async fn record(
        user_id: i64,
        booking_id: Option<i64>,
        kind: RewardKind,
        points: i64,
        description: &str,
        tx: &mut db::Transaction<'_>,
    ) -> Result<RewardTransaction, ServiceError> {
        let points = match kind {
            RewardKind::Earned => points.abs(),
            RewardKind::Redeemed | RewardKind::Expired => -points.abs(),
        };

        let transaction = sqlx::query_as::<_, RewardTransaction>(
            "INSERT INTO reward_transactions (user_id, booking_id, kind, points, description)
             VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(user_id)
        .bind(booking_id)
        .bind(kind.to_string())
        .bind(points)
        .bind(description)
        .fetch_one(&mut *tx)
        .await?;

        Ok(transaction)
    }

    #[tracing::instrument(name = "RewardTransaction::balance", skip(db))]
    pub async fn balance(user_id: i64, db: &db::Pool) -> Result<i64, ServiceError> {
        let balance: (i64,) = sqlx::query_as(
            "SELECT COALESCE(SUM(points), 0)::BIGINT FROM reward_transactions WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(db)
        .await?;

        Ok(balance.0)
    }

    /// The balance of a user inside a transaction.
    ///
    /// Locks the user row first, concurrent redemptions of the same user
    /// wait for each other so the balance can't go negative.
    pub async fn locked_balance(user_id: i64, tx: &mut db::Transaction<'_>) -> Result<i64, ServiceError> {
        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let balance: (i64,) = sqlx::query_as(
            "SELECT COALESCE(SUM(points), 0)::BIGINT FROM reward_transactions WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        Ok(balance.0)
    }

    #[tracing::instrument(name = "RewardTransaction::find_by_user", skip(db))]
    pub async fn find_by_user(user_id: i64, db: &db::Pool) -> Result<Vec<RewardTransaction>, ServiceError> {
        let transactions = sqlx::query_as::<_, RewardTransaction>(
            "SELECT * FROM reward_transactions WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(db)
        .await?;

        Ok(transactions)
    }

    pub async fn summary(user_id: i64, db: &db::Pool) -> Result<RewardSummary, ServiceError> {
        let transactions = RewardTransaction::find_by_user(user_id, db).await?;
        let balance = transactions.iter().map(|transaction| transaction.points).sum();

        Ok(RewardSummary {
            balance,
            transactions,
        })
    }

    /// Expire the points that were earned more than `expiry_days` ago and
    /// haven't been spent yet.
    ///
    /// Every user is handled in its own transaction, under the same user
    /// lock as redemptions.
    ///
    /// Returns the users and the amount of points that expired for them.
    #[tracing::instrument(name = "RewardTransaction::expire", skip(db))]
    pub async fn expire(
        expiry_days: i64,
        db: &db::Pool,
    ) -> Result<Vec<(i64, i64)>, ServiceError> {
        let cutoff = Utc::now() - Duration::days(expiry_days);

        let user_ids: Vec<(i64,)> = sqlx::query_as(
            "SELECT DISTINCT user_id FROM reward_transactions
             WHERE kind = 'earned' AND created_at < $1",
        )
        .bind(cutoff)
        .fetch_all(db)
        .await?;

        let mut expired = Vec::new();
        for (user_id,) in user_ids {
            let mut tx = db.begin().await?;

            sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
                .bind(user_id)
                .execute(&mut tx)
                .await?;

            let totals = sqlx::query_as::<_, ExpiryTotals>(
                "SELECT
                    COALESCE(SUM(points) FILTER (WHERE kind = 'earned' AND created_at < $2), 0)::BIGINT AS old_earned,
                    COALESCE(-SUM(points) FILTER (WHERE kind <> 'earned'), 0)::BIGINT AS spent
                 FROM reward_transactions
                 WHERE user_id = $1",
            )
            .bind(user_id)
            .bind(cutoff)
            .fetch_one(&mut tx)
            .await?;

            let points = points_to_expire(totals.old_earned, totals.spent);
            if points > 0 {
                RewardTransaction::record(
                    user_id,
                    None,
                    RewardKind::Expired,
                    points,
                    &format!("{} points expired after {} days", points, expiry_days),
                    &mut tx,
                )
                .await?;

                expired.push((user_id, points));
            }

            tx.commit().await?;
        }

        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn earning_rounds_down() {
        assert_eq!(points_for(0), 0);
        assert_eq!(points_for(99), 0);
        assert_eq!(points_for(100), 1);
        assert_eq!(points_for(4550), 45);
        assert_eq!(points_for(-100), 0);
    }

    #[test]
    fn nothing_expires_when_everything_was_spent() {
        assert_eq!(points_to_expire(0, 0), 0);
        assert_eq!(points_to_expire(100, 100), 0);
        assert_eq!(points_to_expire(100, 250), 0);
    }

    #[test]
    fn unspent_old_points_expire() {
        // 300 old points, 120 redeemed
        assert_eq!(points_to_expire(300, 120), 180);
        // after the sweep the expired entry counts as spent
        assert_eq!(points_to_expire(300, 120 + 180), 0);
    }

    #[test]
    fn expiry_after_a_redemption_keeps_the_balance_positive() {
        // 500 old points, all of them redeemed before the sweep took the lock
        let earned = 500;
        let spent = 500;
        let points = points_to_expire(earned, spent);

        assert_eq!(points, 0);
        assert!(earned - spent - points >= 0);

        // the sweep never takes more than the balance
        for &(old_earned, recent, spent) in &[(500, 0, 200), (500, 300, 700), (100, 900, 0)] {
            let balance = old_earned + recent - spent;
            assert!(points_to_expire(old_earned, spent) <= balance.max(0));
        }
    }

    #[test]
    fn kinds() {
        assert_eq!(RewardKind::Redeemed.to_string(), "redeemed");
        assert_eq!(
            serde_json::to_string(&RewardKind::Expired).unwrap(),
            "\"expired\""
        );
    }
}
