use chrono::{DateTime, Utc};
use regex::Regex;

use sqlx::Done;

use crate::db;
use crate::errors::ServiceError;

#[derive(Serialize, Deserialize, Debug, Clone, sqlx::FromRow)]
pub struct Promotion {
    pub id: i64,
    pub code: String,
    pub description: Option<String>,
    pub discount_percent: Option<i16>,
    /// in cents
    pub discount_amount: Option<i64>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub max_uses: Option<i32>,
    pub used_count: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Used by administrators to create and update promotions.
///
/// A promotion either gives a percentage or a fixed amount off.
///
/// ``` shell
/// curl --location --request POST 'localhost:8080/api/admin/promotions' \
///     --header 'Content-Type: application/json' \
///     --data-raw '{
///         "code": "SPRING-DINK",
///         "discount_percent": 20,
///         "valid_from": "2026-03-21T00:00:00Z",
///         "valid_until": "2026-06-21T00:00:00Z",
///         "max_uses": 100
///     }'
/// ```
#[derive(Deserialize, Debug, Clone)]
pub struct PromotionMessage {
    pub code: String,
    pub description: Option<String>,
    pub discount_percent: Option<i16>,
    pub discount_amount: Option<i64>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub max_uses: Option<i32>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// what a client sees when checking a code
#[derive(Serialize, Debug)]
pub struct PromotionCheck {
    pub code: String,
    pub description: Option<String>,
    pub discount_percent: Option<i16>,
    pub discount_amount: Option<i64>,
    pub valid_until: DateTime<Utc>,
    pub applicable: bool,
}

impl Promotion {
    /// the amount taken off a price, never more than the price itself
    pub fn discount(&self, base_price: i64) -> i64 {
        let discount = match (self.discount_percent, self.discount_amount) {
            (Some(percent), _) => base_price * i64::from(percent) / 100,
            (None, Some(amount)) => amount,
            (None, None) => 0,
        };

        discount.min(base_price).max(0)
    }

    /// active, within its validity window and not used up
    pub fn is_applicable(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.valid_from <= now
            && now < self.valid_until
            && self.max_uses.map_or(true, |max| self.used_count < max)
    }

    pub fn check(&self, now: DateTime<Utc>) -> PromotionCheck {
        PromotionCheck {
            code: self.code.clone(),
            description: self.description.clone(),
            discount_percent: self.discount_percent,
            discount_amount: self.discount_amount,
            valid_until: self.valid_until,
            applicable: self.is_applicable(now),
        }
    }

    /// Use a promotion code as part of a booking transaction.
    ///
    /// The promotion row stays locked until the transaction ends, so
    /// `max_uses` holds under concurrent bookings.
    #[tracing::instrument(name = "Promotion::claim", skip(tx))]
    pub async fn claim(
        code: &str,
        now: DateTime<Utc>,
        tx: &mut db::Transaction<'_>,
    ) -> Result<Promotion, ServiceError> {
        let promotion = sqlx::query_as::<_, Promotion>(
            "SELECT * FROM promotions WHERE code = $1 FOR UPDATE",
        )
        .bind(code.trim().to_uppercase())
        .fetch_optional(&mut *tx)
        .await?;

        let promotion = match promotion {
            Some(promotion) => promotion,
            None => bad_request!("unknown promotion code"),
        };

        if !promotion.is_applicable(now) {
            bad_request!("this promotion code is no longer valid");
        }

        let promotion = sqlx::query_as::<_, Promotion>(
            "UPDATE promotions SET used_count = used_count + 1, updated_at = NOW()
             WHERE id = $1 RETURNING *",
        )
        .bind(promotion.id)
        .fetch_one(&mut *tx)
        .await?;

        Ok(promotion)
    }

    #[tracing::instrument(name = "Promotion::find_by_code", skip(db))]
    pub async fn find_by_code(code: &str, db: &db::Pool) -> Result<Promotion, ServiceError> {
        let promotion = sqlx::query_as::<_, Promotion>("SELECT * FROM promotions WHERE code = $1")
            .bind(code.trim().to_uppercase())
            .fetch_one(db)
            .await?;

        Ok(promotion)
    }

    pub async fn find_all(db: &db::Pool) -> Result<Vec<Promotion>, ServiceError> {
        let promotions =
            sqlx::query_as::<_, Promotion>("SELECT * FROM promotions ORDER BY valid_from DESC")
                .fetch_all(db)
                .await?;

        Ok(promotions)
    }

    #[tracing::instrument(name = "Promotion::create", skip(db))]
    pub async fn create(promotion: PromotionMessage, db: &db::Pool) -> Result<Promotion, ServiceError> {
        let promotion = sqlx::query_as::<_, Promotion>(
            "INSERT INTO promotions
                (code, description, discount_percent, discount_amount, valid_from, valid_until, max_uses, is_active)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *",
        )
        .bind(promotion.code.trim().to_uppercase())
        .bind(promotion.description)
        .bind(promotion.discount_percent)
        .bind(promotion.discount_amount)
        .bind(promotion.valid_from)
        .bind(promotion.valid_until)
        .bind(promotion.max_uses)
        .bind(promotion.is_active)
        .fetch_one(db)
        .await?;

        Ok(promotion)
    }

    #[tracing::instrument(name = "Promotion::update", skip(db))]
    pub async fn update(
        id: i64,
        promotion: PromotionMessage,
        db: &db::Pool,
    ) -> Result<Promotion, ServiceError> {
        let promotion = sqlx::query_as::<_, Promotion>(
            "UPDATE promotions
             SET code = $2, description = $3, discount_percent = $4, discount_amount = $5,
                 valid_from = $6, valid_until = $7, max_uses = $8, is_active = $9, updated_at = NOW()
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(promotion.code.trim().to_uppercase())
        .bind(promotion.description)
        .bind(promotion.discount_percent)
        .bind(promotion.discount_amount)
        .bind(promotion.valid_from)
        .bind(promotion.valid_until)
        .bind(promotion.max_uses)
        .bind(promotion.is_active)
        .fetch_one(db)
        .await?;

        Ok(promotion)
    }

    #[tracing::instrument(name = "Promotion::delete", skip(db))]
    pub async fn delete(id: i64, db: &db::Pool) -> Result<(), ServiceError> {
        let result = sqlx::query("DELETE FROM promotions WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound);
        }

        Ok(())
    }
}

lazy_static! {
    static ref CODE_PATTERN: Regex = Regex::new(r"^[A-Z0-9_-]{3,20}$").expect("invalid promotion code regex");
}

impl crate::validator::Validate<PromotionMessage> for PromotionMessage {
    fn validate(&self) -> Result<(), ServiceError> {
        if !CODE_PATTERN.is_match(&self.code.trim().to_uppercase()) {
            bad_request!("a promotion code has 3 to 20 letters, numbers, '-' or '_'");
        }

        match (self.discount_percent, self.discount_amount) {
            (Some(_), Some(_)) | (None, None) => {
                bad_request!("a promotion needs either a discount percentage or a discount amount");
            }
            (Some(percent), None) if !(1..=100).contains(&percent) => {
                bad_request!("the discount percentage should be within [1-100]");
            }
            (None, Some(amount)) if amount <= 0 => {
                bad_request!("the discount amount has to be above 0");
            }
            _ => {}
        }

        if self.valid_from >= self.valid_until {
            bad_request!("a promotion has to end after it starts");
        }

        if let Some(max_uses) = self.max_uses {
            if max_uses <= 0 {
                bad_request!("the maximum amount of uses has to be above 0");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::validator::Validator;
    use chrono::Duration;

    pub(crate) fn promotion(percent: Option<i16>, amount: Option<i64>) -> Promotion {
        let now = Utc::now();
        Promotion {
            id: 1,
            code: "DINK".to_string(),
            description: None,
            discount_percent: percent,
            discount_amount: amount,
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(1),
            max_uses: None,
            used_count: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn message() -> PromotionMessage {
        let now = Utc::now();
        PromotionMessage {
            code: "spring-dink".to_string(),
            description: None,
            discount_percent: Some(20),
            discount_amount: None,
            valid_from: now,
            valid_until: now + Duration::days(30),
            max_uses: Some(100),
            is_active: true,
        }
    }

    #[test]
    fn percentage_discount_rounds_down() {
        let promotion = promotion(Some(15), None);
        assert_eq!(promotion.discount(1000), 150);
        assert_eq!(promotion.discount(999), 149);
        assert_eq!(promotion.discount(0), 0);
    }

    #[test]
    fn fixed_discount_is_capped_at_the_price() {
        let promotion = promotion(None, Some(500));
        assert_eq!(promotion.discount(1500), 500);
        assert_eq!(promotion.discount(300), 300);
    }

    #[test]
    fn applicability() {
        let now = Utc::now();
        assert!(promotion(Some(10), None).is_applicable(now));

        let mut inactive = promotion(Some(10), None);
        inactive.is_active = false;
        assert!(!inactive.is_applicable(now));

        let mut expired = promotion(Some(10), None);
        expired.valid_until = now - Duration::hours(1);
        assert!(!expired.is_applicable(now));

        let mut not_started = promotion(Some(10), None);
        not_started.valid_from = now + Duration::hours(1);
        assert!(!not_started.is_applicable(now));

        let mut used_up = promotion(Some(10), None);
        used_up.max_uses = Some(3);
        used_up.used_count = 3;
        assert!(!used_up.is_applicable(now));
        used_up.used_count = 2;
        assert!(used_up.is_applicable(now));
    }

    #[test]
    fn validation() {
        assert!(Validator::new(message()).validate().is_ok());

        let mut both = message();
        both.discount_amount = Some(100);
        assert!(Validator::new(both).validate().is_err());

        let mut too_much = message();
        too_much.discount_percent = Some(101);
        assert!(Validator::new(too_much).validate().is_err());

        let mut bad_code = message();
        bad_code.code = "no spaces".to_string();
        assert!(Validator::new(bad_code).validate().is_err());

        let mut backwards = message();
        backwards.valid_until = backwards.valid_from;
        assert!(Validator::new(backwards).validate().is_err());
    }
}
