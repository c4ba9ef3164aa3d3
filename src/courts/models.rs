use std::fmt;

use chrono::{DateTime, Utc};
use pickleball_cache::{Cache, CacheIdentifier};

use sqlx::Done;

use crate::auth::SessionUser;
use crate::db;
use crate::errors::ServiceError;
use crate::validator::text_length;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Surface {
    Hard,
    Clay,
    Grass,
    Synthetic,
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let surface = match self {
            Surface::Hard => "hard",
            Surface::Clay => "clay",
            Surface::Grass => "grass",
            Surface::Synthetic => "synthetic",
        };
        write!(f, "{}", surface)
    }
}

impl Default for Surface {
    fn default() -> Self {
        Surface::Hard
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, sqlx::FromRow)]
pub struct Court {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub address: String,
    pub city: String,
    pub surface: String,
    pub is_indoor: bool,
    pub max_players: i16,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Used to create and update courts.
///
/// **POST /api/courts**
///
/// The owner is the authenticated user, only court owners and admins can do this.
///
/// ``` shell
/// curl --location --request POST 'localhost:8080/api/courts' \
///     --header 'Content-Type: application/json' \
///     --data-raw '{
///         "name": "Center Court",
///         "address": "Kitchen Lane 7",
///         "city": "Ghent",
///         "surface": "hard",
///         "is_indoor": true,
///         "max_players": 4
///     }'
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct CourtMessage {
    pub name: String,
    pub description: Option<String>,
    pub address: String,
    pub city: String,
    #[serde(default)]
    pub surface: Surface,
    #[serde(default)]
    pub is_indoor: bool,
    #[serde(default = "default_max_players")]
    pub max_players: i16,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_max_players() -> i16 {
    4
}

fn default_active() -> bool {
    true
}

/// CourtFilter can be used by anyone to search for courts
#[derive(Debug, Deserialize)]
pub struct CourtFilter {
    /// filter these courts by %name%
    pub name: Option<String>,
    /// filter by %city%
    pub city: Option<String>,
    pub surface: Option<Surface>,
    pub indoor: Option<bool>,
    /// list courts owned by a specific user, inactive courts included
    pub owner_id: Option<i64>,
}

impl Court {
    /// returns true if the user may change the court or its bookings
    pub fn is_managed_by(&self, user: &SessionUser) -> bool {
        user.is_admin() || user.id == self.owner_id
    }

    #[tracing::instrument(name = "Court::create", skip(court, db))]
    pub async fn create(owner_id: i64, court: CourtMessage, db: &db::Pool) -> Result<Court, ServiceError> {
        let court = sqlx::query_as::<_, Court>(
            "INSERT INTO courts (owner_id, name, description, address, city, surface, is_indoor, max_players, is_active)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING *",
        )
        .bind(owner_id)
        .bind(court.name.trim())
        .bind(court.description)
        .bind(court.address.trim())
        .bind(court.city.trim())
        .bind(court.surface.to_string())
        .bind(court.is_indoor)
        .bind(court.max_players)
        .bind(court.is_active)
        .fetch_one(db)
        .await?;

        Ok(court)
    }

    #[tracing::instrument(name = "Court::find_by_id", skip(db))]
    pub async fn find_by_id(id: i64, db: &db::Pool) -> Result<Court, ServiceError> {
        if let Some(court) = Cache::get(id).await {
            return Ok(court);
        }

        let court = sqlx::query_as::<_, Court>("SELECT * FROM courts WHERE id = $1")
            .bind(id)
            .fetch_one(db)
            .await?;

        Cache::set(&court, court.id).await;

        Ok(court)
    }

    #[tracing::instrument(name = "Court::find_all", skip(db))]
    pub async fn find_all(filter: CourtFilter, db: &db::Pool) -> Result<Vec<Court>, ServiceError> {
        let courts = sqlx::query_as::<_, Court>(
            "SELECT * FROM courts
             WHERE ($1::VARCHAR IS NULL OR name ILIKE $1)
             AND ($2::VARCHAR IS NULL OR city ILIKE $2)
             AND ($3::VARCHAR IS NULL OR surface = $3)
             AND ($4::BOOLEAN IS NULL OR is_indoor = $4)
             AND ($5::BIGINT IS NULL OR owner_id = $5)
             AND (is_active OR $5::BIGINT IS NOT NULL)
             ORDER BY city, name",
        )
        .bind(filter.name.map(|name| format!("%{}%", name)))
        .bind(filter.city.map(|city| format!("%{}%", city)))
        .bind(filter.surface.map(|surface| surface.to_string()))
        .bind(filter.indoor)
        .bind(filter.owner_id)
        .fetch_all(db)
        .await?;

        Ok(courts)
    }

    #[tracing::instrument(name = "Court::update", skip(court, db))]
    pub async fn update(id: i64, court: CourtMessage, db: &db::Pool) -> Result<Court, ServiceError> {
        let court = sqlx::query_as::<_, Court>(
            "UPDATE courts
             SET name = $2, description = $3, address = $4, city = $5, surface = $6,
                 is_indoor = $7, max_players = $8, is_active = $9, updated_at = NOW()
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(court.name.trim())
        .bind(court.description)
        .bind(court.address.trim())
        .bind(court.city.trim())
        .bind(court.surface.to_string())
        .bind(court.is_indoor)
        .bind(court.max_players)
        .bind(court.is_active)
        .fetch_one(db)
        .await?;

        Cache::set(&court, court.id).await;

        Ok(court)
    }

    /// Delete a court, refused while it still has bookings coming up
    #[tracing::instrument(name = "Court::delete", skip(db))]
    pub async fn delete(id: i64, db: &db::Pool) -> Result<(), ServiceError> {
        let mut tx = db.begin().await?;

        // waits for bookings that are being created on this court
        sqlx::query("SELECT id FROM courts WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_one(&mut tx)
            .await?;

        let upcoming: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM bookings
             WHERE court_id = $1 AND status IN ('pending', 'confirmed') AND end_time > NOW()",
        )
        .bind(id)
        .fetch_one(&mut tx)
        .await?;

        ensure_deletable(upcoming.0)?;

        let result = sqlx::query("DELETE FROM courts WHERE id = $1")
            .bind(id)
            .execute(&mut tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound);
        }

        tx.commit().await?;

        Cache::evict::<Court, _>(id).await;

        Ok(())
    }

    /// returns the amount of active courts
    pub async fn count(db: &db::Pool) -> Result<i64, ServiceError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM courts WHERE is_active")
            .fetch_one(db)
            .await?;

        Ok(count.0)
    }
}

fn ensure_deletable(upcoming_bookings: i64) -> Result<(), ServiceError> {
    if upcoming_bookings > 0 {
        conflict!(format!(
            "this court still has {} upcoming booking(s), cancel them first",
            upcoming_bookings
        ));
    }

    Ok(())
}

impl CacheIdentifier for Court {
    fn cache_key<T: fmt::Display>(id: T) -> String {
        format!("court.{}", id)
    }
}

impl crate::validator::Validate<CourtMessage> for CourtMessage {
    fn validate(&self) -> Result<(), ServiceError> {
        text_length("name", &self.name, 60)?;
        text_length("address", &self.address, 255)?;
        text_length("city", &self.city, 80)?;

        if let Some(description) = self.description.as_ref() {
            if description.chars().count() > 2000 {
                bad_request!("description is too long, maximum 2000 characters");
            }
        }

        if !(2..=8).contains(&self.max_players) {
            bad_request!("a court has room for 2 to 8 players");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::validator::Validator;

    fn message() -> CourtMessage {
        serde_json::from_str(
            r#"{ "name": "Center Court", "address": "Kitchen Lane 7", "city": "Ghent" }"#,
        )
        .unwrap()
    }

    #[test]
    fn defaults() {
        let court = message();
        assert_eq!(court.surface, Surface::Hard);
        assert_eq!(court.max_players, 4);
        assert!(court.is_active);
        assert!(!court.is_indoor);
        assert!(Validator::new(court).validate().is_ok());
    }

    #[test]
    fn invalid_courts() {
        let mut court = message();
        court.name = String::from("  ");
        assert!(Validator::new(court).validate().is_err());

        let mut court = message();
        court.max_players = 12;
        assert!(Validator::new(court).validate().is_err());

        let mut court = message();
        court.max_players = 1;
        assert!(Validator::new(court).validate().is_err());
    }

    #[test]
    fn courts_with_upcoming_bookings_are_kept() {
        assert!(ensure_deletable(0).is_ok());
        assert_eq!(
            ensure_deletable(2),
            Err(ServiceError::Conflict(
                "this court still has 2 upcoming booking(s), cancel them first".to_string()
            ))
        );
    }

    #[test]
    fn unknown_surface_is_rejected() {
        let court = serde_json::from_str::<CourtMessage>(
            r#"{ "name": "x", "address": "y", "city": "z", "surface": "ice" }"#,
        );
        assert!(court.is_err());
    }

    #[test]
    fn managers() {
        let court = Court {
            id: 1,
            owner_id: 5,
            name: "Center Court".to_string(),
            description: None,
            address: "Kitchen Lane 7".to_string(),
            city: "Ghent".to_string(),
            surface: Surface::Clay.to_string(),
            is_indoor: false,
            max_players: 4,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let owner = SessionUser {
            id: 5,
            username: "owner".to_string(),
            role: Role::CourtOwner,
        };
        let other_owner = SessionUser {
            id: 6,
            username: "other".to_string(),
            role: Role::CourtOwner,
        };
        let admin = SessionUser {
            id: 7,
            username: "admin".to_string(),
            role: Role::Admin,
        };

        assert!(court.is_managed_by(&owner));
        assert!(!court.is_managed_by(&other_owner));
        assert!(court.is_managed_by(&admin));
    }
}
