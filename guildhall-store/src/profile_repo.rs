use async_trait::async_trait;
use chrono::{DateTime, Utc};
use guildhall_core::repository::{ProfileRepository, RepoResult};
use guildhall_shared::{Profile, Role, SubscriptionStatus};
use sqlx::PgPool;
use uuid::Uuid;

pub struct StoreProfileRepository {
    pool: PgPool,
}

impl StoreProfileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    id: Uuid,
    email: Option<String>,
    display_name: Option<String>,
    role: String,
    subscription_status: String,
    subscription_plan: Option<String>,
    customer_id: Option<String>,
    subscription_id: Option<String>,
    current_period_end: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProfileRow> for Profile {
    type Error = String;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        Ok(Profile {
            id: row.id,
            email: row.email,
            display_name: row.display_name,
            role: Role::parse(&row.role).ok_or_else(|| format!("unknown role {}", row.role))?,
            subscription_status: SubscriptionStatus::parse(&row.subscription_status)
                .ok_or_else(|| format!("unknown subscription status {}", row.subscription_status))?,
            subscription_plan: row.subscription_plan,
            customer_id: row.customer_id,
            subscription_id: row.subscription_id,
            current_period_end: row.current_period_end,
            updated_at: row.updated_at,
        })
    }
}

const PROFILE_COLUMNS: &str = "id, email, display_name, role, subscription_status, subscription_plan, \
     customer_id, subscription_id, current_period_end, updated_at";

#[async_trait]
impl ProfileRepository for StoreProfileRepository {
    async fn get_profile(&self, id: Uuid) -> RepoResult<Option<Profile>> {
        let row: Option<ProfileRow> =
            sqlx::query_as(&format!("SELECT {} FROM profiles WHERE id = $1", PROFILE_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(Profile::try_from).transpose()?)
    }

    async fn ensure_profile(&self, id: Uuid, email: Option<&str>) -> RepoResult<Profile> {
        // The no-op update makes RETURNING yield the existing row too.
        let row: ProfileRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO profiles (id, email) VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET email = COALESCE(profiles.email, EXCLUDED.email)
            RETURNING {}
            "#,
            PROFILE_COLUMNS
        ))
        .bind(id)
        .bind(email)
        .fetch_one(&self.pool)
        .await?;

        Ok(Profile::try_from(row)?)
    }

    async fn find_by_customer(&self, customer_id: &str) -> RepoResult<Option<Profile>> {
        let row: Option<ProfileRow> =
            sqlx::query_as(&format!("SELECT {} FROM profiles WHERE customer_id = $1", PROFILE_COLUMNS))
                .bind(customer_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(Profile::try_from).transpose()?)
    }

    async fn save_profile(&self, profile: &Profile) -> RepoResult<()> {
        sqlx::query(
            r#"
            UPDATE profiles
            SET email = $2, display_name = $3, role = $4, subscription_status = $5, subscription_plan = $6,
                customer_id = $7, subscription_id = $8, current_period_end = $9, updated_at = $10
            WHERE id = $1
            "#,
        )
        .bind(profile.id)
        .bind(&profile.email)
        .bind(&profile.display_name)
        .bind(profile.role.as_str())
        .bind(profile.subscription_status.as_str())
        .bind(&profile.subscription_plan)
        .bind(&profile.customer_id)
        .bind(&profile.subscription_id)
        .bind(profile.current_period_end)
        .bind(profile.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
