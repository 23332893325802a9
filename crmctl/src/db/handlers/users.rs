//! Database repository for users.

use crate::db::{
    errors::Result,
    models::users::{UserCreateDBRequest, UserDBResponse},
};
use crate::types::{UserId, abbrev_uuid};
use sqlx::PgConnection;
use tracing::instrument;

const USER_COLUMNS: &str = "id, email, display_name, password_hash, is_super_admin, auth_source, last_login, created_at, updated_at";

pub struct Users<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Users<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(email = %request.email), err)]
    pub async fn create(&mut self, request: &UserCreateDBRequest) -> Result<UserDBResponse> {
        let user = sqlx::query_as::<_, UserDBResponse>(&format!(
            "INSERT INTO users (email, display_name, password_hash, is_super_admin, auth_source)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(request.email.trim())
        .bind(&request.display_name)
        .bind(&request.password_hash)
        .bind(request.is_super_admin)
        .bind(&request.auth_source)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(user)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn get_by_id(&mut self, id: UserId) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, UserDBResponse>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(user)
    }

    /// Case-insensitive lookup by email
    #[instrument(skip(self), err)]
    pub async fn get_user_by_email(&mut self, email: &str) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, UserDBResponse>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = LOWER($1)"
        ))
        .bind(email.trim())
        .fetch_optional(&mut *self.db)
        .await?;
        Ok(user)
    }

    pub async fn record_login(&mut self, id: UserId) -> Result<()> {
        sqlx::query("UPDATE users SET last_login = NOW() WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;
        Ok(())
    }

    /// Create the super-admin if missing, or promote and refresh the password of an existing account.
    #[instrument(skip(self, password_hash), err)]
    pub async fn upsert_super_admin(&mut self, email: &str, password_hash: Option<&str>) -> Result<UserId> {
        let id = sqlx::query_scalar::<_, UserId>(
            "INSERT INTO users (email, password_hash, is_super_admin, auth_source)
             VALUES ($1, $2, TRUE, 'system')
             ON CONFLICT (LOWER(email)) DO UPDATE
                SET is_super_admin = TRUE,
                    password_hash = COALESCE(EXCLUDED.password_hash, users.password_hash),
                    updated_at = NOW()
             RETURNING id",
        )
        .bind(email)
        .bind(password_hash)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(id)
    }

    /// Remove users that no longer belong to any organization and are not super-admins.
    pub async fn delete_orphaned(&mut self, ids: &[UserId]) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM users u
             WHERE u.id = ANY($1)
               AND NOT u.is_super_admin
               AND NOT EXISTS (SELECT 1 FROM organization_members m WHERE m.user_id = u.id)",
        )
        .bind(ids)
        .execute(&mut *self.db)
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::PgPool;

    fn request(email: &str) -> UserCreateDBRequest {
        UserCreateDBRequest {
            email: email.to_string(),
            display_name: Some("Test User".to_string()),
            password_hash: None,
            is_super_admin: false,
            auth_source: "native".to_string(),
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_and_lookup_case_insensitive(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let created = repo.create(&request("Alice@Example.com")).await.unwrap();
        let found = repo.get_user_by_email("alice@example.com").await.unwrap().unwrap();
        assert_eq!(created.id, found.id);
        assert!(!found.is_super_admin);

        let duplicate = repo.create(&request("ALICE@example.com")).await;
        assert!(matches!(duplicate, Err(crate::db::errors::DbError::UniqueViolation { .. })));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_upsert_super_admin_promotes_existing(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let created = repo.create(&request("root@example.com")).await.unwrap();
        let id = repo.upsert_super_admin("root@example.com", None).await.unwrap();
        assert_eq!(created.id, id);

        let user = repo.get_by_id(id).await.unwrap().unwrap();
        assert!(user.is_super_admin);
    }
}
