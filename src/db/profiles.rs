//! Profile operations.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{bump_revision, Repository};
use crate::errors::AppError;
use crate::models::{CreateProfileRequest, Profile, Role};

impl Repository {
    /// List all profiles.
    pub async fn list_profiles(&self) -> Result<Vec<Profile>, AppError> {
        let rows = sqlx::query(
            "SELECT id, email, full_name, role, created_at FROM profiles ORDER BY email",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(profile_from_row).collect())
    }

    /// Get a profile by ID.
    pub async fn get_profile(&self, id: &str) -> Result<Option<Profile>, AppError> {
        let row = sqlx::query(
            "SELECT id, email, full_name, role, created_at FROM profiles WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(profile_from_row))
    }

    /// Create a profile. Duplicate emails are a conflict.
    pub async fn create_profile(&self, request: &CreateProfileRequest) -> Result<Profile, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let email = request.email.trim().to_lowercase();

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO profiles (id, email, full_name, role, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&email)
        .bind(&request.full_name)
        .bind(request.role.as_str())
        .bind(&now)
        .execute(&mut *tx)
        .await?;
        bump_revision(&mut *tx).await?;
        tx.commit().await?;

        Ok(Profile {
            id,
            email,
            full_name: request.full_name.clone(),
            role: request.role,
            created_at: now,
        })
    }

    /// Change a profile's role.
    pub async fn update_profile_role(&self, id: &str, role: Role) -> Result<Profile, AppError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("UPDATE profiles SET role = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Profile {} not found", id)));
        }

        bump_revision(&mut *tx).await?;
        tx.commit().await?;

        self.get_profile(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Profile {} not found", id)))
    }
}

fn profile_from_row(row: &SqliteRow) -> Profile {
    let role: String = row.get("role");
    Profile {
        id: row.get("id"),
        email: row.get("email"),
        full_name: row.get("full_name"),
        // Unknown stored roles get the least privilege.
        role: Role::from_str(&role).unwrap_or(Role::Viewer),
        created_at: row.get("created_at"),
    }
}
