//! Sponsor operations.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{bump_revision, Repository};
use crate::errors::AppError;
use crate::models::{
    CreateSponsorRequest, CreateSponsorTimelineEventRequest, Sponsor, SponsorStatus,
    SponsorTimelineEvent, UpdateEmailChoice, UpdateSponsorRequest,
};

const SPONSOR_COLUMNS: &str = "id, first_name, last_name, email, secondary_email, phone, address, status, start_date, profile_image_url, primary_email_for_updates, notes, created_at, updated_at, version";

impl Repository {
    /// List all sponsors, by name.
    pub async fn list_sponsors(&self) -> Result<Vec<Sponsor>, AppError> {
        let sql = format!("SELECT {SPONSOR_COLUMNS} FROM sponsors ORDER BY last_name, first_name");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(sponsor_from_row).collect())
    }

    /// Get a sponsor by ID.
    pub async fn get_sponsor(&self, id: &str) -> Result<Option<Sponsor>, AppError> {
        let sql = format!("SELECT {SPONSOR_COLUMNS} FROM sponsors WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(sponsor_from_row))
    }

    /// Create a new sponsor.
    pub async fn create_sponsor(&self, request: &CreateSponsorRequest) -> Result<Sponsor, AppError> {
        let now = Utc::now().to_rfc3339();
        let sponsor = Sponsor {
            id: uuid::Uuid::new_v4().to_string(),
            first_name: request.first_name.trim().to_string(),
            last_name: request.last_name.trim().to_string(),
            email: request.email.clone(),
            secondary_email: request.secondary_email.clone(),
            phone: request.phone.clone(),
            address: request.address.clone(),
            status: request.status,
            start_date: request.start_date.clone(),
            profile_image_url: request.profile_image_url.clone(),
            primary_email_for_updates: request.primary_email_for_updates,
            notes: request.notes.clone(),
            created_at: now.clone(),
            updated_at: now,
            version: 1,
        };
        validate_sponsor(&sponsor)?;

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO sponsors (id, first_name, last_name, email, secondary_email, phone, address, status, start_date, profile_image_url, primary_email_for_updates, notes, created_at, updated_at, version) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1)",
        )
        .bind(&sponsor.id)
        .bind(&sponsor.first_name)
        .bind(&sponsor.last_name)
        .bind(&sponsor.email)
        .bind(&sponsor.secondary_email)
        .bind(&sponsor.phone)
        .bind(&sponsor.address)
        .bind(sponsor.status.as_str())
        .bind(&sponsor.start_date)
        .bind(&sponsor.profile_image_url)
        .bind(sponsor.primary_email_for_updates.map(|c| c.as_str()))
        .bind(&sponsor.notes)
        .bind(&sponsor.created_at)
        .bind(&sponsor.updated_at)
        .execute(&mut *tx)
        .await?;
        bump_revision(&mut *tx).await?;
        tx.commit().await?;

        Ok(sponsor)
    }

    /// Update a sponsor with optimistic concurrency control.
    pub async fn update_sponsor(
        &self,
        id: &str,
        request: &UpdateSponsorRequest,
    ) -> Result<Sponsor, AppError> {
        let existing = self
            .get_sponsor(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Sponsor {} not found", id)))?;

        // Check version for optimistic concurrency
        if let Some(expected) = request.expected_version {
            if existing.version != expected {
                return Err(AppError::VersionMismatch {
                    message: format!(
                        "Version mismatch: expected {}, current {}",
                        expected, existing.version
                    ),
                    current_version: existing.version,
                });
            }
        }

        let updated = Sponsor {
            id: existing.id.clone(),
            first_name: request
                .first_name
                .as_deref()
                .map(|s| s.trim().to_string())
                .unwrap_or_else(|| existing.first_name.clone()),
            last_name: request
                .last_name
                .as_deref()
                .map(|s| s.trim().to_string())
                .unwrap_or_else(|| existing.last_name.clone()),
            email: request.email.clone().or(existing.email.clone()),
            secondary_email: request
                .secondary_email
                .clone()
                .or(existing.secondary_email.clone()),
            phone: request.phone.clone().or(existing.phone.clone()),
            address: request.address.clone().or(existing.address.clone()),
            status: request.status.unwrap_or(existing.status),
            start_date: request.start_date.clone().or(existing.start_date.clone()),
            profile_image_url: request
                .profile_image_url
                .clone()
                .or(existing.profile_image_url.clone()),
            primary_email_for_updates: request
                .primary_email_for_updates
                .or(existing.primary_email_for_updates),
            notes: request.notes.clone().or(existing.notes.clone()),
            created_at: existing.created_at.clone(),
            updated_at: Utc::now().to_rfc3339(),
            version: existing.version + 1,
        };
        validate_sponsor(&updated)?;

        let mut tx = self.pool.begin().await?;

        // Conditional UPDATE with version check to prevent lost updates
        let result = sqlx::query(
            "UPDATE sponsors SET first_name = ?, last_name = ?, email = ?, secondary_email = ?, phone = ?, address = ?, status = ?, start_date = ?, profile_image_url = ?, primary_email_for_updates = ?, notes = ?, updated_at = ?, version = ? WHERE id = ? AND version = ?",
        )
        .bind(&updated.first_name)
        .bind(&updated.last_name)
        .bind(&updated.email)
        .bind(&updated.secondary_email)
        .bind(&updated.phone)
        .bind(&updated.address)
        .bind(updated.status.as_str())
        .bind(&updated.start_date)
        .bind(&updated.profile_image_url)
        .bind(updated.primary_email_for_updates.map(|c| c.as_str()))
        .bind(&updated.notes)
        .bind(&updated.updated_at)
        .bind(updated.version)
        .bind(id)
        .bind(existing.version)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            drop(tx);
            let current = self.get_sponsor(id).await?;
            return Err(AppError::VersionMismatch {
                message: "Concurrent modification detected".to_string(),
                current_version: current.map(|s| s.version).unwrap_or(0),
            });
        }

        bump_revision(&mut *tx).await?;
        tx.commit().await?;

        Ok(updated)
    }

    /// Delete a sponsor. Its students stay, with the sponsorship link cleared.
    pub async fn delete_sponsor(&self, id: &str) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let unlinked = sqlx::query(
            "UPDATE students SET sponsor_id = NULL, sponsored_since = NULL, updated_at = ? WHERE sponsor_id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM sponsors WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Sponsor {} not found", id)));
        }

        bump_revision(&mut *tx).await?;
        tx.commit().await?;

        tracing::debug!(
            "Sponsor {} deleted, {} students unlinked",
            id,
            unlinked.rows_affected()
        );
        Ok(())
    }

    /// Sponsor timeline, newest first.
    pub async fn list_sponsor_timeline(
        &self,
        sponsor_id: &str,
    ) -> Result<Vec<SponsorTimelineEvent>, AppError> {
        if self.get_sponsor(sponsor_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Sponsor {} not found", sponsor_id)));
        }

        let rows = sqlx::query(
            "SELECT id, sponsor_id, event_type, title, description, event_date, created_at FROM sponsor_timeline_events WHERE sponsor_id = ? ORDER BY event_date DESC, created_at DESC",
        )
        .bind(sponsor_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(sponsor_event_from_row).collect())
    }

    /// Append an entry to a sponsor's timeline.
    pub async fn create_sponsor_timeline_event(
        &self,
        sponsor_id: &str,
        request: &CreateSponsorTimelineEventRequest,
    ) -> Result<SponsorTimelineEvent, AppError> {
        let now = Utc::now();
        let event = SponsorTimelineEvent {
            id: uuid::Uuid::new_v4().to_string(),
            sponsor_id: sponsor_id.to_string(),
            event_type: request.event_type.clone(),
            title: request.title.trim().to_string(),
            description: request.description.clone(),
            event_date: request
                .event_date
                .clone()
                .unwrap_or_else(|| now.format("%Y-%m-%d").to_string()),
            created_at: now.to_rfc3339(),
        };

        let mut tx = self.pool.begin().await?;
        // A missing sponsor fails the foreign key and surfaces as a validation error.
        sqlx::query(
            "INSERT INTO sponsor_timeline_events (id, sponsor_id, event_type, title, description, event_date, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.id)
        .bind(&event.sponsor_id)
        .bind(&event.event_type)
        .bind(&event.title)
        .bind(&event.description)
        .bind(&event.event_date)
        .bind(&event.created_at)
        .execute(&mut *tx)
        .await?;
        bump_revision(&mut *tx).await?;
        tx.commit().await?;

        Ok(event)
    }
}

/// Field rules shared by create and update.
fn validate_sponsor(sponsor: &Sponsor) -> Result<(), AppError> {
    if sponsor.first_name.is_empty() || sponsor.last_name.is_empty() {
        return Err(AppError::Validation(
            "firstName and lastName are required".to_string(),
        ));
    }

    let selected = match sponsor.primary_email_for_updates {
        Some(UpdateEmailChoice::Secondary) => Some(&sponsor.secondary_email),
        Some(UpdateEmailChoice::Primary) => Some(&sponsor.email),
        None => None,
    };
    if let Some(address) = selected {
        if address.as_deref().map_or(true, |a| a.trim().is_empty()) {
            return Err(AppError::Validation(
                "primaryEmailForUpdates selects an address that is not set".to_string(),
            ));
        }
    }
    Ok(())
}

fn sponsor_from_row(row: &SqliteRow) -> Sponsor {
    let status: String = row.get("status");
    let update_choice: Option<String> = row.get("primary_email_for_updates");
    Sponsor {
        id: row.get("id"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        email: row.get("email"),
        secondary_email: row.get("secondary_email"),
        phone: row.get("phone"),
        address: row.get("address"),
        status: SponsorStatus::from_str(&status).unwrap_or(SponsorStatus::Active),
        start_date: row.get("start_date"),
        profile_image_url: row.get("profile_image_url"),
        primary_email_for_updates: update_choice.and_then(|s| UpdateEmailChoice::from_str(&s)),
        notes: row.get("notes"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        version: row.get("version"),
    }
}

fn sponsor_event_from_row(row: &SqliteRow) -> SponsorTimelineEvent {
    SponsorTimelineEvent {
        id: row.get("id"),
        sponsor_id: row.get("sponsor_id"),
        event_type: row.get("event_type"),
        title: row.get("title"),
        description: row.get("description"),
        event_date: row.get("event_date"),
        created_at: row.get("created_at"),
    }
}
