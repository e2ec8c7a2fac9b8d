//! Database operations for `companies`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `companies` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CompanyRow {
    pub id: i64,
    pub public_id: Uuid,
    pub name: String,
    pub slug: String,
    pub monthly_budget: Option<Decimal>,
    pub max_cpl: Option<Decimal>,
    pub max_cac: Option<Decimal>,
    pub target_ticket: Option<Decimal>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for creating a company.
#[derive(Debug, Clone)]
pub struct NewCompany {
    pub name: String,
    pub slug: String,
    pub monthly_budget: Option<Decimal>,
    pub max_cpl: Option<Decimal>,
    pub max_cac: Option<Decimal>,
    pub target_ticket: Option<Decimal>,
}

/// Creates a company; the slug must be unique.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails (including slug conflicts).
pub async fn create_company(pool: &PgPool, new: &NewCompany) -> Result<CompanyRow, DbError> {
    let row = sqlx::query_as::<_, CompanyRow>(
        "INSERT INTO companies \
             (public_id, name, slug, monthly_budget, max_cpl, max_cac, target_ticket) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING id, public_id, name, slug, monthly_budget, max_cpl, max_cac, \
                   target_ticket, is_active, created_at, updated_at",
    )
    .bind(Uuid::new_v4())
    .bind(&new.name)
    .bind(&new.slug)
    .bind(new.monthly_budget)
    .bind(new.max_cpl)
    .bind(new.max_cac)
    .bind(new.target_ticket)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Returns all active companies ordered by name.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_active_companies(pool: &PgPool) -> Result<Vec<CompanyRow>, DbError> {
    let rows = sqlx::query_as::<_, CompanyRow>(
        "SELECT id, public_id, name, slug, monthly_budget, max_cpl, max_cac, \
                target_ticket, is_active, created_at, updated_at \
         FROM companies \
         WHERE is_active \
         ORDER BY name",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns an active company by slug.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no active company has the slug, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_company_by_slug(pool: &PgPool, slug: &str) -> Result<CompanyRow, DbError> {
    let row = sqlx::query_as::<_, CompanyRow>(
        "SELECT id, public_id, name, slug, monthly_budget, max_cpl, max_cac, \
                target_ticket, is_active, created_at, updated_at \
         FROM companies \
         WHERE slug = $1 AND is_active",
    )
    .bind(slug)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}
