/// Account database models and operations
use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// Coarse authorization class carried in token claims
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Farmer,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Farmer => "farmer",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "farmer" => Ok(Role::Farmer),
            "admin" => Ok(Role::Admin),
            _ => Err(AppError::Validation(format!("Invalid role: {}", s))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Certification status of a farmer account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificationStatus {
    Pending,
    Certified,
    Declined,
}

impl CertificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificationStatus::Pending => "pending",
            CertificationStatus::Certified => "certified",
            CertificationStatus::Declined => "declined",
        }
    }
}

impl FromStr for CertificationStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(CertificationStatus::Pending),
            "certified" => Ok(CertificationStatus::Certified),
            "declined" => Ok(CertificationStatus::Declined),
            _ => Err(AppError::Validation(format!("Invalid status: {}", s))),
        }
    }
}

impl fmt::Display for CertificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account record in the database.
///
/// Holds secret-bearing fields and is therefore never serialized; convert
/// to [`crate::account::User`] before it leaves the service.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub farm_size: Option<f64>,
    pub crop_type: Option<String>,
    pub role: Role,
    pub status: CertificationStatus,
    pub refresh_token_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    fn from_row(row: &SqliteRow) -> AppResult<Self> {
        let role: String = row.try_get("role")?;
        let status: String = row.try_get("status")?;

        Ok(Account {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            name: row.try_get("name")?,
            farm_size: row.try_get("farm_size")?,
            crop_type: row.try_get("crop_type")?,
            role: role.parse()?,
            status: status.parse()?,
            refresh_token_hash: row.try_get("refresh_token_hash")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Fields required to create an account
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub farm_size: Option<f64>,
    pub crop_type: Option<String>,
    pub role: Role,
    pub status: CertificationStatus,
}

const ACCOUNT_COLUMNS: &str = "id, email, password_hash, name, farm_size, crop_type, role, status,
     refresh_token_hash, created_at, updated_at";

/// Credential store backed by the `account` table
#[derive(Clone)]
pub struct AccountStore {
    db: SqlitePool,
}

impl AccountStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Insert a new account; emails are expected to be normalized already
    pub async fn insert(&self, new: NewAccount) -> AppResult<Account> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO account
                 (id, email, password_hash, name, farm_size, crop_type,
                  role, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .bind(&id)
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(&new.name)
        .bind(new.farm_size)
        .bind(&new.crop_type)
        .bind(new.role.as_str())
        .bind(new.status.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.db)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AppError::Conflict("Email already registered".to_string())
            }
            _ => AppError::Database(e),
        })?;

        Ok(Account {
            id,
            email: new.email,
            password_hash: new.password_hash,
            name: new.name,
            farm_size: new.farm_size,
            crop_type: new.crop_type,
            role: new.role,
            status: new.status,
            refresh_token_hash: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Get account by id
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<Account>> {
        let query = format!("SELECT {} FROM account WHERE id = ?1", ACCOUNT_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        row.as_ref().map(Account::from_row).transpose()
    }

    /// Get account by id, restricted to one role
    pub async fn find_by_id_and_role(&self, id: &str, role: Role) -> AppResult<Option<Account>> {
        let query = format!(
            "SELECT {} FROM account WHERE id = ?1 AND role = ?2",
            ACCOUNT_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(role.as_str())
            .fetch_optional(&self.db)
            .await?;

        row.as_ref().map(Account::from_row).transpose()
    }

    /// Get account by (normalized) email
    pub async fn find_by_email(&self, email: &str) -> AppResult<Option<Account>> {
        let query = format!("SELECT {} FROM account WHERE email = ?1", ACCOUNT_COLUMNS);
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.db)
            .await?;

        row.as_ref().map(Account::from_row).transpose()
    }

    /// Check if email exists
    pub async fn email_exists(&self, email: &str) -> AppResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM account WHERE email = ?1")
            .bind(email)
            .fetch_one(&self.db)
            .await?;

        Ok(count > 0)
    }

    /// All accounts with a role, newest first
    pub async fn list_by_role(&self, role: Role) -> AppResult<Vec<Account>> {
        let query = format!(
            "SELECT {} FROM account WHERE role = ?1 ORDER BY created_at DESC, rowid DESC",
            ACCOUNT_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(role.as_str())
            .fetch_all(&self.db)
            .await?;

        rows.iter().map(Account::from_row).collect()
    }

    /// Set the certification status of a farmer. Returns `None` when no farmer has this id.
    pub async fn update_status(
        &self,
        id: &str,
        status: CertificationStatus,
    ) -> AppResult<Option<Account>> {
        let result = sqlx::query(
            "UPDATE account SET status = ?1, updated_at = ?2 WHERE id = ?3 AND role = ?4",
        )
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(id)
        .bind(Role::Farmer.as_str())
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.find_by_id(id).await
    }

    /// Overwrite (or clear) the stored refresh-token hash.
    ///
    /// Last writer wins; there is no version check.
    pub async fn set_refresh_token_hash(&self, id: &str, hash: Option<&str>) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE account SET refresh_token_hash = ?1, updated_at = ?2 WHERE id = ?3",
        )
        .bind(hash)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
