//! Application accounts.
//!
//! Usernames are unique. Passwords are stored as salted SHA-256 digests in
//! `sha256$<salt>$<digest>` form; session issuance lives outside this crate.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::NaiveDateTime;
use sea_query::{Expr, Order, Query};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::interfaces::activity_sink::{ActivityEntry, ActivitySink};
use crate::interfaces::storage_adapter::{StorageAdapter, StorageError};
use crate::services::activity::TracingActivitySink;
use crate::services::build_query;
use crate::services::error::{Result, WorkflowError};
use crate::services::leave_workflow::Actor;
use crate::storage::schema::Users;
use crate::storage::Row;

const HASH_SCHEME: &str = "sha256";
const SALT_LEN: usize = 16;

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    SuperAdmin,
    Admin,
    Operator,
    Student,
    Teacher,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::SuperAdmin => "SUPER_ADMIN",
            UserRole::Admin => "ADMIN",
            UserRole::Operator => "OPERATOR",
            UserRole::Student => "STUDENT",
            UserRole::Teacher => "TEACHER",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "SUPER_ADMIN" => Ok(UserRole::SuperAdmin),
            "ADMIN" => Ok(UserRole::Admin),
            "OPERATOR" => Ok(UserRole::Operator),
            "STUDENT" => Ok(UserRole::Student),
            "TEACHER" => Ok(UserRole::Teacher),
            other => Err(WorkflowError::validation(format!("unknown role '{}'", other))),
        }
    }
}

/// An account as listed. Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub role: UserRole,
    pub name: String,
    pub nip: Option<String>,
    pub subject: Option<String>,
    pub is_active: bool,
    pub created_at: Option<NaiveDateTime>,
}

impl User {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_i64("id")?,
            username: row.get_str("username")?,
            role: row.get_str("role")?.parse()?,
            name: row.get_str("name")?,
            nip: row.get_opt_str("nip")?,
            subject: row.get_opt_str("mapel")?,
            is_active: row.get_bool("is_active")?,
            created_at: row.get_opt_datetime("created_at")?,
        })
    }
}

/// Fields supplied when creating an account.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub role: UserRole,
    pub name: String,
    pub nip: Option<String>,
    pub subject: Option<String>,
}

impl NewUser {
    fn validate(&self) -> Result<()> {
        if self.username.trim().is_empty() || self.password.is_empty() || self.name.trim().is_empty()
        {
            return Err(WorkflowError::validation(
                "username, password, role and name are required",
            ));
        }
        Ok(())
    }
}

const USER_COLUMNS: [Users; 8] = [
    Users::Id,
    Users::Username,
    Users::Role,
    Users::Name,
    Users::Nip,
    Users::Mapel,
    Users::IsActive,
    Users::CreatedAt,
];

fn optional(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn digest(salt: &[u8], password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash a password with a fresh random salt.
pub fn hash_password(password: &str) -> String {
    let salt: [u8; SALT_LEN] = rand::random();
    format!("{}${}${}", HASH_SCHEME, hex::encode(salt), digest(&salt, password))
}

/// Check a password against a stored hash. Unknown formats never match.
pub fn verify_password(stored: &str, password: &str) -> bool {
    let mut parts = stored.splitn(3, '$');
    let (Some(HASH_SCHEME), Some(salt), Some(expected)) = (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    match hex::decode(salt) {
        Ok(salt) => digest(&salt, password) == expected,
        Err(_) => false,
    }
}

/// Account directory over a storage adapter.
pub struct UserDirectory {
    storage: Arc<dyn StorageAdapter>,
    activity: Arc<dyn ActivitySink>,
}

impl UserDirectory {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self {
            storage,
            activity: Arc::new(TracingActivitySink),
        }
    }

    pub fn with_activity_sink(mut self, activity: Arc<dyn ActivitySink>) -> Self {
        self.activity = activity;
        self
    }

    fn record(&self, action: &'static str, entity_id: Option<i64>, actor: &Actor, description: String) {
        self.activity.record(ActivityEntry {
            action,
            entity_type: "user",
            entity_id,
            actor_id: actor.id,
            actor_name: actor.name.clone(),
            description,
        });
    }

    /// All accounts, newest first.
    pub async fn list_users(&self) -> Result<Vec<User>> {
        let (sql, params) = build_query(
            Query::select()
                .columns(USER_COLUMNS)
                .from(Users::Table)
                .order_by(Users::CreatedAt, Order::Desc)
                .order_by(Users::Id, Order::Desc)
                .to_owned(),
        );
        let rows = self.storage.query(&sql, &params).await?;
        rows.iter().map(User::from_row).collect()
    }

    /// Create an account. A taken username is `Conflict`.
    pub async fn create_user(&self, user: NewUser, actor: &Actor) -> Result<i64> {
        user.validate()?;
        let username = user.username.trim();

        let (sql, params) = build_query(
            Query::select()
                .column(Users::Id)
                .from(Users::Table)
                .and_where(Expr::col(Users::Username).eq(username))
                .to_owned(),
        );
        if !self.storage.query(&sql, &params).await?.is_empty() {
            return Err(WorkflowError::Conflict(format!(
                "username '{}' already exists",
                username
            )));
        }

        let (sql, params) = build_query(
            Query::insert()
                .into_table(Users::Table)
                .columns([
                    Users::Username,
                    Users::PasswordHash,
                    Users::Role,
                    Users::Name,
                    Users::Nip,
                    Users::Mapel,
                ])
                .values_panic([
                    username.into(),
                    hash_password(&user.password).into(),
                    user.role.as_str().into(),
                    user.name.trim().into(),
                    optional(&user.nip).into(),
                    optional(&user.subject).into(),
                ])
                .to_owned(),
        );
        // A concurrent insert of the same name still lands on the unique key
        let id = self
            .storage
            .execute(&sql, &params)
            .await?
            .last_insert_id
            .ok_or_else(|| {
                WorkflowError::Storage(StorageError::Decode {
                    column: "id".to_string(),
                    reason: "insert did not report a generated identifier".to_string(),
                })
            })?;
        info!(user_id = id, role = %user.role, "User created");
        self.record(
            "CREATE_USER",
            Some(id),
            actor,
            format!("Created user: {}", username),
        );
        Ok(id)
    }

    /// Hard delete.
    pub async fn delete_user(&self, id: i64, actor: &Actor) -> Result<()> {
        let (sql, params) = build_query(
            Query::delete()
                .from_table(Users::Table)
                .and_where(Expr::col(Users::Id).eq(id))
                .to_owned(),
        );
        if self.storage.execute(&sql, &params).await?.affected_rows == 0 {
            return Err(WorkflowError::NotFound { entity: "user", id });
        }
        info!(user_id = id, "User deleted");
        self.record("DELETE_USER", Some(id), actor, format!("Deleted user ID: {}", id));
        Ok(())
    }

    pub async fn update_password(&self, id: i64, new_password: &str, actor: &Actor) -> Result<()> {
        if new_password.is_empty() {
            return Err(WorkflowError::validation("new password required"));
        }
        let (sql, params) = build_query(
            Query::update()
                .table(Users::Table)
                .value(Users::PasswordHash, hash_password(new_password))
                .and_where(Expr::col(Users::Id).eq(id))
                .to_owned(),
        );
        // Fresh salt on every hash, so the row always changes when it exists
        if self.storage.execute(&sql, &params).await?.affected_rows == 0 {
            return Err(WorkflowError::NotFound { entity: "user", id });
        }
        info!(user_id = id, "Password updated");
        self.record(
            "UPDATE_PASSWORD",
            Some(id),
            actor,
            format!("Updated password for user ID: {}", id),
        );
        Ok(())
    }

    /// Look up an active account by credentials and stamp its last login.
    ///
    /// Returns `None` for an unknown, inactive or mismatched account.
    pub async fn check_credentials(&self, username: &str, password: &str) -> Result<Option<User>> {
        let (sql, params) = build_query(
            Query::select()
                .columns(USER_COLUMNS)
                .column(Users::PasswordHash)
                .from(Users::Table)
                .and_where(Expr::col(Users::Username).eq(username.trim()))
                .and_where(Expr::col(Users::IsActive).eq(true))
                .to_owned(),
        );
        let rows = self.storage.query(&sql, &params).await?;
        let Some(row) = rows.first() else {
            debug!(username, "Unknown or inactive account");
            return Ok(None);
        };
        if !verify_password(&row.get_str("password_hash")?, password) {
            debug!(username, "Password mismatch");
            return Ok(None);
        }
        let user = User::from_row(row)?;

        let (sql, params) = build_query(
            Query::update()
                .table(Users::Table)
                .value(Users::LastLogin, Expr::cust("NOW()"))
                .and_where(Expr::col(Users::Id).eq(user.id))
                .to_owned(),
        );
        self.storage.execute(&sql, &params).await?;
        self.record(
            "LOGIN",
            Some(user.id),
            &Actor::new(user.id, user.name.clone()),
            "User logged in successfully".to_string(),
        );
        Ok(Some(user))
    }
}
