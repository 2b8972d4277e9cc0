//! User account persistence.
//!
//! Accounts are keyed by email for login and by username for mentions and
//! DM lookup.  Passwords are stored as `base64(salt):base64(hash)` using
//! PBKDF2-HMAC-SHA256 (ring) with 600,000 iterations.  The
//! `primary_language` field drives translation fan-out and display.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use flowtalk_pipeline::Language;

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

// ── types ────────────────────────────────────────────────────────────

/// A FlowTalk account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier (UUID v7).
    pub id: String,
    /// Login email, unique.
    pub email: String,
    /// Public handle, unique.
    pub username: String,
    /// The language this user reads messages in.
    pub primary_language: Language,
    /// Optional avatar URL.
    pub avatar: Option<String>,
    /// Optional free-form status line.
    pub status_message: Option<String>,
    /// Unix timestamp when the account was created.
    pub created_at: i64,
    /// Unix timestamp of the last profile update.
    pub updated_at: i64,
}

/// Profile fields a user may change after registration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    /// New display language, if changing.
    pub primary_language: Option<Language>,
    /// New avatar URL, if changing.
    pub avatar: Option<String>,
    /// New status line, if changing.
    pub status_message: Option<String>,
}

// ── password hashing ─────────────────────────────────────────────────

/// PBKDF2-HMAC-SHA256 iteration count (OWASP 2023).
const PBKDF2_ITERATIONS: u32 = 600_000;

/// Salt length in bytes.
const SALT_LEN: usize = 32;

/// Derived key length in bytes.
const KEY_LEN: usize = 32;

static PBKDF2_ALG: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;

/// Hash a password into the storable `base64(salt):base64(hash)` form.
fn hash_password(password: &str) -> StoreResult<String> {
    let rng = SystemRandom::new();

    let mut salt = [0u8; SALT_LEN];
    rng.fill(&mut salt)
        .map_err(|_| StoreError::InvalidArgument("failed to generate random salt".into()))?;

    let mut hash = [0u8; KEY_LEN];
    let iterations =
        std::num::NonZeroU32::new(PBKDF2_ITERATIONS).expect("PBKDF2_ITERATIONS is non-zero");
    pbkdf2::derive(PBKDF2_ALG, iterations, &salt, password.as_bytes(), &mut hash);

    Ok(format!("{}:{}", BASE64.encode(salt), BASE64.encode(hash)))
}

/// Verify a password against the stored form in constant time.
fn verify_password(password: &str, stored: &str) -> StoreResult<bool> {
    let Some((salt_b64, hash_b64)) = stored.split_once(':') else {
        return Err(StoreError::InvalidArgument(
            "malformed password hash".into(),
        ));
    };

    let salt = BASE64
        .decode(salt_b64)
        .map_err(|e| StoreError::InvalidArgument(format!("bad salt encoding: {e}")))?;
    let hash = BASE64
        .decode(hash_b64)
        .map_err(|e| StoreError::InvalidArgument(format!("bad hash encoding: {e}")))?;

    let iterations =
        std::num::NonZeroU32::new(PBKDF2_ITERATIONS).expect("PBKDF2_ITERATIONS is non-zero");
    Ok(pbkdf2::verify(PBKDF2_ALG, iterations, &salt, password.as_bytes(), &hash).is_ok())
}

// ── store ────────────────────────────────────────────────────────────

/// CRUD operations on user accounts.
#[derive(Clone)]
pub struct UserStore {
    db: Database,
}

impl UserStore {
    /// Create a user store backed by `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Register a new account.
    ///
    /// # Errors
    ///
    /// `Conflict` when the email or username is taken; `InvalidArgument`
    /// for empty email, username, or password.
    #[instrument(skip(self, password))]
    pub async fn create(
        &self,
        email: &str,
        password: &str,
        username: &str,
        primary_language: Language,
    ) -> StoreResult<User> {
        let email = email.trim().to_lowercase();
        let username = username.trim().to_string();
        if email.is_empty() || !email.contains('@') {
            return Err(StoreError::InvalidArgument("invalid email".into()));
        }
        if username.is_empty() {
            return Err(StoreError::InvalidArgument("username is required".into()));
        }
        if password.is_empty() {
            return Err(StoreError::InvalidArgument("password is required".into()));
        }

        let user = User {
            id: Uuid::now_v7().to_string(),
            email,
            username,
            primary_language,
            avatar: None,
            status_message: None,
            created_at: Utc::now().timestamp(),
            updated_at: Utc::now().timestamp(),
        };
        let password_hash = hash_password(password)?;

        let row = user.clone();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO users \
                     (id, email, username, password_hash, primary_language, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    rusqlite::params![
                        row.id,
                        row.email,
                        row.username,
                        password_hash,
                        row.primary_language.as_code(),
                        row.created_at,
                        row.updated_at,
                    ],
                )
                .map_err(|e| match e {
                    rusqlite::Error::SqliteFailure(err, _)
                        if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                    {
                        StoreError::Conflict {
                            entity: "user",
                            detail: "email or username already registered".into(),
                        }
                    }
                    other => StoreError::Sqlite(other),
                })?;
                Ok(())
            })
            .await?;

        debug!(user_id = %user.id, "user created");
        Ok(user)
    }

    /// Fetch a user by id.
    pub async fn get(&self, id: &str) -> StoreResult<Option<User>> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, email, username, primary_language, avatar, status_message, \
                            created_at, updated_at \
                     FROM users WHERE id = ?1",
                )?;
                let mut rows = stmt.query_map([&id], row_to_user)?;
                match rows.next() {
                    Some(row) => Ok(Some(row??)),
                    None => Ok(None),
                }
            })
            .await
    }

    /// Fetch a user by username.
    pub async fn get_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let username = username.trim().to_string();
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, email, username, primary_language, avatar, status_message, \
                            created_at, updated_at \
                     FROM users WHERE username = ?1",
                )?;
                let mut rows = stmt.query_map([&username], row_to_user)?;
                match rows.next() {
                    Some(row) => Ok(Some(row??)),
                    None => Ok(None),
                }
            })
            .await
    }

    /// Check credentials; returns the user on success, `None` otherwise.
    #[instrument(skip(self, password))]
    pub async fn authenticate(&self, email: &str, password: &str) -> StoreResult<Option<User>> {
        let email = email.trim().to_lowercase();
        let fetched = self
            .db
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, email, username, primary_language, avatar, status_message, \
                            created_at, updated_at, password_hash \
                     FROM users WHERE email = ?1",
                )?;
                let mut rows = stmt.query_map([&email], |row| {
                    let hash: String = row.get(8)?;
                    Ok((row_to_user(row)?, hash))
                })?;
                match rows.next() {
                    Some(row) => {
                        let (user, hash) = row?;
                        Ok(Some((user?, hash)))
                    }
                    None => Ok(None),
                }
            })
            .await?;

        match fetched {
            Some((user, hash)) if verify_password(password, &hash)? => Ok(Some(user)),
            _ => Ok(None),
        }
    }

    /// Apply a partial profile update and return the fresh record.
    #[instrument(skip(self))]
    pub async fn update_profile(&self, id: &str, update: ProfileUpdate) -> StoreResult<User> {
        let id_owned = id.to_string();
        let now = Utc::now().timestamp();
        let affected = self
            .db
            .execute(move |conn| {
                let affected = conn.execute(
                    "UPDATE users SET \
                     primary_language = coalesce(?2, primary_language), \
                     avatar           = coalesce(?3, avatar), \
                     status_message   = coalesce(?4, status_message), \
                     updated_at       = ?5 \
                     WHERE id = ?1",
                    rusqlite::params![
                        id_owned,
                        update.primary_language.map(|l| l.as_code()),
                        update.avatar,
                        update.status_message,
                        now,
                    ],
                )?;
                Ok(affected)
            })
            .await?;

        if affected == 0 {
            return Err(StoreError::NotFound {
                entity: "user",
                id: id.to_string(),
            });
        }
        self.get(id).await?.ok_or_else(|| StoreError::NotFound {
            entity: "user",
            id: id.to_string(),
        })
    }
}

/// Map a SELECT row (columns in the canonical order) to a [`User`].
fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoreResult<User>> {
    let lang_code: String = row.get(3)?;
    Ok((|| {
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            username: row.get(2)?,
            primary_language: Language::from_code(&lang_code).ok_or_else(|| {
                StoreError::InvalidArgument(format!("unknown language code: {lang_code}"))
            })?,
            avatar: row.get(4)?,
            status_message: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    })())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> UserStore {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().await.unwrap();
        UserStore::new(db)
    }

    #[tokio::test]
    async fn create_and_get() {
        let store = setup().await;
        let user = store
            .create("ana@example.com", "s3cret", "ana", Language::Es)
            .await
            .unwrap();

        let fetched = store.get(&user.id).await.unwrap().unwrap();
        assert_eq!(fetched.email, "ana@example.com");
        assert_eq!(fetched.username, "ana");
        assert_eq!(fetched.primary_language, Language::Es);
        assert!(fetched.avatar.is_none());
    }

    #[tokio::test]
    async fn email_is_normalized() {
        let store = setup().await;
        let user = store
            .create("  Ana@Example.COM ", "pw", "ana", Language::En)
            .await
            .unwrap();
        assert_eq!(user.email, "ana@example.com");
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let store = setup().await;
        store
            .create("a@b.com", "pw", "first", Language::En)
            .await
            .unwrap();
        let err = store
            .create("a@b.com", "pw", "second", Language::En)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { entity: "user", .. }));
    }

    #[tokio::test]
    async fn duplicate_username_conflicts() {
        let store = setup().await;
        store
            .create("a@b.com", "pw", "same", Language::En)
            .await
            .unwrap();
        let err = store
            .create("c@d.com", "pw", "same", Language::En)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn authenticate_happy_path() {
        let store = setup().await;
        store
            .create("a@b.com", "correct horse", "ana", Language::En)
            .await
            .unwrap();

        let user = store.authenticate("a@b.com", "correct horse").await.unwrap();
        assert!(user.is_some());
    }

    #[tokio::test]
    async fn authenticate_wrong_password() {
        let store = setup().await;
        store
            .create("a@b.com", "right", "ana", Language::En)
            .await
            .unwrap();
        assert!(store.authenticate("a@b.com", "wrong").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn authenticate_unknown_email() {
        let store = setup().await;
        assert!(store.authenticate("ghost@b.com", "pw").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_by_username() {
        let store = setup().await;
        let created = store
            .create("a@b.com", "pw", "ana", Language::Fr)
            .await
            .unwrap();
        let fetched = store.get_by_username("ana").await.unwrap().unwrap();
        assert_eq!(fetched.id, created.id);
        assert!(store.get_by_username("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_profile_changes_language() {
        let store = setup().await;
        let user = store
            .create("a@b.com", "pw", "ana", Language::En)
            .await
            .unwrap();

        let updated = store
            .update_profile(
                &user.id,
                ProfileUpdate {
                    primary_language: Some(Language::De),
                    avatar: Some("https://cdn.example/a.png".into()),
                    status_message: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.primary_language, Language::De);
        assert_eq!(updated.avatar.as_deref(), Some("https://cdn.example/a.png"));
        // Untouched fields survive.
        assert_eq!(updated.username, "ana");
    }

    #[tokio::test]
    async fn update_profile_missing_user() {
        let store = setup().await;
        let err = store
            .update_profile("nope", ProfileUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn invalid_registrations_rejected() {
        let store = setup().await;
        assert!(store.create("", "pw", "u", Language::En).await.is_err());
        assert!(store.create("not-an-email", "pw", "u", Language::En).await.is_err());
        assert!(store.create("a@b.com", "", "u", Language::En).await.is_err());
        assert!(store.create("a@b.com", "pw", "", Language::En).await.is_err());
    }

    #[test]
    fn password_hashes_are_salted() {
        let a = hash_password("same").unwrap();
        let b = hash_password("same").unwrap();
        assert_ne!(a, b);
        assert!(verify_password("same", &a).unwrap());
        assert!(verify_password("same", &b).unwrap());
        assert!(!verify_password("different", &a).unwrap());
    }

    #[test]
    fn malformed_stored_hash_errors() {
        assert!(verify_password("pw", "no-colon-here").is_err());
    }
}
