//! Community, channel, and membership persistence.
//!
//! Communities own channels; membership is per community and defines who
//! receives (and therefore which languages are fanned out for) every
//! message posted to the community's channels.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use flowtalk_pipeline::Language;

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

// ── types ────────────────────────────────────────────────────────────

/// A community of users sharing a set of channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Community {
    /// Unique identifier (UUID v7).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Unix timestamp when the community was created.
    pub created_at: i64,
}

/// A named room within a community.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    /// Unique identifier (UUID v7).
    pub id: String,
    /// Owning community.
    pub community_id: String,
    /// Slugified name, unique within the community.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Unix timestamp when the channel was created.
    pub created_at: i64,
}

/// A community annotated with the caller's membership, for discovery.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredCommunity {
    /// The community.
    #[serde(flatten)]
    pub community: Community,
    /// Whether the caller already belongs to it.
    pub is_member: bool,
}

/// Channel names are slugified: lowercase, whitespace to `-`, everything
/// else outside `[a-z0-9-]` dropped.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().to_lowercase().chars() {
        if c.is_ascii_alphanumeric() || c == '-' {
            slug.push(c);
        } else if c.is_whitespace() {
            slug.push('-');
        }
    }
    slug
}

// ── store ────────────────────────────────────────────────────────────

/// CRUD for communities, channels, and membership.
#[derive(Clone)]
pub struct CommunityStore {
    db: Database,
}

impl CommunityStore {
    /// Create a community store backed by `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a community with its default `general` channel and enroll
    /// the creator.
    #[instrument(skip(self, description))]
    pub async fn create_community(
        &self,
        name: &str,
        description: Option<String>,
        creator_id: &str,
    ) -> StoreResult<(Community, Channel)> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(StoreError::InvalidArgument(
                "community name is required".into(),
            ));
        }

        let now = Utc::now().timestamp();
        let community = Community {
            id: Uuid::now_v7().to_string(),
            name,
            description,
            created_at: now,
        };
        let general = Channel {
            id: Uuid::now_v7().to_string(),
            community_id: community.id.clone(),
            name: "general".to_string(),
            description: None,
            created_at: now,
        };

        let c = community.clone();
        let ch = general.clone();
        let creator = creator_id.to_string();
        self.db
            .execute_mut(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO communities (id, name, description, created_at) \
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![c.id, c.name, c.description, c.created_at],
                )?;
                tx.execute(
                    "INSERT INTO channels (id, community_id, name, description, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![ch.id, ch.community_id, ch.name, ch.description, ch.created_at],
                )?;
                tx.execute(
                    "INSERT INTO community_members (community_id, user_id, joined_at) \
                     VALUES (?1, ?2, ?3)",
                    rusqlite::params![c.id, creator, c.created_at],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await?;

        debug!(community_id = %community.id, "community created");
        Ok((community, general))
    }

    /// Add a user to a community.  Joining twice is a no-op.
    #[instrument(skip(self))]
    pub async fn join(&self, community_id: &str, user_id: &str) -> StoreResult<()> {
        let community_id_owned = community_id.to_string();
        let user_id = user_id.to_string();
        let now = Utc::now().timestamp();
        let affected = self
            .db
            .execute(move |conn| {
                let exists: i64 = conn.query_row(
                    "SELECT count(*) FROM communities WHERE id = ?1",
                    [&community_id_owned],
                    |row| row.get(0),
                )?;
                if exists == 0 {
                    return Err(StoreError::NotFound {
                        entity: "community",
                        id: community_id_owned,
                    });
                }
                Ok(conn.execute(
                    "INSERT OR IGNORE INTO community_members (community_id, user_id, joined_at) \
                     VALUES (?1, ?2, ?3)",
                    rusqlite::params![community_id_owned, user_id, now],
                )?)
            })
            .await?;
        if affected == 1 {
            debug!(community_id, "member joined");
        }
        Ok(())
    }

    /// Whether a user belongs to a community.
    pub async fn is_member(&self, community_id: &str, user_id: &str) -> StoreResult<bool> {
        let community_id = community_id.to_string();
        let user_id = user_id.to_string();
        self.db
            .execute(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT count(*) FROM community_members \
                     WHERE community_id = ?1 AND user_id = ?2",
                    rusqlite::params![community_id, user_id],
                    |row| row.get(0),
                )?;
                Ok(count > 0)
            })
            .await
    }

    /// The communities a user belongs to, with every channel in them.
    pub async fn list_for_user(&self, user_id: &str) -> StoreResult<(Vec<Community>, Vec<Channel>)> {
        let user_id = user_id.to_string();
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT c.id, c.name, c.description, c.created_at \
                     FROM communities c \
                     JOIN community_members m ON m.community_id = c.id \
                     WHERE m.user_id = ?1 ORDER BY c.created_at",
                )?;
                let communities: Vec<Community> = stmt
                    .query_map([&user_id], row_to_community)?
                    .collect::<Result<_, _>>()?;

                let mut stmt = conn.prepare(
                    "SELECT ch.id, ch.community_id, ch.name, ch.description, ch.created_at \
                     FROM channels ch \
                     JOIN community_members m ON m.community_id = ch.community_id \
                     WHERE m.user_id = ?1 ORDER BY ch.created_at",
                )?;
                let channels: Vec<Channel> = stmt
                    .query_map([&user_id], row_to_channel)?
                    .collect::<Result<_, _>>()?;

                Ok((communities, channels))
            })
            .await
    }

    /// Every community, annotated with the caller's membership.
    pub async fn discover(&self, user_id: &str) -> StoreResult<Vec<DiscoveredCommunity>> {
        let user_id = user_id.to_string();
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT c.id, c.name, c.description, c.created_at, \
                            exists(SELECT 1 FROM community_members m \
                                   WHERE m.community_id = c.id AND m.user_id = ?1) \
                     FROM communities c ORDER BY c.created_at",
                )?;
                let rows = stmt.query_map([&user_id], |row| {
                    Ok(DiscoveredCommunity {
                        community: row_to_community(row)?,
                        is_member: row.get(4)?,
                    })
                })?;
                Ok(rows.collect::<Result<_, _>>()?)
            })
            .await
    }

    /// Create a channel in a community.  The name is slugified.
    #[instrument(skip(self, description))]
    pub async fn create_channel(
        &self,
        community_id: &str,
        name: &str,
        description: Option<String>,
    ) -> StoreResult<Channel> {
        let slug = slugify(name);
        if slug.is_empty() {
            return Err(StoreError::InvalidArgument(
                "channel name must contain letters or digits".into(),
            ));
        }

        let channel = Channel {
            id: Uuid::now_v7().to_string(),
            community_id: community_id.to_string(),
            name: slug,
            description,
            created_at: Utc::now().timestamp(),
        };

        let row = channel.clone();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO channels (id, community_id, name, description, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![row.id, row.community_id, row.name, row.description, row.created_at],
                )
                .map_err(|e| match e {
                    rusqlite::Error::SqliteFailure(err, _)
                        if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                    {
                        StoreError::Conflict {
                            entity: "channel",
                            detail: format!("channel `{}` already exists", row.name),
                        }
                    }
                    other => StoreError::Sqlite(other),
                })?;
                Ok(())
            })
            .await?;

        debug!(channel_id = %channel.id, name = %channel.name, "channel created");
        Ok(channel)
    }

    /// Fetch a channel by id.
    pub async fn get_channel(&self, channel_id: &str) -> StoreResult<Option<Channel>> {
        let channel_id = channel_id.to_string();
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, community_id, name, description, created_at \
                     FROM channels WHERE id = ?1",
                )?;
                let mut rows = stmt.query_map([&channel_id], row_to_channel)?;
                match rows.next() {
                    Some(row) => Ok(Some(row?)),
                    None => Ok(None),
                }
            })
            .await
    }

    /// Snapshot of the primary languages of a channel's members.
    ///
    /// This is the fan-out input: captured at translation time, not kept
    /// in sync with later preference changes.
    pub async fn channel_member_languages(&self, channel_id: &str) -> StoreResult<Vec<Language>> {
        let channel_id = channel_id.to_string();
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT u.primary_language \
                     FROM channels ch \
                     JOIN community_members m ON m.community_id = ch.community_id \
                     JOIN users u ON u.id = m.user_id \
                     WHERE ch.id = ?1",
                )?;
                let codes = stmt.query_map([&channel_id], |row| row.get::<_, String>(0))?;

                let mut languages = Vec::new();
                for code in codes {
                    let code = code?;
                    let lang = Language::from_code(&code).ok_or_else(|| {
                        StoreError::InvalidArgument(format!("unknown language code: {code}"))
                    })?;
                    languages.push(lang);
                }
                Ok(languages)
            })
            .await
    }
}

// ── row mapping ──────────────────────────────────────────────────────

fn row_to_community(row: &rusqlite::Row<'_>) -> rusqlite::Result<Community> {
    Ok(Community {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn row_to_channel(row: &rusqlite::Row<'_>) -> rusqlite::Result<Channel> {
    Ok(Channel {
        id: row.get(0)?,
        community_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        created_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user_store::UserStore;

    async fn setup() -> (CommunityStore, UserStore) {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().await.unwrap();
        (CommunityStore::new(db.clone()), UserStore::new(db))
    }

    async fn user(users: &UserStore, name: &str, lang: Language) -> String {
        users
            .create(&format!("{name}@example.com"), "pw", name, lang)
            .await
            .unwrap()
            .id
    }

    #[test]
    fn slugify_rules() {
        assert_eq!(slugify("General Chat"), "general-chat");
        assert_eq!(slugify("  Rust Help!  "), "rust-help");
        assert_eq!(slugify("déjà-vu"), "dj-vu");
        assert_eq!(slugify("!!!"), "");
    }

    #[tokio::test]
    async fn create_community_seeds_general_and_creator() {
        let (communities, users) = setup().await;
        let creator = user(&users, "ana", Language::Es).await;

        let (community, general) = communities
            .create_community("Rustaceans", Some("systems chat".into()), &creator)
            .await
            .unwrap();

        assert_eq!(general.name, "general");
        assert_eq!(general.community_id, community.id);
        assert!(communities.is_member(&community.id, &creator).await.unwrap());
    }

    #[tokio::test]
    async fn join_is_idempotent() {
        let (communities, users) = setup().await;
        let creator = user(&users, "ana", Language::Es).await;
        let joiner = user(&users, "bo", Language::Fr).await;
        let (community, _) = communities
            .create_community("c", None, &creator)
            .await
            .unwrap();

        communities.join(&community.id, &joiner).await.unwrap();
        communities.join(&community.id, &joiner).await.unwrap();
        assert!(communities.is_member(&community.id, &joiner).await.unwrap());
    }

    #[tokio::test]
    async fn join_missing_community() {
        let (communities, users) = setup().await;
        let u = user(&users, "ana", Language::Es).await;
        let err = communities.join("ghost", &u).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn list_for_user_scopes_to_memberships() {
        let (communities, users) = setup().await;
        let ana = user(&users, "ana", Language::Es).await;
        let bo = user(&users, "bo", Language::Fr).await;

        let (mine, _) = communities.create_community("mine", None, &ana).await.unwrap();
        communities.create_community("theirs", None, &bo).await.unwrap();
        communities
            .create_channel(&mine.id, "Rust Help", None)
            .await
            .unwrap();

        let (cs, chs) = communities.list_for_user(&ana).await.unwrap();
        assert_eq!(cs.len(), 1);
        assert_eq!(cs[0].name, "mine");
        let names: Vec<_> = chs.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["general", "rust-help"]);
    }

    #[tokio::test]
    async fn discover_flags_membership() {
        let (communities, users) = setup().await;
        let ana = user(&users, "ana", Language::Es).await;
        let bo = user(&users, "bo", Language::Fr).await;
        communities.create_community("a", None, &ana).await.unwrap();
        communities.create_community("b", None, &bo).await.unwrap();

        let discovered = communities.discover(&ana).await.unwrap();
        assert_eq!(discovered.len(), 2);
        let a = discovered.iter().find(|d| d.community.name == "a").unwrap();
        let b = discovered.iter().find(|d| d.community.name == "b").unwrap();
        assert!(a.is_member);
        assert!(!b.is_member);
    }

    #[tokio::test]
    async fn duplicate_channel_name_conflicts() {
        let (communities, users) = setup().await;
        let ana = user(&users, "ana", Language::Es).await;
        let (community, _) = communities.create_community("c", None, &ana).await.unwrap();

        communities
            .create_channel(&community.id, "Rust Help", None)
            .await
            .unwrap();
        // Same slug after normalization.
        let err = communities
            .create_channel(&community.id, "rust help", None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn member_languages_snapshot() {
        let (communities, users) = setup().await;
        let ana = user(&users, "ana", Language::Es).await;
        let bo = user(&users, "bo", Language::Fr).await;
        let cy = user(&users, "cy", Language::Es).await;

        let (community, general) = communities.create_community("c", None, &ana).await.unwrap();
        communities.join(&community.id, &bo).await.unwrap();
        communities.join(&community.id, &cy).await.unwrap();

        let mut langs = communities
            .channel_member_languages(&general.id)
            .await
            .unwrap();
        langs.sort();
        assert_eq!(langs, vec![Language::Es, Language::Es, Language::Fr]);
    }

    #[tokio::test]
    async fn get_channel_round_trip() {
        let (communities, users) = setup().await;
        let ana = user(&users, "ana", Language::Es).await;
        let (_, general) = communities.create_community("c", None, &ana).await.unwrap();

        let fetched = communities.get_channel(&general.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "general");
        assert!(communities.get_channel("ghost").await.unwrap().is_none());
    }
}
