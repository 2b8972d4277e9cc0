//! Per-community glossary persistence.
//!
//! Communities can pin their own protected terms (team names, internal
//! product names) on top of the bundled default glossary.  The pipeline
//! merges the two at translation time, with community terms winning on
//! case-insensitive equality.

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, instrument};
use uuid::Uuid;

use flowtalk_pipeline::{GlossaryEntry, TermCategory};

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

/// A stored community glossary term.
#[derive(Debug, Clone, Serialize)]
pub struct StoredTerm {
    /// Unique identifier (UUID v7).
    pub id: String,
    /// Owning community.
    pub community_id: String,
    /// The protected term.
    pub term: String,
    /// Classification.
    pub category: TermCategory,
    /// Restore the typed surface (true) or the canonical form (false).
    pub preserve_case: bool,
    /// Unix timestamp when the term was added.
    pub created_at: i64,
}

impl StoredTerm {
    /// Convert to the pipeline's entry form.
    pub fn to_entry(&self) -> GlossaryEntry {
        GlossaryEntry {
            term: self.term.clone(),
            category: self.category,
            preserve_case: self.preserve_case,
        }
    }
}

/// CRUD for community glossary terms.
#[derive(Clone)]
pub struct GlossaryStore {
    db: Database,
}

impl GlossaryStore {
    /// Create a glossary store backed by `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Add a term to a community's glossary.
    ///
    /// # Errors
    ///
    /// `Conflict` when the term already exists in the community
    /// (case-insensitively).
    #[instrument(skip(self))]
    pub async fn add(
        &self,
        community_id: &str,
        term: &str,
        category: TermCategory,
        preserve_case: bool,
    ) -> StoreResult<StoredTerm> {
        let term = term.trim().to_string();
        if term.is_empty() {
            return Err(StoreError::InvalidArgument("term is required".into()));
        }

        let stored = StoredTerm {
            id: Uuid::now_v7().to_string(),
            community_id: community_id.to_string(),
            term,
            category,
            preserve_case,
            created_at: Utc::now().timestamp(),
        };

        let row = stored.clone();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO glossary_terms \
                     (id, community_id, term, category, preserve_case, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    rusqlite::params![
                        row.id,
                        row.community_id,
                        row.term,
                        row.category.as_str(),
                        row.preserve_case,
                        row.created_at,
                    ],
                )
                .map_err(|e| match e {
                    rusqlite::Error::SqliteFailure(err, _)
                        if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                    {
                        StoreError::Conflict {
                            entity: "glossary_term",
                            detail: format!("term `{}` already exists", row.term),
                        }
                    }
                    other => StoreError::Sqlite(other),
                })?;
                Ok(())
            })
            .await?;

        debug!(community_id, term = %stored.term, "glossary term added");
        Ok(stored)
    }

    /// All terms for a community, newest first.
    pub async fn list(&self, community_id: &str) -> StoreResult<Vec<StoredTerm>> {
        let community_id = community_id.to_string();
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, community_id, term, category, preserve_case, created_at \
                     FROM glossary_terms WHERE community_id = ?1 \
                     ORDER BY created_at DESC, rowid DESC",
                )?;
                let rows = stmt.query_map([&community_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, bool>(4)?,
                        row.get::<_, i64>(5)?,
                    ))
                })?;

                let mut terms = Vec::new();
                for row in rows {
                    let (id, community_id, term, category, preserve_case, created_at) = row?;
                    let category = TermCategory::from_str(&category).ok_or_else(|| {
                        StoreError::InvalidArgument(format!("unknown term category: {category}"))
                    })?;
                    terms.push(StoredTerm {
                        id,
                        community_id,
                        term,
                        category,
                        preserve_case,
                        created_at,
                    });
                }
                Ok(terms)
            })
            .await
    }

    /// The community's terms in the pipeline's entry form, for merging
    /// above the default glossary.
    pub async fn entries_for_community(&self, community_id: &str) -> StoreResult<Vec<GlossaryEntry>> {
        Ok(self
            .list(community_id)
            .await?
            .iter()
            .map(StoredTerm::to_entry)
            .collect())
    }

    /// Remove a term by id.  Returns true when a row was deleted.
    #[instrument(skip(self))]
    pub async fn remove(&self, community_id: &str, term_id: &str) -> StoreResult<bool> {
        let community_id = community_id.to_string();
        let term_id = term_id.to_string();
        self.db
            .execute(move |conn| {
                let removed = conn.execute(
                    "DELETE FROM glossary_terms WHERE id = ?1 AND community_id = ?2",
                    rusqlite::params![term_id, community_id],
                )?;
                Ok(removed == 1)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::community_store::CommunityStore;
    use crate::user_store::UserStore;
    use flowtalk_pipeline::Language;

    async fn setup() -> (GlossaryStore, String) {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().await.unwrap();
        let users = UserStore::new(db.clone());
        let ana = users
            .create("ana@example.com", "pw", "ana", Language::Es)
            .await
            .unwrap();
        let (community, _) = CommunityStore::new(db.clone())
            .create_community("c", None, &ana.id)
            .await
            .unwrap();
        (GlossaryStore::new(db), community.id)
    }

    #[tokio::test]
    async fn add_list_remove() {
        let (store, community) = setup().await;

        let term = store
            .add(&community, "FlowTalk", TermCategory::Brand, true)
            .await
            .unwrap();

        let listed = store.list(&community).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].term, "FlowTalk");
        assert_eq!(listed[0].category, TermCategory::Brand);

        assert!(store.remove(&community, &term.id).await.unwrap());
        assert!(store.list(&community).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_term_conflicts_case_insensitively() {
        let (store, community) = setup().await;
        store
            .add(&community, "FlowTalk", TermCategory::Brand, true)
            .await
            .unwrap();
        let err = store
            .add(&community, "flowtalk", TermCategory::Custom, false)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn entries_convert_for_pipeline() {
        let (store, community) = setup().await;
        store
            .add(&community, "AcmeCorp", TermCategory::Brand, true)
            .await
            .unwrap();

        let entries = store.entries_for_community(&community).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].term, "AcmeCorp");
        assert!(entries[0].preserve_case);
    }

    #[tokio::test]
    async fn empty_term_rejected() {
        let (store, community) = setup().await;
        assert!(store
            .add(&community, "   ", TermCategory::Custom, true)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn remove_wrong_community_is_false() {
        let (store, community) = setup().await;
        let term = store
            .add(&community, "X11", TermCategory::Technical, false)
            .await
            .unwrap();
        assert!(!store.remove("other", &term.id).await.unwrap());
    }
}
