//! Remote id write-back for mirrored local rows.

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use coursewire_core::{Error, MirrorStore, ObjectKind, Result};

/// Local table holding rows of the given remote object kind.
fn table_for(kind: ObjectKind) -> &'static str {
    match kind {
        ObjectKind::Keyword => "keyword",
        ObjectKind::KeywordBinding => "keyword_binding",
        ObjectKind::User => "app_user",
        ObjectKind::Course => "course",
        ObjectKind::Section => "section",
        ObjectKind::Activity => "activity",
        ObjectKind::Completion => "completion",
        ObjectKind::Assignment => "assignment",
        ObjectKind::Cohort => "cohort",
        ObjectKind::ConnectionMarker => "connection_marker",
    }
}

/// PostgreSQL implementation of MirrorStore.
#[derive(Clone)]
pub struct PgMirrorStore {
    pool: Pool<Postgres>,
}

impl PgMirrorStore {
    /// Create a new PgMirrorStore with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MirrorStore for PgMirrorStore {
    async fn set_remote_ids(&self, kind: ObjectKind, ids: &[(i64, String)]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        // Table names come from the fixed kind mapping, never from input.
        let sql = format!("UPDATE {} SET remote_id = $2 WHERE id = $1", table_for(kind));

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        for (id, remote_id) in ids {
            sqlx::query(&sql)
                .bind(id)
                .bind(remote_id)
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }
}
