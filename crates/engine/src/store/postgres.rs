//! PostgreSQL store backend.
//!
//! Expected schema (managed outside the engine):
//!
//! ```sql
//! CREATE TABLE content_node (
//!     uid        TEXT PRIMARY KEY,
//!     kind       TEXT NOT NULL,
//!     state      TEXT NOT NULL,
//!     parameters JSONB NOT NULL DEFAULT '{}'::jsonb,
//!     elements   JSONB,
//!     children   JSONB,
//!     created    BIGINT NOT NULL,
//!     modified   BIGINT NOT NULL
//! );
//! CREATE INDEX content_node_children_idx ON content_node USING gin (children);
//!
//! CREATE TABLE revision (
//!     target     TEXT PRIMARY KEY,
//!     owner      TEXT NOT NULL,
//!     kind       TEXT NOT NULL,
//!     state      TEXT NOT NULL,
//!     parameters JSONB NOT NULL DEFAULT '{}'::jsonb,
//!     elements   JSONB,
//!     children   JSONB,
//!     created    BIGINT NOT NULL,
//!     modified   BIGINT NOT NULL
//! );
//!
//! CREATE TABLE page (
//!     uid       TEXT PRIMARY KEY,
//!     title     TEXT NOT NULL,
//!     root      TEXT NOT NULL,
//!     state     TEXT NOT NULL,
//!     category  TEXT,
//!     tags      JSONB NOT NULL DEFAULT '[]'::jsonb,
//!     created   BIGINT NOT NULL,
//!     modified  BIGINT NOT NULL,
//!     published BIGINT
//! );
//!
//! CREATE TABLE tag (
//!     uid  TEXT PRIMARY KEY,
//!     name TEXT NOT NULL
//! );
//!
//! CREATE TABLE shared_content (
//!     uid TEXT PRIMARY KEY
//! );
//! ```

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use indexmap::IndexMap;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};

use crate::config::EngineConfig;
use crate::content::{ContentNode, NodePayload, NodeState, TypeRegistry, Uid};
use crate::page::{Page, PageState, Tag};
use crate::revision::{DraftState, Revision};
use crate::store::{ContentStore, StoreError, StoreTx};

pub struct PgStore {
    pool: PgPool,
    registry: Arc<TypeRegistry>,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            registry: Arc::new(TypeRegistry::new()),
        }
    }

    /// Uses a caller-provided registry so legacy kind discriminators in
    /// existing rows keep resolving.
    pub fn with_registry(pool: PgPool, registry: Arc<TypeRegistry>) -> Self {
        Self { pool, registry }
    }

    pub async fn connect(config: &EngineConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .connect(&config.database_url)
            .await
            .context("failed to connect to PostgreSQL")?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(sqlx::FromRow)]
struct NodeRow {
    uid: String,
    kind: String,
    state: String,
    parameters: serde_json::Value,
    elements: Option<serde_json::Value>,
    children: Option<serde_json::Value>,
    created: i64,
    modified: i64,
}

#[derive(sqlx::FromRow)]
struct RevisionRow {
    target: String,
    owner: String,
    kind: String,
    state: String,
    parameters: serde_json::Value,
    elements: Option<serde_json::Value>,
    children: Option<serde_json::Value>,
    created: i64,
    modified: i64,
}

#[derive(sqlx::FromRow)]
struct PageRow {
    uid: String,
    title: String,
    root: String,
    state: String,
    category: Option<String>,
    tags: serde_json::Value,
    created: i64,
    modified: i64,
    published: Option<i64>,
}

#[derive(sqlx::FromRow)]
struct TagRow {
    uid: String,
    name: String,
}

fn decode_payload(
    container: bool,
    elements: Option<serde_json::Value>,
    children: Option<serde_json::Value>,
) -> Result<NodePayload, StoreError> {
    if let Some(children) = children {
        let uids: Vec<Uid> =
            serde_json::from_value(children).context("decoding children column")?;
        return Ok(NodePayload::Children(uids));
    }
    if let Some(elements) = elements {
        let map = serde_json::from_value(elements).context("decoding elements column")?;
        return Ok(NodePayload::Elements(map));
    }
    if container {
        Ok(NodePayload::Children(Vec::new()))
    } else {
        Ok(NodePayload::Elements(IndexMap::new()))
    }
}

fn encode_payload(
    payload: &NodePayload,
) -> Result<(Option<serde_json::Value>, Option<serde_json::Value>), StoreError> {
    match payload {
        NodePayload::Elements(map) => {
            let value = serde_json::to_value(map).context("encoding elements column")?;
            Ok((Some(value), None))
        }
        NodePayload::Children(list) => {
            let value = serde_json::to_value(list).context("encoding children column")?;
            Ok((None, Some(value)))
        }
    }
}

impl PgStore {
    fn node_from_row(&self, row: NodeRow) -> Result<ContentNode, StoreError> {
        let kind = self
            .registry
            .resolve(&row.kind)
            .context("decoding content_node.kind")?;
        let state = NodeState::from_str(&row.state).context("decoding content_node.state")?;
        let payload = decode_payload(kind.is_container(), row.elements, row.children)?;
        let parameters =
            serde_json::from_value(row.parameters).context("decoding content_node.parameters")?;
        Ok(ContentNode {
            uid: Uid::from_trusted(row.uid),
            kind,
            state,
            parameters,
            payload,
            created: row.created,
            modified: row.modified,
        })
    }

    fn revision_from_row(&self, row: RevisionRow) -> Result<Revision, StoreError> {
        let kind = self
            .registry
            .resolve(&row.kind)
            .context("decoding revision.kind")?;
        let state = DraftState::from_str(&row.state).context("decoding revision.state")?;
        let payload = decode_payload(kind.is_container(), row.elements, row.children)?;
        let parameters =
            serde_json::from_value(row.parameters).context("decoding revision.parameters")?;
        Ok(Revision {
            target: Uid::from_trusted(row.target),
            owner: Uid::from_trusted(row.owner),
            kind,
            state,
            payload,
            parameters,
            created: row.created,
            modified: row.modified,
        })
    }
}

fn page_from_row(row: PageRow) -> Result<Page, StoreError> {
    let state = PageState::from_str(&row.state).context("decoding page.state")?;
    let tags: Vec<Uid> = serde_json::from_value(row.tags).context("decoding page.tags")?;
    Ok(Page {
        uid: Uid::from_trusted(row.uid),
        title: row.title,
        root: Uid::from_trusted(row.root),
        state,
        category: row.category,
        tags,
        created: row.created,
        modified: row.modified,
        published: row.published,
    })
}

fn uid_strings(uids: &[Uid]) -> Vec<String> {
    uids.iter().map(|uid| uid.as_str().to_owned()).collect()
}

const SELECT_NODE: &str =
    "SELECT uid, kind, state, parameters, elements, children, created, modified FROM content_node";

const SELECT_REVISION: &str =
    "SELECT target, owner, kind, state, parameters, elements, children, created, modified FROM revision";

const SELECT_PAGE: &str =
    "SELECT uid, title, root, state, category, tags, created, modified, published FROM page";

#[async_trait]
impl ContentStore for PgStore {
    async fn get_node(&self, uid: &Uid) -> Result<Option<ContentNode>, StoreError> {
        let row = sqlx::query_as::<_, NodeRow>(&format!("{SELECT_NODE} WHERE uid = $1"))
            .bind(uid.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| self.node_from_row(row)).transpose()
    }

    async fn get_nodes(&self, uids: &[Uid]) -> Result<Vec<ContentNode>, StoreError> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, NodeRow>(&format!("{SELECT_NODE} WHERE uid = ANY($1)"))
            .bind(uid_strings(uids))
            .fetch_all(&self.pool)
            .await?;
        let mut by_uid: HashMap<Uid, ContentNode> = HashMap::with_capacity(rows.len());
        for row in rows {
            let node = self.node_from_row(row)?;
            by_uid.insert(node.uid.clone(), node);
        }
        // Request order, not result-set order.
        Ok(uids.iter().filter_map(|uid| by_uid.remove(uid)).collect())
    }

    async fn get_page(&self, uid: &Uid) -> Result<Option<Page>, StoreError> {
        let row = sqlx::query_as::<_, PageRow>(&format!("{SELECT_PAGE} WHERE uid = $1"))
            .bind(uid.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(page_from_row).transpose()
    }

    async fn list_pages(&self) -> Result<Vec<Page>, StoreError> {
        let rows = sqlx::query_as::<_, PageRow>(&format!("{SELECT_PAGE} ORDER BY uid"))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(page_from_row).collect()
    }

    async fn get_pages(&self, uids: &[Uid]) -> Result<Vec<Page>, StoreError> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        let rows =
            sqlx::query_as::<_, PageRow>(&format!("{SELECT_PAGE} WHERE uid = ANY($1) ORDER BY uid"))
                .bind(uid_strings(uids))
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(page_from_row).collect()
    }

    async fn get_tags(&self, uids: &[Uid]) -> Result<Vec<Tag>, StoreError> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, TagRow>("SELECT uid, name FROM tag WHERE uid = ANY($1)")
            .bind(uid_strings(uids))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| Tag {
                uid: Uid::from_trusted(row.uid),
                name: row.name,
            })
            .collect())
    }

    async fn get_revision(&self, target: &Uid) -> Result<Option<Revision>, StoreError> {
        let row = sqlx::query_as::<_, RevisionRow>(&format!("{SELECT_REVISION} WHERE target = $1"))
            .bind(target.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| self.revision_from_row(row)).transpose()
    }

    async fn revisions_for(&self, targets: &[Uid]) -> Result<Vec<Revision>, StoreError> {
        if targets.is_empty() {
            return Ok(Vec::new());
        }
        let rows =
            sqlx::query_as::<_, RevisionRow>(&format!("{SELECT_REVISION} WHERE target = ANY($1)"))
                .bind(uid_strings(targets))
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter()
            .map(|row| self.revision_from_row(row))
            .collect()
    }

    async fn all_revisions(&self) -> Result<Vec<Revision>, StoreError> {
        let rows = sqlx::query_as::<_, RevisionRow>(&format!("{SELECT_REVISION} ORDER BY target"))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| self.revision_from_row(row))
            .collect()
    }

    async fn is_shared(&self, uid: &Uid) -> Result<bool, StoreError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM shared_content WHERE uid = $1)")
                .bind(uid.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn shared_uids(&self) -> Result<Vec<Uid>, StoreError> {
        let uids: Vec<String> = sqlx::query_scalar("SELECT uid FROM shared_content ORDER BY uid")
            .fetch_all(&self.pool)
            .await?;
        Ok(uids.into_iter().map(Uid::from_trusted).collect())
    }

    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }
}

struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn upsert_node(&mut self, node: &ContentNode) -> Result<(), StoreError> {
        let (elements, children) = encode_payload(&node.payload)?;
        let parameters =
            serde_json::to_value(&node.parameters).context("encoding content_node.parameters")?;
        sqlx::query(
            r#"
            INSERT INTO content_node (uid, kind, state, parameters, elements, children, created, modified)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (uid) DO UPDATE SET
                kind = EXCLUDED.kind,
                state = EXCLUDED.state,
                parameters = EXCLUDED.parameters,
                elements = EXCLUDED.elements,
                children = EXCLUDED.children,
                modified = EXCLUDED.modified
            "#,
        )
        .bind(node.uid.as_str())
        .bind(node.kind.as_str())
        .bind(node.state.as_str())
        .bind(parameters)
        .bind(elements)
        .bind(children)
        .bind(node.created)
        .bind(node.modified)
        .execute(&mut *self.tx)
        .await
        .context("failed to upsert content node")?;
        Ok(())
    }

    async fn delete_node(&mut self, uid: &Uid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM content_node WHERE uid = $1")
            .bind(uid.as_str())
            .execute(&mut *self.tx)
            .await
            .context("failed to delete content node")?;
        Ok(())
    }

    async fn detach_child(&mut self, uid: &Uid) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE content_node
            SET children = COALESCE(
                    (SELECT jsonb_agg(child)
                     FROM jsonb_array_elements(children) AS child
                     WHERE child <> to_jsonb($1::text)),
                    '[]'::jsonb),
                modified = $2
            WHERE children @> to_jsonb(ARRAY[$1::text])
            "#,
        )
        .bind(uid.as_str())
        .bind(Utc::now().timestamp())
        .execute(&mut *self.tx)
        .await
        .context("failed to detach child references")?;
        Ok(result.rows_affected())
    }

    async fn bulk_set_state(
        &mut self,
        uids: &[Uid],
        state: NodeState,
    ) -> Result<u64, StoreError> {
        if uids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("UPDATE content_node SET state = $1 WHERE uid = ANY($2)")
            .bind(state.as_str())
            .bind(uid_strings(uids))
            .execute(&mut *self.tx)
            .await
            .context("failed to bulk-update node states")?;
        Ok(result.rows_affected())
    }

    async fn upsert_revision(&mut self, revision: &Revision) -> Result<(), StoreError> {
        let (elements, children) = encode_payload(&revision.payload)?;
        let parameters =
            serde_json::to_value(&revision.parameters).context("encoding revision.parameters")?;
        sqlx::query(
            r#"
            INSERT INTO revision (target, owner, kind, state, parameters, elements, children, created, modified)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (target) DO UPDATE SET
                owner = EXCLUDED.owner,
                kind = EXCLUDED.kind,
                state = EXCLUDED.state,
                parameters = EXCLUDED.parameters,
                elements = EXCLUDED.elements,
                children = EXCLUDED.children,
                modified = EXCLUDED.modified
            "#,
        )
        .bind(revision.target.as_str())
        .bind(revision.owner.as_str())
        .bind(revision.kind.as_str())
        .bind(revision.state.as_str())
        .bind(parameters)
        .bind(elements)
        .bind(children)
        .bind(revision.created)
        .bind(revision.modified)
        .execute(&mut *self.tx)
        .await
        .context("failed to upsert revision")?;
        Ok(())
    }

    async fn delete_revision(&mut self, target: &Uid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM revision WHERE target = $1")
            .bind(target.as_str())
            .execute(&mut *self.tx)
            .await
            .context("failed to delete revision")?;
        Ok(())
    }

    async fn upsert_page(&mut self, page: &Page) -> Result<(), StoreError> {
        let tags = serde_json::to_value(&page.tags).context("encoding page.tags")?;
        sqlx::query(
            r#"
            INSERT INTO page (uid, title, root, state, category, tags, created, modified, published)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (uid) DO UPDATE SET
                title = EXCLUDED.title,
                root = EXCLUDED.root,
                state = EXCLUDED.state,
                category = EXCLUDED.category,
                tags = EXCLUDED.tags,
                modified = EXCLUDED.modified,
                published = EXCLUDED.published
            "#,
        )
        .bind(page.uid.as_str())
        .bind(&page.title)
        .bind(page.root.as_str())
        .bind(page.state.as_str())
        .bind(&page.category)
        .bind(tags)
        .bind(page.created)
        .bind(page.modified)
        .bind(page.published)
        .execute(&mut *self.tx)
        .await
        .context("failed to upsert page")?;
        Ok(())
    }

    async fn upsert_tag(&mut self, tag: &Tag) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO tag (uid, name)
            VALUES ($1, $2)
            ON CONFLICT (uid) DO UPDATE SET name = EXCLUDED.name
            "#,
        )
        .bind(tag.uid.as_str())
        .bind(&tag.name)
        .execute(&mut *self.tx)
        .await
        .context("failed to upsert tag")?;
        Ok(())
    }

    async fn mark_shared(&mut self, uid: &Uid) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO shared_content (uid) VALUES ($1) ON CONFLICT (uid) DO NOTHING")
            .bind(uid.as_str())
            .execute(&mut *self.tx)
            .await
            .context("failed to mark content as shared")?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
