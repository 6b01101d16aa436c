// Postgres persistence for discovered posts, keywords, and platform accounts.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use growthsignal_common::{DiscoveredPost, Keyword, NewDiscoveredPost, Platform};

use super::DiscoveryStore;
use crate::persist::{keyword_increments, PersistOutcome};

pub struct PgStore {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct KeywordRow {
    id: Uuid,
    phrase: String,
    category: Option<String>,
    is_active: bool,
    posts_matched: i64,
}

impl From<KeywordRow> for Keyword {
    fn from(r: KeywordRow) -> Self {
        Keyword {
            id: r.id,
            phrase: r.phrase,
            category: r.category,
            is_active: r.is_active,
            posts_matched: r.posts_matched,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PostRow {
    id: Uuid,
    platform: String,
    external_id: String,
    external_url: String,
    author_name: String,
    author_handle: String,
    content: String,
    thread_context: Option<String>,
    matched_keywords: String,
    posted_at: Option<DateTime<Utc>>,
    discovered_at: DateTime<Utc>,
    status: String,
}

impl TryFrom<PostRow> for DiscoveredPost {
    type Error = anyhow::Error;

    fn try_from(r: PostRow) -> Result<Self> {
        Ok(DiscoveredPost {
            id: r.id,
            platform: r.platform.parse().map_err(anyhow::Error::msg)?,
            external_id: r.external_id,
            external_url: r.external_url,
            author_name: r.author_name,
            author_handle: r.author_handle,
            content: r.content,
            thread_context: r.thread_context,
            matched_keywords: r.matched_keywords,
            posted_at: r.posted_at,
            discovered_at: r.discovered_at,
            status: r.status.parse().map_err(anyhow::Error::msg)?,
        })
    }
}

/// Decode the `matched_keywords` JSON arrays returned by the insert.
fn decode_keyword_lists(rows: &[String]) -> Result<Vec<Vec<String>>> {
    rows.iter()
        .map(|json| {
            serde_json::from_str(json)
                .with_context(|| format!("Failed to decode matched_keywords {json:?}"))
        })
        .collect()
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("Failed to connect to Postgres")?;
        Ok(Self::new(pool))
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;
        Ok(())
    }

    /// Create or reactivate a keyword. Settings-surface helper, used for seeding.
    pub async fn upsert_keyword(&self, phrase: &str, category: Option<&str>) -> Result<Keyword> {
        let row = sqlx::query_as::<_, KeywordRow>(
            r#"
            INSERT INTO keywords (phrase, category)
            VALUES ($1, $2)
            ON CONFLICT (phrase)
            DO UPDATE SET category = EXCLUDED.category, is_active = TRUE, updated_at = now()
            RETURNING id, phrase, category, is_active, posts_matched
            "#,
        )
        .bind(phrase.trim())
        .bind(category)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    pub async fn keyword(&self, phrase: &str) -> Result<Option<Keyword>> {
        let row = sqlx::query_as::<_, KeywordRow>(
            "SELECT id, phrase, category, is_active, posts_matched FROM keywords WHERE phrase = $1",
        )
        .bind(phrase.trim())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    /// Store a credential blob as the platform's active account.
    pub async fn set_account_credentials(&self, platform: Platform, blob: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE platform_accounts SET is_active = FALSE WHERE platform = $1")
            .bind(platform.as_str())
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO platform_accounts (platform, credentials) VALUES ($1, $2)")
            .bind(platform.as_str())
            .bind(blob)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn last_fetched_at(&self, platform: Platform) -> Result<Option<DateTime<Utc>>> {
        let at = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            "SELECT last_fetched_at FROM platform_accounts WHERE platform = $1 AND is_active LIMIT 1",
        )
        .bind(platform.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(at.flatten())
    }

    /// Stored posts for a platform, newest first.
    pub async fn posts(&self, platform: Platform) -> Result<Vec<DiscoveredPost>> {
        let rows = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT id, platform, external_id, external_url, author_name, author_handle,
                   content, thread_context, matched_keywords, posted_at, discovered_at, status
            FROM discovered_posts
            WHERE platform = $1
            ORDER BY discovered_at DESC
            "#,
        )
        .bind(platform.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(DiscoveredPost::try_from).collect()
    }
}

#[async_trait]
impl DiscoveryStore for PgStore {
    async fn active_keywords(&self) -> Result<Vec<Keyword>> {
        let rows = sqlx::query_as::<_, KeywordRow>(
            r#"
            SELECT id, phrase, category, is_active, posts_matched
            FROM keywords
            WHERE is_active
            ORDER BY created_at ASC, phrase ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn latest_discovered_at(&self, platform: Platform) -> Result<Option<DateTime<Utc>>> {
        let latest = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            "SELECT MAX(discovered_at) FROM discovered_posts WHERE platform = $1",
        )
        .bind(platform.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(latest)
    }

    async fn account_credentials(&self, platform: Platform) -> Result<Option<String>> {
        let blob = sqlx::query_scalar::<_, String>(
            r#"
            SELECT credentials FROM platform_accounts
            WHERE platform = $1 AND is_active
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(platform.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(blob)
    }

    async fn mark_fetched(&self, platform: Platform, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE platform_accounts SET last_fetched_at = $2 WHERE platform = $1 AND is_active",
        )
        .bind(platform.as_str())
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn persist_batch(&self, posts: &[NewDiscoveredPost]) -> Result<PersistOutcome> {
        if posts.is_empty() {
            return Ok(PersistOutcome::empty());
        }

        let platforms: Vec<&str> = posts.iter().map(|p| p.platform.as_str()).collect();
        let external_ids: Vec<&str> = posts.iter().map(|p| p.external_id.as_str()).collect();
        let urls: Vec<&str> = posts.iter().map(|p| p.external_url.as_str()).collect();
        let author_names: Vec<&str> = posts.iter().map(|p| p.author_name.as_str()).collect();
        let author_handles: Vec<&str> = posts.iter().map(|p| p.author_handle.as_str()).collect();
        let contents: Vec<&str> = posts.iter().map(|p| p.content.as_str()).collect();
        let contexts: Vec<Option<&str>> =
            posts.iter().map(|p| p.thread_context.as_deref()).collect();
        let keywords: Vec<String> = posts.iter().map(|p| p.matched_keywords_json()).collect();
        let posted: Vec<Option<DateTime<Utc>>> = posts.iter().map(|p| p.posted_at).collect();
        let discovered: Vec<DateTime<Utc>> = posts.iter().map(|p| p.discovered_at).collect();

        let mut tx = self.pool.begin().await?;

        let inserted: Vec<String> = sqlx::query_scalar::<_, String>(
            r#"
            INSERT INTO discovered_posts
                (platform, external_id, external_url, author_name, author_handle,
                 content, thread_context, matched_keywords, posted_at, discovered_at, status)
            SELECT p, e, u, an, ah, c, tc, mk, pa, da, 'new'
            FROM UNNEST($1::text[], $2::text[], $3::text[], $4::text[], $5::text[],
                        $6::text[], $7::text[], $8::text[], $9::timestamptz[], $10::timestamptz[])
                AS t(p, e, u, an, ah, c, tc, mk, pa, da)
            ON CONFLICT (platform, external_id) DO NOTHING
            RETURNING matched_keywords
            "#,
        )
        .bind(&platforms)
        .bind(&external_ids)
        .bind(&urls)
        .bind(&author_names)
        .bind(&author_handles)
        .bind(&contents)
        .bind(&contexts)
        .bind(&keywords)
        .bind(&posted)
        .bind(&discovered)
        .fetch_all(&mut *tx)
        .await
        .context("Failed to insert discovered posts")?;

        // A row that cannot be decoded aborts the transaction, so no row is
        // committed without its counter increments.
        let inserted_keywords = decode_keyword_lists(&inserted)?;
        let increments = keyword_increments(inserted_keywords.iter().map(Vec::as_slice));

        if !increments.is_empty() {
            let phrases: Vec<&str> = increments.keys().map(String::as_str).collect();
            let counts: Vec<i64> = increments.values().copied().collect();
            sqlx::query(
                r#"
                UPDATE keywords
                SET posts_matched = keywords.posts_matched + v.n, updated_at = now()
                FROM UNNEST($1::text[], $2::bigint[]) AS v(phrase, n)
                WHERE btrim(keywords.phrase) = v.phrase
                "#,
            )
            .bind(&phrases)
            .bind(&counts)
            .execute(&mut *tx)
            .await
            .context("Failed to increment keyword counters")?;
        }

        tx.commit().await?;

        Ok(PersistOutcome {
            submitted: posts.len(),
            inserted: inserted.len(),
            increments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_lists_decode_in_row_order() {
        let rows = vec![r#"["LLM","trading bot"]"#.to_string(), "[]".to_string()];
        let lists = decode_keyword_lists(&rows).unwrap();
        assert_eq!(lists, vec![vec!["LLM".to_string(), "trading bot".to_string()], vec![]]);
    }

    #[test]
    fn undecodable_keyword_list_is_an_error() {
        let rows = vec![r#"["LLM"]"#.to_string(), "LLM, trading bot".to_string()];
        let err = decode_keyword_lists(&rows).unwrap_err();
        assert!(format!("{err:#}").contains("matched_keywords"));
    }
}
