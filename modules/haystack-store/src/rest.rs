//! PostgREST-style store client.
//!
//! The relational store exposes generic CRUD per table; filters are query
//! params (`column=eq.value`), ordering is `order=column.asc.nullsfirst`,
//! and `Prefer: return=representation` echoes inserted rows back.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use haystack_common::config::BOT_AUTHOR_ID;
use haystack_common::HaystackError;
use haystack_common::types::{
    CrawlRecord, FieldNote, ModerationItem, NewCrawlRecord, NewFieldNote, PipelineRun, RunKind,
    RunStatus, SourceFeed, SourceKind,
};

use crate::Store;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct RestStore {
    base_url: String,
    service_key: String,
    http: reqwest::Client,
}

impl RestStore {
    pub fn new(base_url: &str, service_key: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
            http: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("Failed to build store HTTP client"),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .header("Prefer", "return=representation")
    }

    async fn get_rows<T: serde::de::DeserializeOwned>(
        &self,
        table: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let response = self
            .authed(self.http.get(self.table_url(table)).query(params))
            .send()
            .await
            .with_context(|| format!("store GET {table} failed"))?;
        Self::check(response).await?.json().await.map_err(Into::into)
    }

    async fn insert_row<T: serde::de::DeserializeOwned>(
        &self,
        table: &str,
        body: &Value,
    ) -> Result<T> {
        let response = self
            .authed(self.http.post(self.table_url(table)).json(body))
            .send()
            .await
            .with_context(|| format!("store POST {table} failed"))?;
        // Inserts echo a one-element array under return=representation.
        let mut rows: Vec<T> = Self::check(response).await?.json().await?;
        rows.pop()
            .ok_or_else(|| anyhow!("store POST {table} returned no rows"))
    }

    async fn patch_rows(&self, table: &str, params: &[(&str, String)], body: &Value) -> Result<()> {
        let response = self
            .authed(self.http.patch(self.table_url(table)).query(params).json(body))
            .send()
            .await
            .with_context(|| format!("store PATCH {table} failed"))?;
        Self::check(response).await?;
        Ok(())
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(HaystackError::Store(format!("({status}): {body}")).into())
    }
}

fn eq(value: &str) -> String {
    format!("eq.{value}")
}

#[async_trait]
impl Store for RestStore {
    async fn active_sources(&self, kind: SourceKind) -> Result<Vec<SourceFeed>> {
        self.get_rows(
            "source_feeds",
            &[
                ("is_active", "eq.true".to_string()),
                ("source_kind", eq(&kind.to_string())),
                ("order", "last_fetched_at.asc.nullsfirst".to_string()),
            ],
        )
        .await
    }

    async fn mark_source_fetched(&self, source_id: &str, error: Option<&str>) -> Result<()> {
        let now = Utc::now();
        let body = match error {
            Some(message) => json!({
                "last_fetched_at": now,
                "updated_at": now,
                "last_error": message,
            }),
            None => json!({
                "last_fetched_at": now,
                "updated_at": now,
                "last_error": Value::Null,
                "consecutive_errors": 0,
            }),
        };
        self.patch_rows("source_feeds", &[("id", eq(source_id))], &body)
            .await
    }

    async fn set_reliability_score(&self, source_id: &str, score: f64) -> Result<()> {
        let result = self
            .patch_rows(
                "source_feeds",
                &[("id", eq(source_id))],
                &json!({ "reliability_score": score }),
            )
            .await;
        // The column arrives with a later migration; its absence is not an error.
        if let Err(e) = result {
            debug!(source_id, error = %e, "reliability score write skipped");
        }
        Ok(())
    }

    async fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<CrawlRecord>> {
        let mut rows: Vec<CrawlRecord> = self
            .get_rows(
                "crawl_history",
                &[
                    ("content_fingerprint", eq(fingerprint)),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(rows.pop())
    }

    async fn recent_relevant(&self, limit: u32) -> Result<Vec<CrawlRecord>> {
        self.get_rows(
            "crawl_history",
            &[
                ("was_relevant", "eq.true".to_string()),
                ("order", "fetched_at.desc".to_string()),
                ("limit", limit.to_string()),
            ],
        )
        .await
    }

    async fn recent_relevant_nonduplicates(&self, limit: u32) -> Result<Vec<CrawlRecord>> {
        self.get_rows(
            "crawl_history",
            &[
                ("was_relevant", "eq.true".to_string()),
                ("was_duplicate", "eq.false".to_string()),
                ("order", "fetched_at.desc".to_string()),
                ("limit", limit.to_string()),
            ],
        )
        .await
    }

    async fn recent_relevant_for_source(
        &self,
        source_id: &str,
        limit: u32,
    ) -> Result<Vec<CrawlRecord>> {
        self.get_rows(
            "crawl_history",
            &[
                ("source_feed_id", eq(source_id)),
                ("was_relevant", "eq.true".to_string()),
                ("order", "fetched_at.desc".to_string()),
                ("limit", limit.to_string()),
            ],
        )
        .await
    }

    async fn recent_relevant_since(
        &self,
        since: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<CrawlRecord>> {
        self.get_rows(
            "crawl_history",
            &[
                ("was_relevant", "eq.true".to_string()),
                ("fetched_at", format!("gte.{}", since.to_rfc3339())),
                ("order", "fetched_at.desc".to_string()),
                ("limit", limit.to_string()),
            ],
        )
        .await
    }

    async fn record_crawl(&self, record: NewCrawlRecord) -> Result<CrawlRecord> {
        let mut body = serde_json::to_value(&record)?;
        body["id"] = json!(Uuid::new_v4().to_string());
        body["fetched_at"] = json!(Utc::now());
        self.insert_row("crawl_history", &body).await
    }

    async fn create_run(&self, run_kind: RunKind) -> Result<PipelineRun> {
        let body = json!({
            "id": Uuid::new_v4().to_string(),
            "run_type": run_kind,
            "status": RunStatus::Running,
            "started_at": Utc::now(),
            "stats": {},
            "errors": [],
            "sources_polled": [],
        });
        self.insert_row("pipeline_runs", &body).await
    }

    async fn complete_run(
        &self,
        run_id: &str,
        status: RunStatus,
        stats: Value,
        errors: Vec<Value>,
        sources_polled: Vec<String>,
    ) -> Result<()> {
        self.patch_rows(
            "pipeline_runs",
            &[("id", eq(run_id))],
            &json!({
                "status": status,
                "completed_at": Utc::now(),
                "stats": stats,
                "errors": errors,
                "sources_polled": sources_polled,
            }),
        )
        .await
    }

    async fn create_moderation_item(
        &self,
        item_type: &str,
        content: &str,
        metadata: Value,
    ) -> Result<ModerationItem> {
        let body = json!({
            "id": Uuid::new_v4().to_string(),
            "type": item_type,
            "content": content,
            "status": "pending",
            "metadata": metadata,
        });
        self.insert_row("moderation_queue", &body).await
    }

    async fn approved_tips(&self, limit: u32) -> Result<Vec<ModerationItem>> {
        self.get_rows(
            "moderation_queue",
            &[
                ("type", "eq.tip".to_string()),
                ("status", "eq.approved".to_string()),
                ("order", "created_at.asc".to_string()),
                ("limit", limit.to_string()),
            ],
        )
        .await
    }

    async fn update_moderation_metadata(&self, item_id: &str, metadata: Value) -> Result<()> {
        self.patch_rows(
            "moderation_queue",
            &[("id", eq(item_id))],
            &json!({ "metadata": metadata }),
        )
        .await
    }

    async fn create_field_note(&self, note: NewFieldNote) -> Result<FieldNote> {
        let mut body = serde_json::to_value(&note)?;
        body["id"] = json!(Uuid::new_v4().to_string());
        body["author_id"] = json!(BOT_AUTHOR_ID);
        body["status"] = json!("raw");
        body["contacts"] = json!([]);
        body["created_at"] = json!(Utc::now());
        self.insert_row("field_notes", &body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_urls_are_rooted_at_rest_v1() {
        let store = RestStore::new("https://db.example.com/", "key");
        assert_eq!(
            store.table_url("crawl_history"),
            "https://db.example.com/rest/v1/crawl_history"
        );
    }

    #[test]
    fn eq_filter_shape() {
        assert_eq!(eq("abc"), "eq.abc");
    }

    #[test]
    fn new_crawl_record_serializes_for_insert() {
        let record = NewCrawlRecord::new(
            "src-1",
            "https://example.com/a",
            "abc123",
            "run-1",
            json!({"title": "t"}),
            haystack_common::types::CrawlStatus::Rejected,
        );
        let body = serde_json::to_value(&record).unwrap();
        assert_eq!(body["status"], json!("rejected"));
        assert_eq!(body["was_relevant"], json!(false));
        assert_eq!(body["source_feed_id"], json!("src-1"));
    }
}
