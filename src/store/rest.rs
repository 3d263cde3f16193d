// envclone/src/store/rest.rs
use async_trait::async_trait;
use reqwest::header::{CONTENT_RANGE, HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use super::{Row, StoreError, TableStore};

const REST_PATH: &str = "rest/v1";

/// PostgREST error payload.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: Option<String>,
    message: Option<String>,
}

/// HTTP client for a PostgREST endpoint authenticated with a privileged key.
pub struct RestStore {
    client: Client,
    rest_url: Url,
}

impl RestStore {
    pub fn new(endpoint: &Url, api_key: &str, timeout: Duration) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        let mut key_value = HeaderValue::from_str(api_key)
            .map_err(|_| anyhow::anyhow!("API key contains characters not allowed in a header"))?;
        key_value.set_sensitive(true);
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|_| anyhow::anyhow!("API key contains characters not allowed in a header"))?;
        bearer.set_sensitive(true);
        headers.insert("apikey", key_value);
        headers.insert(AUTHORIZATION, bearer);

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        let mut base = endpoint.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let rest_url = base.join(&format!("{}/", REST_PATH))?;

        Ok(Self { client, rest_url })
    }

    fn table_url(&self, table: &str) -> Result<Url, StoreError> {
        self.rest_url
            .join(table)
            .map_err(|e| StoreError::Protocol(format!("invalid table name {}: {}", table, e)))
    }

    fn request(&self, method: Method, table: &str) -> Result<RequestBuilder, StoreError> {
        Ok(self.client.request(method, self.table_url(table)?))
    }

    /// Turns a non-success response into a classified [`StoreError`].
    async fn check(table: &str, response: Response) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let body: Option<ApiErrorBody> = serde_json::from_str(&text).ok();
        let code = body.as_ref().and_then(|b| b.code.clone());
        let message = body
            .and_then(|b| b.message)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| {
                if text.is_empty() {
                    status.canonical_reason().unwrap_or("unknown error").to_string()
                } else {
                    text
                }
            });

        if is_missing_relation(code.as_deref(), &message) {
            return Err(StoreError::RelationMissing(table.to_string()));
        }

        Err(StoreError::Api {
            status: status.as_u16(),
            code,
            message,
        })
    }
}

/// Only a PostgREST error code or a Postgres "relation does not exist"
/// message proves a table is absent. A bare 404 may come from a wrong base
/// URL or a gateway and stays an API error.
fn is_missing_relation(code: Option<&str>, message: &str) -> bool {
    if matches!(code, Some("42P01") | Some("PGRST205")) {
        return true;
    }
    let lower = message.to_lowercase();
    lower.contains("relation") && lower.contains("does not exist")
}

/// Reads the total from a `Content-Range` value such as `0-24/25` or `*/0`.
fn parse_content_range_total(value: &str) -> Option<u64> {
    let (_, total) = value.rsplit_once('/')?;
    total.trim().parse().ok()
}

#[async_trait]
impl TableStore for RestStore {
    async fn count(&self, table: &str) -> Result<u64, StoreError> {
        let response = self
            .request(Method::HEAD, table)?
            .query(&[("select", "*")])
            .header("Prefer", "count=exact")
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            // HEAD carries no error body; a zero-row read tells a missing
            // relation apart from an endpoint that is not PostgREST.
            self.select_page(table, 0, 0).await?;
            return Err(StoreError::Api {
                status: StatusCode::NOT_FOUND.as_u16(),
                code: None,
                message: format!("count for {} answered 404 while the table is readable", table),
            });
        }
        let response = Self::check(table, response).await?;

        response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total)
            .ok_or_else(|| {
                StoreError::Protocol(format!("missing or unreadable Content-Range for {}", table))
            })
    }

    async fn select_page(
        &self,
        table: &str,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Row>, StoreError> {
        let response = self
            .request(Method::GET, table)?
            .query(&[
                ("select", "*".to_string()),
                ("offset", offset.to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await?;
        let response = Self::check(table, response).await?;
        let rows: Vec<Row> = response.json().await?;
        Ok(rows)
    }

    async fn insert(&self, table: &str, rows: &[Row]) -> Result<(), StoreError> {
        let response = self
            .request(Method::POST, table)?
            .header("Prefer", "return=minimal")
            .json(rows)
            .send()
            .await?;
        Self::check(table, response).await?;
        Ok(())
    }

    async fn upsert(&self, table: &str, rows: &[Row], conflict_key: &str) -> Result<(), StoreError> {
        let response = self
            .request(Method::POST, table)?
            .query(&[("on_conflict", conflict_key)])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(rows)
            .send()
            .await?;
        Self::check(table, response).await?;
        Ok(())
    }

    async fn delete_all(&self, table: &str, key_column: &str) -> Result<(), StoreError> {
        let response = self
            .request(Method::DELETE, table)?
            .query(&[(key_column, "not.is.null")])
            .header("Prefer", "return=minimal")
            .send()
            .await?;
        Self::check(table, response).await?;
        Ok(())
    }
}
