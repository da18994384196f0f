//! Thin JSON client for the famtreed HTTP API.

use anyhow::{bail, Context, Result};
use reqwest::{Method, RequestBuilder};
use serde_json::Value;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct ApiClient {
    http: reqwest::Client,
    base: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base: &str, token: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, format!("{}{path}", self.base));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Value> {
        let response = builder
            .send()
            .await
            .with_context(|| format!("failed to reach famtreed at {}", self.base))?;
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);

        if !status.is_success() {
            let reason = error_message(&body)
                .or(status.canonical_reason())
                .unwrap_or("request failed");
            bail!("{reason} (HTTP {})", status.as_u16());
        }
        Ok(body)
    }

    pub async fn get(&self, path: &str) -> Result<Value> {
        self.get_query(path, &[]).await
    }

    pub async fn get_query(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        self.send(self.request(Method::GET, path).query(query)).await
    }

    pub async fn post(&self, path: &str, body: Option<Value>) -> Result<Value> {
        let builder = self.request(Method::POST, path);
        let builder = match body {
            Some(body) => builder.json(&body),
            None => builder,
        };
        self.send(builder).await
    }

    pub async fn patch(&self, path: &str, body: Value) -> Result<Value> {
        self.send(self.request(Method::PATCH, path).json(&body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value> {
        self.send(self.request(Method::DELETE, path)).await
    }

    /// Plain-text health check.
    pub async fn health(&self) -> Result<String> {
        let response = self
            .request(Method::GET, "/health")
            .send()
            .await
            .with_context(|| format!("failed to reach famtreed at {}", self.base))?;
        Ok(response.text().await?)
    }
}

/// The `message` field of an error body.
pub fn error_message(body: &Value) -> Option<&str> {
    body.get("message").and_then(Value::as_str).filter(|m| !m.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_message() {
        let body = json!({ "success": false, "message": "Invalid email or password" });
        assert_eq!(error_message(&body), Some("Invalid email or password"));
        assert_eq!(error_message(&json!({ "message": "" })), None);
        assert_eq!(error_message(&Value::Null), None);
    }

    #[test]
    fn test_query_pairs_are_encoded() {
        let client = ApiClient::new("http://localhost:8080", None).unwrap();
        let request = client
            .request(Method::GET, "/api/photos")
            .query(&[("relationship", "Spouse/Partner")])
            .build()
            .unwrap();
        assert_eq!(request.url().path(), "/api/photos");
        assert_eq!(request.url().query(), Some("relationship=Spouse%2FPartner"));
    }

    #[test]
    fn test_base_url_normalized() {
        let client = ApiClient::new("http://localhost:8080/", Some(String::new())).unwrap();
        assert_eq!(client.base, "http://localhost:8080");
        assert!(!client.has_token());
    }
}
