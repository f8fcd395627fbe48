//! HTTP client for the KeyEscrow server.

use crate::models::{ErrorBody, KeyRecord, KeyState, MessageBody};
use reqwest::{Response, Url};
use serde::de::DeserializeOwned;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success response; `message` is the server's `error` field.
    #[error("Server returned {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Record {0} has no key material")]
    MissingKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// HTTP client for the escrow API.
pub struct EscrowClient {
    client: reqwest::Client,
    base_url: Url,
}

impl EscrowClient {
    pub fn new(server_url: &str) -> Result<Self> {
        let base_url =
            Url::parse(server_url).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(server_url.to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self { client, base_url })
    }

    /// All records, newest first.
    pub async fn list_keys(&self) -> Result<Vec<KeyRecord>> {
        let url = self.endpoint(&["api", "keys"])?;
        let response = self.client.get(url).send().await?;
        decode(response).await
    }

    /// Records submitted under `username`, newest first.
    pub async fn list_keys_for(&self, username: &str) -> Result<Vec<KeyRecord>> {
        let url = self.endpoint(&["api", "keys", username])?;
        let response = self.client.get(url).send().await?;
        decode(response).await
    }

    /// Look a record up in a freshly fetched listing.
    pub async fn find_key(&self, key_id: &str) -> Result<KeyRecord> {
        self.list_keys()
            .await?
            .into_iter()
            .find(|k| k.id == key_id)
            .ok_or_else(|| ClientError::NotFound(key_id.to_string()))
    }

    pub async fn update_state(&self, key_id: &str, state: KeyState) -> Result<KeyRecord> {
        let url = self.endpoint(&["api", "keys", key_id, "state"])?;
        let response = self
            .client
            .patch(url)
            .json(&serde_json::json!({ "state": state }))
            .send()
            .await?;
        decode(response).await
    }

    /// Flip the state the server currently reports for `key_id`. Returns the
    /// record as confirmed by the server.
    pub async fn toggle_state(&self, key_id: &str) -> Result<KeyRecord> {
        let current = self.find_key(key_id).await?;
        let next = KeyState::toggle_from(current.state);
        self.update_state(key_id, next).await
    }

    /// Delete a record; returns the server's confirmation message.
    pub async fn delete_key(&self, key_id: &str) -> Result<String> {
        let url = self.endpoint(&["api", "keys", key_id])?;
        let response = self.client.delete(url).send().await?;
        let body: MessageBody = decode(response).await?;
        Ok(body.message)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let message = match response.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status.to_string(),
    };
    Err(ClientError::Server {
        status: status.as_u16(),
        message,
    })
}
