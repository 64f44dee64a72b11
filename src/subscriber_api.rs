use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, Secret};
use std::time;
use uuid::Uuid;

use crate::domain::subscriber::{Subscriber, SubscriberRecord};
use crate::domain::subscriber_status::SubscriberStatus;

const REQUEST_TIMEOUT: time::Duration = time::Duration::from_secs(10);

/// Read access to the subscriber-management service.
#[async_trait]
pub trait SubscriberApi: Send + Sync {
    async fn list_subscribers(
        &self,
        status: SubscriberStatus,
    ) -> Result<Vec<Subscriber>, SubscriberApiError>;

    /// `None` when the subscriber no longer exists.
    async fn get_subscriber(&self, id: Uuid) -> Result<Option<Subscriber>, SubscriberApiError>;
}

#[derive(thiserror::Error)]
pub enum SubscriberApiError {
    #[error("Failed to reach the subscriber service.")]
    RequestError(#[from] reqwest::Error),
    #[error("Subscriber service answered with unexpected status {0}.")]
    UnexpectedStatus(u16),
}

impl std::fmt::Debug for SubscriberApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Caused by:\n\t({})", self)
    }
}

pub struct SubscriberApiClient {
    http_client: Client,
    base_url: String,
    api_key: Secret<String>,
}

impl SubscriberApiClient {
    pub fn new(
        base_url: String,
        api_key: Secret<String>,
        timeout: Option<time::Duration>,
    ) -> Result<SubscriberApiClient, reqwest::Error> {
        let http_client = Client::builder()
            .timeout(timeout.unwrap_or(REQUEST_TIMEOUT))
            .build()?;

        Ok(SubscriberApiClient {
            http_client,
            base_url,
            api_key,
        })
    }

    fn authorization(&self) -> String {
        format!("Bearer {}", self.api_key.expose_secret())
    }
}

#[async_trait]
impl SubscriberApi for SubscriberApiClient {
    #[tracing::instrument(name = "Listing subscribers by status", skip(self))]
    async fn list_subscribers(
        &self,
        status: SubscriberStatus,
    ) -> Result<Vec<Subscriber>, SubscriberApiError> {
        let url = format!("{}/subscribers", self.base_url);
        let records: Vec<SubscriberRecord> = self
            .http_client
            .get(&url)
            .header("Authorization", self.authorization())
            .query(&[("status", status.as_ref())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let subscribers = records
            .into_iter()
            .filter_map(|record| match Subscriber::try_from(record) {
                Ok(subscriber) => Some(subscriber),
                Err(err) => {
                    tracing::warn!("Ignoring subscriber record: {}", err);
                    None
                }
            })
            .collect();

        Ok(subscribers)
    }

    #[tracing::instrument(name = "Fetching a subscriber", skip(self))]
    async fn get_subscriber(&self, id: Uuid) -> Result<Option<Subscriber>, SubscriberApiError> {
        let url = format!("{}/subscribers/{}", self.base_url, id);
        let response = self
            .http_client
            .get(&url)
            .header("Authorization", self.authorization())
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let record: SubscriberRecord = response.json().await?;

                match Subscriber::try_from(record) {
                    Ok(subscriber) => Ok(Some(subscriber)),
                    Err(err) => {
                        tracing::warn!("Ignoring subscriber record: {}", err);
                        Ok(None)
                    }
                }
            }
            status => Err(SubscriberApiError::UnexpectedStatus(status.as_u16())),
        }
    }
}
