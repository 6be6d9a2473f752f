use async_trait::async_trait;
use guildhall_core::fulfillment::{FulfillmentOrderRequest, FulfillmentProvider, RemoteArticle, RemoteStock};
use guildhall_core::ProviderError;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{error, info};

/// JSON client for the print-on-demand provider
#[derive(Clone)]
pub struct HttpFulfillmentClient {
    client: Client,
    api_base: String,
    api_key: String,
}

impl std::fmt::Debug for HttpFulfillmentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFulfillmentClient")
            .field("api_base", &self.api_base)
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct ListEnvelope<T> {
    data: Vec<T>,
}

#[derive(Deserialize)]
struct CreatedOrder {
    id: String,
}

impl HttpFulfillmentClient {
    pub fn new(client: Client, api_base: &str, api_key: &str) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, path: &str) -> Result<T, ProviderError> {
        let response = request
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), path, "Fulfillment request failed");
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

#[async_trait]
impl FulfillmentProvider for HttpFulfillmentClient {
    async fn list_articles(&self) -> Result<Vec<RemoteArticle>, ProviderError> {
        let envelope: ListEnvelope<RemoteArticle> =
            self.send(self.client.get(self.url("/articles")), "/articles").await?;
        Ok(envelope.data)
    }

    async fn list_stock(&self) -> Result<Vec<RemoteStock>, ProviderError> {
        let envelope: ListEnvelope<RemoteStock> = self.send(self.client.get(self.url("/stock")), "/stock").await?;
        Ok(envelope.data)
    }

    async fn create_order(&self, request: &FulfillmentOrderRequest) -> Result<String, ProviderError> {
        let created: CreatedOrder = self
            .send(self.client.post(self.url("/orders")).json(request), "/orders")
            .await?;
        info!(reference = %request.reference, remote_id = %created.id, "Fulfillment order accepted");
        Ok(created.id)
    }
}
