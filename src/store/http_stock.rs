use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{StockClient, StoreError};
use crate::config::StockServiceConfig;

// The inventory API answers either with a bare number or a small object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StockResponse {
    Plain(i32),
    Wrapped {
        #[serde(alias = "availableQuantity", alias = "stockQuantity")]
        quantity: i32,
    },
}

impl StockResponse {
    fn quantity(&self) -> i32 {
        match self {
            StockResponse::Plain(quantity) => *quantity,
            StockResponse::Wrapped { quantity } => *quantity,
        }
    }
}

/// Queries `GET {base_url}/api/products/{id}/stock` on the inventory service.
pub struct HttpStockClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStockClient {
    pub fn new(config: &StockServiceConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| StoreError::Unavailable(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn stock_url(&self, product_id: Uuid) -> String {
        format!("{}/api/products/{}/stock", self.base_url, product_id)
    }
}

#[async_trait]
impl StockClient for HttpStockClient {
    async fn get_available_stock(&self, product_id: Uuid) -> Result<i32, StoreError> {
        let url = self.stock_url(product_id);
        debug!(url = %url, "Querying available stock");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(format!("Stock request failed: {}", e)))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(StoreError::NotFound {
                entity: "Product",
                id: product_id,
            }),
            status if !status.is_success() => {
                warn!(product_id = %product_id, status = %status, "Stock service returned an error");
                Err(StoreError::Unavailable(format!("Stock service returned {}", status)))
            }
            _ => {
                let body: StockResponse = response
                    .json()
                    .await
                    .map_err(|e| StoreError::Unavailable(format!("Invalid stock response: {}", e)))?;
                Ok(body.quantity())
            }
        }
    }
}
