use std::time::Duration;

use anyhow::{Result, anyhow};
use log::{debug, error};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use surf::Config;

use super::{
  BoundaryRecord, BoundaryRequest, LegendImage, LegendService, MapDataService, PointQuery,
  ServiceError,
};
use crate::map::cluster::ClusterAggregate;

const TIMEOUT: Duration = Duration::from_secs(10);

fn client() -> Result<surf::Client> {
  Config::new()
    .set_timeout(Some(TIMEOUT))
    .try_into()
    .map_err(|e| anyhow!("Could not build HTTP client: {e}"))
}

fn transport(url: &str, e: &surf::Error) -> ServiceError {
  ServiceError::Transport {
    url: url.to_string(),
    message: e.to_string(),
  }
}

async fn checked(url: &str, request: surf::RequestBuilder) -> Result<surf::Response> {
  let response = request.await.map_err(|e| transport(url, &e))?;
  if !response.status().is_success() {
    error!("Request to {url} returned {}", response.status());
    return Err(
      ServiceError::Status {
        url: url.to_string(),
        status: response.status().into(),
      }
      .into(),
    );
  }
  Ok(response)
}

async fn json<T: DeserializeOwned>(url: &str, mut response: surf::Response) -> Result<T> {
  response.body_json::<T>().await.map_err(|e| {
    ServiceError::Decode {
      url: url.to_string(),
      message: e.to_string(),
    }
    .into()
  })
}

/// The backend REST API: `getSDTV`, `getClusterCount` and `fetchBoundary`.
#[derive(Debug, Clone)]
pub struct HttpMapDataService {
  base_url: String,
  client: surf::Client,
}

impl HttpMapDataService {
  pub fn new(base_url: &str) -> Result<Self> {
    Ok(Self {
      base_url: base_url.trim_end_matches('/').to_string(),
      client: client()?,
    })
  }

  #[must_use]
  pub fn base_url(&self) -> &str {
    &self.base_url
  }

  fn url(&self, endpoint: &str) -> String {
    format!("{}/{endpoint}", self.base_url)
  }

  async fn post<B: Serialize + Sync, T: DeserializeOwned>(&self, endpoint: &str, body: &B) -> Result<T> {
    let url = self.url(endpoint);
    debug!("POST {url}");
    let request = self
      .client
      .post(&url)
      .body_json(body)
      .map_err(|e| transport(&url, &e))?;
    let response = checked(&url, request).await?;
    json(&url, response).await
  }
}

#[async_trait::async_trait]
impl MapDataService for HttpMapDataService {
  async fn point_data(&self, query: &PointQuery) -> Result<Vec<Value>> {
    self.post("getSDTV", query).await
  }

  async fn cluster_counts(&self) -> Result<Vec<ClusterAggregate>> {
    let url = self.url("getClusterCount");
    debug!("GET {url}");
    let response = checked(&url, self.client.get(&url)).await?;
    json(&url, response).await
  }

  async fn boundary(&self, request: &BoundaryRequest) -> Result<Vec<BoundaryRecord>> {
    self.post("fetchBoundary", request).await
  }
}

/// Loads legend graphics over HTTP and uses the WMS URL formatter.
#[derive(Debug, Clone)]
pub struct HttpLegendService {
  client: surf::Client,
}

impl HttpLegendService {
  pub fn new() -> Result<Self> {
    Ok(Self { client: client()? })
  }
}

#[async_trait::async_trait]
impl LegendService for HttpLegendService {
  async fn legend_image(&self, url: &str) -> Result<LegendImage> {
    let mut response = checked(url, self.client.get(url)).await?;
    let bytes = response
      .body_bytes()
      .await
      .map_err(|e| transport(url, &e))?;
    Ok(LegendImage::decode(bytes)?)
  }
}
