use futures::future::join_all;
use log::debug;

use super::layer::MapLayer;
use crate::services::{LegendImage, LegendService};

/// A legend graphic to be fetched for one visible layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegendRequest {
  pub layer_name: String,
  pub url: String,
}

/// A fetched legend, shown next to the map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegendEntry {
  pub layer_name: String,
  pub url: String,
  pub image: LegendImage,
}

/// Legend requests for every visible layer that names a queryable WMS layer, in layer order.
#[must_use]
pub fn legend_requests(layers: &[MapLayer], service: &dyn LegendService) -> Vec<LegendRequest> {
  layers
    .iter()
    .filter(|layer| layer.visible())
    .filter_map(|layer| {
      let (url, name) = layer.source()?.legend_params()?;
      Some(LegendRequest {
        layer_name: layer.name().to_string(),
        url: service.legend_url(url, name),
      })
    })
    .collect()
}

/// Fetches all legends concurrently. Failed fetches are left out.
pub async fn fetch_legends(
  requests: Vec<LegendRequest>,
  service: &dyn LegendService,
) -> Vec<LegendEntry> {
  let fetches = requests.into_iter().map(|request| async move {
    match service.legend_image(&request.url).await {
      Ok(image) => Some(LegendEntry {
        layer_name: request.layer_name,
        url: request.url,
        image,
      }),
      Err(e) => {
        debug!("No legend for '{}' from {}: {e}", request.layer_name, request.url);
        None
      }
    }
  });
  join_all(fetches).await.into_iter().flatten().collect()
}
