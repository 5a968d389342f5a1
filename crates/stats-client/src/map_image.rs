//! Map preview images, looked up once per map name.

use crate::cache::LookupCache;
use crate::client::{ApiClient, RequestOptions};
use serde::{Deserialize, Serialize};
use stats_types::query::encode_path_segment;
use stats_types::FetchError;
use std::sync::Arc;

/// Image URLs for one map. Any size may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapImage {
    #[serde(default)]
    pub small: Option<String>,
    #[serde(default)]
    pub medium: Option<String>,
    #[serde(default)]
    pub large: Option<String>,
}

pub struct MapImages {
    client: Arc<ApiClient>,
    cache: Arc<LookupCache<String, MapImage>>,
}

impl MapImages {
    pub fn new(client: Arc<ApiClient>, cache: Arc<LookupCache<String, MapImage>>) -> Self {
        Self { client, cache }
    }

    /// Fetch `GET /map/{name}/image`, memoized by map name.
    pub async fn lookup(&self, map_name: &str) -> Result<MapImage, FetchError> {
        let endpoint = format!("/map/{}/image", encode_path_segment(map_name));
        let client = Arc::clone(&self.client);
        self.cache
            .get_or_fetch(map_name.to_string(), || async move {
                tracing::debug!(endpoint = %endpoint, "loading map image");
                client
                    .request_as::<MapImage>(&endpoint, RequestOptions::get())
                    .await
            })
            .await
    }

    pub fn cache(&self) -> &LookupCache<String, MapImage> {
        &self.cache
    }
}
