use crate::domain::models::LatLng;
use crate::infrastructure::entry_mapper::{format_origin, DirectionsPayload};
use crate::infrastructure::error::CoreError;
use async_trait::async_trait;
use reqwest::Client;
use url::Url;

/// Resolves the device's current position. On desktop this is backed by
/// configuration rather than a sensor.
pub trait LocationProvider: Send + Sync {
    fn current_position(&self) -> Result<LatLng, CoreError>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticLocationProvider {
    position: Option<LatLng>,
}

impl StaticLocationProvider {
    pub fn new(position: Option<LatLng>) -> Self {
        Self { position }
    }
}

impl LocationProvider for StaticLocationProvider {
    fn current_position(&self) -> Result<LatLng, CoreError> {
        self.position
            .ok_or_else(|| CoreError::LocationUnavailable("no origin configured".to_string()))
    }
}

#[async_trait]
pub trait DirectionsClient: Send + Sync {
    /// Returns the encoded polyline of a path from `origin` to the place
    /// identified by `destination_place_id`.
    async fn fetch_route(
        &self,
        access_token: &str,
        origin: LatLng,
        destination_place_id: &str,
    ) -> Result<String, CoreError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestDirectionsClient {
    client: Client,
    base_url: Url,
}

impl ReqwestDirectionsClient {
    pub fn new(base_url: &str) -> Result<Self, CoreError> {
        let base_url = Url::parse(base_url)
            .map_err(|error| CoreError::InvalidConfig(format!("invalid api base url: {error}")))?;
        Ok(Self {
            client: Client::new(),
            base_url,
        })
    }

    fn directions_endpoint(&self) -> Result<Url, CoreError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| CoreError::InvalidConfig("api base URL cannot be a base".to_string()))?;
            path.pop_if_empty();
            path.push("recommendations");
            path.push("directions");
        }
        Ok(url)
    }
}

#[async_trait]
impl DirectionsClient for ReqwestDirectionsClient {
    async fn fetch_route(
        &self,
        access_token: &str,
        origin: LatLng,
        destination_place_id: &str,
    ) -> Result<String, CoreError> {
        if destination_place_id.trim().is_empty() {
            return Err(CoreError::InvalidConfig(
                "destination place id must not be empty".to_string(),
            ));
        }

        let endpoint = self.directions_endpoint()?;
        let response = self
            .client
            .get(endpoint)
            .query(&[
                ("origin", format_origin(origin)),
                ("destination_place_id", destination_place_id.to_string()),
            ])
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|error| CoreError::Network(format!("failed fetching directions: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| CoreError::Network(format!("failed reading directions: {error}")))?;

        if !status.is_success() {
            let detail = if body.trim().is_empty() {
                "no error detail".to_string()
            } else {
                body.trim().to_string()
            };
            return Err(CoreError::RemoteRequestFailed {
                status: status.as_u16(),
                detail,
            });
        }

        let parsed = serde_json::from_str::<DirectionsPayload>(&body).map_err(|error| {
            CoreError::Network(format!("invalid directions payload: {error}; body={body}"))
        })?;
        Ok(parsed.encoded_polyline)
    }
}
