use crate::infrastructure::entry_mapper::{
    ItineraryPayload, ScheduleItemPayload, SchedulePatchPayload,
};
use crate::infrastructure::error::CoreError;
use async_trait::async_trait;
use reqwest::Client;
use url::Url;

#[async_trait]
pub trait ItineraryApiClient: Send + Sync {
    async fn list_itineraries(&self, access_token: &str) -> Result<Vec<ItineraryPayload>, CoreError>;

    async fn create_entry(
        &self,
        access_token: &str,
        itinerary_id: &str,
        item: &ScheduleItemPayload,
    ) -> Result<String, CoreError>;

    async fn update_entry(
        &self,
        access_token: &str,
        entry_id: &str,
        patch: &SchedulePatchPayload,
    ) -> Result<(), CoreError>;

    async fn delete_entry(&self, access_token: &str, entry_id: &str) -> Result<(), CoreError>;

    async fn delete_itinerary(&self, access_token: &str, itinerary_id: &str)
        -> Result<(), CoreError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestItineraryApiClient {
    client: Client,
    base_url: Url,
}

#[derive(Debug, serde::Deserialize)]
struct ErrorDetailPayload {
    detail: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct CreatedItemPayload {
    id: String,
}

impl ReqwestItineraryApiClient {
    pub fn new(base_url: &str) -> Result<Self, CoreError> {
        let base_url = Url::parse(base_url)
            .map_err(|error| CoreError::InvalidConfig(format!("invalid api base url: {error}")))?;
        Ok(Self {
            client: Client::new(),
            base_url,
        })
    }

    fn endpoint(&self, segments: &[&str], trailing_slash: bool) -> Result<Url, CoreError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| CoreError::InvalidConfig("api base URL cannot be a base".to_string()))?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
            if trailing_slash {
                path.push("");
            }
        }
        Ok(url)
    }

    fn http_error(status: reqwest::StatusCode, body: &str) -> CoreError {
        let detail = serde_json::from_str::<ErrorDetailPayload>(body)
            .ok()
            .and_then(|parsed| parsed.detail)
            .unwrap_or_else(|| {
                if body.trim().is_empty() {
                    "no error detail".to_string()
                } else {
                    body.trim().to_string()
                }
            });
        CoreError::RemoteRequestFailed {
            status: status.as_u16(),
            detail,
        }
    }

    fn ensure_non_empty(value: &str, field: &str) -> Result<(), CoreError> {
        if value.trim().is_empty() {
            return Err(CoreError::InvalidConfig(format!("{field} must not be empty")));
        }
        Ok(())
    }
}

#[async_trait]
impl ItineraryApiClient for ReqwestItineraryApiClient {
    async fn list_itineraries(&self, access_token: &str) -> Result<Vec<ItineraryPayload>, CoreError> {
        Self::ensure_non_empty(access_token, "access token")?;

        let endpoint = self.endpoint(&["itineraries"], true)?;
        let response = self
            .client
            .get(endpoint)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|error| CoreError::Network(format!("failed listing itineraries: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| CoreError::Network(format!("failed reading itinerary list: {error}")))?;

        if !status.is_success() {
            return Err(Self::http_error(status, &body));
        }

        serde_json::from_str::<Vec<ItineraryPayload>>(&body).map_err(|error| {
            CoreError::Network(format!("invalid itinerary list payload: {error}; body={body}"))
        })
    }

    async fn create_entry(
        &self,
        access_token: &str,
        itinerary_id: &str,
        item: &ScheduleItemPayload,
    ) -> Result<String, CoreError> {
        Self::ensure_non_empty(access_token, "access token")?;
        Self::ensure_non_empty(itinerary_id, "itinerary id")?;

        let endpoint = self.endpoint(&["itineraries", itinerary_id, "items"], false)?;
        let response = self
            .client
            .post(endpoint)
            .bearer_auth(access_token)
            .json(item)
            .send()
            .await
            .map_err(|error| CoreError::Network(format!("failed creating schedule item: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| CoreError::Network(format!("failed reading create response: {error}")))?;

        if !status.is_success() {
            return Err(Self::http_error(status, &body));
        }

        let parsed = serde_json::from_str::<CreatedItemPayload>(&body).map_err(|error| {
            CoreError::Network(format!("invalid create payload: {error}; body={body}"))
        })?;
        let id = parsed.id.trim().to_string();
        if id.is_empty() {
            return Err(CoreError::Network(
                "create response did not include an id".to_string(),
            ));
        }
        Ok(id)
    }

    async fn update_entry(
        &self,
        access_token: &str,
        entry_id: &str,
        patch: &SchedulePatchPayload,
    ) -> Result<(), CoreError> {
        Self::ensure_non_empty(access_token, "access token")?;
        Self::ensure_non_empty(entry_id, "entry id")?;

        let endpoint = self.endpoint(&["itineraries", "items", entry_id], false)?;
        let response = self
            .client
            .put(endpoint)
            .bearer_auth(access_token)
            .json(patch)
            .send()
            .await
            .map_err(|error| CoreError::Network(format!("failed updating schedule item: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| CoreError::Network(format!("failed reading update response: {error}")))?;

        if !status.is_success() {
            return Err(Self::http_error(status, &body));
        }
        Ok(())
    }

    async fn delete_entry(&self, access_token: &str, entry_id: &str) -> Result<(), CoreError> {
        Self::ensure_non_empty(access_token, "access token")?;
        Self::ensure_non_empty(entry_id, "entry id")?;

        let endpoint = self.endpoint(&["itineraries", "items", entry_id], false)?;
        let response = self
            .client
            .delete(endpoint)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|error| CoreError::Network(format!("failed deleting schedule item: {error}")))?;

        // Only an empty 204-style success counts; a 200 with an error body is
        // still a failed delete.
        let status = response.status();
        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(());
        }
        let body = response
            .text()
            .await
            .map_err(|error| CoreError::Network(format!("failed reading delete response: {error}")))?;
        Err(Self::http_error(status, &body))
    }

    async fn delete_itinerary(
        &self,
        access_token: &str,
        itinerary_id: &str,
    ) -> Result<(), CoreError> {
        Self::ensure_non_empty(access_token, "access token")?;
        Self::ensure_non_empty(itinerary_id, "itinerary id")?;

        let endpoint = self.endpoint(&["itineraries", itinerary_id], false)?;
        let response = self
            .client
            .delete(endpoint)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|error| CoreError::Network(format!("failed deleting itinerary: {error}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response
            .text()
            .await
            .map_err(|error| CoreError::Network(format!("failed reading delete response: {error}")))?;
        Err(Self::http_error(status, &body))
    }
}
