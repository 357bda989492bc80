use crate::application::session::{with_authorized_retry, TokenSource};
use crate::domain::models::{LatLng, LatLngBounds};
use crate::infrastructure::directions_client::{DirectionsClient, LocationProvider};
use crate::infrastructure::error::CoreError;
use crate::infrastructure::polyline::{bounding_viewport, decode_polyline};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub struct RouteOverlay {
    pub destination_place_id: String,
    pub path: Vec<LatLng>,
    pub bounds: LatLngBounds,
}

/// Fetches and holds the route currently drawn on the map. Each toggle or
/// cancellation bumps an epoch counter; a fetch whose epoch is stale by the
/// time its response arrives is discarded rather than applied.
pub struct RouteOverlayFetcher<D, L, T>
where
    D: DirectionsClient,
    L: LocationProvider,
    T: TokenSource,
{
    directions: Arc<D>,
    location: Arc<L>,
    tokens: Arc<T>,
    overlay: Mutex<Option<RouteOverlay>>,
    epoch: AtomicU64,
}

impl<D, L, T> RouteOverlayFetcher<D, L, T>
where
    D: DirectionsClient,
    L: LocationProvider,
    T: TokenSource,
{
    pub fn new(directions: Arc<D>, location: Arc<L>, tokens: Arc<T>) -> Self {
        Self {
            directions,
            location,
            tokens,
            overlay: Mutex::new(None),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn current_overlay(&self) -> Option<RouteOverlay> {
        self.overlay.lock().ok().and_then(|guard| guard.clone())
    }

    /// Shows the route to `destination_place_id`, or hides it if that same
    /// route is already shown. Hiding never issues a network request.
    pub async fn toggle_route(
        &self,
        destination_place_id: &str,
    ) -> Result<Option<RouteOverlay>, CoreError> {
        {
            let mut guard = self
                .overlay
                .lock()
                .map_err(|_| CoreError::Validation("route overlay lock poisoned".to_string()))?;
            if guard
                .as_ref()
                .is_some_and(|overlay| overlay.destination_place_id == destination_place_id)
            {
                *guard = None;
                self.epoch.fetch_add(1, Ordering::SeqCst);
                return Ok(None);
            }
        }

        let ticket = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let origin = self.location.current_position()?;

        let encoded = with_authorized_retry(self.tokens.as_ref(), |token| {
            let directions = Arc::clone(&self.directions);
            let destination = destination_place_id.to_string();
            async move { directions.fetch_route(&token, origin, &destination).await }
        })
        .await?;

        let path = decode_polyline(&encoded)?;
        let bounds = bounding_viewport(&path)
            .ok_or_else(|| CoreError::InvalidPolyline("route has no coordinates".to_string()))?;

        // A newer toggle or an explicit cancel superseded this fetch.
        if self.epoch.load(Ordering::SeqCst) != ticket {
            return Ok(None);
        }

        let overlay = RouteOverlay {
            destination_place_id: destination_place_id.to_string(),
            path,
            bounds,
        };
        if let Ok(mut guard) = self.overlay.lock() {
            *guard = Some(overlay.clone());
        }
        Ok(Some(overlay))
    }

    /// Invalidates any in-flight fetch without touching the shown overlay.
    pub fn cancel_pending(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Hides the overlay and invalidates any in-flight fetch.
    pub fn clear(&self) {
        self.cancel_pending();
        if let Ok(mut guard) = self.overlay.lock() {
            *guard = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::directions_client::StaticLocationProvider;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    // Reference encoding of [(38.5, -120.2), (40.7, -120.95), (43.252, -126.453)].
    const ENCODED: &str = "_p~iF~ps|U_ulLnnqC_mqNvxq`@";

    struct FakeDirectionsClient {
        fetch_calls: AtomicUsize,
        entered: Notify,
        release: Notify,
        blocking: bool,
    }

    impl FakeDirectionsClient {
        fn immediate() -> Self {
            Self {
                fetch_calls: AtomicUsize::new(0),
                entered: Notify::new(),
                release: Notify::new(),
                blocking: false,
            }
        }

        fn blocking() -> Self {
            Self {
                blocking: true,
                ..Self::immediate()
            }
        }
    }

    #[async_trait]
    impl DirectionsClient for FakeDirectionsClient {
        async fn fetch_route(
            &self,
            _access_token: &str,
            _origin: LatLng,
            _destination_place_id: &str,
        ) -> Result<String, CoreError> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            if self.blocking {
                self.entered.notify_one();
                self.release.notified().await;
            }
            Ok(ENCODED.to_string())
        }
    }

    struct FakeTokenSource;

    #[async_trait]
    impl TokenSource for FakeTokenSource {
        async fn current_token(&self) -> Result<String, CoreError> {
            Ok("token".to_string())
        }

        async fn refresh_now(&self) -> Result<String, CoreError> {
            Ok("token".to_string())
        }

        fn invalidate(&self) {}
    }

    fn fetcher(
        directions: Arc<FakeDirectionsClient>,
        position: Option<LatLng>,
    ) -> Arc<RouteOverlayFetcher<FakeDirectionsClient, StaticLocationProvider, FakeTokenSource>>
    {
        Arc::new(RouteOverlayFetcher::new(
            directions,
            Arc::new(StaticLocationProvider::new(position)),
            Arc::new(FakeTokenSource),
        ))
    }

    fn origin() -> LatLng {
        LatLng { lat: 35.0, lng: 135.7 }
    }

    #[tokio::test]
    async fn toggle_fetches_and_decodes_the_route() {
        let directions = Arc::new(FakeDirectionsClient::immediate());
        let fetcher = fetcher(Arc::clone(&directions), Some(origin()));

        let overlay = fetcher
            .toggle_route("place-1")
            .await
            .expect("fetch succeeds")
            .expect("route shown");

        assert_eq!(overlay.destination_place_id, "place-1");
        assert_eq!(overlay.path.len(), 3);
        assert!((overlay.path[0].lat - 38.5).abs() < 1e-9);
        assert!((overlay.bounds.south_west.lng - (-126.453)).abs() < 1e-9);
        assert_eq!(fetcher.current_overlay(), Some(overlay));
    }

    #[tokio::test]
    async fn toggling_the_same_destination_hides_without_a_request() {
        let directions = Arc::new(FakeDirectionsClient::immediate());
        let fetcher = fetcher(Arc::clone(&directions), Some(origin()));

        fetcher.toggle_route("place-1").await.expect("first toggle");
        let hidden = fetcher.toggle_route("place-1").await.expect("second toggle");

        assert!(hidden.is_none());
        assert!(fetcher.current_overlay().is_none());
        assert_eq!(directions.fetch_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn toggling_a_different_destination_replaces_the_route() {
        let directions = Arc::new(FakeDirectionsClient::immediate());
        let fetcher = fetcher(Arc::clone(&directions), Some(origin()));

        fetcher.toggle_route("place-1").await.expect("first toggle");
        let replaced = fetcher
            .toggle_route("place-2")
            .await
            .expect("second toggle")
            .expect("route shown");

        assert_eq!(replaced.destination_place_id, "place-2");
        assert_eq!(directions.fetch_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn missing_device_location_fails_without_a_request() {
        let directions = Arc::new(FakeDirectionsClient::immediate());
        let fetcher = fetcher(Arc::clone(&directions), None);

        let result = fetcher.toggle_route("place-1").await;

        assert!(matches!(result, Err(CoreError::LocationUnavailable(_))));
        assert!(fetcher.current_overlay().is_none());
        assert_eq!(directions.fetch_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancelled_fetch_discards_its_result() {
        let directions = Arc::new(FakeDirectionsClient::blocking());
        let fetcher = fetcher(Arc::clone(&directions), Some(origin()));

        let pending = tokio::spawn({
            let fetcher = Arc::clone(&fetcher);
            async move { fetcher.toggle_route("place-1").await }
        });

        directions.entered.notified().await;
        fetcher.cancel_pending();
        directions.release.notify_one();

        let outcome = pending.await.expect("task joins").expect("no error");
        assert!(outcome.is_none());
        assert!(fetcher.current_overlay().is_none());
    }
}
