use crate::application::session::{with_authorized_retry, TokenSource};
use crate::domain::models::{
    validate_date, validate_hhmm, Itinerary, ScheduleEntry,
};
use crate::infrastructure::entry_mapper::{decode_itinerary, encode_new_item, encode_patch};
use crate::infrastructure::error::CoreError;
use crate::infrastructure::itinerary_api_client::ItineraryApiClient;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Destructive removals never run without an explicit user decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteConfirmation {
    Confirmed,
    Cancelled,
}

#[derive(Debug, Default)]
struct StoreState {
    itineraries: Vec<Itinerary>,
    selected_id: Option<String>,
    /// Entry ids with a mutation currently awaiting its remote response.
    in_flight: HashSet<String>,
}

/// Local source of truth for the loaded itineraries. Mutations are applied
/// optimistically: the local copy changes first, the remote call follows, and
/// a failed update restores the pre-mutation snapshot.
pub struct ScheduleStore<A, T>
where
    A: ItineraryApiClient,
    T: TokenSource,
{
    api: Arc<A>,
    tokens: Arc<T>,
    state: Mutex<StoreState>,
}

impl<A, T> ScheduleStore<A, T>
where
    A: ItineraryApiClient,
    T: TokenSource,
{
    pub fn new(api: Arc<A>, tokens: Arc<T>) -> Self {
        Self {
            api,
            tokens,
            state: Mutex::new(StoreState::default()),
        }
    }

    fn lock_state(&self) -> Result<std::sync::MutexGuard<'_, StoreState>, CoreError> {
        self.state
            .lock()
            .map_err(|_| CoreError::Validation("schedule state lock poisoned".to_string()))
    }

    pub async fn load_itineraries(&self) -> Result<Vec<Itinerary>, CoreError> {
        let payloads = with_authorized_retry(self.tokens.as_ref(), |token| {
            let api = Arc::clone(&self.api);
            async move { api.list_itineraries(&token).await }
        })
        .await?;

        let itineraries = payloads
            .iter()
            .map(decode_itinerary)
            .collect::<Result<Vec<_>, _>>()?;

        let mut state = self.lock_state()?;
        // Keep the selection only if the reloaded list still carries it.
        if let Some(selected) = &state.selected_id {
            if !itineraries.iter().any(|itinerary| &itinerary.id == selected) {
                state.selected_id = None;
            }
        }
        state.itineraries = itineraries.clone();
        Ok(itineraries)
    }

    pub fn itineraries(&self) -> Result<Vec<Itinerary>, CoreError> {
        Ok(self.lock_state()?.itineraries.clone())
    }

    pub fn select_itinerary(&self, itinerary_id: &str) -> Result<Itinerary, CoreError> {
        let mut state = self.lock_state()?;
        let found = state
            .itineraries
            .iter()
            .find(|itinerary| itinerary.id == itinerary_id)
            .cloned()
            .ok_or_else(|| CoreError::ItineraryNotFound(itinerary_id.to_string()))?;
        state.selected_id = Some(found.id.clone());
        Ok(found)
    }

    pub fn selected_itinerary(&self) -> Result<Option<Itinerary>, CoreError> {
        let state = self.lock_state()?;
        let Some(selected) = &state.selected_id else {
            return Ok(None);
        };
        Ok(state
            .itineraries
            .iter()
            .find(|itinerary| &itinerary.id == selected)
            .cloned())
    }

    /// Creates a new entry on the selected itinerary. Creation is not
    /// optimistic: the entry appears locally only once the server has
    /// assigned it an id.
    pub async fn create_entry(&self, entry: ScheduleEntry) -> Result<ScheduleEntry, CoreError> {
        entry.validate().map_err(CoreError::Validation)?;
        let itinerary_id = self
            .lock_state()?
            .selected_id
            .clone()
            .ok_or(CoreError::NoItinerarySelected)?;

        let payload = encode_new_item(&entry);
        let new_id = with_authorized_retry(self.tokens.as_ref(), |token| {
            let api = Arc::clone(&self.api);
            let payload = payload.clone();
            let itinerary_id = itinerary_id.clone();
            async move { api.create_entry(&token, &itinerary_id, &payload).await }
        })
        .await?;

        let mut stored = entry;
        stored.id = Some(new_id);

        let mut state = self.lock_state()?;
        if let Some(itinerary) = state
            .itineraries
            .iter_mut()
            .find(|itinerary| itinerary.id == itinerary_id)
        {
            itinerary.entries.push(stored.clone());
        }
        Ok(stored)
    }

    /// Reschedules an entry. The patch is applied locally before the remote
    /// call; a remote failure restores the snapshot and reports which entry
    /// was rolled back.
    pub async fn update_entry(
        &self,
        entry_id: &str,
        scheduled_date: &str,
        scheduled_time: &str,
        duration_minutes: i64,
    ) -> Result<(), CoreError> {
        validate_date(scheduled_date, "entry.scheduled_date").map_err(CoreError::Validation)?;
        validate_hhmm(scheduled_time, "entry.scheduled_time").map_err(CoreError::Validation)?;
        if duration_minutes < 1 {
            return Err(CoreError::Validation(format!(
                "duration must be at least one minute, got {duration_minutes}"
            )));
        }

        // No token means no local mutation either; the entry must not move
        // on screen when the save cannot even be attempted.
        self.tokens.current_token().await?;

        let snapshot = {
            let mut state = self.lock_state()?;
            if state.in_flight.contains(entry_id) {
                return Err(CoreError::ConcurrentMutation(entry_id.to_string()));
            }
            let entry = find_entry_mut(&mut state, entry_id)
                .ok_or_else(|| CoreError::EntryNotFound(entry_id.to_string()))?;
            let snapshot = entry.clone();
            entry.scheduled_date = scheduled_date.to_string();
            entry.scheduled_time = scheduled_time.to_string();
            entry.duration_minutes = duration_minutes;
            state.in_flight.insert(entry_id.to_string());
            snapshot
        };

        let patch = encode_patch(scheduled_date, scheduled_time, duration_minutes);
        let result = with_authorized_retry(self.tokens.as_ref(), |token| {
            let api = Arc::clone(&self.api);
            let patch = patch.clone();
            let entry_id = entry_id.to_string();
            async move { api.update_entry(&token, &entry_id, &patch).await }
        })
        .await;

        let mut state = self.lock_state()?;
        state.in_flight.remove(entry_id);
        match result {
            Ok(()) => Ok(()),
            Err(error) => {
                if let Some(entry) = find_entry_mut(&mut state, entry_id) {
                    *entry = snapshot.clone();
                }
                Err(CoreError::RollbackApplied {
                    entry: snapshot.place_name,
                    detail: error.to_string(),
                })
            }
        }
    }

    /// Removes an entry. The local removal is optimistic, and unlike updates
    /// it is not rolled back on failure: a failed delete leaves the entry
    /// absent locally until the next reload.
    pub async fn delete_entry(
        &self,
        entry_id: &str,
        confirmation: DeleteConfirmation,
    ) -> Result<(), CoreError> {
        if confirmation == DeleteConfirmation::Cancelled {
            return Ok(());
        }

        self.tokens.current_token().await?;

        {
            let mut state = self.lock_state()?;
            if state.in_flight.contains(entry_id) {
                return Err(CoreError::ConcurrentMutation(entry_id.to_string()));
            }
            if !remove_entry(&mut state, entry_id) {
                return Err(CoreError::EntryNotFound(entry_id.to_string()));
            }
            state.in_flight.insert(entry_id.to_string());
        }

        let result = with_authorized_retry(self.tokens.as_ref(), |token| {
            let api = Arc::clone(&self.api);
            let entry_id = entry_id.to_string();
            async move { api.delete_entry(&token, &entry_id).await }
        })
        .await;

        self.lock_state()?.in_flight.remove(entry_id);
        result
    }

    pub async fn delete_itinerary(&self, itinerary_id: &str) -> Result<(), CoreError> {
        with_authorized_retry(self.tokens.as_ref(), |token| {
            let api = Arc::clone(&self.api);
            let itinerary_id = itinerary_id.to_string();
            async move { api.delete_itinerary(&token, &itinerary_id).await }
        })
        .await?;

        let mut state = self.lock_state()?;
        state
            .itineraries
            .retain(|itinerary| itinerary.id != itinerary_id);
        if state.selected_id.as_deref() == Some(itinerary_id) {
            state.selected_id = None;
        }
        Ok(())
    }
}

impl<A, T> ScheduleStore<A, T>
where
    A: ItineraryApiClient,
    T: TokenSource,
{
    #[cfg(test)]
    pub(crate) fn seed_for_tests(&self, itineraries: Vec<Itinerary>, selected_id: Option<String>) {
        let mut state = self.state.lock().expect("state lock");
        state.itineraries = itineraries;
        state.selected_id = selected_id;
    }
}

fn find_entry_mut<'a>(state: &'a mut StoreState, entry_id: &str) -> Option<&'a mut ScheduleEntry> {
    let selected = state.selected_id.clone()?;
    state
        .itineraries
        .iter_mut()
        .find(|itinerary| itinerary.id == selected)?
        .entries
        .iter_mut()
        .find(|entry| entry.id.as_deref() == Some(entry_id))
}

fn remove_entry(state: &mut StoreState, entry_id: &str) -> bool {
    let Some(selected) = state.selected_id.clone() else {
        return false;
    };
    let Some(itinerary) = state
        .itineraries
        .iter_mut()
        .find(|itinerary| itinerary.id == selected)
    else {
        return false;
    };
    let before = itinerary.entries.len();
    itinerary
        .entries
        .retain(|entry| entry.id.as_deref() != Some(entry_id));
    itinerary.entries.len() < before
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ItineraryKind;
    use crate::infrastructure::entry_mapper::{
        ItineraryPayload, ScheduleItemPayload, SchedulePatchPayload,
    };
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct FakeApiClient {
        list_responses: Mutex<VecDeque<Result<Vec<ItineraryPayload>, CoreError>>>,
        create_responses: Mutex<VecDeque<Result<String, CoreError>>>,
        mutation_responses: Mutex<VecDeque<Result<(), CoreError>>>,
        update_calls: AtomicUsize,
        delete_calls: AtomicUsize,
    }

    impl FakeApiClient {
        fn push_mutation(&self, response: Result<(), CoreError>) {
            self.mutation_responses
                .lock()
                .expect("mutation lock")
                .push_back(response);
        }

        fn next_mutation(&self) -> Result<(), CoreError> {
            self.mutation_responses
                .lock()
                .expect("mutation lock")
                .pop_front()
                .unwrap_or(Ok(()))
        }
    }

    #[async_trait]
    impl ItineraryApiClient for FakeApiClient {
        async fn list_itineraries(
            &self,
            _access_token: &str,
        ) -> Result<Vec<ItineraryPayload>, CoreError> {
            self.list_responses
                .lock()
                .expect("list lock")
                .pop_front()
                .unwrap_or(Ok(Vec::new()))
        }

        async fn create_entry(
            &self,
            _access_token: &str,
            _itinerary_id: &str,
            _item: &ScheduleItemPayload,
        ) -> Result<String, CoreError> {
            self.create_responses
                .lock()
                .expect("create lock")
                .pop_front()
                .unwrap_or(Ok("generated-id".to_string()))
        }

        async fn update_entry(
            &self,
            _access_token: &str,
            _entry_id: &str,
            _patch: &SchedulePatchPayload,
        ) -> Result<(), CoreError> {
            self.update_calls.fetch_add(1, Ordering::SeqCst);
            self.next_mutation()
        }

        async fn delete_entry(&self, _access_token: &str, _entry_id: &str) -> Result<(), CoreError> {
            self.delete_calls.fetch_add(1, Ordering::SeqCst);
            self.next_mutation()
        }

        async fn delete_itinerary(
            &self,
            _access_token: &str,
            _itinerary_id: &str,
        ) -> Result<(), CoreError> {
            self.next_mutation()
        }
    }

    #[derive(Debug)]
    struct FakeTokenSource {
        authenticated: bool,
    }

    #[async_trait]
    impl TokenSource for FakeTokenSource {
        async fn current_token(&self) -> Result<String, CoreError> {
            if self.authenticated {
                Ok("token".to_string())
            } else {
                Err(CoreError::AuthenticationRequired)
            }
        }

        async fn refresh_now(&self) -> Result<String, CoreError> {
            self.current_token().await
        }

        fn invalidate(&self) {}
    }

    fn entry(id: &str, time: &str) -> ScheduleEntry {
        ScheduleEntry {
            id: Some(id.to_string()),
            place_id: format!("place-{id}"),
            place_name: format!("Place {id}"),
            description: None,
            place_type: None,
            address: None,
            rating: None,
            image_url: None,
            scheduled_date: "2025-06-01".to_string(),
            scheduled_time: time.to_string(),
            duration_minutes: 60,
        }
    }

    fn seeded_store(
        entries: Vec<ScheduleEntry>,
    ) -> (Arc<FakeApiClient>, ScheduleStore<FakeApiClient, FakeTokenSource>) {
        let api = Arc::new(FakeApiClient::default());
        let store = ScheduleStore::new(
            Arc::clone(&api),
            Arc::new(FakeTokenSource { authenticated: true }),
        );
        {
            let mut state = store.state.lock().expect("state lock");
            state.itineraries = vec![Itinerary {
                id: "itn-1".to_string(),
                name: "Kyoto".to_string(),
                kind: ItineraryKind::Custom,
                budget: None,
                start_date: "2025-06-01".to_string(),
                end_date: "2025-06-05".to_string(),
                entries,
            }];
            state.selected_id = Some("itn-1".to_string());
        }
        (api, store)
    }

    fn current_entry(
        store: &ScheduleStore<FakeApiClient, FakeTokenSource>,
        entry_id: &str,
    ) -> Option<ScheduleEntry> {
        store
            .selected_itinerary()
            .expect("state readable")
            .and_then(|itinerary| {
                itinerary
                    .entries
                    .into_iter()
                    .find(|entry| entry.id.as_deref() == Some(entry_id))
            })
    }

    #[tokio::test]
    async fn update_applies_optimistically_and_persists_on_success() {
        let (api, store) = seeded_store(vec![entry("e1", "09:00")]);

        store
            .update_entry("e1", "2025-06-02", "14:30", 90)
            .await
            .expect("update succeeds");

        let updated = current_entry(&store, "e1").expect("entry present");
        assert_eq!(updated.scheduled_date, "2025-06-02");
        assert_eq!(updated.scheduled_time, "14:30");
        assert_eq!(updated.duration_minutes, 90);
        assert_eq!(api.update_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_update_restores_the_exact_snapshot() {
        let (api, store) = seeded_store(vec![entry("e1", "09:00")]);
        api.push_mutation(Err(CoreError::RemoteRequestFailed {
            status: 500,
            detail: "server error".to_string(),
        }));

        let result = store.update_entry("e1", "2025-06-02", "14:30", 90).await;

        match result {
            Err(CoreError::RollbackApplied { entry, detail }) => {
                assert_eq!(entry, "Place e1");
                assert!(detail.contains("500"));
            }
            other => panic!("expected rollback error, got {other:?}"),
        }
        let restored = current_entry(&store, "e1").expect("entry present");
        assert_eq!(restored.scheduled_date, "2025-06-01");
        assert_eq!(restored.scheduled_time, "09:00");
        assert_eq!(restored.duration_minutes, 60);
    }

    #[tokio::test]
    async fn update_without_session_leaves_local_state_untouched() {
        let api = Arc::new(FakeApiClient::default());
        let store = ScheduleStore::new(
            Arc::clone(&api),
            Arc::new(FakeTokenSource {
                authenticated: false,
            }),
        );
        {
            let mut state = store.state.lock().expect("state lock");
            state.itineraries = vec![Itinerary {
                id: "itn-1".to_string(),
                name: "Kyoto".to_string(),
                kind: ItineraryKind::Custom,
                budget: None,
                start_date: "2025-06-01".to_string(),
                end_date: "2025-06-05".to_string(),
                entries: vec![entry("e1", "09:00")],
            }];
            state.selected_id = Some("itn-1".to_string());
        }

        let result = store.update_entry("e1", "2025-06-02", "14:30", 90).await;

        assert!(matches!(result, Err(CoreError::AuthenticationRequired)));
        let untouched = current_entry(&store, "e1").expect("entry present");
        assert_eq!(untouched.scheduled_time, "09:00");
        assert_eq!(api.update_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn update_rejects_malformed_patch_before_any_change() {
        let (api, store) = seeded_store(vec![entry("e1", "09:00")]);

        assert!(matches!(
            store.update_entry("e1", "2025-06-02", "25:00", 90).await,
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            store.update_entry("e1", "2025-06-02", "14:30", 0).await,
            Err(CoreError::Validation(_))
        ));
        assert_eq!(api.update_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancelled_delete_is_a_no_op() {
        let (api, store) = seeded_store(vec![entry("e1", "09:00")]);

        store
            .delete_entry("e1", DeleteConfirmation::Cancelled)
            .await
            .expect("cancel is ok");

        assert!(current_entry(&store, "e1").is_some());
        assert_eq!(api.delete_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_delete_does_not_resurrect_the_entry() {
        let (api, store) = seeded_store(vec![entry("e1", "09:00")]);
        api.push_mutation(Err(CoreError::RemoteRequestFailed {
            status: 500,
            detail: "server error".to_string(),
        }));

        let result = store.delete_entry("e1", DeleteConfirmation::Confirmed).await;

        assert!(matches!(
            result,
            Err(CoreError::RemoteRequestFailed { status: 500, .. })
        ));
        // The optimistic removal stands even though the remote call failed.
        assert!(current_entry(&store, "e1").is_none());
    }

    #[tokio::test]
    async fn create_appends_entry_with_server_assigned_id() {
        let (_, store) = seeded_store(vec![]);
        let mut draft = entry("unused", "11:00");
        draft.id = None;

        let stored = store.create_entry(draft).await.expect("create succeeds");

        assert_eq!(stored.id.as_deref(), Some("generated-id"));
        let itinerary = store
            .selected_itinerary()
            .expect("state readable")
            .expect("selected");
        assert_eq!(itinerary.entries.len(), 1);
        assert_eq!(itinerary.entries[0].id.as_deref(), Some("generated-id"));
    }

    #[tokio::test]
    async fn delete_itinerary_removes_it_and_clears_selection() {
        let (_, store) = seeded_store(vec![entry("e1", "09:00")]);

        store
            .delete_itinerary("itn-1")
            .await
            .expect("delete succeeds");

        assert!(store.itineraries().expect("readable").is_empty());
        assert!(store.selected_itinerary().expect("readable").is_none());
    }

    #[tokio::test]
    async fn second_mutation_for_same_entry_is_rejected_while_in_flight() {
        let (api, store) = seeded_store(vec![entry("e1", "09:00")]);
        store
            .state
            .lock()
            .expect("state lock")
            .in_flight
            .insert("e1".to_string());

        let update = store.update_entry("e1", "2025-06-02", "14:30", 90).await;
        assert!(matches!(update, Err(CoreError::ConcurrentMutation(_))));

        let delete = store.delete_entry("e1", DeleteConfirmation::Confirmed).await;
        assert!(matches!(delete, Err(CoreError::ConcurrentMutation(_))));

        assert_eq!(api.update_calls.load(Ordering::SeqCst), 0);
        assert_eq!(api.delete_calls.load(Ordering::SeqCst), 0);
        let untouched = current_entry(&store, "e1").expect("entry present");
        assert_eq!(untouched.scheduled_time, "09:00");
    }

    #[tokio::test]
    async fn selecting_unknown_itinerary_fails() {
        let (_, store) = seeded_store(vec![]);
        assert!(matches!(
            store.select_itinerary("missing"),
            Err(CoreError::ItineraryNotFound(_))
        ));
    }
}
