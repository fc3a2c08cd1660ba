//! Observable store of change requests for one session.
//!
//! The store owns every fetched change request, the flag data each one is
//! diffed against, and the paged lists shown on list pages. State is
//! published as immutable [`StoreSnapshot`]s over a `watch` channel; what
//! happened is published as [`StoreEvent`]s over a `broadcast` channel.
//!
//! Fetches are tagged with a per-key generation. A response is applied only
//! if no newer request for the same key was started in the meantime, so a
//! slow response can never overwrite a faster, newer one.

use crate::error::AppError;
use crate::models::{ChangeRequest, ChangeRequestFlags};
use crate::services::api_client::{
    page_param, ApiClient, ChangeRequestAction, ChangeRequestListQuery, PagedResponse,
};
use crate::services::clock::{Clock, SystemClock};
use crate::services::remote::ChangeRequestApi;
use crate::services::store_events::{ChangeRequestUpdateType, ListBucket, ListKey, StoreEvent};
use crate::settings::Settings;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};

/// Default number of change requests per list page.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Capacity of the event channel. Slow receivers skip older events.
const EVENT_CAPACITY: usize = 64;

/// Which page of a list to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRequest {
    /// Page 1.
    First,

    /// Jump straight to page `n`.
    Number(u32),

    /// A `next`/`previous` URL from an earlier response.
    Url(String),
}

/// One stored page of a change-request list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeRequestList {
    pub results: Vec<ChangeRequest>,

    /// Total across all pages.
    pub count: u32,

    pub next: Option<String>,
    pub previous: Option<String>,

    /// 1-based number of this page.
    pub page: u32,
}

impl ChangeRequestList {
    fn from_response(response: PagedResponse<ChangeRequest>, page: u32) -> Self {
        let results = response
            .results
            .into_iter()
            .filter(|cr| match cr.validate() {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("Skipping malformed change request {}: {}", cr.id, e);
                    false
                }
            })
            .collect();

        Self {
            results,
            count: response.count,
            next: response.next,
            previous: response.previous,
            page,
        }
    }
}

/// Immutable view of the store at one point in time.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    lists: HashMap<ListKey, ChangeRequestList>,
    models: HashMap<i64, ChangeRequest>,
    flags: HashMap<i64, ChangeRequestFlags>,
    errored: HashSet<i64>,
    list_errors: HashSet<ListKey>,
    in_flight: u32,
    saving: u32,
}

impl StoreSnapshot {
    pub fn list(&self, key: &ListKey) -> Option<&ChangeRequestList> {
        self.lists.get(key)
    }

    pub fn change_request(&self, id: i64) -> Option<&ChangeRequest> {
        self.models.get(&id)
    }

    pub fn flags(&self, id: i64) -> Option<&ChangeRequestFlags> {
        self.flags.get(&id)
    }

    /// Whether the last load of `id` failed.
    pub fn is_errored(&self, id: i64) -> bool {
        self.errored.contains(&id)
    }

    /// Whether the last load of the list failed.
    pub fn list_failed(&self, key: &ListKey) -> bool {
        self.list_errors.contains(key)
    }

    /// Whether any fetch is outstanding.
    pub fn is_loading(&self) -> bool {
        self.in_flight > 0
    }

    /// Whether any mutation is outstanding.
    pub fn is_saving(&self) -> bool {
        self.saving > 0
    }

    /// Replace `updated` wherever it appears in a cached list. A request that
    /// was just committed no longer belongs in open lists.
    fn replace_in_lists(&mut self, updated: &ChangeRequest) {
        for (key, list) in self.lists.iter_mut() {
            let Some(index) = list.results.iter().position(|cr| cr.id == updated.id) else {
                continue;
            };
            if key.bucket == ListBucket::Open && updated.is_committed() {
                list.results.remove(index);
                list.count = list.count.saturating_sub(1);
            } else {
                list.results[index] = updated.clone();
            }
        }
    }

    fn remove_from_lists(&mut self, id: i64, environment: &str) {
        for (key, list) in self.lists.iter_mut() {
            if key.environment != environment {
                continue;
            }
            let before = list.results.len();
            list.results.retain(|cr| cr.id != id);
            if list.results.len() < before {
                list.count = list.count.saturating_sub(1);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RequestKey {
    List(ListKey),
    One(i64),
}

#[derive(Debug, Default)]
struct Generations {
    next: u64,
    latest: HashMap<RequestKey, u64>,
}

impl Generations {
    fn begin(&mut self, key: RequestKey) -> u64 {
        self.next += 1;
        self.latest.insert(key, self.next);
        self.next
    }

    fn is_latest(&self, key: &RequestKey, generation: u64) -> bool {
        self.latest.get(key) == Some(&generation)
    }

    /// Make every outstanding fetch of a list matching `affected` stale.
    fn invalidate_lists(&mut self, mut affected: impl FnMut(&ListKey) -> bool) {
        let keys: Vec<RequestKey> = self
            .latest
            .keys()
            .filter(|k| matches!(k, RequestKey::List(key) if affected(key)))
            .cloned()
            .collect();
        for key in keys {
            self.begin(key);
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Counter {
    InFlight,
    Saving,
}

/// Keeps a busy counter raised while alive; dropping the future that owns
/// it lowers the counter again.
struct Busy<'a> {
    state: &'a watch::Sender<Arc<StoreSnapshot>>,
    counter: Counter,
}

impl<'a> Busy<'a> {
    fn start(state: &'a watch::Sender<Arc<StoreSnapshot>>, counter: Counter) -> Self {
        state.send_modify(|s| {
            let s = Arc::make_mut(s);
            match counter {
                Counter::InFlight => s.in_flight += 1,
                Counter::Saving => s.saving += 1,
            }
        });
        Self { state, counter }
    }
}

impl Drop for Busy<'_> {
    fn drop(&mut self) {
        let counter = self.counter;
        self.state.send_modify(|s| {
            let s = Arc::make_mut(s);
            match counter {
                Counter::InFlight => s.in_flight = s.in_flight.saturating_sub(1),
                Counter::Saving => s.saving = s.saving.saturating_sub(1),
            }
        });
    }
}

struct Inner<A> {
    api: A,
    clock: Arc<dyn Clock>,
    page_size: u32,
    state: watch::Sender<Arc<StoreSnapshot>>,
    events: broadcast::Sender<StoreEvent>,
    generations: Mutex<Generations>,
}

/// Change-request store.
///
/// Cloning is cheap; clones share state.
pub struct ChangeRequestStore<A> {
    inner: Arc<Inner<A>>,
}

impl<A> Clone for ChangeRequestStore<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl ChangeRequestStore<ApiClient> {
    /// Create a store talking to the API configured in `settings`, with its
    /// page size.
    pub fn from_settings(settings: &Settings) -> Result<Self, AppError> {
        settings.validate()?;
        let api = ApiClient::new(settings.api.clone())?;
        Ok(Self::with_options(api, Arc::new(SystemClock), settings.page_size))
    }
}

impl<A: ChangeRequestApi> ChangeRequestStore<A> {
    /// Create a store using wall-clock time and the default page size.
    pub fn new(api: A) -> Self {
        Self::with_options(api, Arc::new(SystemClock), DEFAULT_PAGE_SIZE)
    }

    pub fn with_options(api: A, clock: Arc<dyn Clock>, page_size: u32) -> Self {
        let (state, _) = watch::channel(Arc::new(StoreSnapshot::default()));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                api,
                clock,
                page_size: page_size.max(1),
                state,
                events,
                generations: Mutex::new(Generations::default()),
            }),
        }
    }

    /// Receive a new snapshot after every change. Dropping the receiver
    /// unsubscribes.
    pub fn subscribe(&self) -> watch::Receiver<Arc<StoreSnapshot>> {
        self.inner.state.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    /// Current state.
    pub fn snapshot(&self) -> Arc<StoreSnapshot> {
        self.inner.state.borrow().clone()
    }

    pub fn api(&self) -> &A {
        &self.inner.api
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    pub fn page_size(&self) -> u32 {
        self.inner.page_size
    }

    /// Load one page of a change-request list into `(environment, bucket)`.
    pub async fn fetch_list(
        &self,
        environment: &str,
        bucket: ListBucket,
        page: PageRequest,
    ) -> Result<ChangeRequestList, AppError> {
        let key = ListKey::new(environment, bucket);
        let request_key = RequestKey::List(key.clone());
        let generation = self.begin(request_key.clone()).await;

        log::debug!(
            "Fetching {:?} change requests for {} ({:?}, generation {})",
            bucket,
            environment,
            page,
            generation
        );

        let result = {
            let _busy = Busy::start(&self.inner.state, Counter::InFlight);
            match &page {
                PageRequest::Url(url) => self.inner.api.list_change_requests_at(url).await,
                PageRequest::First => {
                    let query = self.list_query(bucket, 1);
                    self.inner.api.list_change_requests(environment, &query).await
                }
                PageRequest::Number(n) => {
                    let query = self.list_query(bucket, *n);
                    self.inner.api.list_change_requests(environment, &query).await
                }
            }
        };

        match result {
            Ok(response) => {
                let page_number = match &page {
                    PageRequest::First => 1,
                    PageRequest::Number(n) => (*n).max(1),
                    PageRequest::Url(url) => page_param(url).unwrap_or(1),
                };
                let list = ChangeRequestList::from_response(response, page_number);

                let stored = list.clone();
                let applied = self
                    .apply_if_latest(&request_key, generation, |s| {
                        s.list_errors.remove(&key);
                        s.lists.insert(key.clone(), stored);
                    })
                    .await;
                if applied {
                    self.emit(StoreEvent::ListUpdated { key });
                }
                Ok(list)
            }
            Err(e) => {
                log::warn!(
                    "Failed to fetch {:?} change requests for {}: {}",
                    bucket,
                    environment,
                    e
                );
                let applied = self
                    .apply_if_latest(&request_key, generation, |s| {
                        s.list_errors.insert(key.clone());
                    })
                    .await;
                if applied {
                    self.emit(StoreEvent::ListFailed {
                        key,
                        message: e.to_string(),
                    });
                }
                Err(e)
            }
        }
    }

    /// Load a change request together with the project flag and the live
    /// environment flag of its feature.
    pub async fn fetch_one(
        &self,
        id: i64,
        project_id: i64,
        environment: &str,
    ) -> Result<ChangeRequest, AppError> {
        let request_key = RequestKey::One(id);
        let generation = self.begin(request_key.clone()).await;
        log::debug!("Fetching change request {} (generation {})", id, generation);

        let result = {
            let _busy = Busy::start(&self.inner.state, Counter::InFlight);
            self.load_one(id, project_id, environment).await
        };

        match result {
            Ok((change_request, flags)) => {
                let stored = change_request.clone();
                let applied = self
                    .apply_if_latest(&request_key, generation, |s| {
                        s.errored.remove(&id);
                        s.flags.insert(id, flags);
                        s.replace_in_lists(&stored);
                        s.models.insert(id, stored);
                    })
                    .await;
                if applied {
                    self.emit(StoreEvent::ChangeRequestUpdated {
                        id,
                        update_type: ChangeRequestUpdateType::Fetched,
                    });
                }
                Ok(change_request)
            }
            Err(e) => {
                log::warn!("Failed to fetch change request {}: {}", id, e);
                let applied = self
                    .apply_if_latest(&request_key, generation, |s| {
                        s.errored.insert(id);
                    })
                    .await;
                if applied {
                    self.emit(StoreEvent::ChangeRequestFailed {
                        id,
                        message: e.to_string(),
                    });
                }
                Err(e)
            }
        }
    }

    async fn load_one(
        &self,
        id: i64,
        project_id: i64,
        environment: &str,
    ) -> Result<(ChangeRequest, ChangeRequestFlags), AppError> {
        let change_request = self.inner.api.get_change_request(id).await?;
        change_request.validate()?;
        let flags = self
            .load_flags(&change_request, project_id, environment)
            .await?;
        Ok((change_request, flags))
    }

    async fn load_flags(
        &self,
        change_request: &ChangeRequest,
        project_id: i64,
        environment: &str,
    ) -> Result<ChangeRequestFlags, AppError> {
        let api = &self.inner.api;
        let feature = change_request
            .feature_state()
            .map(|fs| fs.feature)
            .ok_or_else(|| AppError::invalid_input("Change request has no feature state"))?;

        let (project_flag, environment_flag) = futures::try_join!(
            api.get_project_flag(project_id, feature),
            api.get_environment_flag(environment, feature),
        )?;
        if let Some(flag) = &environment_flag {
            flag.validate()?;
        }

        Ok(ChangeRequestFlags {
            project_flag: Some(project_flag),
            environment_flag,
        })
    }

    /// Reload only the flag data of a stored change request.
    ///
    /// A failure keeps the flags already stored and leaves the request's
    /// error flag alone.
    pub async fn refresh_flags(
        &self,
        id: i64,
        project_id: i64,
        environment: &str,
    ) -> Result<ChangeRequestFlags, AppError> {
        let change_request = self
            .snapshot()
            .change_request(id)
            .cloned()
            .ok_or_else(|| AppError::not_found_with_id("Change request", id.to_string()))?;

        let request_key = RequestKey::One(id);
        let generation = self.begin(request_key.clone()).await;
        log::debug!(
            "Refreshing flags of change request {} (generation {})",
            id,
            generation
        );

        let result = {
            let _busy = Busy::start(&self.inner.state, Counter::InFlight);
            self.load_flags(&change_request, project_id, environment).await
        };

        match result {
            Ok(flags) => {
                let stored = flags.clone();
                let applied = self
                    .apply_if_latest(&request_key, generation, |s| {
                        s.flags.insert(id, stored);
                    })
                    .await;
                if applied {
                    self.emit(StoreEvent::ChangeRequestUpdated {
                        id,
                        update_type: ChangeRequestUpdateType::Fetched,
                    });
                }
                Ok(flags)
            }
            Err(e) => {
                log::warn!("Failed to refresh flags of change request {}: {}", id, e);
                Err(e)
            }
        }
    }

    /// Save an edited change request.
    ///
    /// Committed requests cannot be edited. On failure the stored state is
    /// left as it was and a [`StoreEvent::Problem`] is emitted.
    pub async fn update(&self, change_request: ChangeRequest) -> Result<ChangeRequest, AppError> {
        if change_request.is_committed() {
            return Err(self.problem(AppError::invalid_input(
                "Committed change requests cannot be edited",
            )));
        }
        if let Err(e) = change_request.validate() {
            return Err(self.problem(e));
        }

        log::debug!("Saving change request {}", change_request.id);
        let result = {
            let _busy = Busy::start(&self.inner.state, Counter::Saving);
            self.inner.api.update_change_request(&change_request).await
        };

        match result {
            Ok(updated) => {
                self.store_model(updated.clone(), ChangeRequestUpdateType::Saved)
                    .await;
                Ok(updated)
            }
            Err(e) => Err(self.problem(e)),
        }
    }

    /// Approve or commit a change request. Returns the updated request.
    pub async fn act(
        &self,
        id: i64,
        action: ChangeRequestAction,
    ) -> Result<ChangeRequest, AppError> {
        log::info!("Change request {}: {}", id, action);
        let result = {
            let _busy = Busy::start(&self.inner.state, Counter::Saving);
            self.inner.api.change_request_action(id, action).await
        };

        match result {
            Ok(updated) => {
                let update_type = match action {
                    ChangeRequestAction::Approve => ChangeRequestUpdateType::Approved,
                    ChangeRequestAction::Commit => ChangeRequestUpdateType::Committed,
                };
                self.store_model(updated.clone(), update_type).await;
                Ok(updated)
            }
            Err(e) => Err(self.problem(e)),
        }
    }

    /// Delete a change request and forget it everywhere in `environment`.
    pub async fn remove(&self, id: i64, environment: &str) -> Result<(), AppError> {
        log::info!("Deleting change request {}", id);
        let result = {
            let _busy = Busy::start(&self.inner.state, Counter::Saving);
            self.inner.api.delete_change_request(id).await
        };

        if let Err(e) = result {
            return Err(self.problem(e));
        }

        // Anything still in flight for this id, or for a list of its
        // environment, describes a deleted request.
        let mut generations = self.inner.generations.lock().await;
        generations.begin(RequestKey::One(id));
        generations.invalidate_lists(|key| key.environment == environment);
        self.modify(|s| {
            s.models.remove(&id);
            s.flags.remove(&id);
            s.errored.remove(&id);
            s.remove_from_lists(id, environment);
        });
        drop(generations);

        self.emit(StoreEvent::ChangeRequestRemoved { id });
        Ok(())
    }

    fn list_query(&self, bucket: ListBucket, page: u32) -> ChangeRequestListQuery {
        let (committed, live_from_after) = match bucket {
            ListBucket::Open => (false, None),
            ListBucket::Committed => (true, None),
            ListBucket::Scheduled => (true, Some(self.now())),
        };

        ChangeRequestListQuery {
            committed: Some(committed),
            live_from_after,
            page: Some(page.max(1)),
            page_size: Some(self.inner.page_size),
        }
    }

    /// Store a change request returned by a mutation. Outstanding fetches of
    /// the same id and of any list become stale; the request carries no
    /// environment key to narrow the lists down.
    async fn store_model(&self, updated: ChangeRequest, update_type: ChangeRequestUpdateType) {
        let id = updated.id;
        let mut generations = self.inner.generations.lock().await;
        generations.begin(RequestKey::One(id));
        generations.invalidate_lists(|_| true);
        self.modify(|s| {
            s.errored.remove(&id);
            s.replace_in_lists(&updated);
            s.models.insert(id, updated);
        });
        drop(generations);

        self.emit(StoreEvent::ChangeRequestUpdated { id, update_type });
    }

    async fn begin(&self, key: RequestKey) -> u64 {
        self.inner.generations.lock().await.begin(key)
    }

    async fn apply_if_latest(
        &self,
        key: &RequestKey,
        generation: u64,
        apply: impl FnOnce(&mut StoreSnapshot),
    ) -> bool {
        let generations = self.inner.generations.lock().await;
        if !generations.is_latest(key, generation) {
            log::debug!(
                "Discarding stale response for {:?} (generation {})",
                key,
                generation
            );
            return false;
        }
        self.modify(apply);
        true
    }

    fn modify(&self, apply: impl FnOnce(&mut StoreSnapshot)) {
        self.inner.state.send_modify(|s| apply(Arc::make_mut(s)));
    }

    fn emit(&self, event: StoreEvent) {
        // No receivers is fine.
        let _ = self.inner.events.send(event);
    }

    fn problem(&self, error: AppError) -> AppError {
        log::warn!("Change request operation failed: {}", error);
        self.emit(StoreEvent::Problem {
            message: error.to_string(),
        });
        error
    }
}
