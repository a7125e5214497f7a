//! Cursor-stack pagination over one tag's reviews.
//!
//! The controller is the only writer of [`PanelState`]. State lives behind a
//! mutex that is released before every request, and at most one fetch is in
//! flight: navigation attempted while one is pending is a silent no-op. Each
//! fetch carries the generation it was issued under, and a response is only
//! applied while that generation is still the latest one.
//!
//! The pending request is tracked outside the mutex so a caller that drops a
//! navigation future mid-request (a timeout, an aborted task) releases it.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use shared::{
    domain::{Cursor, ReviewId, SettingsId},
    protocol::{KeysetPage, PanelSettings, ReviewRecord},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::{
    api::{ReviewsApi, MAX_PAGE_SIZE, MIN_PAGE_SIZE},
    error::PanelError,
    rating::{DisplayRating, RatingAggregator, RatingSnapshot},
};

pub const DEFAULT_PAGE_SIZE: u32 = 10;

const IDLE: u64 = 0;

/// The page on screen plus the `before` bounds that led to it.
#[derive(Debug, Clone, PartialEq)]
pub struct PageState {
    items: Vec<ReviewRecord>,
    next_cursor: Option<Cursor>,
    // Never empty; the bottom entry is always `None`.
    cursor_stack: Vec<Option<Cursor>>,
}

impl Default for PageState {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
            cursor_stack: vec![None],
        }
    }
}

impl PageState {
    pub fn items(&self) -> &[ReviewRecord] {
        &self.items
    }

    pub fn next_cursor(&self) -> Option<&Cursor> {
        self.next_cursor.as_ref()
    }

    pub fn cursor_stack(&self) -> &[Option<Cursor>] {
        &self.cursor_stack
    }

    /// The `before` bound the current page was fetched with.
    pub fn current_before(&self) -> Option<&Cursor> {
        self.cursor_stack.last().and_then(Option::as_ref)
    }

    pub fn can_go_back(&self) -> bool {
        self.cursor_stack.len() > 1
    }

    pub fn has_next(&self) -> bool {
        self.next_cursor.is_some()
    }

    fn previous_before(&self) -> Option<Option<Cursor>> {
        let depth = self.cursor_stack.len();
        if depth < 2 {
            return None;
        }
        Some(self.cursor_stack[depth - 2].clone())
    }

    fn reset_stack(&mut self) {
        self.cursor_stack.truncate(1);
    }

    fn replace(&mut self, page: KeysetPage, commit: StackCommit) {
        match commit {
            StackCommit::Push(cursor) => self.cursor_stack.push(Some(cursor)),
            StackCommit::Pop => {
                if self.can_go_back() {
                    self.cursor_stack.pop();
                }
            }
            StackCommit::Keep => {}
        }
        self.items = page.items;
        self.next_cursor = page.next_cursor;
    }

    fn clear_items(&mut self) {
        self.items.clear();
        self.next_cursor = None;
    }

    fn remove(&mut self, id: &ReviewId) -> bool {
        let before = self.items.len();
        self.items.retain(|item| &item.id != id);
        self.items.len() != before
    }
}

/// Which configuration and tag scope the visible reviews.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSelector {
    settings_id: Option<SettingsId>,
    tag: Option<String>,
    tags: Vec<String>,
}

impl FilterSelector {
    pub fn settings_id(&self) -> Option<&SettingsId> {
        self.settings_id.as_ref()
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    fn configure(&mut self, settings: &PanelSettings) {
        self.settings_id = Some(settings.id.clone()).filter(|id| !id.is_empty());
        self.tags = settings.tags.clone();
    }

    fn select(&mut self, tag: Option<&str>) {
        self.tag = tag
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_string);
    }

    fn active(&self) -> Option<(SettingsId, String)> {
        Some((self.settings_id.clone()?, self.tag.clone()?))
    }
}

/// Everything a renderer needs, cloned out by [`PageCursorController::snapshot`].
#[derive(Debug, Clone)]
pub struct PanelState {
    pub filter: FilterSelector,
    pub page: PageState,
    pub rating: RatingAggregator,
    pub settings: Option<PanelSettings>,
    pub page_size: u32,
    /// A request is pending. Filled in by [`PageCursorController::snapshot`].
    pub loading: bool,
    /// An optimistic removal was never reconciled with the server. Filled in by
    /// [`PageCursorController::snapshot`].
    pub needs_refresh: bool,
}

impl Default for PanelState {
    fn default() -> Self {
        Self {
            filter: FilterSelector::default(),
            page: PageState::default(),
            rating: RatingAggregator::default(),
            settings: None,
            page_size: DEFAULT_PAGE_SIZE,
            loading: false,
            needs_refresh: false,
        }
    }
}

impl PanelState {
    fn clear(&mut self) {
        self.page = PageState::default();
        self.rating.reset();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Busy,
    NoNextPage,
    AtFirstPage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied,
    /// No configuration id or tag; the panel was emptied without a request.
    Cleared,
    /// A newer generation was issued while this request was pending.
    Stale,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PanelEvent {
    SettingsLoaded {
        tags: Vec<String>,
    },
    PageLoaded {
        tag: String,
        items: usize,
        has_next: bool,
        review_count: u64,
        rating: DisplayRating,
    },
    Cleared,
    FetchFailed {
        tag: Option<String>,
        message: String,
    },
    ReviewRemoved {
        id: ReviewId,
    },
    DeleteFailed {
        id: ReviewId,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum StackCommit {
    Push(Cursor),
    Pop,
    Keep,
}

#[derive(Debug)]
struct FetchTicket {
    generation: u64,
    settings_id: SettingsId,
    tag: String,
    limit: u32,
    before: Option<Cursor>,
    commit: StackCommit,
}

enum Plan {
    Skip(SkipReason),
    Clear,
    Fetch(FetchTicket),
}

#[derive(Default)]
struct ControllerState {
    panel: PanelState,
    generation: u64,
}

impl ControllerState {
    fn issue(&mut self, before: Option<Cursor>, commit: StackCommit) -> Plan {
        let Some((settings_id, tag)) = self.panel.filter.active() else {
            self.panel.clear();
            return Plan::Clear;
        };
        self.generation += 1;
        Plan::Fetch(FetchTicket {
            generation: self.generation,
            settings_id,
            tag,
            limit: self.panel.page_size,
            before,
            commit,
        })
    }

    fn plan_initial(&mut self, tag: Option<&str>, page_size: u32) -> Plan {
        self.panel.filter.select(tag);
        self.panel.page_size = page_size.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE);
        self.panel.page.reset_stack();
        self.issue(None, StackCommit::Keep)
    }

    fn plan_next(&mut self) -> Plan {
        let Some(next) = self.panel.page.next_cursor.clone() else {
            return Plan::Skip(SkipReason::NoNextPage);
        };
        self.issue(Some(next.clone()), StackCommit::Push(next))
    }

    fn plan_back(&mut self) -> Plan {
        let Some(before) = self.panel.page.previous_before() else {
            return Plan::Skip(SkipReason::AtFirstPage);
        };
        self.issue(before, StackCommit::Pop)
    }

    fn plan_refresh(&mut self) -> Plan {
        let before = self.panel.page.current_before().cloned();
        self.issue(before, StackCommit::Keep)
    }

    /// Drops whatever is pending; its response will be discarded as stale.
    fn invalidate(&mut self) {
        self.generation += 1;
        self.panel.clear();
    }
}

/// Holds the controller's pending-request slot for one generation. Releasing is a
/// no-op once a newer generation has taken the slot.
struct InFlight<'a> {
    slot: &'a AtomicU64,
    generation: u64,
}

impl InFlight<'_> {
    fn release(&self) {
        let _ = self.slot.compare_exchange(
            self.generation,
            IDLE,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

pub struct PageCursorController {
    api: ReviewsApi,
    state: Mutex<ControllerState>,
    events: broadcast::Sender<PanelEvent>,
    // Generation of the pending request, or `IDLE`.
    in_flight: AtomicU64,
    unreconciled: AtomicBool,
}

impl PageCursorController {
    pub fn new(api: ReviewsApi) -> Arc<Self> {
        Self::with_state(api, ControllerState::default())
    }

    /// For callers that already know the configuration id and skip [`Self::load_settings`].
    pub fn new_with_settings_id(api: ReviewsApi, settings_id: SettingsId) -> Arc<Self> {
        let mut state = ControllerState::default();
        state.panel.filter.settings_id = Some(settings_id).filter(|id| !id.is_empty());
        Self::with_state(api, state)
    }

    pub fn new_with_page_size(api: ReviewsApi, page_size: u32) -> Arc<Self> {
        let mut state = ControllerState::default();
        state.panel.page_size = page_size.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE);
        Self::with_state(api, state)
    }

    fn with_state(api: ReviewsApi, state: ControllerState) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            api,
            state: Mutex::new(state),
            events,
            in_flight: AtomicU64::new(IDLE),
            unreconciled: AtomicBool::new(false),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PanelEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> PanelState {
        let mut panel = self.state.lock().await.panel.clone();
        panel.loading = self.is_busy();
        panel.needs_refresh = self.needs_refresh();
        panel
    }

    pub async fn is_loading(&self) -> bool {
        self.is_busy()
    }

    /// True when a removal was abandoned before its reconciling fetch ran, so the
    /// visible page may not match the server until the next page load.
    pub fn needs_refresh(&self) -> bool {
        self.unreconciled.load(Ordering::Acquire)
    }

    pub async fn can_go_back(&self) -> bool {
        self.state.lock().await.panel.page.can_go_back()
    }

    pub async fn has_next(&self) -> bool {
        self.state.lock().await.panel.page.has_next()
    }

    pub async fn rating(&self) -> RatingSnapshot {
        self.state.lock().await.panel.rating.snapshot()
    }

    /// Fetches the configuration, selects its first tag and loads the first page.
    ///
    /// The configuration is stored even if a filter change overtook the request;
    /// the page for the tag chosen since then is loaded instead of the first tag.
    pub async fn load_settings(&self) -> Result<FetchOutcome, PanelError> {
        let in_flight = {
            let mut state = self.state.lock().await;
            if self.is_busy() {
                debug!("settings load rejected: fetch already in flight");
                return Ok(FetchOutcome::Skipped(SkipReason::Busy));
            }
            state.generation += 1;
            self.claim(state.generation)
        };

        let result = self.api.settings().await;

        let pending = {
            let mut state = self.state.lock().await;
            let current = state.generation == in_flight.generation;
            in_flight.release();

            let settings = match result {
                Ok(settings) => settings,
                Err(source) => {
                    if current {
                        state.panel.clear();
                    }
                    warn!(error = %source, "failed to load panel settings");
                    let _ = self.events.send(PanelEvent::FetchFailed {
                        tag: None,
                        message: source.to_string(),
                    });
                    return Err(PanelError::Settings(source));
                }
            };

            info!(
                settings_id = %settings.id,
                tags = settings.tags.len(),
                "loaded panel settings"
            );
            state.panel.filter.configure(&settings);
            let _ = self.events.send(PanelEvent::SettingsLoaded {
                tags: settings.tags.clone(),
            });
            let tag = if current {
                settings.first_tag().map(str::to_string)
            } else if self.is_busy() {
                state.panel.settings = Some(settings);
                debug!("filter changed during settings load; its fetch is still pending");
                return Ok(FetchOutcome::Stale);
            } else {
                debug!("filter changed during settings load; reloading selected tag");
                state.panel.filter.tag().map(str::to_string)
            };
            state.panel.settings = Some(settings);
            let page_size = state.panel.page_size;
            let plan = state.plan_initial(tag.as_deref(), page_size);
            self.settle(plan).map(|ticket| {
                let in_flight = self.claim(ticket.generation);
                (ticket, in_flight)
            })
        };

        match pending {
            Ok((ticket, in_flight)) => self.run_fetch(ticket, &in_flight).await,
            Err(outcome) => Ok(outcome),
        }
    }

    /// Starts over on the first page of `filter_tag`. An empty tag clears the panel.
    pub async fn load_initial(
        &self,
        filter_tag: &str,
        page_size: u32,
    ) -> Result<FetchOutcome, PanelError> {
        self.navigate(|state| state.plan_initial(Some(filter_tag), page_size))
            .await
    }

    pub async fn go_next(&self) -> Result<FetchOutcome, PanelError> {
        self.navigate(ControllerState::plan_next).await
    }

    pub async fn go_back(&self) -> Result<FetchOutcome, PanelError> {
        self.navigate(ControllerState::plan_back).await
    }

    pub async fn refresh_current_page(&self) -> Result<FetchOutcome, PanelError> {
        self.navigate(ControllerState::plan_refresh).await
    }

    /// Switches tag. Unlike navigation this is accepted while a fetch is pending,
    /// and that fetch's response is then dropped.
    pub async fn select_filter(&self, tag: Option<&str>) -> Result<FetchOutcome, PanelError> {
        let pending = {
            let mut state = self.state.lock().await;
            if self.is_busy() {
                debug!("filter change invalidates pending fetch");
            }
            state.invalidate();
            self.in_flight.store(IDLE, Ordering::Release);
            self.unreconciled.store(false, Ordering::Release);
            let page_size = state.panel.page_size;
            let plan = state.plan_initial(tag, page_size);
            self.settle(plan).map(|ticket| {
                let in_flight = self.claim(ticket.generation);
                (ticket, in_flight)
            })
        };

        match pending {
            Ok((ticket, in_flight)) => self.run_fetch(ticket, &in_flight).await,
            Err(outcome) => Ok(outcome),
        }
    }

    /// Drops `id` from the visible page right away, deletes it on the server, then
    /// re-fetches the current page whether or not the delete succeeded. With no
    /// active tag the delete is still sent and the outcome is
    /// [`FetchOutcome::Cleared`].
    pub async fn remove_item(&self, id: &ReviewId) -> Result<FetchOutcome, PanelError> {
        let pending = {
            let mut state = self.state.lock().await;
            if self.is_busy() {
                debug!(%id, "removal rejected: fetch already in flight");
                return Ok(FetchOutcome::Skipped(SkipReason::Busy));
            }
            if state.panel.page.remove(id) {
                state.panel.rating.decrement_count();
                self.unreconciled.store(true, Ordering::Release);
                let _ = self
                    .events
                    .send(PanelEvent::ReviewRemoved { id: id.clone() });
            }
            let plan = state.plan_refresh();
            self.settle(plan).map(|ticket| {
                let in_flight = self.claim(ticket.generation);
                (ticket, in_flight)
            })
        };

        let deleted = self.api.delete_review(id).await;
        match &deleted {
            Ok(()) => info!(%id, "deleted review"),
            Err(err) => {
                warn!(%id, error = %err, "failed to delete review; reconciling with server");
                let _ = self.events.send(PanelEvent::DeleteFailed {
                    id: id.clone(),
                    message: err.to_string(),
                });
            }
        }

        let refreshed = match pending {
            Ok((ticket, in_flight)) => {
                if self.is_current(ticket.generation).await {
                    self.run_fetch(ticket, &in_flight).await
                } else {
                    Ok(FetchOutcome::Stale)
                }
            }
            Err(outcome) => Ok(outcome),
        };

        match deleted {
            Ok(()) => refreshed,
            Err(source) => Err(PanelError::Delete {
                id: id.clone(),
                source,
            }),
        }
    }

    async fn navigate<F>(&self, plan: F) -> Result<FetchOutcome, PanelError>
    where
        F: FnOnce(&mut ControllerState) -> Plan,
    {
        let pending = {
            let mut state = self.state.lock().await;
            if self.is_busy() {
                debug!("navigation rejected: fetch already in flight");
                return Ok(FetchOutcome::Skipped(SkipReason::Busy));
            }
            let plan = plan(&mut *state);
            self.settle(plan).map(|ticket| {
                let in_flight = self.claim(ticket.generation);
                (ticket, in_flight)
            })
        };

        match pending {
            Ok((ticket, in_flight)) => self.run_fetch(ticket, &in_flight).await,
            Err(outcome) => Ok(outcome),
        }
    }

    fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire) != IDLE
    }

    /// Must be called with the state lock held, right after the generation was issued.
    fn claim(&self, generation: u64) -> InFlight<'_> {
        self.in_flight.store(generation, Ordering::Release);
        InFlight {
            slot: &self.in_flight,
            generation,
        }
    }

    fn settle(&self, plan: Plan) -> Result<FetchTicket, FetchOutcome> {
        match plan {
            Plan::Fetch(ticket) => Ok(ticket),
            Plan::Skip(reason) => {
                debug!(?reason, "navigation skipped");
                Err(FetchOutcome::Skipped(reason))
            }
            Plan::Clear => {
                debug!("no active configuration or tag; panel cleared");
                self.unreconciled.store(false, Ordering::Release);
                let _ = self.events.send(PanelEvent::Cleared);
                Err(FetchOutcome::Cleared)
            }
        }
    }

    async fn is_current(&self, generation: u64) -> bool {
        self.state.lock().await.generation == generation
    }

    async fn run_fetch(
        &self,
        ticket: FetchTicket,
        in_flight: &InFlight<'_>,
    ) -> Result<FetchOutcome, PanelError> {
        let result = self
            .api
            .reviews_page(
                &ticket.settings_id,
                &ticket.tag,
                ticket.limit,
                ticket.before.as_ref(),
            )
            .await;

        let mut state = self.state.lock().await;
        if state.generation != ticket.generation {
            debug!(
                tag = %ticket.tag,
                generation = ticket.generation,
                latest = state.generation,
                "discarding stale reviews response"
            );
            return Ok(FetchOutcome::Stale);
        }
        in_flight.release();

        match result {
            Ok(page) => {
                self.unreconciled.store(false, Ordering::Release);
                let review_count = page.review_count;
                let rating = state.panel.rating.ingest(page.avg_rating, review_count);
                state.panel.page.replace(page, ticket.commit);

                let items = state.panel.page.items().len();
                let has_next = state.panel.page.has_next();
                info!(
                    tag = %ticket.tag,
                    items,
                    has_next,
                    depth = state.panel.page.cursor_stack().len(),
                    "loaded reviews page"
                );
                let _ = self.events.send(PanelEvent::PageLoaded {
                    tag: ticket.tag,
                    items,
                    has_next,
                    review_count,
                    rating,
                });
                Ok(FetchOutcome::Applied)
            }
            Err(source) => {
                state.panel.page.clear_items();
                warn!(tag = %ticket.tag, error = %source, "failed to fetch reviews page");
                let _ = self.events.send(PanelEvent::FetchFailed {
                    tag: Some(ticket.tag.clone()),
                    message: source.to_string(),
                });
                Err(PanelError::Fetch {
                    tag: ticket.tag,
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/pagination_tests.rs"]
mod tests;
