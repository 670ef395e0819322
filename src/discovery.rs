//! The discovery view orchestrator.
//!
//! `DiscoveryView` owns all per-view state (filters, caches, selection,
//! bookmarks, the export job, notifications) and drives the remote service.
//! The core is a two-phase fetch API: `apply`/`plan_fetch` hand back a
//! `SearchTicket`, and `complete_search` applies the outcome with
//! signature-gated write-back, so a response that resolves after the filters
//! moved on is discarded instead of overwriting newer state. The async
//! methods are thin drivers over that core; all mutation happens through
//! `&mut self`, so dropping the view abandons in-flight work without any
//! completion touching torn-down state.

use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::api_client::{GrantService, SearchResponse, ServiceError, StatsSummary};
use crate::cache::{CacheDecision, CacheStats, ResultCache, ResultSet, StatsCache, StatsDecision};
use crate::export::{
    ExportFormat, ExportJob, ExportPayload, ExportRequest, ExportResult, ExportScope, ExportStatus,
};
use crate::filter_state::{FilterChange, FilterState};
use crate::logging::{NotificationCenter, Severity};
use crate::saved_marks::{SaveOp, SavedMarks};
use crate::selection::SelectionSet;

/// Tunables for one discovery view, usually taken from [`crate::config::Config`]
#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    /// Freshness threshold for cached result sets
    pub result_ttl: Duration,
    /// Freshness threshold for the aggregate stats read
    pub stats_ttl: Duration,
    /// Interval between simulated export progress steps
    pub export_tick: Duration,
    /// How long a finished export stays visible before returning to idle
    pub export_cooldown: Duration,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            result_ttl: Duration::from_secs(60),
            stats_ttl: Duration::from_secs(300),
            export_tick: Duration::from_millis(150),
            export_cooldown: Duration::from_secs(4),
        }
    }
}

/// A planned search: the signature it was issued under plus a snapshot of
/// the filters to send. Outcomes are matched back against the signature.
#[derive(Debug, Clone)]
pub struct SearchTicket {
    signature: String,
    filters: FilterState,
}

impl SearchTicket {
    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn filters(&self) -> &FilterState {
        &self.filters
    }
}

/// What the view should render right now
#[derive(Debug)]
pub enum ViewPhase<'a> {
    /// Nothing fetched yet and nothing in flight
    NoData,
    /// First load for the current signature; a previous snapshot may stand in
    Loading { placeholder: Option<&'a ResultSet> },
    /// Cached snapshot displayed while its refresh is in flight
    Refreshing { snapshot: &'a ResultSet },
    Ready { snapshot: &'a ResultSet },
    /// Zero matches: a valid state with its own presentation, not an error
    Empty,
    Error {
        message: &'a str,
        retained: Option<&'a ResultSet>,
    },
}

pub struct DiscoveryView {
    service: Arc<dyn GrantService>,
    settings: DiscoverySettings,
    filters: FilterState,
    results: ResultCache,
    stats: StatsCache,
    selection: SelectionSet,
    marks: SavedMarks,
    export: ExportJob,
    notifications: NotificationCenter,
    /// Signature of the search currently in flight, if any
    pending: Option<String>,
    /// Last signature that had a displayable snapshot (placeholder source)
    last_shown: Option<String>,
    /// Failed fetch for a signature with no cached entry
    fetch_error: Option<(String, String)>,
}

impl DiscoveryView {
    pub fn new(service: Arc<dyn GrantService>, settings: DiscoverySettings) -> Self {
        let results = ResultCache::new(settings.result_ttl);
        let stats = StatsCache::new(settings.stats_ttl);
        let export = ExportJob::new(settings.export_cooldown);
        Self {
            service,
            settings,
            filters: FilterState::default(),
            results,
            stats,
            selection: SelectionSet::new(),
            marks: SavedMarks::new(),
            export,
            notifications: NotificationCenter::new(),
            pending: None,
            last_shown: None,
            fetch_error: None,
        }
    }

    pub fn filters(&self) -> &FilterState {
        &self.filters
    }

    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    pub fn export_job(&self) -> &ExportJob {
        &self.export
    }

    pub fn notifications(&self) -> &NotificationCenter {
        &self.notifications
    }

    pub fn drain_notifications(&mut self) -> Vec<crate::logging::Notification> {
        self.notifications.drain()
    }

    pub fn is_saved(&self, id: &str) -> bool {
        self.marks.is_saved(id)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.results.stats(Instant::now())
    }

    // ---- filter state & fetch planning -------------------------------

    /// Merge a filter change and plan the fetch it requires, if any.
    pub fn apply(&mut self, change: FilterChange) -> Option<SearchTicket> {
        self.filters.update(change);
        self.plan_fetch(Instant::now())
    }

    /// Restore default filters and plan the resulting fetch.
    pub fn reset_filters(&mut self) -> Option<SearchTicket> {
        self.filters.reset();
        self.plan_fetch(Instant::now())
    }

    /// Adopt a complete filter state, e.g. restored from a shared address.
    /// Does not plan a fetch; follow with `refresh` or `plan_fetch`.
    pub fn restore_filters(&mut self, filters: FilterState) {
        self.filters = filters;
    }

    /// Decide whether the current signature needs a remote search.
    ///
    /// A fresh cache entry answers immediately; a stale entry keeps being
    /// displayed while the refresh runs behind it; a miss leaves the
    /// previous snapshot up as a placeholder.
    pub fn plan_fetch(&mut self, now: Instant) -> Option<SearchTicket> {
        let signature = self.filters.signature();

        let (has_entry, fresh) = match self.results.lookup(&signature, now) {
            CacheDecision::Fresh(_) => (true, true),
            CacheDecision::Stale(_) => (true, false),
            CacheDecision::Miss => (false, false),
        };

        if fresh {
            self.last_shown = Some(signature);
            return None;
        }
        if has_entry {
            // Keep showing the stale snapshot while the refresh runs
            self.last_shown = Some(signature.clone());
        }
        self.plan_refresh(signature)
    }

    fn plan_refresh(&mut self, signature: String) -> Option<SearchTicket> {
        if self.pending.as_deref() == Some(signature.as_str()) {
            // Refresh already in flight for this signature
            return None;
        }
        debug!(
            target: "discovery",
            signature = &signature[..12.min(signature.len())],
            "planning search"
        );
        self.pending = Some(signature.clone());
        Some(SearchTicket {
            signature,
            filters: self.filters.clone(),
        })
    }

    /// Apply a search outcome. Outcomes whose signature no longer matches
    /// the current filters are discarded; failures never evict cached data.
    pub fn complete_search(
        &mut self,
        ticket: &SearchTicket,
        outcome: Result<SearchResponse, ServiceError>,
    ) {
        let current = self.filters.signature();
        if ticket.signature != current {
            debug!(
                target: "discovery",
                signature = &ticket.signature[..12.min(ticket.signature.len())],
                "response for superseded signature discarded"
            );
            if self.pending.as_deref() == Some(ticket.signature.as_str()) {
                self.pending = None;
            }
            return;
        }

        if self.pending.as_deref() == Some(ticket.signature.as_str()) {
            self.pending = None;
        }

        match outcome {
            Ok(response) => {
                let result = ResultSet::from_response(response);
                info!(
                    target: "discovery",
                    total = result.total_count,
                    page = result.page,
                    "search resolved"
                );
                self.results.insert(&ticket.signature, result, Instant::now());
                self.fetch_error = None;
                self.last_shown = Some(ticket.signature.clone());
            }
            Err(err) => {
                self.fetch_error = Some((ticket.signature.clone(), err.to_string()));
                self.notifications
                    .push(Severity::Error, format!("search failed: {}", err));
            }
        }
    }

    /// What the view should render for the current filters.
    pub fn phase(&self) -> ViewPhase<'_> {
        let signature = self.filters.signature();
        let in_flight = self.pending.as_deref() == Some(signature.as_str());

        if let Some(snapshot) = self.results.get(&signature) {
            if in_flight {
                return ViewPhase::Refreshing { snapshot };
            }
            if snapshot.is_empty() {
                return ViewPhase::Empty;
            }
            return ViewPhase::Ready { snapshot };
        }

        if let Some((err_sig, message)) = &self.fetch_error {
            if *err_sig == signature {
                return ViewPhase::Error {
                    message: message.as_str(),
                    retained: self.placeholder(),
                };
            }
        }

        if in_flight {
            return ViewPhase::Loading {
                placeholder: self.placeholder(),
            };
        }

        ViewPhase::NoData
    }

    /// The snapshot currently on screen: the current signature's entry, or
    /// the previous signature's while a first load is in flight.
    pub fn displayed(&self) -> Option<&ResultSet> {
        let signature = self.filters.signature();
        self.results.get(&signature).or_else(|| self.placeholder())
    }

    fn placeholder(&self) -> Option<&ResultSet> {
        self.last_shown
            .as_deref()
            .and_then(|signature| self.results.get(signature))
    }

    // ---- selection ---------------------------------------------------

    /// Flip selection for one record. Returns the new membership state.
    pub fn toggle_selected(&mut self, id: &str) -> bool {
        self.selection.toggle(id)
    }

    /// Select every record on the currently displayed page.
    pub fn select_all_visible(&mut self) {
        let visible: Vec<String> = match self.displayed() {
            Some(snapshot) => snapshot.records.iter().map(|r| r.id.clone()).collect(),
            None => return,
        };
        self.selection.select_all(visible.iter().map(|id| id.as_str()));
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    // ---- async drivers ----------------------------------------------

    /// Merge a change and run the fetch it requires to completion.
    pub async fn apply_filters(&mut self, change: FilterChange) -> Result<()> {
        let ticket = self.apply(change);
        self.drive_search(ticket).await
    }

    /// Re-run the current search if its cache entry is stale or missing.
    pub async fn refresh(&mut self) -> Result<()> {
        let ticket = self.plan_fetch(Instant::now());
        self.drive_search(ticket).await
    }

    async fn drive_search(&mut self, ticket: Option<SearchTicket>) -> Result<()> {
        let Some(ticket) = ticket else {
            return Ok(());
        };
        let service = Arc::clone(&self.service);
        let outcome = service.search(ticket.filters()).await;
        let failure = outcome.as_ref().err().map(|err| err.to_string());
        self.complete_search(&ticket, outcome);
        match failure {
            Some(message) => Err(anyhow!(message)),
            None => Ok(()),
        }
    }

    /// Toggle a bookmark, driving the remote reconciliation to quiescence.
    /// Returns the final local state.
    pub async fn toggle_saved(&mut self, id: &str) -> bool {
        let mut next = self.marks.toggle(id);
        while let Some(op) = next {
            let service = Arc::clone(&self.service);
            let outcome = match &op {
                SaveOp::Save(target) => service.save(target).await,
                SaveOp::Unsave(target) => service.unsave(target).await,
            };
            let completion = self.marks.complete(op.id(), outcome);
            if completion.failed {
                self.notifications.push(
                    Severity::Error,
                    format!("could not update bookmark for {}", op.id()),
                );
            }
            next = completion.followup;
        }
        self.marks.is_saved(id)
    }

    /// Aggregate stats, served from cache within its freshness window. A
    /// failed refresh keeps any previous aggregates (and warns) rather than
    /// blanking them.
    pub async fn load_stats(&mut self) -> Option<StatsSummary> {
        let needs_fetch = !matches!(self.stats.lookup(Instant::now()), StatsDecision::Fresh(_));
        if needs_fetch {
            let service = Arc::clone(&self.service);
            match service.get_stats().await {
                Ok(stats) => self.stats.insert(stats, Instant::now()),
                Err(err) => {
                    self.notifications
                        .push(Severity::Warn, format!("stats unavailable: {}", err));
                }
            }
        }
        self.stats.get().cloned()
    }

    // ---- export ------------------------------------------------------

    /// Build the quick-export request: minimal fields, scope = selection
    /// when non-empty, otherwise everything matching the current filters.
    pub fn quick_export_request(&self, format: ExportFormat) -> ExportRequest {
        let scope = if self.selection.is_empty() {
            ExportScope::Filter(self.filters.clone())
        } else {
            ExportScope::Selection(self.selection.ids())
        };
        ExportRequest::quick(format, scope)
    }

    /// Scope for an advanced export over the current selection.
    pub fn selection_scope(&self) -> ExportScope {
        ExportScope::Selection(self.selection.ids())
    }

    /// Scope for an advanced export over the current filters.
    pub fn filter_scope(&self) -> ExportScope {
        ExportScope::Filter(self.filters.clone())
    }

    pub async fn quick_export(&mut self, format: ExportFormat) -> Result<ExportResult> {
        let request = self.quick_export_request(format);
        self.run_export(request).await
    }

    /// Run one export job to a terminal state.
    ///
    /// Progress ticks and the remote call feed the job independently; the
    /// loop ends only when the machine itself reports a terminal state, so
    /// completion is a rendezvous, not a race.
    pub async fn run_export(&mut self, request: ExportRequest) -> Result<ExportResult> {
        let payload = ExportPayload::from_request(&request);
        let selection_scoped = request.scope.is_selection();

        if let Err(err) = self.export.begin(request) {
            self.notifications
                .push(Severity::Error, format!("export rejected: {}", err));
            return Err(anyhow!(err));
        }

        self.export.dispatched();

        let service = Arc::clone(&self.service);
        let remote = service.export(&payload);
        tokio::pin!(remote);

        let mut ticker = tokio::time::interval(self.settings.export_tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut remote_done = false;

        while !self.export.is_terminal() {
            if remote_done {
                ticker.tick().await;
                self.export.tick();
            } else {
                tokio::select! {
                    outcome = &mut remote => {
                        self.export.resolve_remote(outcome);
                        remote_done = true;
                    }
                    _ = ticker.tick() => {
                        self.export.tick();
                    }
                }
            }
        }

        if self.export.status() == ExportStatus::Complete {
            if let Some(result) = self.export.result() {
                let result = result.clone();
                if selection_scoped {
                    // The export consumed the selection
                    self.selection.clear();
                }
                return Ok(result);
            }
        }

        let message = self
            .export
            .error()
            .unwrap_or("export failed")
            .to_string();
        self.notifications
            .push(Severity::Error, format!("export failed: {}", message));
        Err(anyhow!(message))
    }

    /// Return a finished export to idle once its display cooldown elapsed.
    pub fn maybe_reset_export(&mut self) -> bool {
        self.export.maybe_reset(Instant::now())
    }
}
