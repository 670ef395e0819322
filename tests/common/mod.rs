#![allow(dead_code)]

//! Programmable in-memory `GrantService` double shared by the integration
//! tests. Outcomes are scripted per endpoint; when a script runs dry the
//! service answers with a benign default.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use bandi_cli::api_client::{
    ExportOutcome, GrantService, GrantSource, GrantSummary, SearchResponse, ServiceError,
    StatsSummary,
};
use bandi_cli::export::ExportPayload;
use bandi_cli::filter_state::FilterState;

pub fn record(id: &str, title: &str) -> GrantSummary {
    GrantSummary {
        id: id.to_string(),
        title: title.to_string(),
        entity: "Regione Lazio".to_string(),
        source: GrantSource::Regione,
        amount: Some(10_000),
        deadline: None,
        days_remaining: None,
        keyword_match: None,
    }
}

pub fn page_response(records: Vec<GrantSummary>, total_count: usize, page: u32) -> SearchResponse {
    SearchResponse {
        records,
        total_count,
        page,
        page_size: 20,
    }
}

pub fn transport_err(message: &str) -> ServiceError {
    ServiceError::Transport(message.to_string())
}

#[derive(Default)]
pub struct FakeService {
    pub search_script: Mutex<VecDeque<Result<SearchResponse, ServiceError>>>,
    pub search_calls: AtomicUsize,
    pub search_requests: Mutex<Vec<FilterState>>,

    pub stats_script: Mutex<VecDeque<Result<StatsSummary, ServiceError>>>,
    pub stats_calls: AtomicUsize,

    pub export_script: Mutex<VecDeque<Result<ExportOutcome, ServiceError>>>,
    pub export_requests: Mutex<Vec<ExportPayload>>,
    pub export_delay: Mutex<Option<Duration>>,

    pub save_script: Mutex<VecDeque<Result<(), ServiceError>>>,
    /// (id, true for save / false for unsave), in call order
    pub save_calls: Mutex<Vec<(String, bool)>>,
}

impl FakeService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_search(&self, outcome: Result<SearchResponse, ServiceError>) {
        self.search_script.lock().unwrap().push_back(outcome);
    }

    pub fn script_stats(&self, outcome: Result<StatsSummary, ServiceError>) {
        self.stats_script.lock().unwrap().push_back(outcome);
    }

    pub fn script_export(&self, outcome: Result<ExportOutcome, ServiceError>) {
        self.export_script.lock().unwrap().push_back(outcome);
    }

    pub fn script_save(&self, outcome: Result<(), ServiceError>) {
        self.save_script.lock().unwrap().push_back(outcome);
    }

    pub fn delay_exports(&self, delay: Duration) {
        *self.export_delay.lock().unwrap() = Some(delay);
    }

    pub fn search_call_count(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn stats_call_count(&self) -> usize {
        self.stats_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GrantService for FakeService {
    async fn search(&self, filters: &FilterState) -> Result<SearchResponse, ServiceError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.search_requests.lock().unwrap().push(filters.clone());
        self.search_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(page_response(vec![], 0, 1)))
    }

    async fn get_stats(&self) -> Result<StatsSummary, ServiceError> {
        self.stats_calls.fetch_add(1, Ordering::SeqCst);
        self.stats_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(StatsSummary::default()))
    }

    async fn export(&self, request: &ExportPayload) -> Result<ExportOutcome, ServiceError> {
        self.export_requests.lock().unwrap().push(request.clone());
        let delay = *self.export_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.export_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ExportOutcome::Payload(b"export-bytes".to_vec())))
    }

    async fn save(&self, id: &str) -> Result<(), ServiceError> {
        self.save_calls
            .lock()
            .unwrap()
            .push((id.to_string(), true));
        self.save_script.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    async fn unsave(&self, id: &str) -> Result<(), ServiceError> {
        self.save_calls
            .lock()
            .unwrap()
            .push((id.to_string(), false));
        self.save_script.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}
