//! Canonical search/sort/pagination state and its flat representation.
//!
//! `FilterState` is the single source of truth for what the discovery view
//! is asking the remote service. It round-trips to a flat key/value form so
//! a search can be bookmarked or shared, and it derives the cache signature
//! used by the result cache.

use chrono::NaiveDate;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::warn;

/// Default page size for search results
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Upper bound the remote service accepts for a single page
pub const MAX_PAGE_SIZE: u32 = 100;

/// Legacy wire sentinel meaning "no upper amount bound". Incoming values at
/// or above this parse to an unbounded maximum; we never emit it ourselves.
pub const AMOUNT_UNBOUNDED_SENTINEL: u64 = 999_999_999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFilter {
    All,
    Regione,
    Stato,
    Europa,
    Fondazioni,
}

impl Default for SourceFilter {
    fn default() -> Self {
        SourceFilter::All
    }
}

impl SourceFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFilter::All => "all",
            SourceFilter::Regione => "regione",
            SourceFilter::Stato => "stato",
            SourceFilter::Europa => "europa",
            SourceFilter::Fondazioni => "fondazioni",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "all" => Some(SourceFilter::All),
            "regione" => Some(SourceFilter::Regione),
            "stato" => Some(SourceFilter::Stato),
            "europa" => Some(SourceFilter::Europa),
            "fondazioni" => Some(SourceFilter::Fondazioni),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryFilter {
    All,
    Cultura,
    Sociale,
    Ambiente,
    Formazione,
    Sport,
    Innovazione,
}

impl Default for CategoryFilter {
    fn default() -> Self {
        CategoryFilter::All
    }
}

impl CategoryFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryFilter::All => "all",
            CategoryFilter::Cultura => "cultura",
            CategoryFilter::Sociale => "sociale",
            CategoryFilter::Ambiente => "ambiente",
            CategoryFilter::Formazione => "formazione",
            CategoryFilter::Sport => "sport",
            CategoryFilter::Innovazione => "innovazione",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "all" => Some(CategoryFilter::All),
            "cultura" => Some(CategoryFilter::Cultura),
            "sociale" => Some(CategoryFilter::Sociale),
            "ambiente" => Some(CategoryFilter::Ambiente),
            "formazione" => Some(CategoryFilter::Formazione),
            "sport" => Some(CategoryFilter::Sport),
            "innovazione" => Some(CategoryFilter::Innovazione),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    All,
    Active,
    ClosingSoon,
    Expired,
}

impl Default for StatusFilter {
    fn default() -> Self {
        StatusFilter::All
    }
}

impl StatusFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusFilter::All => "all",
            StatusFilter::Active => "active",
            StatusFilter::ClosingSoon => "closing_soon",
            StatusFilter::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "all" => Some(StatusFilter::All),
            "active" => Some(StatusFilter::Active),
            "closing_soon" => Some(StatusFilter::ClosingSoon),
            "expired" => Some(StatusFilter::Expired),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Deadline,
    Amount,
    Relevance,
    PublishedAt,
}

impl Default for SortKey {
    fn default() -> Self {
        SortKey::Deadline
    }
}

impl SortKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::Deadline => "deadline",
            SortKey::Amount => "amount",
            SortKey::Relevance => "relevance",
            SortKey::PublishedAt => "published_at",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "deadline" => Some(SortKey::Deadline),
            "amount" => Some(SortKey::Amount),
            "relevance" => Some(SortKey::Relevance),
            "published_at" => Some(SortKey::PublishedAt),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl Default for SortDirection {
    fn default() -> Self {
        SortDirection::Asc
    }
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "asc" => Some(SortDirection::Asc),
            "desc" => Some(SortDirection::Desc),
            _ => None,
        }
    }
}

/// The canonical query state for the discovery view.
///
/// Serializes directly as the search request body; optional bounds are
/// omitted when unset so the wire format matches the flat representation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterState {
    pub query: String,
    pub source: SourceFilter,
    pub category: CategoryFilter,
    pub status: StatusFilter,
    pub amount_min: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_max: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline_from: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline_to: Option<NaiveDate>,
    pub sort_key: SortKey,
    pub sort_dir: SortDirection,
    pub page_size: u32,
    pub page: u32,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            query: String::new(),
            source: SourceFilter::All,
            category: CategoryFilter::All,
            status: StatusFilter::All,
            amount_min: 0,
            amount_max: None,
            deadline_from: None,
            deadline_to: None,
            sort_key: SortKey::default(),
            sort_dir: SortDirection::default(),
            page_size: DEFAULT_PAGE_SIZE,
            page: 1,
        }
    }
}

/// A partial change to be merged into a `FilterState`.
///
/// Unset fields are left alone. The double-`Option` fields distinguish
/// "don't touch" (`None`) from "clear the bound" (`Some(None)`).
#[derive(Debug, Clone, Default)]
pub struct FilterChange {
    pub query: Option<String>,
    pub source: Option<SourceFilter>,
    pub category: Option<CategoryFilter>,
    pub status: Option<StatusFilter>,
    pub amount_min: Option<u64>,
    pub amount_max: Option<Option<u64>>,
    pub deadline_from: Option<Option<NaiveDate>>,
    pub deadline_to: Option<Option<NaiveDate>>,
    pub sort: Option<(SortKey, SortDirection)>,
    pub page_size: Option<u32>,
    pub page: Option<u32>,
}

impl FilterChange {
    pub fn query(mut self, q: impl Into<String>) -> Self {
        self.query = Some(q.into());
        self
    }

    pub fn source(mut self, source: SourceFilter) -> Self {
        self.source = Some(source);
        self
    }

    pub fn category(mut self, category: CategoryFilter) -> Self {
        self.category = Some(category);
        self
    }

    pub fn status(mut self, status: StatusFilter) -> Self {
        self.status = Some(status);
        self
    }

    pub fn amount_range(mut self, min: u64, max: Option<u64>) -> Self {
        self.amount_min = Some(min);
        self.amount_max = Some(max);
        self
    }

    pub fn deadline_range(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.deadline_from = Some(from);
        self.deadline_to = Some(to);
        self
    }

    pub fn sort(mut self, key: SortKey, dir: SortDirection) -> Self {
        self.sort = Some((key, dir));
        self
    }

    pub fn page_size(mut self, size: u32) -> Self {
        self.page_size = Some(size);
        self
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    /// True when the change touches anything other than the page number
    pub fn touches_filters(&self) -> bool {
        self.query.is_some()
            || self.source.is_some()
            || self.category.is_some()
            || self.status.is_some()
            || self.amount_min.is_some()
            || self.amount_max.is_some()
            || self.deadline_from.is_some()
            || self.deadline_to.is_some()
            || self.sort.is_some()
            || self.page_size.is_some()
    }
}

impl FilterState {
    /// Merge a partial change into the state.
    ///
    /// Any change outside the page number resets the page to 1, even if the
    /// same change carries an explicit page.
    pub fn update(&mut self, change: FilterChange) {
        let filters_touched = change.touches_filters();

        if let Some(q) = change.query {
            self.query = q;
        }
        if let Some(source) = change.source {
            self.source = source;
        }
        if let Some(category) = change.category {
            self.category = category;
        }
        if let Some(status) = change.status {
            self.status = status;
        }
        if let Some(min) = change.amount_min {
            self.amount_min = min;
        }
        if let Some(max) = change.amount_max {
            self.amount_max = max;
        }
        if let Some(from) = change.deadline_from {
            self.deadline_from = from;
        }
        if let Some(to) = change.deadline_to {
            self.deadline_to = to;
        }
        if let Some((key, dir)) = change.sort {
            self.sort_key = key;
            self.sort_dir = dir;
        }
        if let Some(size) = change.page_size {
            self.page_size = size;
        }
        if let Some(page) = change.page {
            self.page = page.max(1);
        }

        if filters_touched {
            self.page = 1;
        }

        self.normalise();
    }

    /// Restore documented defaults
    pub fn reset(&mut self) {
        *self = FilterState::default();
    }

    fn normalise(&mut self) {
        if self.page == 0 {
            self.page = 1;
        }
        if self.page_size == 0 {
            self.page_size = DEFAULT_PAGE_SIZE;
        }
        if self.page_size > MAX_PAGE_SIZE {
            self.page_size = MAX_PAGE_SIZE;
        }
        if let Some(max) = self.amount_max {
            if max >= AMOUNT_UNBOUNDED_SENTINEL {
                self.amount_max = None;
            } else if self.amount_min > max {
                warn!(
                    target: "filters",
                    amount_min = self.amount_min,
                    amount_max = max,
                    "amount_min above amount_max, clamping"
                );
                self.amount_min = max;
            }
        }
    }

    /// Flat key/value representation suitable for a shareable address.
    /// Fields at their defaults are omitted; the order is canonical.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = Vec::new();
        let mut push = |k: &str, v: String| pairs.push((k.to_string(), v));

        if !self.query.is_empty() {
            push("q", self.query.clone());
        }
        if self.source != SourceFilter::All {
            push("source", self.source.as_str().to_string());
        }
        if self.category != CategoryFilter::All {
            push("category", self.category.as_str().to_string());
        }
        if self.status != StatusFilter::All {
            push("status", self.status.as_str().to_string());
        }
        if self.amount_min > 0 {
            push("amount_min", self.amount_min.to_string());
        }
        if let Some(max) = self.amount_max {
            push("amount_max", max.to_string());
        }
        if let Some(from) = self.deadline_from {
            push("deadline_from", from.format("%Y-%m-%d").to_string());
        }
        if let Some(to) = self.deadline_to {
            push("deadline_to", to.format("%Y-%m-%d").to_string());
        }
        if self.sort_key != SortKey::default() {
            push("sort", self.sort_key.as_str().to_string());
        }
        if self.sort_dir != SortDirection::default() {
            push("dir", self.sort_dir.as_str().to_string());
        }
        if self.page_size != DEFAULT_PAGE_SIZE {
            push("page_size", self.page_size.to_string());
        }
        if self.page > 1 {
            push("page", self.page.to_string());
        }

        pairs
    }

    /// Rebuild a state from a flat representation.
    ///
    /// Parsing external input must never fail: unknown keys are ignored and
    /// invalid values coerce to their defaults with a warning.
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut state = FilterState::default();

        for (key, value) in pairs {
            match key {
                "q" => state.query = value.to_string(),
                "source" => match SourceFilter::parse(value) {
                    Some(v) => state.source = v,
                    None => warn!(target: "filters", key, value, "invalid value, using default"),
                },
                "category" => match CategoryFilter::parse(value) {
                    Some(v) => state.category = v,
                    None => warn!(target: "filters", key, value, "invalid value, using default"),
                },
                "status" => match StatusFilter::parse(value) {
                    Some(v) => state.status = v,
                    None => warn!(target: "filters", key, value, "invalid value, using default"),
                },
                "amount_min" => match value.parse::<u64>() {
                    Ok(v) => state.amount_min = v,
                    Err(_) => warn!(target: "filters", key, value, "invalid value, using default"),
                },
                "amount_max" => match value.parse::<u64>() {
                    Ok(v) if v >= AMOUNT_UNBOUNDED_SENTINEL => state.amount_max = None,
                    Ok(v) => state.amount_max = Some(v),
                    Err(_) => warn!(target: "filters", key, value, "invalid value, using default"),
                },
                "deadline_from" => match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
                    Ok(v) => state.deadline_from = Some(v),
                    Err(_) => warn!(target: "filters", key, value, "invalid date, using default"),
                },
                "deadline_to" => match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
                    Ok(v) => state.deadline_to = Some(v),
                    Err(_) => warn!(target: "filters", key, value, "invalid date, using default"),
                },
                "sort" => match SortKey::parse(value) {
                    Some(v) => state.sort_key = v,
                    None => warn!(target: "filters", key, value, "invalid value, using default"),
                },
                "dir" => match SortDirection::parse(value) {
                    Some(v) => state.sort_dir = v,
                    None => warn!(target: "filters", key, value, "invalid value, using default"),
                },
                "page_size" => match value.parse::<u32>() {
                    Ok(v) => state.page_size = v,
                    Err(_) => warn!(target: "filters", key, value, "invalid value, using default"),
                },
                "page" => match value.parse::<u32>() {
                    Ok(v) => state.page = v.max(1),
                    Err(_) => warn!(target: "filters", key, value, "invalid value, using default"),
                },
                _ => {
                    warn!(target: "filters", key, "unknown key in shared filter state, ignoring");
                }
            }
        }

        state.normalise();
        state
    }

    /// `key=value&key=value` form of `to_pairs`, minimally escaped
    pub fn to_query_string(&self) -> String {
        self.to_pairs()
            .iter()
            .map(|(k, v)| format!("{}={}", k, escape_component(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Parse a query string produced by `to_query_string` (or shared from
    /// elsewhere; malformed segments coerce like `from_pairs`).
    pub fn from_query_string(input: &str) -> Self {
        let decoded: Vec<(String, String)> = input
            .split('&')
            .filter(|segment| !segment.is_empty())
            .map(|segment| match segment.split_once('=') {
                Some((k, v)) => (k.to_string(), unescape_component(v)),
                None => (segment.to_string(), String::new()),
            })
            .collect();

        Self::from_pairs(decoded.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    /// Deterministic cache signature for this state.
    ///
    /// Two field-wise equal states hash identically because the canonical
    /// pair order is fixed and defaults are always omitted the same way.
    pub fn signature(&self) -> String {
        let canonical = self
            .to_pairs()
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

fn escape_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '%' => out.push_str("%25"),
            '&' => out.push_str("%26"),
            '=' => out.push_str("%3D"),
            '+' => out.push_str("%2B"),
            ' ' => out.push('+'),
            _ => out.push(ch),
        }
    }
    out
}

fn unescape_component(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi * 16 + lo);
                        i += 3;
                    }
                    // Not a valid escape, keep the literal percent
                    _ => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
