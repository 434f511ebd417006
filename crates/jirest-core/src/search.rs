//! Paginated JQL search
//!
//! Pages are requested in increasing offset order and only when needed.
//! Fetched issues are kept, so the cursor can be rewound without another
//! request; the remote query itself is never restarted.

use crate::container::Container;
use crate::issue::Issue;
use crate::service::IssueService;
use crate::Result;
use serde_json::{Value, json};
use tracing::debug;

/// Page size used unless configured otherwise
pub const DEFAULT_PAGE_SIZE: u64 = 50;

/// Lazily paginated search results
pub struct Search {
    service: IssueService,
    jql: Option<String>,
    start_at: u64,
    max_results: u64,
    fields: Vec<String>,
    expand: Vec<String>,
    validate_query: bool,
    issues: Vec<Issue>,
    total: Option<u64>,
    cursor: usize,
    failed: bool,
}

impl Search {
    pub fn new(service: IssueService) -> Self {
        Self {
            service,
            jql: None,
            start_at: 0,
            max_results: DEFAULT_PAGE_SIZE,
            fields: Vec::new(),
            expand: Vec::new(),
            validate_query: true,
            issues: Vec::new(),
            total: None,
            cursor: 0,
            failed: false,
        }
    }

    /// Offset of the first result to request
    pub fn set_start_at(&mut self, start_at: u64) {
        self.start_at = start_at;
    }

    /// Page size; at least one
    pub fn set_max_results(&mut self, max_results: u64) {
        self.max_results = max_results.max(1);
    }

    pub fn set_fields(&mut self, fields: Vec<String>) {
        self.fields = fields;
    }

    pub fn set_expand(&mut self, expand: Vec<String>) {
        self.expand = expand;
    }

    pub fn set_validate_query(&mut self, validate_query: bool) {
        self.validate_query = validate_query;
    }

    pub fn jql(&self) -> Option<&str> {
        self.jql.as_deref()
    }

    pub fn start_at(&self) -> u64 {
        self.start_at
    }

    pub fn max_results(&self) -> u64 {
        self.max_results
    }

    /// Total reported by the server, once a page was fetched
    pub fn total(&self) -> Option<u64> {
        self.total
    }

    /// Issues fetched so far
    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    /// Set the query and fetch the first page.
    ///
    /// The query can only be set once; later calls return `Ok(false)` and
    /// change nothing.
    pub fn start(&mut self, jql: &str) -> Result<bool> {
        if self.jql.is_some() {
            return Ok(false);
        }

        self.jql = Some(jql.to_string());
        self.fetch_next_page()?;
        Ok(true)
    }

    /// Fetch the page following the issues already fetched.
    ///
    /// Returns whether a full page arrived or the total was reached, i.e.
    /// whether calling again may make progress.
    pub fn fetch_next_page(&mut self) -> Result<bool> {
        let Some(jql) = self.jql.as_deref() else {
            return Ok(false);
        };

        let offset = self.start_at + self.issues.len() as u64;
        if self.total.is_some_and(|total| offset >= total) {
            return Ok(false);
        }

        let mut request = json!({
            "jql": jql,
            "startAt": offset,
            "maxResults": self.max_results,
            "validateQuery": self.validate_query,
        });
        if !self.fields.is_empty() {
            request["fields"] = json!(self.fields);
        }
        if !self.expand.is_empty() {
            request["expand"] = json!(self.expand);
        }

        debug!(jql, offset, max_results = self.max_results, "fetching search page");
        let Some(mut response) = self.service.transport().post("search", &request) else {
            return Ok(false);
        };

        if let Some(total) = response.get("total").and_then(Value::as_u64) {
            self.total = Some(total);
        }
        // the server may cap the page size below what was asked for
        if let Some(page_size) = response.get("maxResults").and_then(Value::as_u64) {
            if page_size > 0 && page_size < self.max_results {
                self.max_results = page_size;
            }
        }

        let records = match response.get_mut("issues").map(Value::take) {
            Some(Value::Array(records)) => records,
            _ => Vec::new(),
        };

        let mut page = Vec::with_capacity(records.len());
        for record in records {
            let seed = Container::from_map(serde_json::from_value(record)?);
            page.push(Issue::from_seed(&self.service, seed, false)?);
        }

        let received = page.len() as u64;
        self.issues.extend(page);

        let fetched = self.start_at + self.issues.len() as u64;
        let reached_total = self.total.is_some_and(|total| fetched >= total);
        Ok(received > 0 && (received >= self.max_results || reached_total))
    }

    /// Fetch pages until no more progress is made
    pub fn load_all(&mut self) -> Result<()> {
        while self.fetch_next_page()? {}
        Ok(())
    }

    /// Whether the cursor points at a result, fetching the next page when
    /// the cursor has moved past the fetched issues.
    pub fn valid(&mut self) -> Result<bool> {
        let Some(total) = self.total else {
            return Ok(false);
        };
        let available = total.saturating_sub(self.start_at);
        let position = self.cursor as u64;

        if self.cursor >= self.issues.len() && position < available {
            self.fetch_next_page()?;
            return Ok(self.cursor < self.issues.len());
        }

        Ok(position < available)
    }

    /// Issue under the cursor, if fetched
    pub fn current(&self) -> Option<&Issue> {
        self.issues.get(self.cursor)
    }

    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn advance(&mut self) {
        self.cursor += 1;
    }

    /// Move the cursor back to the first fetched issue
    pub fn rewind(&mut self) {
        self.cursor = 0;
        self.failed = false;
    }
}

impl Iterator for Search {
    type Item = Result<Issue>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        match self.valid() {
            Ok(true) => {
                let issue = self.current().cloned();
                self.advance();
                issue.map(Ok)
            }
            Ok(false) => None,
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}
