//! In-process scripted directory for tests.
//!
//! [`FakeDirectory`] implements [`DirectoryConnector`] over an in-memory
//! entry list. It understands the filter subset the crate issues (`&`, `|`,
//! `!`, presence, equality, `>=`, `<=`, `*` substrings), honours scope, size
//! limit and paged-results cookies, and records every request in a journal.
//! Faults can be queued to make the next operation fail or stall.

use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use la_model::{dn, TlsMode};
use parking_lot::Mutex;

use crate::error::{DirectoryError, DirectoryResult};
use crate::session::{
    result_code, AttributeChange, ChangeOp, DirectoryConnector, DirectorySession, ProtocolOutcome,
    RawEntry, SearchPage, SearchRequest,
};
use crate::settings::{Endpoint, SearchScope};

/// One request seen by the fake server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    /// Transport opened.
    Connect {
        /// Host connected to.
        host: String,
        /// Transport mode.
        tls_mode: TlsMode,
    },
    /// StartTLS extended operation.
    StartTls,
    /// Simple bind.
    Bind {
        /// Bind DN.
        dn: String,
    },
    /// Search request.
    Search {
        /// Search base.
        base: String,
        /// Filter string.
        filter: String,
        /// Scope.
        scope: SearchScope,
        /// Paged-results size, when the control was sent.
        page_size: Option<i32>,
        /// Size limit.
        size_limit: i32,
    },
    /// Add request.
    Add {
        /// Entry DN.
        dn: String,
    },
    /// Modify request.
    Modify {
        /// Entry DN.
        dn: String,
        /// Requested changes.
        changes: Vec<AttributeChange>,
    },
    /// Delete request.
    Delete {
        /// Entry DN.
        dn: String,
    },
    /// Modify-DN request.
    ModifyDn {
        /// Entry DN.
        dn: String,
        /// New RDN.
        new_rdn: String,
        /// New parent.
        new_superior: Option<String>,
    },
    /// Unbind.
    Unbind,
}

/// Failure injected into the next non-bind operation.
#[derive(Debug, Clone)]
pub enum Fault {
    /// Transport breaks.
    Transport(String),
    /// Server answers with the given result code.
    Result {
        /// Result code.
        code: u32,
        /// Diagnostic text.
        message: String,
    },
    /// Server stalls for the given time before answering.
    Hang(Duration),
}

#[derive(Default)]
struct State {
    entries: Vec<RawEntry>,
    journal: Vec<Recorded>,
    password: Option<String>,
    refuse: Option<String>,
    faults: VecDeque<Fault>,
    connects: usize,
    connect_delay: Option<Duration>,
}

impl State {
    fn position(&self, target: &str) -> Option<usize> {
        let target = dn::normalize(target);
        self.entries
            .iter()
            .position(|entry| dn::normalize(&entry.dn) == target)
    }
}

/// Scripted in-memory directory.
#[derive(Clone, Default)]
pub struct FakeDirectory {
    state: Arc<Mutex<State>>,
}

impl FakeDirectory {
    /// Creates an empty directory that accepts any bind.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Only accepts binds with this password.
    #[must_use]
    pub fn require_password(self, password: impl Into<String>) -> Self {
        self.state.lock().password = Some(password.into());
        self
    }

    /// Adds an entry and returns the directory.
    #[must_use]
    pub fn with_entry(self, dn: &str, attrs: &[(&str, &[&str])]) -> Self {
        self.insert(dn, attrs);
        self
    }

    /// Adds or replaces an entry.
    pub fn insert(&self, dn: &str, attrs: &[(&str, &[&str])]) {
        let entry = RawEntry {
            dn: dn.to_string(),
            attrs: attrs
                .iter()
                .map(|(name, values)| {
                    (
                        (*name).to_string(),
                        values.iter().map(|v| (*v).to_string()).collect(),
                    )
                })
                .collect(),
        };
        let mut state = self.state.lock();
        match state.position(dn) {
            Some(idx) => state.entries[idx] = entry,
            None => state.entries.push(entry),
        }
    }

    /// Returns an entry by DN.
    #[must_use]
    pub fn entry(&self, dn: &str) -> Option<RawEntry> {
        let state = self.state.lock();
        state.position(dn).map(|idx| state.entries[idx].clone())
    }

    /// Returns every entry in insertion order.
    #[must_use]
    pub fn entries(&self) -> Vec<RawEntry> {
        self.state.lock().entries.clone()
    }

    /// Makes every connect attempt fail with `message`.
    pub fn refuse_connections(&self, message: impl Into<String>) {
        self.state.lock().refuse = Some(message.into());
    }

    /// Accepts connections again.
    pub fn accept_connections(&self) {
        self.state.lock().refuse = None;
    }

    /// Makes every connect attempt stall for `delay` first.
    pub fn delay_connections(&self, delay: Duration) {
        self.state.lock().connect_delay = Some(delay);
    }

    /// Queues a fault for the next non-bind operation.
    pub fn fail_next(&self, fault: Fault) {
        self.state.lock().faults.push_back(fault);
    }

    /// Returns the request journal.
    #[must_use]
    pub fn journal(&self) -> Vec<Recorded> {
        self.state.lock().journal.clone()
    }

    /// Clears the request journal.
    pub fn clear_journal(&self) {
        self.state.lock().journal.clear();
    }

    /// Number of search requests in the journal.
    #[must_use]
    pub fn search_count(&self) -> usize {
        self.state
            .lock()
            .journal
            .iter()
            .filter(|r| matches!(r, Recorded::Search { .. }))
            .count()
    }

    /// Number of successful transport opens.
    #[must_use]
    pub fn connects(&self) -> usize {
        self.state.lock().connects
    }
}

#[async_trait]
impl DirectoryConnector for FakeDirectory {
    async fn connect(&self, endpoint: &Endpoint) -> DirectoryResult<Box<dyn DirectorySession>> {
        let delay = self.state.lock().connect_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock();
        if let Some(message) = &state.refuse {
            return Err(DirectoryError::connection(message.clone()));
        }
        state.connects += 1;
        state.journal.push(Recorded::Connect {
            host: endpoint.host.clone(),
            tls_mode: endpoint.tls_mode,
        });
        if endpoint.tls_mode == TlsMode::StartTls {
            state.journal.push(Recorded::StartTls);
        }
        Ok(Box::new(FakeSession {
            state: Arc::clone(&self.state),
        }))
    }
}

struct FakeSession {
    state: Arc<Mutex<State>>,
}

impl FakeSession {
    /// Records the request and applies a queued fault.
    ///
    /// Returns `Some(outcome)` when the fault answers the request.
    async fn begin(&self, record: Recorded) -> DirectoryResult<Option<ProtocolOutcome>> {
        let fault = {
            let mut state = self.state.lock();
            state.journal.push(record);
            state.faults.pop_front()
        };
        match fault {
            None => Ok(None),
            Some(Fault::Transport(message)) => Err(DirectoryError::connection(message)),
            Some(Fault::Result { code, message }) => Ok(Some(ProtocolOutcome::new(code, message))),
            Some(Fault::Hang(duration)) => {
                tokio::time::sleep(duration).await;
                Ok(None)
            }
        }
    }
}

fn no_such_object(dn: &str) -> ProtocolOutcome {
    ProtocolOutcome::new(result_code::NO_SUCH_OBJECT, format!("no such entry: {dn}"))
}

fn already_exists(dn: &str) -> ProtocolOutcome {
    ProtocolOutcome::new(result_code::ENTRY_ALREADY_EXISTS, format!("entry exists: {dn}"))
}

fn attribute_key(entry: &RawEntry, name: &str) -> Option<String> {
    entry
        .attrs
        .keys()
        .find(|key| key.eq_ignore_ascii_case(name))
        .cloned()
}

fn apply_change(entry: &mut RawEntry, change: &AttributeChange) {
    let key = attribute_key(entry, &change.attribute).unwrap_or_else(|| change.attribute.clone());
    match change.op {
        ChangeOp::Add => {
            let values = entry.attrs.entry(key).or_default();
            for value in &change.values {
                if !values.contains(value) {
                    values.push(value.clone());
                }
            }
        }
        ChangeOp::Replace => {
            if change.values.is_empty() {
                entry.attrs.remove(&key);
            } else {
                entry.attrs.insert(key, change.values.clone());
            }
        }
        ChangeOp::Delete => {
            if change.values.is_empty() {
                entry.attrs.remove(&key);
            } else if let Some(values) = entry.attrs.get_mut(&key) {
                values.retain(|v| !change.values.iter().any(|d| d.eq_ignore_ascii_case(v)));
                if values.is_empty() {
                    entry.attrs.remove(&key);
                }
            }
        }
    }
}

fn in_scope(entry_dn: &str, base: &str, scope: SearchScope) -> bool {
    match scope {
        SearchScope::Base => dn::normalize(entry_dn) == dn::normalize(base),
        SearchScope::OneLevel => dn::split_rdn(entry_dn)
            .is_some_and(|(_, parent)| dn::normalize(parent) == dn::normalize(base)),
        SearchScope::Subtree => dn::is_within(entry_dn, base),
    }
}

fn project(entry: &RawEntry, attributes: &[String]) -> RawEntry {
    if attributes.is_empty() || attributes.iter().any(|a| a == "*") {
        return entry.clone();
    }
    let attrs: HashMap<String, Vec<String>> = entry
        .attrs
        .iter()
        .filter(|(key, _)| attributes.iter().any(|a| a.eq_ignore_ascii_case(key)))
        .map(|(key, values)| (key.clone(), values.clone()))
        .collect();
    RawEntry {
        dn: entry.dn.clone(),
        attrs,
    }
}

#[async_trait]
impl DirectorySession for FakeSession {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> DirectoryResult<ProtocolOutcome> {
        let mut state = self.state.lock();
        state.journal.push(Recorded::Bind { dn: dn.to_string() });
        match &state.password {
            Some(expected) if expected != password => Ok(ProtocolOutcome::new(
                result_code::INVALID_CREDENTIALS,
                "invalid credentials",
            )),
            _ => Ok(ProtocolOutcome::success()),
        }
    }

    async fn search(&mut self, request: &SearchRequest) -> DirectoryResult<SearchPage> {
        let record = Recorded::Search {
            base: request.base.clone(),
            filter: request.filter.clone(),
            scope: request.scope,
            page_size: request.page.as_ref().map(|page| page.size),
            size_limit: request.size_limit,
        };
        if let Some(outcome) = self.begin(record).await? {
            return Ok(SearchPage {
                entries: Vec::new(),
                cookie: Vec::new(),
                outcome,
            });
        }

        let filter = parse_filter(&request.filter).ok_or_else(|| {
            DirectoryError::rejected("search", &request.base, 87, "bad search filter")
        })?;

        let state = self.state.lock();
        let base_known = state
            .entries
            .iter()
            .any(|entry| dn::is_within(&entry.dn, &request.base));
        if !base_known {
            return Ok(SearchPage {
                entries: Vec::new(),
                cookie: Vec::new(),
                outcome: no_such_object(&request.base),
            });
        }

        let mut matched: Vec<RawEntry> = state
            .entries
            .iter()
            .filter(|entry| in_scope(&entry.dn, &request.base, request.scope))
            .filter(|entry| filter.matches(entry))
            .map(|entry| project(entry, &request.attributes))
            .collect();

        let mut outcome = ProtocolOutcome::success();
        if request.size_limit > 0 {
            let limit = usize::try_from(request.size_limit).unwrap_or(usize::MAX);
            if matched.len() > limit {
                matched.truncate(limit);
                outcome = ProtocolOutcome::new(result_code::SIZE_LIMIT_EXCEEDED, "size limit exceeded");
            }
        }

        let Some(page) = &request.page else {
            return Ok(SearchPage {
                entries: matched,
                cookie: Vec::new(),
                outcome,
            });
        };

        let offset: usize = std::str::from_utf8(&page.cookie)
            .ok()
            .and_then(|c| c.parse().ok())
            .unwrap_or(0);
        let size = usize::try_from(page.size).unwrap_or(1).max(1);
        let end = (offset + size).min(matched.len());
        let entries = matched.get(offset..end).map(<[RawEntry]>::to_vec).unwrap_or_default();
        let cookie = if end < matched.len() {
            end.to_string().into_bytes()
        } else {
            Vec::new()
        };

        Ok(SearchPage {
            entries,
            cookie,
            outcome,
        })
    }

    async fn add(
        &mut self,
        dn: &str,
        attributes: &[(String, Vec<String>)],
    ) -> DirectoryResult<ProtocolOutcome> {
        if let Some(outcome) = self.begin(Recorded::Add { dn: dn.to_string() }).await? {
            return Ok(outcome);
        }
        let mut state = self.state.lock();
        if state.position(dn).is_some() {
            return Ok(already_exists(dn));
        }
        state.entries.push(RawEntry {
            dn: dn.to_string(),
            attrs: attributes.iter().cloned().collect(),
        });
        Ok(ProtocolOutcome::success())
    }

    async fn modify(
        &mut self,
        dn: &str,
        changes: &[AttributeChange],
    ) -> DirectoryResult<ProtocolOutcome> {
        let record = Recorded::Modify {
            dn: dn.to_string(),
            changes: changes.to_vec(),
        };
        if let Some(outcome) = self.begin(record).await? {
            return Ok(outcome);
        }
        let mut state = self.state.lock();
        let Some(idx) = state.position(dn) else {
            return Ok(no_such_object(dn));
        };
        for change in changes {
            apply_change(&mut state.entries[idx], change);
        }
        Ok(ProtocolOutcome::success())
    }

    async fn delete(&mut self, dn: &str) -> DirectoryResult<ProtocolOutcome> {
        if let Some(outcome) = self.begin(Recorded::Delete { dn: dn.to_string() }).await? {
            return Ok(outcome);
        }
        let mut state = self.state.lock();
        match state.position(dn) {
            Some(idx) => {
                state.entries.remove(idx);
                Ok(ProtocolOutcome::success())
            }
            None => Ok(no_such_object(dn)),
        }
    }

    async fn modify_dn(
        &mut self,
        dn: &str,
        new_rdn: &str,
        delete_old_rdn: bool,
        new_superior: Option<&str>,
    ) -> DirectoryResult<ProtocolOutcome> {
        let record = Recorded::ModifyDn {
            dn: dn.to_string(),
            new_rdn: new_rdn.to_string(),
            new_superior: new_superior.map(str::to_string),
        };
        if let Some(outcome) = self.begin(record).await? {
            return Ok(outcome);
        }

        let mut state = self.state.lock();
        let Some(idx) = state.position(dn) else {
            return Ok(no_such_object(dn));
        };
        let parent = match (new_superior, dn::split_rdn(dn)) {
            (Some(parent), _) => parent.to_string(),
            (None, Some((_, parent))) => parent.to_string(),
            (None, None) => {
                return Ok(ProtocolOutcome::new(53, "cannot rename a root entry"));
            }
        };
        let new_dn = format!("{new_rdn},{parent}");
        if state.position(&new_dn).is_some() {
            return Ok(already_exists(&new_dn));
        }

        let old_rdn = dn::leading_rdn(dn).to_string();
        let entry = &mut state.entries[idx];
        entry.dn = new_dn;
        if let Some((attr, value)) = new_rdn.split_once('=') {
            apply_change(entry, &AttributeChange::add(attr, vec![value.to_string()]));
        }
        if delete_old_rdn && !old_rdn.eq_ignore_ascii_case(new_rdn) {
            if let Some((attr, value)) = old_rdn.split_once('=') {
                apply_change(entry, &AttributeChange::delete(attr, vec![value.to_string()]));
            }
        }
        Ok(ProtocolOutcome::success())
    }

    async fn unbind(&mut self) -> DirectoryResult<()> {
        self.state.lock().journal.push(Recorded::Unbind);
        Ok(())
    }
}

// ============================================================================
// Filter evaluation
// ============================================================================

#[derive(Debug)]
enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Present(String),
    Equal(String, String),
    Substring(String, Vec<String>),
    GreaterOrEqual(String, String),
    LessOrEqual(String, String),
}

fn parse_filter(input: &str) -> Option<Filter> {
    let (filter, rest) = parse(input.trim())?;
    rest.trim().is_empty().then_some(filter)
}

fn parse(input: &str) -> Option<(Filter, &str)> {
    let body = input.trim_start().strip_prefix('(')?;
    if let Some(list) = body.strip_prefix('&') {
        let (filters, rest) = parse_list(list)?;
        return Some((Filter::And(filters), rest));
    }
    if let Some(list) = body.strip_prefix('|') {
        let (filters, rest) = parse_list(list)?;
        return Some((Filter::Or(filters), rest));
    }
    if let Some(inner) = body.strip_prefix('!') {
        let (filter, rest) = parse(inner)?;
        let rest = rest.trim_start().strip_prefix(')')?;
        return Some((Filter::Not(Box::new(filter)), rest));
    }
    let end = body.find(')')?;
    Some((parse_item(&body[..end])?, &body[end + 1..]))
}

fn parse_list(mut input: &str) -> Option<(Vec<Filter>, &str)> {
    let mut filters = Vec::new();
    loop {
        input = input.trim_start();
        if let Some(rest) = input.strip_prefix(')') {
            return Some((filters, rest));
        }
        let (filter, rest) = parse(input)?;
        filters.push(filter);
        input = rest;
    }
}

fn parse_item(item: &str) -> Option<Filter> {
    if let Some((attr, value)) = item.split_once(">=") {
        return Some(Filter::GreaterOrEqual(attr.trim().to_string(), unescape(value)));
    }
    if let Some((attr, value)) = item.split_once("<=") {
        return Some(Filter::LessOrEqual(attr.trim().to_string(), unescape(value)));
    }
    let (attr, value) = item.split_once('=')?;
    let attr = attr.trim().to_string();
    if value == "*" {
        Some(Filter::Present(attr))
    } else if value.contains('*') {
        Some(Filter::Substring(
            attr,
            value.split('*').map(|piece| unescape(piece).to_lowercase()).collect(),
        ))
    } else {
        Some(Filter::Equal(attr, unescape(value)))
    }
}

fn unescape(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut idx = 0;
    while idx < bytes.len() {
        if bytes[idx] == b'\\' {
            if let Some(byte) = value
                .get(idx + 1..idx + 3)
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
            {
                out.push(byte);
                idx += 3;
                continue;
            }
        }
        out.push(bytes[idx]);
        idx += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn compare(actual: &str, wanted: &str) -> Ordering {
    match (actual.parse::<i64>(), wanted.parse::<i64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => actual.to_lowercase().cmp(&wanted.to_lowercase()),
    }
}

fn substring_match(value: &str, pieces: &[String]) -> bool {
    let value = value.to_lowercase();
    let (Some(first), Some(last)) = (pieces.first(), pieces.last()) else {
        return false;
    };
    if pieces.len() < 2 {
        return value == *first;
    }
    if !value.starts_with(first.as_str()) {
        return false;
    }
    let mut pos = first.len();
    for middle in &pieces[1..pieces.len() - 1] {
        match value[pos..].find(middle.as_str()) {
            Some(found) => pos += found + middle.len(),
            None => return false,
        }
    }
    value.len() >= pos + last.len() && value.ends_with(last.as_str())
}

impl Filter {
    fn matches(&self, entry: &RawEntry) -> bool {
        let values = |attr: &str| -> Vec<&String> {
            entry
                .attrs
                .iter()
                .filter(|(key, _)| key.eq_ignore_ascii_case(attr))
                .flat_map(|(_, values)| values.iter())
                .collect()
        };
        match self {
            Self::And(filters) => filters.iter().all(|f| f.matches(entry)),
            Self::Or(filters) => filters.iter().any(|f| f.matches(entry)),
            Self::Not(filter) => !filter.matches(entry),
            Self::Present(attr) => !values(attr).is_empty(),
            Self::Equal(attr, wanted) => values(attr).iter().any(|v| v.eq_ignore_ascii_case(wanted)),
            Self::Substring(attr, pieces) => {
                values(attr).iter().any(|v| substring_match(v, pieces))
            }
            Self::GreaterOrEqual(attr, wanted) => values(attr)
                .iter()
                .any(|v| compare(v, wanted) != Ordering::Less),
            Self::LessOrEqual(attr, wanted) => values(attr)
                .iter()
                .any(|v| compare(v, wanted) != Ordering::Greater),
        }
    }
}
