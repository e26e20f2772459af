//! Append-only security event store.
//!
//! [`AuditStore`] is the seam between ingestion and storage. The bundled
//! [`MemoryAuditStore`] keeps a bounded ring of recent events: once the
//! retention limits are hit, the oldest entries are dropped without notice.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::error::AuditResult;
use crate::events::{EventType, NewEvent, SecurityEvent, Severity};
use crate::logger::{AuditLogger, NoopAuditLogger};

/// Default maximum number of retained events.
pub const DEFAULT_MAX_EVENTS: usize = 10_000;

/// Default maximum event age (7 days).
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default upper bound on events returned by one query.
pub const DEFAULT_MAX_PAGE_SIZE: usize = 100;

/// Selects events from the log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    /// Only events of this type.
    pub event_type: Option<EventType>,
    /// Only events at or after this instant.
    pub since: Option<DateTime<Utc>>,
    /// Only events at or before this instant.
    pub until: Option<DateTime<Utc>>,
    /// Only events at or above this severity.
    pub min_severity: Option<Severity>,
    /// Maximum number of events, capped by the store's page size.
    pub limit: Option<usize>,
}

impl EventFilter {
    /// Matches every event.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Matches events of one type.
    #[must_use]
    pub fn for_type(event_type: EventType) -> Self {
        Self {
            event_type: Some(event_type),
            ..Self::default()
        }
    }

    /// Restricts to events at or after `since`.
    #[must_use]
    pub const fn with_since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Restricts to events at or before `until`.
    #[must_use]
    pub const fn with_until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    /// Restricts to events at or above `severity`.
    #[must_use]
    pub const fn with_min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = Some(severity);
        self
    }

    /// Limits the number of returned events.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns true if `event` satisfies every criterion.
    #[must_use]
    pub fn matches(&self, event: &SecurityEvent) -> bool {
        self.event_type.is_none_or(|t| event.event_type() == t)
            && self.since.is_none_or(|since| event.timestamp() >= since)
            && self.until.is_none_or(|until| event.timestamp() <= until)
            && self.min_severity.is_none_or(|min| event.severity() >= min)
    }
}

/// Returned by [`AuditStore::append`] so the caller can correlate the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AppendReceipt {
    /// Identifier of the stored event.
    pub event_id: Uuid,
    /// Commit position of the stored event.
    pub sequence: u64,
    /// Timestamp assigned by the store.
    pub timestamp: DateTime<Utc>,
}

/// Counters describing a store's lifetime activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Events currently retained.
    pub retained: usize,
    /// Events appended since creation.
    pub appended: u64,
    /// Events dropped by retention.
    pub evicted: u64,
}

/// Storage backend for security events.
///
/// Implementations must be safe to share between request handlers: appends
/// racing each other still receive distinct ids and a total commit order.
pub trait AuditStore: Send + Sync {
    /// Appends an event, assigning its id, sequence and timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::StorageUnavailable`](crate::AuditError::StorageUnavailable)
    /// if the backend cannot accept the event.
    fn append(&self, event: NewEvent) -> AuditResult<AppendReceipt>;

    /// Returns matching events, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::StorageUnavailable`](crate::AuditError::StorageUnavailable)
    /// if the backend cannot be read.
    fn query(&self, filter: &EventFilter) -> AuditResult<Vec<SecurityEvent>>;

    /// Returns lifetime counters.
    fn stats(&self) -> StoreStats;

    /// Number of retained events.
    fn len(&self) -> usize {
        self.stats().retained
    }

    /// Returns true if no events are retained.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops events outside the age bound. Returns how many were dropped.
    ///
    /// Stores without an age bound keep the default, which drops nothing.
    fn purge_expired(&self) -> usize {
        0
    }
}

/// Retention bounds for [`MemoryAuditStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Maximum retained events; the oldest is evicted first.
    pub max_events: usize,
    /// Maximum event age; `None` keeps events until count eviction.
    pub max_age: Option<Duration>,
    /// Upper bound on events returned by a single query.
    pub max_page_size: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_events: DEFAULT_MAX_EVENTS,
            max_age: Some(DEFAULT_MAX_AGE),
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
        }
    }
}

impl RetentionPolicy {
    /// Sets the maximum number of retained events.
    #[must_use]
    pub const fn with_max_events(mut self, max_events: usize) -> Self {
        self.max_events = max_events;
        self
    }

    /// Sets the maximum event age.
    #[must_use]
    pub const fn with_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age;
        self
    }

    /// Sets the query page size.
    #[must_use]
    pub const fn with_max_page_size(mut self, max_page_size: usize) -> Self {
        self.max_page_size = max_page_size;
        self
    }

    /// Oldest timestamp still inside the age bound.
    fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let age = TimeDelta::from_std(self.max_age?).ok()?;
        now.checked_sub_signed(age)
    }
}

#[derive(Debug, Default)]
struct Ledger {
    events: VecDeque<SecurityEvent>,
    next_sequence: u64,
    last_timestamp: Option<DateTime<Utc>>,
    appended: u64,
    evicted: u64,
}

impl Ledger {
    fn evict_expired(&mut self, cutoff: Option<DateTime<Utc>>) -> usize {
        let Some(cutoff) = cutoff else {
            return 0;
        };
        let mut dropped = 0;
        while self.events.front().is_some_and(|e| e.timestamp() < cutoff) {
            self.events.pop_front();
            dropped += 1;
        }
        self.evicted += dropped as u64;
        dropped
    }

    fn evict_overflow(&mut self, max_events: usize) -> usize {
        let mut dropped = 0;
        while self.events.len() > max_events {
            self.events.pop_front();
            dropped += 1;
        }
        self.evicted += dropped as u64;
        dropped
    }
}

/// In-memory, bounded audit store.
pub struct MemoryAuditStore {
    retention: RetentionPolicy,
    ledger: Mutex<Ledger>,
    mirror: Arc<dyn AuditLogger>,
}

impl fmt::Debug for MemoryAuditStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryAuditStore")
            .field("retention", &self.retention)
            .field("retained", &self.ledger.lock().events.len())
            .finish_non_exhaustive()
    }
}

impl Default for MemoryAuditStore {
    fn default() -> Self {
        Self::new(RetentionPolicy::default())
    }
}

impl MemoryAuditStore {
    /// Creates a store with the given retention and no mirror.
    #[must_use]
    pub fn new(retention: RetentionPolicy) -> Self {
        Self {
            retention,
            ledger: Mutex::new(Ledger::default()),
            mirror: Arc::new(NoopAuditLogger::new()),
        }
    }

    /// Mirrors every committed event to `logger`.
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn AuditLogger>) -> Self {
        self.mirror = logger;
        self
    }
}

impl AuditStore for MemoryAuditStore {
    fn append(&self, event: NewEvent) -> AuditResult<AppendReceipt> {
        let recorded = {
            let mut ledger = self.ledger.lock();

            let now = Utc::now();
            let timestamp = match ledger.last_timestamp {
                Some(last) if last > now => last,
                _ => now,
            };
            let sequence = ledger.next_sequence;
            ledger.next_sequence += 1;
            ledger.last_timestamp = Some(timestamp);
            ledger.appended += 1;

            let recorded = SecurityEvent::record(event, sequence, timestamp);
            ledger.events.push_back(recorded.clone());

            ledger.evict_expired(self.retention.cutoff(timestamp));
            ledger.evict_overflow(self.retention.max_events);
            recorded
        };

        self.mirror.log(&recorded);

        Ok(AppendReceipt {
            event_id: recorded.event_id(),
            sequence: recorded.sequence(),
            timestamp: recorded.timestamp(),
        })
    }

    fn query(&self, filter: &EventFilter) -> AuditResult<Vec<SecurityEvent>> {
        let page = filter
            .limit
            .map_or(self.retention.max_page_size, |l| {
                l.min(self.retention.max_page_size)
            });
        let cutoff = self.retention.cutoff(Utc::now());

        let ledger = self.ledger.lock();
        Ok(ledger
            .events
            .iter()
            .rev()
            .filter(|e| cutoff.is_none_or(|c| e.timestamp() >= c))
            .filter(|e| filter.matches(e))
            .take(page)
            .cloned()
            .collect())
    }

    fn stats(&self) -> StoreStats {
        let ledger = self.ledger.lock();
        StoreStats {
            retained: ledger.events.len(),
            appended: ledger.appended,
            evicted: ledger.evicted,
        }
    }

    fn purge_expired(&self) -> usize {
        let cutoff = self.retention.cutoff(Utc::now());
        let dropped = self.ledger.lock().evict_expired(cutoff);
        if dropped > 0 {
            debug!(dropped, "purged expired audit events");
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventDetails;
    use proptest::prelude::*;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn violation(severity: Severity) -> NewEvent {
        let mut details = EventDetails::new();
        details.insert("violated-directive".into(), json!("script-src"));
        NewEvent::csp_violation(severity, details)
    }

    #[test]
    fn append_then_query_returns_event() {
        let store = MemoryAuditStore::default();
        let receipt = store.append(violation(Severity::High)).unwrap();

        let events = store
            .query(&EventFilter::for_type(EventType::CspViolation))
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_id(), receipt.event_id);
        assert_eq!(events[0].severity(), Severity::High);
        assert_eq!(events[0].details()["violated-directive"], "script-src");
    }

    #[test]
    fn query_is_most_recent_first() {
        let store = MemoryAuditStore::default();
        let first = store.append(violation(Severity::Low)).unwrap();
        let second = store.append(violation(Severity::Medium)).unwrap();
        let third = store.append(violation(Severity::High)).unwrap();

        let ids: Vec<_> = store
            .query(&EventFilter::all())
            .unwrap()
            .iter()
            .map(SecurityEvent::event_id)
            .collect();
        assert_eq!(ids, vec![third.event_id, second.event_id, first.event_id]);
    }

    #[test]
    fn unused_type_yields_empty() {
        let store = MemoryAuditStore::default();
        store.append(violation(Severity::High)).unwrap();

        let events = store
            .query(&EventFilter::for_type(EventType::AuthFailure))
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn query_on_empty_store_is_ok() {
        let store = MemoryAuditStore::default();
        assert!(store.query(&EventFilter::all()).unwrap().is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn filter_by_type_and_severity() {
        let store = MemoryAuditStore::default();
        store.append(violation(Severity::Low)).unwrap();
        store.append(violation(Severity::High)).unwrap();
        store.append(NewEvent::auth_failure("bad password")).unwrap();

        let csp = store
            .query(&EventFilter::for_type(EventType::CspViolation))
            .unwrap();
        assert_eq!(csp.len(), 2);

        let severe = store
            .query(&EventFilter::all().with_min_severity(Severity::Medium))
            .unwrap();
        assert_eq!(severe.len(), 2);
        assert!(severe.iter().all(|e| e.severity() >= Severity::Medium));
    }

    #[test]
    fn filter_by_time_window() {
        let store = MemoryAuditStore::default();
        let early = store.append(violation(Severity::Low)).unwrap();
        thread::sleep(Duration::from_millis(5));
        let late = store.append(violation(Severity::Low)).unwrap();

        let after = store
            .query(&EventFilter::all().with_since(late.timestamp))
            .unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].event_id(), late.event_id);

        let before = store
            .query(&EventFilter::all().with_until(early.timestamp))
            .unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(before[0].event_id(), early.event_id);
    }

    #[test]
    fn query_is_capped_by_page_size() {
        let store = MemoryAuditStore::new(RetentionPolicy::default().with_max_page_size(3));
        for _ in 0..10 {
            store.append(violation(Severity::Low)).unwrap();
        }

        assert_eq!(store.query(&EventFilter::all()).unwrap().len(), 3);
        assert_eq!(store.query(&EventFilter::all().with_limit(2)).unwrap().len(), 2);
        assert_eq!(store.query(&EventFilter::all().with_limit(50)).unwrap().len(), 3);
    }

    #[test]
    fn count_retention_evicts_oldest() {
        let store = MemoryAuditStore::new(RetentionPolicy::default().with_max_events(3));
        let receipts: Vec<_> = (0..5)
            .map(|_| store.append(violation(Severity::Low)).unwrap())
            .collect();

        let events = store.query(&EventFilter::all()).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].event_id(), receipts[4].event_id);
        assert_eq!(events[2].event_id(), receipts[2].event_id);

        let stats = store.stats();
        assert_eq!(stats.retained, 3);
        assert_eq!(stats.appended, 5);
        assert_eq!(stats.evicted, 2);
    }

    #[test]
    fn age_retention_hides_and_purges_old_events() {
        let store = MemoryAuditStore::new(
            RetentionPolicy::default().with_max_age(Some(Duration::from_millis(30))),
        );
        store.append(violation(Severity::Low)).unwrap();
        thread::sleep(Duration::from_millis(50));

        assert!(store.query(&EventFilter::all()).unwrap().is_empty());
        assert_eq!(store.purge_expired(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn no_age_bound_keeps_events() {
        let store = MemoryAuditStore::new(RetentionPolicy::default().with_max_age(None));
        store.append(violation(Severity::Low)).unwrap();
        assert_eq!(store.purge_expired(), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn mirror_sees_every_append() {
        #[derive(Default)]
        struct Counter(AtomicUsize);
        impl AuditLogger for Counter {
            fn log(&self, _event: &SecurityEvent) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let counter = Arc::new(Counter::default());
        let store = MemoryAuditStore::default().with_logger(counter.clone());
        store.append(violation(Severity::High)).unwrap();
        store.append(NewEvent::auth_failure("x")).unwrap();

        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn concurrent_appends_get_unique_ordered_ids() {
        let store = Arc::new(MemoryAuditStore::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    (0..100)
                        .map(|_| store.append(violation(Severity::Low)).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let receipts: Vec<AppendReceipt> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();

        let ids: HashSet<_> = receipts.iter().map(|r| r.event_id).collect();
        let sequences: HashSet<_> = receipts.iter().map(|r| r.sequence).collect();
        assert_eq!(ids.len(), 800);
        assert_eq!(sequences.len(), 800);

        let events = store
            .query(&EventFilter::all().with_limit(usize::MAX))
            .unwrap();
        for pair in events.windows(2) {
            assert!(pair[0].sequence() > pair[1].sequence());
            assert!(pair[0].timestamp() >= pair[1].timestamp());
        }
    }

    #[test]
    fn store_is_object_safe() {
        let store: Arc<dyn AuditStore> = Arc::new(MemoryAuditStore::default());
        store.append(violation(Severity::Info)).unwrap();
        assert_eq!(store.len(), 1);
    }

    proptest! {
        #[test]
        fn retained_never_exceeds_bound(max in 1usize..20, appends in 0usize..60) {
            let store = MemoryAuditStore::new(RetentionPolicy::default().with_max_events(max));
            for _ in 0..appends {
                store.append(violation(Severity::Low)).unwrap();
            }
            let stats = store.stats();
            prop_assert_eq!(stats.retained, appends.min(max));
            prop_assert_eq!(stats.appended, appends as u64);
            prop_assert_eq!(stats.evicted, appends.saturating_sub(max) as u64);
        }
    }
}
