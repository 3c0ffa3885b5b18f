//! Outstanding request table
//!
//! A [`Correlator`] maps correlation ids to one-shot result slots. Each
//! registration hands back a [`PendingResponse`] that owns the waiting side;
//! the entry leaves the table when it is resolved, when the wait times out,
//! when the handle is dropped, or when the table is closed. A slot can be
//! fulfilled at most once, later resolutions for the same id are dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CorrelationError {
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("request cancelled by shutdown")]
    Shutdown,
    #[error("correlation id {0} is already pending")]
    Duplicate(Uuid),
}

struct Entry<T> {
    slot: oneshot::Sender<T>,
    seq: u64,
    deadline: Instant,
}

struct Table<T> {
    entries: HashMap<Uuid, Entry<T>>,
    next_seq: u64,
    closed: bool,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            next_seq: 0,
            closed: false,
        }
    }
}

/// Table of pending requests awaiting a `T`
pub struct Correlator<T> {
    table: Arc<Mutex<Table<T>>>,
}

impl<T> Clone for Correlator<T> {
    fn clone(&self) -> Self {
        Self {
            table: self.table.clone(),
        }
    }
}

impl<T> Default for Correlator<T> {
    fn default() -> Self {
        Self {
            table: Arc::new(Mutex::new(Table::default())),
        }
    }
}

impl<T> std::fmt::Debug for Correlator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let table = self.table.lock();
        f.debug_struct("Correlator")
            .field("pending", &table.entries.len())
            .field("closed", &table.closed)
            .finish()
    }
}

impl<T> Correlator<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the entry for `id` before the request goes out
    pub fn register(&self, id: Uuid, timeout: Duration) -> Result<PendingResponse<T>, CorrelationError> {
        let mut table = self.table.lock();
        if table.closed {
            return Err(CorrelationError::Shutdown);
        }
        if table.entries.contains_key(&id) {
            return Err(CorrelationError::Duplicate(id));
        }

        let (slot, receiver) = oneshot::channel();
        let deadline = Instant::now() + timeout;
        let seq = table.next_seq;
        table.next_seq += 1;
        table.entries.insert(id, Entry { slot, seq, deadline });

        Ok(PendingResponse {
            id,
            seq,
            timeout,
            deadline,
            receiver,
            table: self.table.clone(),
        })
    }

    /// Fulfil the entry for `id`
    ///
    /// Returns `false` when nothing is waiting, which is normal for a
    /// response that lost the race against its timeout.
    pub fn resolve(&self, id: &Uuid, value: T) -> bool {
        let entry = self.table.lock().entries.remove(id);
        match entry {
            Some(entry) => entry.slot.send(value).is_ok(),
            None => {
                tracing::debug!("dropping response for unknown correlation id {}", id);
                false
            }
        }
    }

    /// Fulfil the oldest unresolved entry, whichever request it belongs to
    pub fn resolve_first(&self, value: T) -> Option<Uuid> {
        let entry = {
            let mut table = self.table.lock();
            let id = table
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.seq)
                .map(|(id, _)| *id)?;
            table.entries.remove(&id).map(|entry| (id, entry))
        };
        let (id, entry) = entry?;
        entry.slot.send(value).ok().map(|_| id)
    }

    pub fn cancel(&self, id: &Uuid) -> bool {
        self.table.lock().entries.remove(id).is_some()
    }

    /// Fail every pending request with [`CorrelationError::Shutdown`]
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<_> = self.table.lock().entries.drain().collect();
        // dropping the senders wakes the waiters
        drained.len()
    }

    /// Cancel everything and refuse new registrations
    pub fn close(&self) -> usize {
        self.table.lock().closed = true;
        self.cancel_all()
    }

    pub fn is_closed(&self) -> bool {
        self.table.lock().closed
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.table.lock().entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.table.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.lock().entries.is_empty()
    }

    /// Earliest deadline among pending entries
    pub fn next_deadline(&self) -> Option<Instant> {
        self.table
            .lock()
            .entries
            .values()
            .map(|entry| entry.deadline)
            .min()
    }
}

/// The waiting side of one registration
///
/// Dropping the handle removes its entry from the table.
pub struct PendingResponse<T> {
    id: Uuid,
    seq: u64,
    timeout: Duration,
    deadline: Instant,
    receiver: oneshot::Receiver<T>,
    table: Arc<Mutex<Table<T>>>,
}

impl<T> PendingResponse<T> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Wait for the response until the deadline
    pub async fn wait(mut self) -> Result<T, CorrelationError> {
        match tokio::time::timeout_at(self.deadline, &mut self.receiver).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(CorrelationError::Shutdown),
            Err(_) => {
                tracing::debug!("request {} timed out after {:?}", self.id, self.timeout);
                Err(CorrelationError::Timeout(self.timeout))
            }
        }
    }
}

impl<T> Drop for PendingResponse<T> {
    fn drop(&mut self) {
        let mut table = self.table.lock();
        // only remove our own registration, the id may have been reused
        if table.entries.get(&self.id).map(|e| e.seq) == Some(self.seq) {
            table.entries.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_resolve_delivers_once() {
        let correlator = Correlator::new();
        let id = Uuid::new_v4();
        let pending = correlator.register(id, Duration::from_secs(5)).unwrap();

        assert!(correlator.resolve(&id, "first"));
        assert!(!correlator.resolve(&id, "second"));
        assert_eq!(pending.wait().await.unwrap(), "first");
        assert!(correlator.is_empty());
    }

    #[tokio::test]
    async fn test_response_before_wait_is_kept() {
        let correlator = Correlator::new();
        let id = Uuid::new_v4();
        let pending = correlator.register(id, Duration::from_secs(1)).unwrap();
        correlator.resolve(&id, 42);
        assert_eq!(pending.wait().await.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_removes_entry() {
        let correlator: Correlator<String> = Correlator::new();
        let id = Uuid::new_v4();
        let pending = correlator.register(id, Duration::from_millis(50)).unwrap();

        let started = Instant::now();
        let result = pending.wait().await;
        assert_eq!(result, Err(CorrelationError::Timeout(Duration::from_millis(50))));
        assert!(started.elapsed() < Duration::from_millis(100));
        assert!(!correlator.contains(&id));

        // a late response is dropped
        assert!(!correlator.resolve(&id, "late".into()));
    }

    #[tokio::test]
    async fn test_cancel_all_wakes_waiters_with_shutdown() {
        let correlator: Correlator<u8> = Correlator::new();
        let a = correlator.register(Uuid::new_v4(), Duration::from_secs(60)).unwrap();
        let b = correlator.register(Uuid::new_v4(), Duration::from_secs(60)).unwrap();

        assert_eq!(correlator.cancel_all(), 2);
        assert_eq!(a.wait().await, Err(CorrelationError::Shutdown));
        assert_eq!(b.wait().await, Err(CorrelationError::Shutdown));
    }

    #[tokio::test]
    async fn test_close_refuses_new_registrations() {
        let correlator: Correlator<u8> = Correlator::new();
        let pending = correlator.register(Uuid::new_v4(), Duration::from_secs(60)).unwrap();
        assert_eq!(correlator.close(), 1);
        assert!(correlator.is_closed());
        assert_eq!(pending.wait().await, Err(CorrelationError::Shutdown));
        assert!(matches!(
            correlator.register(Uuid::new_v4(), Duration::from_secs(1)),
            Err(CorrelationError::Shutdown)
        ));
    }

    #[tokio::test]
    async fn test_resolve_first_takes_oldest() {
        let correlator = Correlator::new();
        let first = correlator.register(Uuid::new_v4(), Duration::from_secs(5)).unwrap();
        let second = correlator.register(Uuid::new_v4(), Duration::from_secs(5)).unwrap();
        let first_id = first.id();

        assert_eq!(correlator.resolve_first("one"), Some(first_id));
        assert_eq!(correlator.resolve_first("two"), Some(second.id()));
        assert_eq!(correlator.resolve_first("three"), None);

        assert_eq!(first.wait().await.unwrap(), "one");
        assert_eq!(second.wait().await.unwrap(), "two");
    }

    #[tokio::test]
    async fn test_duplicate_and_drop_guard() {
        let correlator: Correlator<u8> = Correlator::new();
        let id = Uuid::new_v4();
        let pending = correlator.register(id, Duration::from_secs(5)).unwrap();
        assert!(matches!(
            correlator.register(id, Duration::from_secs(5)),
            Err(CorrelationError::Duplicate(_))
        ));
        assert!(correlator.next_deadline().is_some());
        drop(pending);
        assert!(!correlator.contains(&id));
        assert!(correlator.next_deadline().is_none());
    }
}
