// Range-keyed chart cache with coalesced, abortable, sequence-gated fetches.
//
// At most one display fetch is in flight. Every started fetch, and every switch to a cached
// range, takes the next request sequence number; only the holder of the latest number may
// commit. Aborted or superseded fetches resolve to `FetchError::Aborted` /
// `FetchOutcome::Discarded` and never touch state.
//
// `load` serves request/response callers. It reads and fills the range cache but never the
// displayed map, with at most one load per range in flight.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::models::{ChartMap, TimeRange};

/// Where chart maps come from (the history service in-process, a remote API in a client).
pub trait ChartSource: Send + Sync + 'static {
    fn fetch(&self, range: TimeRange) -> impl Future<Output = anyhow::Result<ChartMap>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// Superseded by a prioritized fetch or cancelled by teardown.
    #[error("chart fetch aborted")]
    Aborted,
    #[error("chart fetch task failed: {0}")]
    Task(String),
    #[error("chart source failed: {0}")]
    Source(String),
}

/// What a completed fetch did to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Committed,
    /// Empty response while non-empty data is displayed; the old data stays.
    RetainedStale,
    /// A newer request was issued (or the cache was torn down) before this one resolved.
    Discarded,
    /// The source returned an error; logged, state untouched.
    Failed,
}

type DoneFuture = Shared<BoxFuture<'static, Result<FetchOutcome, FetchError>>>;
type LoadFuture = Shared<BoxFuture<'static, Result<Arc<ChartMap>, FetchError>>>;

/// Handle to a started or coalesced fetch. Awaiting it is optional.
#[derive(Clone)]
pub struct FetchTicket {
    seq: u64,
    range: TimeRange,
    coalesced: bool,
    done: DoneFuture,
}

impl FetchTicket {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn range(&self) -> TimeRange {
        self.range
    }

    /// True when the call joined an in-flight fetch instead of starting one.
    pub fn is_coalesced(&self) -> bool {
        self.coalesced
    }

    pub async fn wait(self) -> Result<FetchOutcome, FetchError> {
        self.done.await
    }
}

struct CacheEntry {
    map: Arc<ChartMap>,
    cached_at: Instant,
}

struct InFlight {
    seq: u64,
    range: TimeRange,
    abort: AbortHandle,
    done: DoneFuture,
}

struct Load {
    abort: AbortHandle,
    done: LoadFuture,
}

struct CacheState {
    active_range: TimeRange,
    entries: HashMap<TimeRange, CacheEntry>,
    displayed: Option<Arc<ChartMap>>,
    request_seq: u64,
    in_flight: Option<InFlight>,
    loads: HashMap<TimeRange, Load>,
    torn_down: bool,
}

impl CacheState {
    fn fresh_entry(&mut self, range: TimeRange, ttl: Duration) -> Option<Arc<ChartMap>> {
        let entry = self.entries.get(&range)?;
        if entry.cached_at.elapsed() < ttl {
            return Some(entry.map.clone());
        }
        self.entries.remove(&range);
        tracing::debug!(range = %range, "chart cache entry expired");
        None
    }

    fn store(&mut self, range: TimeRange, map: Arc<ChartMap>, ttl: Duration) {
        self.entries.retain(|_, e| e.cached_at.elapsed() < ttl);
        self.entries.insert(
            range,
            CacheEntry {
                map,
                cached_at: Instant::now(),
            },
        );
    }
}

pub struct ChartCache<S> {
    source: Arc<S>,
    ttl: Duration,
    state: Arc<Mutex<CacheState>>,
}

impl<S: ChartSource> ChartCache<S> {
    pub fn new(source: Arc<S>, initial_range: TimeRange, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            state: Arc::new(Mutex::new(CacheState {
                active_range: initial_range,
                entries: HashMap::new(),
                displayed: None,
                request_seq: 0,
                in_flight: None,
                loads: HashMap::new(),
                torn_down: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn active_range(&self) -> TimeRange {
        self.lock().active_range
    }

    /// Map currently shown (last committed, or hydrated from the range cache).
    pub fn displayed(&self) -> Option<Arc<ChartMap>> {
        self.lock().displayed.clone()
    }

    pub fn in_flight_range(&self) -> Option<TimeRange> {
        self.lock().in_flight.as_ref().map(|f| f.range)
    }

    pub fn is_torn_down(&self) -> bool {
        self.lock().torn_down
    }

    /// Serve an unexpired cached map for `range` synchronously. `false` means the caller
    /// has to fetch. A hit supersedes any fetch in flight for another range.
    pub fn hydrate_from_range_cache(&self, range: TimeRange) -> bool {
        let mut state = self.lock();
        let Some(map) = state.fresh_entry(range, self.ttl) else {
            return false;
        };
        if let Some(current) = state.in_flight.take_if(|f| f.range != range) {
            tracing::debug!(
                aborted_range = %current.range,
                aborted_seq = current.seq,
                range = %range,
                "range cache hit supersedes in-flight chart fetch"
            );
            current.abort.abort();
            state.request_seq += 1;
        }
        state.active_range = range;
        state.displayed = Some(map);
        true
    }

    /// Start a fetch for `range`. While a fetch for the same range is in flight the call is
    /// coalesced into it unless `prioritize` is set; a prioritized call, or one for another
    /// range, aborts the in-flight fetch and starts over. Must run inside a tokio runtime.
    pub fn fetch_charts(&self, range: TimeRange, prioritize: bool) -> FetchTicket {
        let mut state = self.lock();

        if let Some(current) = &state.in_flight {
            if current.range == range && !prioritize {
                tracing::trace!(range = %range, seq = current.seq, "chart fetch coalesced");
                return FetchTicket {
                    seq: current.seq,
                    range,
                    coalesced: true,
                    done: current.done.clone(),
                };
            }
            tracing::debug!(
                aborted_range = %current.range,
                aborted_seq = current.seq,
                range = %range,
                "aborting in-flight chart fetch"
            );
            current.abort.abort();
        }

        state.request_seq += 1;
        let seq = state.request_seq;
        state.active_range = range;

        let source = self.source.clone();
        let shared_state = self.state.clone();
        let ttl = self.ttl;
        let handle = tokio::spawn(async move {
            let result = source.fetch(range).await;
            commit(&shared_state, seq, range, result, ttl)
        });
        let abort = handle.abort_handle();
        let done: DoneFuture = async move {
            match handle.await {
                Ok(outcome) => Ok(outcome),
                Err(e) if e.is_cancelled() => Err(FetchError::Aborted),
                Err(e) => Err(FetchError::Task(e.to_string())),
            }
        }
        .boxed()
        .shared();

        state.in_flight = Some(InFlight {
            seq,
            range,
            abort,
            done: done.clone(),
        });

        FetchTicket {
            seq,
            range,
            coalesced: false,
            done,
        }
    }

    /// Cached map for `range`, fetching when the cache misses. Concurrent loads of one range
    /// share a fetch; loads never abort each other or the display fetch. Failures and
    /// teardown degrade to an empty map, never to another range's data.
    pub async fn load(&self, range: TimeRange) -> Arc<ChartMap> {
        let done = {
            let mut state = self.lock();
            if let Some(map) = state.fresh_entry(range, self.ttl) {
                return map;
            }
            if state.torn_down {
                tracing::debug!(range = %range, "chart load after teardown");
                return Arc::default();
            }
            match state.loads.get(&range) {
                Some(load) => load.done.clone(),
                None => self.start_load(&mut state, range),
            }
        };
        match done.await {
            Ok(map) => map,
            Err(FetchError::Aborted) => {
                tracing::debug!(range = %range, "chart load aborted");
                Arc::default()
            }
            Err(e) => {
                tracing::warn!(error = %e, range = %range, operation = "load", "chart load failed");
                Arc::default()
            }
        }
    }

    fn start_load(&self, state: &mut CacheState, range: TimeRange) -> LoadFuture {
        let source = self.source.clone();
        let shared_state = self.state.clone();
        let ttl = self.ttl;
        let handle = tokio::spawn(async move {
            let result = source.fetch(range).await;
            let mut state = shared_state.lock().unwrap_or_else(PoisonError::into_inner);
            state.loads.remove(&range);
            let map = match result {
                Ok(map) => Arc::new(map),
                Err(e) => return Err(FetchError::Source(e.to_string())),
            };
            if !state.torn_down {
                state.store(range, map.clone(), ttl);
            }
            Ok(map)
        });
        let abort = handle.abort_handle();
        let done: LoadFuture = async move {
            match handle.await {
                Ok(result) => result,
                Err(e) if e.is_cancelled() => Err(FetchError::Aborted),
                Err(e) => Err(FetchError::Task(e.to_string())),
            }
        }
        .boxed()
        .shared();
        state.loads.insert(
            range,
            Load {
                abort,
                done: done.clone(),
            },
        );
        tracing::trace!(range = %range, "chart load started");
        done
    }

    /// Abort anything in flight and refuse all later commits.
    pub fn teardown(&self) {
        let mut state = self.lock();
        state.torn_down = true;
        state.request_seq += 1;
        if let Some(in_flight) = state.in_flight.take() {
            in_flight.abort.abort();
            tracing::debug!(seq = in_flight.seq, "chart cache torn down with fetch in flight");
        }
        for (_, load) in state.loads.drain() {
            load.abort.abort();
        }
    }
}

fn commit(
    state: &Mutex<CacheState>,
    seq: u64,
    range: TimeRange,
    result: anyhow::Result<ChartMap>,
    ttl: Duration,
) -> FetchOutcome {
    let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
    if state.torn_down || state.request_seq != seq {
        tracing::debug!(
            seq,
            latest = state.request_seq,
            range = %range,
            "stale chart response discarded"
        );
        return FetchOutcome::Discarded;
    }
    if state.in_flight.as_ref().is_some_and(|f| f.seq == seq) {
        state.in_flight = None;
    }

    let map = match result {
        Ok(map) => map,
        Err(e) => {
            tracing::warn!(error = %e, range = %range, operation = "fetch_charts", "chart fetch failed");
            return FetchOutcome::Failed;
        }
    };

    // Backend hiccups return empty maps; keep showing the last good data instead of blanking.
    let showing_data = state.displayed.as_ref().is_some_and(|m| !m.is_empty());
    if map.is_empty() && showing_data {
        tracing::debug!(range = %range, "empty chart response, retaining displayed data");
        return FetchOutcome::RetainedStale;
    }

    let map = Arc::new(map);
    state.store(range, map.clone(), ttl);
    if range != state.active_range {
        tracing::debug!(
            range = %range,
            active = %state.active_range,
            "chart data cached, not displayed"
        );
        return FetchOutcome::Committed;
    }
    state.displayed = Some(map);
    tracing::debug!(range = %range, seq, "chart data committed");
    FetchOutcome::Committed
}
