use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Per-provider circuit state.
///
/// Closed allows calls; Open skips the provider entirely until the cooldown
/// elapses; HalfOpen admits a single trial call whose outcome decides the
/// next state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Read-only health snapshot returned alongside aggregation results.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub name: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_latency_ms: Option<u64>,
}

struct Entry {
    state: CircuitState,
    consecutive_failures: u32,
    last_success_at: Option<DateTime<Utc>>,
    last_failure_at: Option<DateTime<Utc>>,
    last_latency_ms: Option<u64>,
    opened_at: Option<Instant>,
}

impl Entry {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_success_at: None,
            last_failure_at: None,
            last_latency_ms: None,
            opened_at: None,
        }
    }
}

/// Process-wide success/failure tracker with a circuit breaker per provider.
/// Mutated by every concurrent aggregation run; all transitions happen under
/// one mutex so the state enum can never be observed mid-transition. Two runs
/// racing an open->half-open flip is benign (at worst one extra trial call).
pub struct HealthMonitor {
    entries: Mutex<HashMap<String, Entry>>,
    failure_threshold: u32,
    cooldown: Duration,
}

impl HealthMonitor {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            failure_threshold: failure_threshold.max(1),
            cooldown,
        }
    }

    /// Whether the provider may be called right now. An open circuit whose
    /// cooldown has elapsed flips to half-open here, and the caller that saw
    /// the flip owns the trial call.
    pub fn acquire(&self, name: &str) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries.entry(name.to_string()).or_insert_with(Entry::new);
        match entry.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let cooled = entry
                    .opened_at
                    .is_none_or(|at| at.elapsed() >= self.cooldown);
                if cooled {
                    tracing::info!("Circuit for '{name}' half-open, allowing trial call");
                    entry.state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
            // A trial is already in flight.
            CircuitState::HalfOpen => false,
        }
    }

    pub fn record_success(&self, name: &str, latency: Duration) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries.entry(name.to_string()).or_insert_with(Entry::new);
        if entry.state != CircuitState::Closed {
            tracing::info!("Circuit for '{name}' closed after successful call");
        }
        entry.state = CircuitState::Closed;
        entry.consecutive_failures = 0;
        entry.last_success_at = Some(Utc::now());
        entry.last_latency_ms = Some(latency.as_millis() as u64);
        entry.opened_at = None;
    }

    pub fn record_failure(&self, name: &str, latency: Option<Duration>) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries.entry(name.to_string()).or_insert_with(Entry::new);
        entry.consecutive_failures += 1;
        entry.last_failure_at = Some(Utc::now());
        if let Some(latency) = latency {
            entry.last_latency_ms = Some(latency.as_millis() as u64);
        }
        match entry.state {
            CircuitState::HalfOpen => {
                tracing::warn!("Trial call to '{name}' failed, reopening circuit");
                entry.state = CircuitState::Open;
                entry.opened_at = Some(Instant::now());
            }
            CircuitState::Closed if entry.consecutive_failures >= self.failure_threshold => {
                tracing::warn!(
                    "Circuit for '{name}' opened after {} consecutive failures",
                    entry.consecutive_failures
                );
                entry.state = CircuitState::Open;
                entry.opened_at = Some(Instant::now());
            }
            _ => {}
        }
    }

    /// Snapshot of every tracked provider, sorted by name for stable output.
    pub fn snapshot(&self) -> Vec<ProviderStatus> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut statuses: Vec<ProviderStatus> = entries
            .iter()
            .map(|(name, e)| ProviderStatus {
                name: name.clone(),
                state: e.state,
                consecutive_failures: e.consecutive_failures,
                last_success_at: e.last_success_at,
                last_failure_at: e.last_failure_at,
                last_latency_ms: e.last_latency_ms,
            })
            .collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    #[cfg(test)]
    pub fn state_of(&self, name: &str) -> Option<CircuitState> {
        self.entries.lock().unwrap().get(name).map(|e| e.state)
    }
}
