//! Per-operation timing hooks
//!
//! Every primitive store call is bracketed by [`PerfTracker::begin`] and
//! [`PerfTracker::end`]. [`PerfStats`] is an accumulating tracker that the
//! CLI prints with `--debug`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

/// Kind of primitive store call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Get,
    Put,
    Head,
    List,
    Copy,
    Delete,
}

impl OpKind {
    pub const ALL: [OpKind; 6] = [
        OpKind::Get,
        OpKind::Put,
        OpKind::Head,
        OpKind::List,
        OpKind::Copy,
        OpKind::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Get => "get",
            OpKind::Put => "put",
            OpKind::Head => "head",
            OpKind::List => "list",
            OpKind::Copy => "copy",
            OpKind::Delete => "delete",
        }
    }

    /// Stable log code for a failure of this kind of call
    pub fn error_code(&self) -> &'static str {
        match self {
            OpKind::Get => "err_get",
            OpKind::Put => "err_put",
            OpKind::Head => "err_head",
            OpKind::List => "err_list",
            OpKind::Copy => "err_copy",
            OpKind::Delete => "err_delete",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hooks invoked around each primitive call
pub trait PerfTracker: Send + Sync {
    fn begin(&self, op: OpKind, key: &str);

    fn end(&self, op: OpKind, key: &str, elapsed: Duration, ok: bool);
}

/// Aggregate timings for one [`OpKind`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OpStats {
    pub calls: u64,
    pub failures: u64,
    #[serde(with = "duration_ms")]
    pub total: Duration,
    #[serde(with = "duration_ms")]
    pub max: Duration,
}

impl OpStats {
    pub fn mean(&self) -> Duration {
        if self.calls == 0 {
            Duration::ZERO
        } else {
            self.total / self.calls as u32
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }
}

/// Accumulating [`PerfTracker`]
#[derive(Debug, Default)]
pub struct PerfStats {
    stats: Mutex<HashMap<OpKind, OpStats>>,
}

impl PerfStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stats for one kind of call
    pub fn get(&self, op: OpKind) -> OpStats {
        self.lock().get(&op).copied().unwrap_or_default()
    }

    /// Every kind with at least one call, in [`OpKind::ALL`] order
    pub fn snapshot(&self) -> Vec<(OpKind, OpStats)> {
        let stats = self.lock();
        OpKind::ALL
            .iter()
            .filter_map(|op| stats.get(op).map(|s| (*op, *s)))
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<OpKind, OpStats>> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PerfTracker for PerfStats {
    fn begin(&self, _op: OpKind, _key: &str) {}

    fn end(&self, op: OpKind, _key: &str, elapsed: Duration, ok: bool) {
        let mut stats = self.lock();
        let entry = stats.entry(op).or_default();
        entry.calls += 1;
        if !ok {
            entry.failures += 1;
        }
        entry.total += elapsed;
        entry.max = entry.max.max(elapsed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_kind_codes() {
        assert_eq!(OpKind::Get.as_str(), "get");
        assert_eq!(OpKind::Delete.error_code(), "err_delete");
        assert_eq!(OpKind::List.to_string(), "list");
    }

    #[test]
    fn test_perf_stats_accumulate() {
        let stats = PerfStats::new();
        stats.end(OpKind::Get, "a", Duration::from_millis(10), true);
        stats.end(OpKind::Get, "b", Duration::from_millis(30), false);
        stats.end(OpKind::Put, "c", Duration::from_millis(5), true);

        let get = stats.get(OpKind::Get);
        assert_eq!(get.calls, 2);
        assert_eq!(get.failures, 1);
        assert_eq!(get.max, Duration::from_millis(30));
        assert_eq!(get.mean(), Duration::from_millis(20));

        assert_eq!(stats.get(OpKind::Head), OpStats::default());
        let kinds: Vec<_> = stats.snapshot().into_iter().map(|(op, _)| op).collect();
        assert_eq!(kinds, vec![OpKind::Get, OpKind::Put]);
    }
}
