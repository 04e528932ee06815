//! Process memory probing
//!
//! A [`MemoryProbe`] reports a [`MemorySnapshot`] on demand. With the
//! `process-memory` feature the default probe reads the current process
//! through `sysinfo`: `heap_used` is its resident size and `heap_total` the
//! memory it may use, the cgroup limit when one applies and host memory
//! otherwise. Other processes on the host do not move the used fraction.
//! Without the feature the default probe reports zeros.

#[cfg(feature = "process-memory")]
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Memory figures in bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySnapshot {
    /// Memory used by this process
    pub heap_used: u64,
    /// Memory this process may use
    pub heap_total: u64,
    /// Resident set size of this process
    pub rss: u64,
    /// Mapped memory beyond the resident set
    pub external: u64,
}

impl MemorySnapshot {
    /// `heap_used / heap_total`, or 0 when the total is unknown
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn heap_used_fraction(&self) -> f64 {
        if self.heap_total == 0 {
            0.0
        } else {
            self.heap_used as f64 / self.heap_total as f64
        }
    }
}

/// Source of memory snapshots
pub trait MemoryProbe: Send + Sync {
    /// Take a snapshot now
    fn snapshot(&self) -> MemorySnapshot;
}

impl<F> MemoryProbe for F
where
    F: Fn() -> MemorySnapshot + Send + Sync,
{
    fn snapshot(&self) -> MemorySnapshot {
        self()
    }
}

/// Probe that always reports an empty snapshot
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProbe;

impl MemoryProbe for NullProbe {
    fn snapshot(&self) -> MemorySnapshot {
        MemorySnapshot::default()
    }
}

/// Probe backed by `sysinfo`
#[cfg(feature = "process-memory")]
pub struct SysinfoProbe {
    system: parking_lot::Mutex<sysinfo::System>,
    pid: Option<sysinfo::Pid>,
}

#[cfg(feature = "process-memory")]
impl SysinfoProbe {
    /// Create a probe for the current process
    #[must_use]
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(err) => {
                tracing::warn!(error = err, "Cannot resolve current pid, process memory disabled");
                None
            }
        };
        Self { system: parking_lot::Mutex::new(sysinfo::System::new()), pid }
    }
}

#[cfg(feature = "process-memory")]
impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "process-memory")]
impl fmt::Debug for SysinfoProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SysinfoProbe").field("pid", &self.pid).finish_non_exhaustive()
    }
}

#[cfg(feature = "process-memory")]
impl MemoryProbe for SysinfoProbe {
    fn snapshot(&self) -> MemorySnapshot {
        let mut system = self.system.lock();
        system.refresh_memory();

        let limit = system
            .cgroup_limits()
            .map(|limits| limits.total_memory)
            .filter(|&total| total > 0)
            .unwrap_or_else(|| system.total_memory());
        let mut snapshot = MemorySnapshot { heap_total: limit, ..MemorySnapshot::default() };

        if let Some(pid) = self.pid {
            system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[pid]), true);
            if let Some(process) = system.process(pid) {
                snapshot.heap_used = process.memory();
                snapshot.rss = process.memory();
                snapshot.external = process.virtual_memory().saturating_sub(process.memory());
            }
        }

        snapshot
    }
}

/// The probe used when none is supplied
#[must_use]
pub fn default_probe() -> Arc<dyn MemoryProbe> {
    #[cfg(feature = "process-memory")]
    {
        Arc::new(SysinfoProbe::new())
    }
    #[cfg(not(feature = "process-memory"))]
    {
        Arc::new(NullProbe)
    }
}

/// Best-effort memory reclamation trigger, invoked under memory pressure
pub type ReclaimHook = Arc<dyn Fn() + Send + Sync>;

/// Fixed snapshot, handy for tests and for hosts that measure memory
/// themselves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticProbe(pub MemorySnapshot);

impl MemoryProbe for StaticProbe {
    fn snapshot(&self) -> MemorySnapshot {
        self.0
    }
}
