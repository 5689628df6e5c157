//! Process and runtime context snapshots
//!
//! The normalizer fills `contexts.system` (dynamic) and `contexts.runtime`
//! (static) from a [`ContextProvider`]. The default implementation reads
//! from the current process; tests substitute a fixed provider.

use std::time::Instant;

use once_cell::sync::Lazy;
use serde_json::json;

/// Sampled once so uptime can be reported relative to SDK load.
static PROCESS_START: Lazy<Instant> = Lazy::new(Instant::now);

/// Supplies context snapshots merged into events during normalization.
pub trait ContextProvider: Send + Sync {
    /// Static snapshot: platform, architecture, versions.
    fn static_context(&self) -> serde_json::Value;

    /// Dynamic snapshot: pid, uptime, memory.
    fn dynamic_context(&self) -> serde_json::Value;
}

/// Default provider reading from the current process.
#[derive(Debug, Default)]
pub struct ProcessContextProvider;

impl ProcessContextProvider {
    /// Forces the uptime baseline to be sampled.
    pub fn new() -> Self {
        Lazy::force(&PROCESS_START);
        ProcessContextProvider
    }
}

impl ContextProvider for ProcessContextProvider {
    fn static_context(&self) -> serde_json::Value {
        json!({
            "platform": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
            "versions": {
                "sdk": env!("CARGO_PKG_VERSION"),
            },
        })
    }

    fn dynamic_context(&self) -> serde_json::Value {
        let mut context = json!({
            "pid": std::process::id(),
            "uptimeSeconds": PROCESS_START.elapsed().as_secs(),
        });
        if let Some(rss) = resident_memory_bytes() {
            context["memoryUsage"] = json!({ "rss": rss });
        }
        context
    }
}

/// Resident set size of the current process, when the platform exposes it.
#[cfg(target_os = "linux")]
fn resident_memory_bytes() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(pages * 4096)
}

#[cfg(not(target_os = "linux"))]
fn resident_memory_bytes() -> Option<u64> {
    None
}
