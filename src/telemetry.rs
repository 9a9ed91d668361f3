//! Raw telemetry export (§6) is explicitly an experiment-harness concern:
//! the scheduling core never shells out to a metrics store itself. This
//! module only defines the interface a harness implements, plus the small
//! value type the core hands it at finalization.

use std::time::Instant;

/// Everything the core knows about a completed run that a harness might
/// need to pull CPU/mem/disk/net time-series for.
#[derive(Debug, Clone)]
pub struct RunWindow {
    pub node_addresses: Vec<String>,
    pub started_at: Instant,
    pub stopped_at: Instant,
}

impl RunWindow {
    pub fn duration(&self) -> std::time::Duration {
        self.stopped_at.duration_since(self.started_at)
    }
}

/// A harness-side collaborator that exports raw per-node telemetry for a
/// finished run. The scheduling core calls `export` once, at finalization,
/// and does not interpret its result.
pub trait TelemetryExport: Send + Sync {
    fn export(&self, window: &RunWindow);
}

/// A no-op export used when no harness is wired up (the CLI demo, and most
/// tests).
pub struct NullTelemetryExport;

impl TelemetryExport for NullTelemetryExport {
    fn export(&self, window: &RunWindow) {
        log::debug!(
            "no telemetry export configured; run covered {} nodes over {:?}",
            window.node_addresses.len(),
            window.duration()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_window_duration_is_non_negative() {
        let started = Instant::now();
        let window = RunWindow {
            node_addresses: vec!["n0".into()],
            started_at: started,
            stopped_at: started,
        };
        assert_eq!(window.duration(), std::time::Duration::from_secs(0));
    }
}
