//! Build Monitor: the single sink for nonconformities and progress.
//!
//! The monitor alone decides whether a nonconformity aborts the build. The
//! sequencer and every stage report through a shared `&BuildMonitor`, so its
//! state sits behind interior mutability; a build is single-threaded.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::error::{BuildError, Result};
use crate::domain::nonconformity::Nonconformity;
use crate::domain::unit::BuildUnit;
use crate::obs;

/// How the monitor responds to a nonconformity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStrategy {
    /// Abort on the first nonconformity.
    FailFast,
    /// Collect everything and report at the end.
    Comprehensive,
}

impl ResponseStrategy {
    pub fn from_fail_fast(fail_fast: bool) -> Self {
        if fail_fast {
            ResponseStrategy::FailFast
        } else {
            ResponseStrategy::Comprehensive
        }
    }
}

#[derive(Debug)]
pub struct BuildMonitor {
    strategy: ResponseStrategy,
    nonconformities: RefCell<Vec<Nonconformity>>,
    units: Cell<usize>,
    started: Instant,
}

impl BuildMonitor {
    pub fn new(strategy: ResponseStrategy) -> Self {
        Self {
            strategy,
            nonconformities: RefCell::new(Vec::new()),
            units: Cell::new(0),
            started: Instant::now(),
        }
    }

    pub fn strategy(&self) -> ResponseStrategy {
        self.strategy
    }

    /// Record a nonconformity. In fail-fast mode this returns
    /// [`BuildError::Aborted`], which callers propagate with `?`.
    pub fn report_nonconformity(&self, nc: Nonconformity) -> Result<()> {
        obs::emit_nonconformity(&nc);
        self.nonconformities.borrow_mut().push(nc.clone());
        match self.strategy {
            ResponseStrategy::FailFast => Err(BuildError::Aborted(nc)),
            ResponseStrategy::Comprehensive => Ok(()),
        }
    }

    /// Announce the unit about to be processed.
    pub fn report_progress(&self, unit: &BuildUnit) {
        let seq = self.units.get() + 1;
        self.units.set(seq);
        obs::emit_unit_processed(&unit.rel_path, seq);
    }

    pub fn nonconformity_count(&self) -> usize {
        self.nonconformities.borrow().len()
    }

    pub fn units_processed(&self) -> usize {
        self.units.get()
    }

    /// Close the build and hand over everything that was reported.
    pub fn notify_build_end(&self) -> BuildReport {
        let report = BuildReport {
            nonconformities: self.nonconformities.take(),
            units_processed: self.units.get(),
            duration_ms: self.started.elapsed().as_millis() as u64,
        };
        if report.nonconformities.is_empty() {
            info!(units = report.units_processed, "build end: no nonconformities");
        } else {
            warn!(
                units = report.units_processed,
                nonconformities = report.nonconformities.len(),
                "build end\n{}",
                report.render()
            );
        }
        report
    }
}

/// Everything a build reported, in report order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    pub nonconformities: Vec<Nonconformity>,
    pub units_processed: usize,
    pub duration_ms: u64,
}

impl BuildReport {
    pub fn is_clean(&self) -> bool {
        self.nonconformities.is_empty()
    }

    /// Nonconformities grouped by tool and numbered across the whole report.
    pub fn render(&self) -> String {
        let mut by_tool: BTreeMap<&str, Vec<&Nonconformity>> = BTreeMap::new();
        for nc in &self.nonconformities {
            by_tool.entry(nc.tool.as_str()).or_default().push(nc);
        }
        let mut out = String::new();
        let mut number = 0usize;
        for (tool, items) in by_tool {
            let _ = writeln!(out, "{tool} ({}):", items.len());
            for nc in items {
                number += 1;
                let _ = writeln!(
                    out,
                    "  {number:>3}. {} [{}] {}",
                    nc.location(),
                    nc.msg_id,
                    nc.msg
                );
            }
        }
        let _ = write!(
            out,
            "{} nonconformities in {} units",
            self.nonconformities.len(),
            self.units_processed
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nc(tool: &str, path: &str) -> Nonconformity {
        Nonconformity::new(tool, "x", "bad", path).at_line(1)
    }

    #[test]
    fn test_comprehensive_collects_all() {
        let monitor = BuildMonitor::new(ResponseStrategy::Comprehensive);
        monitor.report_nonconformity(nc("style", "a.rs")).unwrap();
        monitor.report_nonconformity(nc("lint", "b.rs")).unwrap();
        let report = monitor.notify_build_end();
        assert_eq!(report.nonconformities.len(), 2);
        assert_eq!(report.nonconformities[0].tool, "style");
    }

    #[test]
    fn test_fail_fast_aborts_on_first() {
        let monitor = BuildMonitor::new(ResponseStrategy::FailFast);
        let err = monitor.report_nonconformity(nc("style", "a.rs")).unwrap_err();
        match err {
            BuildError::Aborted(first) => assert_eq!(first.path.to_str(), Some("a.rs")),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(monitor.nonconformity_count(), 1);
    }

    #[test]
    fn test_render_groups_and_numbers() {
        let report = BuildReport {
            nonconformities: vec![nc("style", "a.rs"), nc("lint", "b.rs"), nc("style", "c.rs")],
            units_processed: 3,
            duration_ms: 0,
        };
        let text = report.render();
        let lint_at = text.find("lint (1):").unwrap();
        let style_at = text.find("style (2):").unwrap();
        assert!(lint_at < style_at);
        assert!(text.contains("  1. b.rs:1 [x] bad"));
        assert!(text.contains("  3. c.rs:1 [x] bad"));
        assert!(text.ends_with("3 nonconformities in 3 units"));
    }
}
