//! Parallel parsing of compilation units.
//!
//! Parsing a unit touches no shared state, so units are parsed on a
//! `rayon` pool. The pool size comes from a caller-supplied
//! [`ConcurrencyPolicy`]; this module never picks a degree of parallelism
//! on its own. Cancellation is cooperative and checked once per unit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use rayon::prelude::*;

use crate::markup::Element;
use crate::model::ScopeTree;
use crate::parse::{CodeParser, LanguageRules, ParseError};

// ============================================================================
// Policies
// ============================================================================

/// How many workers a parsing batch may use.
pub trait ConcurrencyPolicy: Send + Sync {
    /// Upper bound on worker threads; at least 1.
    fn max_workers(&self) -> usize;
}

/// A fixed number of workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedWorkers(pub usize);

impl ConcurrencyPolicy for FixedWorkers {
    fn max_workers(&self) -> usize {
        self.0.max(1)
    }
}

/// A share of the cores reported by the operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvailableCores {
    /// Percentage of cores, 1..=100.
    pub percent: u8,
}

impl AvailableCores {
    /// All cores.
    pub fn all() -> Self {
        AvailableCores { percent: 100 }
    }
}

impl ConcurrencyPolicy for AvailableCores {
    fn max_workers(&self) -> usize {
        let cores = thread::available_parallelism().map(usize::from).unwrap_or(1);
        let percent = usize::from(self.percent.clamp(1, 100));
        (cores * percent / 100).max(1)
    }
}

// ============================================================================
// Cancellation
// ============================================================================

/// Shared flag checked before each unit is parsed.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Batch Parsing
// ============================================================================

/// Result for one unit of a batch.
#[derive(Debug)]
pub enum UnitOutcome {
    Parsed(ScopeTree),
    Failed(ParseError),
    /// The batch was cancelled before this unit started.
    Cancelled,
}

impl UnitOutcome {
    pub fn is_parsed(&self) -> bool {
        matches!(self, UnitOutcome::Parsed(_))
    }
}

/// Counts for a finished batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub parsed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl BatchSummary {
    pub fn of(outcomes: &[UnitOutcome]) -> Self {
        outcomes.iter().fold(BatchSummary::default(), |mut s, o| {
            match o {
                UnitOutcome::Parsed(_) => s.parsed += 1,
                UnitOutcome::Failed(_) => s.failed += 1,
                UnitOutcome::Cancelled => s.cancelled += 1,
            }
            s
        })
    }
}

/// Parse every unit; outcomes are returned in input order.
pub fn parse_all<R, P>(
    parser: &CodeParser<R>,
    units: &[Element],
    policy: &P,
    cancel: &CancellationToken,
) -> Vec<UnitOutcome>
where
    R: LanguageRules,
    P: ConcurrencyPolicy + ?Sized,
{
    let workers = policy.max_workers().max(1);
    let parse_one = |unit: &Element| -> UnitOutcome {
        if cancel.is_cancelled() {
            return UnitOutcome::Cancelled;
        }
        match parser.parse_unit(unit) {
            Ok(tree) => UnitOutcome::Parsed(tree),
            Err(err) => {
                tracing::warn!(error = %err, file = ?unit.file_name(), "failed to parse unit");
                UnitOutcome::Failed(err)
            }
        }
    };

    let outcomes: Vec<UnitOutcome> = match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
        Ok(pool) => pool.install(|| units.par_iter().map(parse_one).collect()),
        Err(err) => {
            tracing::warn!(error = %err, "could not build worker pool, parsing sequentially");
            units.iter().map(parse_one).collect()
        }
    };

    let summary = BatchSummary::of(&outcomes);
    tracing::info!(
        language = %parser.language(),
        workers,
        parsed = summary.parsed,
        failed = summary.failed,
        cancelled = summary.cancelled,
        "parsed batch"
    );
    outcomes
}

// ============================================================================
// Tests
// ============================================================================
