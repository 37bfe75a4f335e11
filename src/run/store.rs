use crate::core::entity::EntityCode;
use crate::core::ledger::ConsolLine;
use crate::core::period::Period;
use crate::core::posting::IntercompanyPosting;
use crate::elimination::matcher::MatchProposal;
use crate::error::{ConsolidationError, Result};
use crate::graph::resolver::OwnershipResolution;
use crate::run::state::RunState;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// One consolidation run row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRecord {
    pub id: Uuid,
    pub group: String,
    pub period: Period,
    pub dry_run: bool,
    pub state: RunState,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Most recent earlier run for the same group and period.
    pub supersedes: Option<Uuid>,
    pub failure: Option<String>,
    pub locked_by: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
}

/// A configuration error found while computing one entity. The entity is
/// left out of the run and the run cannot be locked.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigurationIssue {
    pub entity: EntityCode,
    #[serde(serialize_with = "display")]
    pub error: ConsolidationError,
}

fn display<S: Serializer>(error: &ConsolidationError, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

/// Headline figures of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub entities_consolidated: usize,
    pub entities_equity_method: usize,
    pub entities_excluded: usize,
    pub configuration_issues: usize,
    pub line_count: usize,
    pub total_cta: rust_decimal::Decimal,
    pub total_eliminations: rust_decimal::Decimal,
    pub total_nci: rust_decimal::Decimal,
    pub matched_pairs: usize,
    pub pending_proposals: usize,
    pub unresolved_postings: usize,
    pub match_rate: f64,
    pub balanced: bool,
}

/// Everything a computed run produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResult {
    pub lines: Vec<ConsolLine>,
    pub resolution: OwnershipResolution,
    pub unresolved: Vec<IntercompanyPosting>,
    pub pending: Vec<MatchProposal>,
    pub issues: Vec<ConfigurationIssue>,
    pub summary: RunSummary,
}

#[derive(Debug, Default)]
struct Inner {
    runs: HashMap<Uuid, RunRecord>,
    results: HashMap<Uuid, RunResult>,
    /// Lines accumulated while `COMPUTING`; never readable.
    staged: HashMap<Uuid, Vec<ConsolLine>>,
    locks: HashMap<(String, Period), Uuid>,
}

/// Run rows, line rows and the (group, year, month) lock table.
///
/// All mutations go through one mutex so a state change and the lock table
/// always move together.
#[derive(Debug, Default)]
pub struct RunStore {
    inner: Mutex<Inner>,
}

impl RunStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn create_run(&self, group: &str, period: Period, dry_run: bool, created_by: &str) -> RunRecord {
        let mut inner = self.inner();
        let supersedes = inner
            .runs
            .values()
            .filter(|r| r.group == group && r.period == period && r.state != RunState::Failed)
            .max_by_key(|r| r.created_at)
            .map(|r| r.id);
        let now = Utc::now();
        let record = RunRecord {
            id: Uuid::new_v4(),
            group: group.to_string(),
            period,
            dry_run,
            state: RunState::Draft,
            created_by: created_by.to_string(),
            created_at: now,
            updated_at: now,
            supersedes,
            failure: None,
            locked_by: None,
            locked_at: None,
        };
        inner.runs.insert(record.id, record.clone());
        record
    }

    pub fn get(&self, run_id: Uuid) -> Result<RunRecord> {
        self.inner()
            .runs
            .get(&run_id)
            .cloned()
            .ok_or(ConsolidationError::RunNotFound(run_id))
    }

    /// Runs for a group and period, oldest first.
    pub fn runs_for(&self, group: &str, period: Period) -> Vec<RunRecord> {
        let mut runs: Vec<RunRecord> = self
            .inner()
            .runs
            .values()
            .filter(|r| r.group == group && r.period == period)
            .cloned()
            .collect();
        runs.sort_by_key(|r| r.created_at);
        runs
    }

    /// The run currently holding the lock for a group and period.
    pub fn in_progress(&self, group: &str, period: Period) -> Option<Uuid> {
        self.inner().locks.get(&(group.to_string(), period)).copied()
    }

    /// Take the (group, period) lock and move the run to `COMPUTING`.
    pub fn begin_compute(&self, run_id: Uuid) -> Result<()> {
        let mut inner = self.inner();
        let record = inner.runs.get(&run_id).ok_or(ConsolidationError::RunNotFound(run_id))?;
        let key = (record.group.clone(), record.period);
        check_transition(record, RunState::Computing)?;
        if let Some(holder) = inner.locks.get(&key) {
            return Err(ConsolidationError::RunInProgress {
                group: key.0,
                period: key.1,
                run_id: *holder,
            });
        }
        log::info!("run {} acquired lock {} {}", run_id, key.0, key.1);
        inner.locks.insert(key, run_id);
        inner.staged.insert(run_id, Vec::new());
        set_state(&mut inner, run_id, RunState::Computing);
        Ok(())
    }

    /// Add lines to a computing run. Staged lines become visible only when
    /// the run completes.
    pub fn append_lines(&self, run_id: Uuid, lines: Vec<ConsolLine>) -> Result<()> {
        let mut inner = self.inner();
        let record = inner.runs.get(&run_id).ok_or(ConsolidationError::RunNotFound(run_id))?;
        match record.state {
            RunState::Computing => {}
            RunState::Locked => return Err(ConsolidationError::RunLocked { run_id }),
            other => {
                return Err(ConsolidationError::InvalidTransition {
                    run_id,
                    from: other.to_string(),
                    to: "APPEND_LINES".to_string(),
                })
            }
        }
        inner.staged.entry(run_id).or_default().extend(lines);
        Ok(())
    }

    /// Commit staged lines and move to `COMPUTED`. A dry run keeps its
    /// report but no lines.
    pub fn complete(&self, run_id: Uuid, mut result: RunResult) -> Result<RunRecord> {
        let mut inner = self.inner();
        let record = inner.runs.get(&run_id).ok_or(ConsolidationError::RunNotFound(run_id))?;
        check_transition(record, RunState::Computed)?;
        let dry_run = record.dry_run;
        let staged = inner.staged.remove(&run_id).unwrap_or_default();
        result.lines = if dry_run { Vec::new() } else { staged };
        inner.results.insert(run_id, result);
        release(&mut inner, run_id);
        set_state(&mut inner, run_id, RunState::Computed);
        self.log_transition(&inner, run_id);
        inner.runs.get(&run_id).cloned().ok_or(ConsolidationError::RunNotFound(run_id))
    }

    /// Move to `FAILED`, dropping anything staged.
    pub fn fail(&self, run_id: Uuid, reason: &str) -> Result<RunRecord> {
        let mut inner = self.inner();
        let record = inner.runs.get(&run_id).ok_or(ConsolidationError::RunNotFound(run_id))?;
        check_transition(record, RunState::Failed)?;
        inner.staged.remove(&run_id);
        release(&mut inner, run_id);
        set_state(&mut inner, run_id, RunState::Failed);
        if let Some(r) = inner.runs.get_mut(&run_id) {
            r.failure = Some(reason.to_string());
        }
        log::warn!("run {} failed: {}", run_id, reason);
        inner.runs.get(&run_id).cloned().ok_or(ConsolidationError::RunNotFound(run_id))
    }

    /// Fails unless the run could be locked right now.
    pub fn check_lockable(&self, run_id: Uuid) -> Result<()> {
        let inner = self.inner();
        let record = inner.runs.get(&run_id).ok_or(ConsolidationError::RunNotFound(run_id))?;
        lockable(&inner, record)
    }

    pub fn lock(&self, run_id: Uuid, locked_by: &str) -> Result<RunRecord> {
        self.lock_with(run_id, locked_by, |_, _| Ok(()))
    }

    /// Lock a run after `publish` accepted its lines. The store stays locked
    /// from the check through the state change, so a run publishes once.
    pub fn lock_with<F>(&self, run_id: Uuid, locked_by: &str, publish: F) -> Result<RunRecord>
    where
        F: FnOnce(&RunRecord, &[ConsolLine]) -> Result<()>,
    {
        let mut inner = self.inner();
        let record = inner.runs.get(&run_id).ok_or(ConsolidationError::RunNotFound(run_id))?;
        lockable(&inner, record)?;
        let lines = inner.results.get(&run_id).map(|r| r.lines.as_slice()).unwrap_or_default();
        publish(record, lines)?;
        set_state(&mut inner, run_id, RunState::Locked);
        let record = inner
            .runs
            .get_mut(&run_id)
            .ok_or(ConsolidationError::RunNotFound(run_id))?;
        record.locked_by = Some(locked_by.to_string());
        record.locked_at = Some(record.updated_at);
        log::info!("run {} locked by {}", run_id, locked_by);
        Ok(record.clone())
    }

    pub fn lines(&self, run_id: Uuid) -> Result<Vec<ConsolLine>> {
        let inner = self.inner();
        if !inner.runs.contains_key(&run_id) {
            return Err(ConsolidationError::RunNotFound(run_id));
        }
        Ok(inner.results.get(&run_id).map(|r| r.lines.clone()).unwrap_or_default())
    }

    pub fn result(&self, run_id: Uuid) -> Result<RunResult> {
        let inner = self.inner();
        if !inner.runs.contains_key(&run_id) {
            return Err(ConsolidationError::RunNotFound(run_id));
        }
        inner
            .results
            .get(&run_id)
            .cloned()
            .ok_or(ConsolidationError::NotComputed(run_id))
    }

    fn log_transition(&self, inner: &Inner, run_id: Uuid) {
        if let Some(r) = inner.runs.get(&run_id) {
            log::info!("run {} ({} {}) is {}", run_id, r.group, r.period, r.state);
        }
    }
}

fn check_transition(record: &RunRecord, next: RunState) -> Result<()> {
    if record.state == RunState::Locked {
        return Err(ConsolidationError::RunLocked { run_id: record.id });
    }
    if !record.state.can_transition_to(next) {
        return Err(ConsolidationError::InvalidTransition {
            run_id: record.id,
            from: record.state.to_string(),
            to: next.to_string(),
        });
    }
    Ok(())
}

fn lockable(inner: &Inner, record: &RunRecord) -> Result<()> {
    if record.dry_run {
        return Err(ConsolidationError::DryRunNotLockable(record.id));
    }
    check_transition(record, RunState::Locked)?;
    let issues = inner.results.get(&record.id).map_or(0, |r| r.issues.len());
    if issues > 0 {
        return Err(ConsolidationError::LockBlocked {
            run_id: record.id,
            issues,
        });
    }
    Ok(())
}

fn set_state(inner: &mut Inner, run_id: Uuid, state: RunState) {
    if let Some(record) = inner.runs.get_mut(&run_id) {
        record.state = state;
        record.updated_at = Utc::now();
    }
}

fn release(inner: &mut Inner, run_id: Uuid) {
    inner.locks.retain(|_, holder| *holder != run_id);
}
