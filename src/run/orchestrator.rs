use crate::config::settings::{EngineSettings, LedgerPresentation};
use crate::config::store::{ConfigSnapshot, PolicyStore};
use crate::core::account::AccountCode;
use crate::core::entity::EntityCode;
use crate::core::ledger::{ConsolLedger, ConsolLine, LineTag};
use crate::core::period::Period;
use crate::core::posting::{IntercompanyPosting, PostingId, PostingSet};
use crate::elimination::decisions::{DecisionLog, MatchDecision, PostingPair};
use crate::elimination::matcher::{EliminationMatcher, MatchProposal};
use crate::error::{ConsolidationError, ErrorClass, Result};
use crate::graph::resolver::{ConsolidationMethod, OwnershipResolver, ResolvedEntity};
use crate::nci::calculator::NciCalculator;
use crate::run::providers::{AccountMapProvider, PostingSink, RateProvider, TrialBalanceProvider};
use crate::run::state::RunState;
use crate::run::store::{ConfigurationIssue, RunRecord, RunResult, RunStore, RunSummary};
use crate::translation::cta::post_cta;
use crate::translation::engine::{TranslatedBalance, TranslationEngine};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

/// Cooperative cancellation flag for one run.
///
/// Checked at the per-entity join points of translation, never in the
/// middle of translating an entity.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
    reason: Arc<Mutex<Option<String>>>,
}

impl CancelHandle {
    pub fn cancel(&self, reason: impl Into<String>) {
        *self.reason.lock().unwrap_or_else(PoisonError::into_inner) = Some(reason.into());
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn check(&self, run_id: Uuid) -> Result<()> {
        if !self.is_cancelled() {
            return Ok(());
        }
        let reason = self
            .reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_else(|| "cancelled".to_string());
        Err(ConsolidationError::Cancelled { run_id, reason })
    }
}

/// What a computation hands back to its caller. For a dry run this is the
/// only place the lines survive.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub record: RunRecord,
    pub result: RunResult,
}

/// One entity's translated balance and intercompany postings, already
/// scaled for its consolidation method.
struct EntityTranslation {
    balance: TranslatedBalance,
    postings: Vec<IntercompanyPosting>,
}

/// Sequences resolver, translation, elimination and NCI for a group and
/// period, and owns the run lifecycle.
///
/// The orchestrator is `Sync`; runs for different groups or periods can be
/// computed from different threads, while a second run for the same group
/// and period is rejected with [`ConsolidationError::RunInProgress`].
pub struct Orchestrator {
    policies: PolicyStore,
    ledger: Arc<dyn TrialBalanceProvider>,
    rates: Arc<dyn RateProvider>,
    account_map: Option<Arc<dyn AccountMapProvider>>,
    sink: Option<Arc<dyn PostingSink>>,
    runs: RunStore,
    decisions: Mutex<HashMap<String, DecisionLog>>,
    cancels: Mutex<HashMap<Uuid, CancelHandle>>,
}

impl Orchestrator {
    pub fn new(policies: PolicyStore, ledger: Arc<dyn TrialBalanceProvider>, rates: Arc<dyn RateProvider>) -> Self {
        Self {
            policies,
            ledger,
            rates,
            account_map: None,
            sink: None,
            runs: RunStore::new(),
            decisions: Mutex::new(HashMap::new()),
            cancels: Mutex::new(HashMap::new()),
        }
    }

    /// Classify accounts through an external provider instead of the
    /// group's configured account map.
    pub fn with_account_map(mut self, provider: Arc<dyn AccountMapProvider>) -> Self {
        self.account_map = Some(provider);
        self
    }

    /// Publish locked runs to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn PostingSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn policies(&self) -> &PolicyStore {
        &self.policies
    }

    pub fn runs(&self) -> &RunStore {
        &self.runs
    }

    // ------------------------------------------------------------------
    // Run control
    // ------------------------------------------------------------------

    /// Create and compute a run. Returns the run id once the run reached
    /// `COMPUTED` or `FAILED`; a request rejected up front returns the error.
    pub fn start_run(&self, group: &str, year: i32, month: u32, dry_run: bool) -> Result<Uuid> {
        let period = Period::new(year, month)
            .ok_or_else(|| ConsolidationError::InvalidConfiguration(format!("invalid period {year}-{month}")))?;
        if let Some(holder) = self.runs.in_progress(group, period) {
            return Err(ConsolidationError::RunInProgress {
                group: group.to_string(),
                period,
                run_id: holder,
            });
        }
        // Unknown groups are rejected before a run row exists.
        self.policies.snapshot(group, period.as_of())?;

        let record = self.create_run(group, period, dry_run, "system");
        match self.compute(record.id) {
            Ok(_) => Ok(record.id),
            Err(e @ ConsolidationError::RunInProgress { .. }) => Err(e),
            Err(e) => {
                if self.runs.get(record.id)?.state == RunState::Failed {
                    log::warn!("run {} ended in FAILED: {}", record.id, e);
                    Ok(record.id)
                } else {
                    Err(e)
                }
            }
        }
    }

    pub fn create_run(&self, group: &str, period: Period, dry_run: bool, created_by: &str) -> RunRecord {
        let record = self.runs.create_run(group, period, dry_run, created_by);
        log::info!(
            "created run {} for {} {}{}",
            record.id,
            group,
            period,
            if dry_run { " (dry run)" } else { "" }
        );
        record
    }

    /// Compute a `DRAFT` run.
    pub fn compute(&self, run_id: Uuid) -> Result<RunReport> {
        let record = self.runs.get(run_id)?;
        let cancel = self.cancel_handle(run_id);
        if let Err(e) = cancel.check(run_id) {
            self.runs.fail(run_id, &e.to_string())?;
            return Err(e);
        }

        if let Err(e) = self.runs.begin_compute(run_id) {
            // Lost the period lock to a concurrent run; this row never computes.
            if matches!(e, ConsolidationError::RunInProgress { .. }) {
                self.runs.fail(run_id, &e.to_string())?;
                self.forget_cancel(run_id);
            }
            return Err(e);
        }

        let outcome = self
            .policies
            .snapshot(&record.group, record.period.as_of())
            .and_then(|snapshot| {
                let decisions = self.decision_log(&record.group);
                self.execute(&record, &snapshot, &decisions, &cancel)
            })
            .and_then(|result| {
                self.runs.append_lines(run_id, result.lines.clone())?;
                Ok(result)
            });

        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                self.runs.fail(run_id, &e.to_string())?;
                self.forget_cancel(run_id);
                return Err(e);
            }
        };

        let record = self.runs.complete(run_id, result.clone())?;
        self.forget_cancel(run_id);
        Ok(RunReport { record, result })
    }

    /// Request cancellation. A `DRAFT` run fails immediately; a `COMPUTING`
    /// run fails at its next join point.
    pub fn cancel_run(&self, run_id: Uuid, reason: &str) -> Result<()> {
        let record = self.runs.get(run_id)?;
        match record.state {
            RunState::Draft => {
                self.runs.fail(run_id, &format!("cancelled: {reason}"))?;
                Ok(())
            }
            RunState::Computing => {
                log::info!("cancellation requested for run {}: {}", run_id, reason);
                self.cancel_handle(run_id).cancel(reason);
                Ok(())
            }
            RunState::Locked => Err(ConsolidationError::RunLocked { run_id }),
            other => Err(ConsolidationError::InvalidTransition {
                run_id,
                from: other.to_string(),
                to: RunState::Failed.to_string(),
            }),
        }
    }

    /// The cancellation handle of a run, created on first use.
    pub fn cancel_handle(&self, run_id: Uuid) -> CancelHandle {
        self.cancels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(run_id)
            .or_default()
            .clone()
    }

    fn forget_cancel(&self, run_id: Uuid) {
        self.cancels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&run_id);
    }

    pub fn get_run_status(&self, run_id: Uuid) -> Result<RunState> {
        Ok(self.runs.get(run_id)?.state)
    }

    pub fn get_run(&self, run_id: Uuid) -> Result<RunRecord> {
        self.runs.get(run_id)
    }

    // ------------------------------------------------------------------
    // Result reader
    // ------------------------------------------------------------------

    pub fn get_consol_lines(&self, run_id: Uuid) -> Result<Vec<ConsolLine>> {
        self.runs.lines(run_id)
    }

    pub fn get_unresolved_eliminations(&self, run_id: Uuid) -> Result<Vec<IntercompanyPosting>> {
        Ok(self.runs.result(run_id)?.unresolved)
    }

    pub fn get_pending_proposals(&self, run_id: Uuid) -> Result<Vec<MatchProposal>> {
        Ok(self.runs.result(run_id)?.pending)
    }

    pub fn get_result(&self, run_id: Uuid) -> Result<RunResult> {
        self.runs.result(run_id)
    }

    // ------------------------------------------------------------------
    // Decisions and finalization
    // ------------------------------------------------------------------

    /// Record a manual decision on two postings left unresolved by a run.
    ///
    /// The run itself is not changed; the decision applies to every later
    /// run of the group.
    pub fn decide_match(
        &self,
        run_id: Uuid,
        first: &PostingId,
        second: &PostingId,
        accept: bool,
        decided_by: &str,
    ) -> Result<MatchDecision> {
        let record = self.runs.get(run_id)?;
        let result = self.runs.result(run_id)?;
        for id in [first, second] {
            if !result.unresolved.iter().any(|p| &p.id == id) {
                return Err(ConsolidationError::UnknownPosting(id.to_string()));
            }
        }
        let pair = PostingPair::new(first.clone(), second.clone());
        let decision = if accept {
            MatchDecision::accept(pair, decided_by)
        } else {
            MatchDecision::reject(pair, decided_by)
        };

        let mut logs = self.decisions.lock().unwrap_or_else(PoisonError::into_inner);
        logs.entry(record.group).or_default().record(decision.clone())?;
        Ok(decision)
    }

    pub fn decision_log(&self, group: &str) -> DecisionLog {
        self.decisions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(group)
            .cloned()
            .unwrap_or_default()
    }

    /// Finalize a computed run: publish its lines through the posting sink,
    /// then lock it.
    pub fn lock_run(&self, run_id: Uuid, locked_by: &str) -> Result<RunRecord> {
        self.runs.lock_with(run_id, locked_by, |record, lines| match &self.sink {
            Some(sink) => sink.publish(record, lines),
            None => Ok(()),
        })
    }

    // ------------------------------------------------------------------
    // Computation
    // ------------------------------------------------------------------

    fn execute(
        &self,
        record: &RunRecord,
        snapshot: &ConfigSnapshot,
        decisions: &DecisionLog,
        cancel: &CancelHandle,
    ) -> Result<RunResult> {
        log::info!("computing run {} for {} {}", record.id, record.group, record.period);
        let presentation = &snapshot.presentation;

        let resolution = OwnershipResolver::new(snapshot.settings.clone()).resolve(
            &snapshot.root,
            &snapshot.ownership,
            snapshot.as_of,
        )?;

        let mut issues: Vec<ConfigurationIssue> = snapshot
            .active_entities()
            .filter(|e| e.code != snapshot.root && resolution.get(&e.code).is_none())
            .map(|e| ConfigurationIssue {
                entity: e.code.clone(),
                error: ConsolidationError::MissingOwnership { entity: e.code.clone() },
            })
            .collect();

        let inactive: HashSet<&EntityCode> = snapshot
            .entities
            .iter()
            .filter(|e| !e.active)
            .map(|e| &e.code)
            .collect();
        let consolidated: Vec<&ResolvedEntity> = resolution
            .consolidated()
            .filter(|r| !inactive.contains(&r.entity))
            .collect();

        cancel.check(record.id)?;

        let accounts: &dyn AccountMapProvider = match &self.account_map {
            Some(provider) => provider.as_ref(),
            None => &snapshot.account_map,
        };
        let engine = TranslationEngine::new(
            &snapshot.rate_policy,
            &snapshot.rate_overrides,
            accounts,
            self.rates.as_ref(),
            presentation,
            record.period,
        );

        let mut translated: Vec<(&ResolvedEntity, EntityTranslation)> = Vec::new();
        let outcomes = self.translate_all(
            record.id,
            &engine,
            &consolidated,
            &snapshot.settings,
            presentation,
            cancel,
        )?;
        for (resolved, outcome) in outcomes {
            match outcome {
                Ok(t) => translated.push((resolved, t)),
                Err(e) if e.class() == ErrorClass::Configuration => {
                    log::warn!("entity {} skipped: {}", resolved.entity, e);
                    issues.push(ConfigurationIssue {
                        entity: resolved.entity.clone(),
                        error: e,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        // Only postings between two consolidated entities can eliminate.
        let in_scope: HashSet<&EntityCode> = translated.iter().map(|(r, _)| &r.entity).collect();
        let postings: PostingSet = translated
            .iter()
            .flat_map(|(_, t)| t.postings.iter())
            .filter(|p| in_scope.contains(&p.counterparty))
            .cloned()
            .collect();
        for error in postings.id_collisions() {
            log::warn!("{}", error);
            if let ConsolidationError::DuplicatePostingId { second, .. } = &error {
                issues.push(ConfigurationIssue {
                    entity: second.clone(),
                    error: error.clone(),
                });
            }
        }
        let mut matched =
            EliminationMatcher::new(&snapshot.elimination_rules, presentation).run(&postings, decisions);

        // A counterparty skipped on a configuration issue still owes its side
        // of the balance; the surviving side stays unresolved.
        let consolidated_codes: HashSet<&EntityCode> = consolidated.iter().map(|r| &r.entity).collect();
        let orphaned: Vec<IntercompanyPosting> = translated
            .iter()
            .flat_map(|(_, t)| t.postings.iter())
            .filter(|p| !in_scope.contains(&p.counterparty) && consolidated_codes.contains(&p.counterparty))
            .cloned()
            .collect();
        if !orphaned.is_empty() {
            log::warn!("{} postings face a skipped counterparty", orphaned.len());
            matched.posting_count += orphaned.len();
            matched.unresolved.extend(orphaned);
            matched
                .unresolved
                .sort_by(|a, b| (&a.id, &a.entity).cmp(&(&b.id, &b.entity)));
        }
        let unresolved_keys: HashSet<(&EntityCode, &AccountCode)> =
            matched.unresolved.iter().map(|p| (&p.entity, &p.account)).collect();

        let mut ledger = ConsolLedger::new();
        let mut residuals = Vec::with_capacity(translated.len());
        for (resolved, t) in &translated {
            for line in &t.balance.lines {
                let mut consol = ConsolLine::new(
                    line.account.clone(),
                    LineTag::Entity(resolved.entity.clone()),
                    line.amount,
                    presentation.presentation_currency.clone(),
                );
                if unresolved_keys.contains(&(&resolved.entity, &line.account)) {
                    consol = consol.flagged_unresolved();
                }
                ledger.push(consol);
            }
            residuals.push((*resolved, t.balance.cta));
        }
        ledger.extend(post_cta(&snapshot.cta_policy, &residuals, presentation));
        ledger.extend(matched.lines.iter().cloned());

        let nci = NciCalculator::new(&snapshot.nci_map, presentation);
        for (resolved, t) in &translated {
            ledger.extend(nci.compute(resolved, &t.balance));
        }
        ledger.canonicalize();

        let inactive_in_scope = resolution
            .consolidated()
            .filter(|r| inactive.contains(&r.entity))
            .count();
        let summary = RunSummary {
            entities_consolidated: translated.len(),
            entities_equity_method: resolution
                .entities()
                .iter()
                .filter(|r| r.method == ConsolidationMethod::Equity && r.exclusion.is_none())
                .count(),
            entities_excluded: resolution.excluded().count() + inactive_in_scope,
            configuration_issues: issues.len(),
            line_count: ledger.len(),
            total_cta: ledger.total_for(|l| matches!(l.tag, LineTag::Cta(_) | LineTag::GroupCta)),
            total_eliminations: ledger.total_for(|l| l.tag == LineTag::Elimination),
            total_nci: ledger.total_for(|l| matches!(l.tag, LineTag::Nci(_))),
            matched_pairs: matched.accepted.len(),
            pending_proposals: matched.pending.len(),
            unresolved_postings: matched.unresolved.len(),
            match_rate: matched.match_rate(),
            balanced: ledger.is_balanced(),
        };
        log::info!(
            "run {}: {} entities, {} lines, {} issues, {} unresolved postings",
            record.id,
            summary.entities_consolidated,
            summary.line_count,
            summary.configuration_issues,
            summary.unresolved_postings
        );

        Ok(RunResult {
            lines: ledger.into_lines(),
            resolution: resolution.clone(),
            unresolved: matched.unresolved,
            pending: matched.pending,
            issues,
            summary,
        })
    }

    /// Translate every consolidated entity, in parallel when configured.
    ///
    /// The results are joined and sorted by entity code before anything
    /// downstream sees them.
    fn translate_all<'r>(
        &self,
        run_id: Uuid,
        engine: &TranslationEngine<'_>,
        entities: &[&'r ResolvedEntity],
        settings: &EngineSettings,
        presentation: &LedgerPresentation,
        cancel: &CancelHandle,
    ) -> Result<Vec<(&'r ResolvedEntity, Result<EntityTranslation>)>> {
        let ledger = self.ledger.as_ref();
        let period = engine.period();
        let workers = if settings.parallel_translation {
            settings.max_translation_workers.clamp(1, entities.len().max(1))
        } else {
            1
        };

        let mut results = if workers == 1 {
            let mut out = Vec::with_capacity(entities.len());
            for &resolved in entities {
                cancel.check(run_id)?;
                out.push((resolved, translate_entity(ledger, engine, resolved, period, presentation)));
            }
            out
        } else {
            let mut chunks: Vec<Vec<&'r ResolvedEntity>> = vec![Vec::new(); workers];
            for (i, &resolved) in entities.iter().enumerate() {
                chunks[i % workers].push(resolved);
            }
            std::thread::scope(|scope| {
                let handles: Vec<_> = chunks
                    .into_iter()
                    .map(|chunk| {
                        scope.spawn(move || {
                            let mut out = Vec::with_capacity(chunk.len());
                            for resolved in chunk {
                                if cancel.is_cancelled() {
                                    break;
                                }
                                out.push((resolved, translate_entity(ledger, engine, resolved, period, presentation)));
                            }
                            out
                        })
                    })
                    .collect();
                handles
                    .into_iter()
                    .flat_map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                    .collect::<Vec<_>>()
            })
        };

        cancel.check(run_id)?;
        results.sort_by(|a, b| a.0.entity.cmp(&b.0.entity));
        Ok(results)
    }
}

fn translate_entity(
    ledger: &dyn TrialBalanceProvider,
    engine: &TranslationEngine<'_>,
    resolved: &ResolvedEntity,
    period: Period,
    presentation: &LedgerPresentation,
) -> Result<EntityTranslation> {
    let scale = resolved.line_scale();
    let balance = ledger.trial_balance(&resolved.entity, period)?;
    let balance = engine.translate(&balance)?.scaled(scale, presentation);

    let mut postings = Vec::new();
    for posting in ledger.intercompany_postings(&resolved.entity, period)? {
        let mut translated = engine.translate_posting(&posting)?;
        if scale != Decimal::ONE {
            translated.amount = presentation.round(translated.amount * scale);
        }
        postings.push(translated);
    }
    Ok(EntityTranslation { balance, postings })
}
