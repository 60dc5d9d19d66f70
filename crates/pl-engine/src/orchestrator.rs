//! Optimization orchestrator.
//!
//! Drives one session at a time: proposes setups through a suggestion handle,
//! persists them, scores telemetry and feeds rewards back. The handle, the
//! setup/trial correlation and the scorer live behind a single mutex, so
//! ask, tell and best are serialized across callers.

use chrono::{DateTime, Utc};
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use pl_optimizer::{
    StudyBackend, StudySettings, SuggestionBackend, SuggestionService, TrialId, VehicleCatalog,
};
use pl_scoring::{ScoringConfig, ScoringEngine};
use pl_types::{
    validation_error, MetricMap, NewSetup, OptimizationConfig, PlError, PlResult, SessionId,
    SessionRecord, SetupId, SetupRecord, SetupStatus, StoreError, TelemetryEvent, TelemetryId,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, error, info, warn};

use crate::config::{PitlaneConfig, ResubmissionPolicy};
use crate::events::{EventBus, OrchestratorEvent};
use crate::store::Stores;

/// Result of one telemetry submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub telemetry_id: TelemetryId,
    pub setup_id: SetupId,
    pub score: f64,
    /// Setup proposed to keep a candidate in flight. `None` outside a session
    /// or when the proposal failed.
    pub next_setup_id: Option<SetupId>,
}

/// Progress snapshot of the active session, built from the stores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizationStatus {
    pub session_id: Option<SessionId>,
    pub vehicle_id: Option<String>,
    pub track_id: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub trials_completed: usize,
    pub trials_pending: usize,
    pub best_score: Option<f64>,
    pub best_setup_id: Option<SetupId>,
    pub is_active: bool,
}

struct ActiveSession {
    record: SessionRecord,
    handle: Box<dyn SuggestionService>,
    trials: HashMap<SetupId, TrialId>,
    setups: HashMap<TrialId, SetupId>,
    told: HashSet<TrialId>,
    best_setup_id: Option<SetupId>,
}

impl ActiveSession {
    fn new(record: SessionRecord, handle: Box<dyn SuggestionService>) -> Self {
        let best_setup_id = record.best_setup_id;
        Self {
            record,
            handle,
            trials: HashMap::new(),
            setups: HashMap::new(),
            told: HashSet::new(),
            best_setup_id,
        }
    }

    fn id(&self) -> SessionId {
        self.record.id
    }

    fn correlate(&mut self, setup_id: SetupId, trial: TrialId) {
        self.trials.insert(setup_id, trial);
        self.setups.insert(trial, setup_id);
    }

    /// Correlated trials that never received a reward.
    fn in_flight(&self) -> usize {
        self.trials.len().saturating_sub(self.told.len())
    }
}

enum Phase {
    Uninitialized,
    Active(Box<ActiveSession>),
    Closed,
}

struct OrchestratorState {
    phase: Phase,
    scorer: ScoringEngine,
    /// Raw scores per setup, for the resubmission policy.
    submissions: HashMap<SetupId, Vec<f64>>,
}

impl OrchestratorState {
    fn active(&self) -> Option<&ActiveSession> {
        match &self.phase {
            Phase::Active(active) => Some(active),
            Phase::Uninitialized | Phase::Closed => None,
        }
    }

    fn active_mut(&mut self) -> PlResult<&mut ActiveSession> {
        match &mut self.phase {
            Phase::Active(active) => Ok(active),
            Phase::Uninitialized | Phase::Closed => Err(PlError::InactiveSession),
        }
    }
}

fn store_failure(err: StoreError) -> PlError {
    error!(operation = err.operation(), error = %err, "store failure");
    PlError::Store(err)
}

/// Session lifecycle and the ask/persist/score/tell loop.
///
/// Shared behind an `Arc`; every operation is synchronous.
pub struct Orchestrator {
    stores: Stores,
    catalog: VehicleCatalog,
    backend: Box<dyn SuggestionBackend>,
    scoring: ScoringConfig,
    resubmission: ResubmissionPolicy,
    state: Mutex<OrchestratorState>,
    events: EventBus,
}

impl Orchestrator {
    /// Built-in vehicles, the in-process study backend and default scoring.
    pub fn new(stores: Stores) -> Self {
        let scoring = ScoringConfig::default();
        Self {
            stores,
            catalog: VehicleCatalog::builtin(),
            backend: Box::new(StudyBackend),
            state: Mutex::new(OrchestratorState {
                phase: Phase::Uninitialized,
                scorer: ScoringEngine::new(scoring.clone()),
                submissions: HashMap::new(),
            }),
            scoring,
            resubmission: ResubmissionPolicy::default(),
            events: EventBus::new(),
        }
    }

    pub fn from_config(stores: Stores, config: &PitlaneConfig) -> Self {
        Self::new(stores)
            .with_scoring(config.scoring.clone())
            .with_resubmission(config.resubmission)
    }

    pub fn with_catalog(mut self, catalog: VehicleCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_backend<B: SuggestionBackend + 'static>(mut self, backend: B) -> Self {
        self.backend = Box::new(backend);
        self
    }

    pub fn with_scoring(mut self, scoring: ScoringConfig) -> Self {
        self.state.get_mut().scorer = ScoringEngine::new(scoring.clone());
        self.scoring = scoring;
        self
    }

    pub fn with_resubmission(mut self, policy: ResubmissionPolicy) -> Self {
        self.resubmission = policy;
        self
    }

    pub fn catalog(&self) -> &VehicleCatalog {
        &self.catalog
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().active().is_some()
    }

    pub fn active_session_id(&self) -> Option<SessionId> {
        self.state.lock().active().map(ActiveSession::id)
    }

    /// Open a session for `vehicle_id` on `track_id` and warm-start it with
    /// `config.initial_setups` pending candidates.
    pub fn start(
        &self,
        vehicle_id: &str,
        track_id: &str,
        config: OptimizationConfig,
    ) -> PlResult<SessionId> {
        let mut state = self.state.lock();
        if let Some(active) = state.active() {
            warn!(active_session_id = active.id(), "start refused, session already active");
            return Err(PlError::Conflict {
                active_session_id: active.id(),
            });
        }
        if let Some(existing) = self.stores.sessions.get_active() {
            warn!(active_session_id = existing.id, "start refused, store has an active session");
            return Err(PlError::Conflict {
                active_session_id: existing.id,
            });
        }

        // Resolve the domain before anything is written.
        let space = self.catalog.domain_for(vehicle_id)?.clone();
        space.validate()?;

        let session_id = self
            .stores
            .sessions
            .create(vehicle_id, track_id, &config)
            .ok_or_else(|| {
                store_failure(StoreError::SessionCreate {
                    vehicle_id: vehicle_id.to_string(),
                    track_id: track_id.to_string(),
                })
            })?;
        let record = self.stores.sessions.get(session_id).unwrap_or_else(|| {
            SessionRecord::new(session_id, vehicle_id, track_id, config.clone())
        });

        let settings = StudySettings::from_config(&config);
        let handle = self.backend.open(settings, space);
        let mut active = ActiveSession::new(record, handle);

        let mut proposed = Vec::with_capacity(config.initial_setups);
        for _ in 0..config.initial_setups {
            match self.propose(&mut active) {
                Ok(setup) => proposed.push(setup),
                Err(err) => {
                    for &(setup_id, _) in &proposed {
                        if !self
                            .stores
                            .setups
                            .update_status(setup_id, SetupStatus::Discarded, None)
                        {
                            error!(session_id, setup_id, "failed to discard warm-start setup");
                        }
                    }
                    if !self.stores.sessions.close(session_id) {
                        error!(session_id, "failed to close half-built session");
                    }
                    error!(session_id, error = %err, "warm start failed, session closed");
                    return Err(err);
                }
            }
        }

        info!(
            session_id,
            vehicle = %vehicle_id,
            track = %track_id,
            sampler = ?active.handle.settings().sampler,
            backend = self.backend.name(),
            initial_setups = proposed.len(),
            "optimization session started"
        );

        state.scorer = ScoringEngine::new(self.scoring.clone());
        state.submissions.clear();
        state.phase = Phase::Active(Box::new(active));

        self.events.publish(OrchestratorEvent::SessionStarted {
            session_id,
            vehicle_id: vehicle_id.to_string(),
            track_id: track_id.to_string(),
            resumed: false,
        });
        for (setup_id, trial) in proposed {
            self.events.publish(OrchestratorEvent::SetupProposed {
                session_id,
                setup_id,
                trial,
            });
        }
        Ok(session_id)
    }

    /// Ask for one more candidate and persist it as pending.
    pub fn generate_next(&self) -> PlResult<SetupId> {
        let mut state = self.state.lock();
        self.propose_next(&mut state)
    }

    /// Score `sample` for `setup_id`, store it and tell the handle when the
    /// setup is linked to a trial. Returns the stored score.
    pub fn record_observation(&self, setup_id: SetupId, sample: &MetricMap) -> PlResult<f64> {
        let mut state = self.state.lock();
        self.observe(&mut state, setup_id, sample)
    }

    /// Close the active session. Trials still in flight are abandoned.
    pub fn stop(&self) -> PlResult<()> {
        let mut state = self.state.lock();
        let active = state.active_mut()?;
        let session_id = active.id();
        let abandoned = active.in_flight();

        if !self.stores.sessions.close(session_id) {
            return Err(store_failure(StoreError::SessionClose { session_id }));
        }
        state.phase = Phase::Closed;

        info!(session_id, abandoned, "optimization session stopped");
        self.events.publish(OrchestratorEvent::SessionStopped {
            session_id,
            abandoned,
        });
        Ok(())
    }

    /// Reattach to the session the store still reports as active.
    ///
    /// Tested setups are re-injected into a fresh handle and correlated again;
    /// setups still pending stay uncorrelated, so their telemetry is stored
    /// and scored but never told. Returns `None` when there is nothing to
    /// resume.
    pub fn resume(&self) -> PlResult<Option<SessionId>> {
        let mut state = self.state.lock();
        if let Some(active) = state.active() {
            return Err(PlError::Conflict {
                active_session_id: active.id(),
            });
        }
        let Some(record) = self.stores.sessions.get_active() else {
            debug!("no active session to resume");
            return Ok(None);
        };

        let space = self.catalog.domain_for(&record.vehicle_id)?.clone();
        let handle = self
            .backend
            .open(StudySettings::from_config(&record.config), space);
        let session_id = record.id;
        let vehicle_id = record.vehicle_id.clone();
        let track_id = record.track_id.clone();
        let mut active = ActiveSession::new(record, handle);
        let mut scorer = ScoringEngine::new(self.scoring.clone());
        state.submissions.clear();

        let mut restored = 0usize;
        let mut uncorrelated = 0usize;
        for setup in self.stores.setups.list_for_session(session_id) {
            for telemetry in self.stores.telemetry.for_setup(setup.id) {
                scorer.update_history(&telemetry.sample());
            }
            match (setup.status, setup.score) {
                (SetupStatus::Tested, Some(score)) => {
                    match active.handle.record(&setup.parameters, score) {
                        Ok(trial) => {
                            active.correlate(setup.id, trial);
                            active.told.insert(trial);
                            state
                                .submissions
                                .entry(setup.id)
                                .or_insert_with(|| vec![score]);
                            restored += 1;
                        }
                        Err(err) => {
                            warn!(
                                session_id,
                                setup_id = setup.id,
                                error = %err,
                                "could not restore setup"
                            );
                        }
                    }
                }
                (SetupStatus::Pending, _) => uncorrelated += 1,
                _ => {}
            }
        }

        state.scorer = scorer;
        state.phase = Phase::Active(Box::new(active));

        info!(
            session_id,
            restored,
            uncorrelated_pending = uncorrelated,
            "optimization session resumed"
        );
        self.events.publish(OrchestratorEvent::SessionStarted {
            session_id,
            vehicle_id,
            track_id,
            resumed: true,
        });
        Ok(Some(session_id))
    }

    /// Telemetry submission path: persist, score and, inside a session,
    /// tell and propose the next candidate.
    pub fn ingest(&self, event: &TelemetryEvent) -> PlResult<IngestOutcome> {
        let setup_id = event.setup_id;
        if !event.lap_time.is_finite() {
            return Err(validation_error!(
                "lap time for setup {setup_id} must be finite, got {}",
                event.lap_time
            ));
        }

        let mut state = self.state.lock();
        self.check_scoreable(setup_id)?;
        let telemetry_id = self
            .stores
            .telemetry
            .append(event)
            .ok_or_else(|| store_failure(StoreError::TelemetryAppend { setup_id }))?;
        let sample = event.sample();

        if state.active().is_some() {
            let score = self.observe(&mut state, setup_id, &sample)?;
            // Already stored and told; a failed proposal must not fail the submission.
            let next_setup_id = match self.propose_next(&mut state) {
                Ok(next) => Some(next),
                Err(err) => {
                    warn!(setup_id, error = %err, "could not propose next setup");
                    None
                }
            };
            return Ok(IngestOutcome {
                telemetry_id,
                setup_id,
                score,
                next_setup_id,
            });
        }

        let OrchestratorState {
            scorer,
            submissions,
            ..
        } = &mut *state;
        let score = self.score_and_persist(scorer, submissions, setup_id, &sample)?;
        info!(setup_id, score, "scored telemetry outside a session");
        self.events.publish(OrchestratorEvent::ObservationScored {
            setup_id,
            score,
            correlated: false,
        });
        Ok(IngestOutcome {
            telemetry_id,
            setup_id,
            score,
            next_setup_id: None,
        })
    }

    pub fn status(&self) -> OptimizationStatus {
        let Some(session_id) = self.active_session_id() else {
            return OptimizationStatus::default();
        };
        let Some(session) = self.stores.sessions.get(session_id) else {
            warn!(session_id, "active session missing from store");
            return OptimizationStatus {
                session_id: Some(session_id),
                is_active: true,
                ..OptimizationStatus::default()
            };
        };

        let setups = self.stores.setups.list_for_session(session_id);
        let trials_completed = setups
            .iter()
            .filter(|s| s.status == SetupStatus::Tested)
            .count();
        let trials_pending = setups.iter().filter(|s| s.is_pending()).count();
        let best_score = session
            .best_setup_id
            .and_then(|id| self.stores.setups.get(id))
            .and_then(|s| s.score);

        OptimizationStatus {
            session_id: Some(session_id),
            vehicle_id: Some(session.vehicle_id),
            track_id: Some(session.track_id),
            start_time: Some(session.start_time),
            trials_completed,
            trials_pending,
            best_score,
            best_setup_id: session.best_setup_id,
            is_active: true,
        }
    }

    /// Oldest pending setup, for the transport.
    pub fn next_pending(&self) -> Option<SetupRecord> {
        self.stores.setups.get_pending()
    }

    pub fn best_setups(&self, vehicle_id: &str, track_id: &str, limit: usize) -> Vec<SetupRecord> {
        self.stores.setups.get_best(vehicle_id, track_id, limit)
    }

    pub fn subscribe(&self) -> Receiver<OrchestratorEvent> {
        self.events.subscribe()
    }

    fn propose(&self, active: &mut ActiveSession) -> PlResult<(SetupId, TrialId)> {
        let suggestion = active.handle.ask()?;
        let new = NewSetup::proposed(
            active.record.vehicle_id.clone(),
            active.record.track_id.clone(),
            suggestion.parameters,
            active.id(),
        );
        let setup_id = self.stores.setups.create(new).ok_or_else(|| {
            store_failure(StoreError::SetupCreate {
                vehicle_id: active.record.vehicle_id.clone(),
                track_id: active.record.track_id.clone(),
            })
        })?;
        active.correlate(setup_id, suggestion.trial);
        debug!(session_id = active.id(), setup_id, trial = %suggestion.trial, "setup proposed");
        Ok((setup_id, suggestion.trial))
    }

    fn propose_next(&self, state: &mut OrchestratorState) -> PlResult<SetupId> {
        let active = state.active_mut()?;
        let (setup_id, trial) = self.propose(active)?;
        self.events.publish(OrchestratorEvent::SetupProposed {
            session_id: active.id(),
            setup_id,
            trial,
        });
        Ok(setup_id)
    }

    fn observe(
        &self,
        state: &mut OrchestratorState,
        setup_id: SetupId,
        sample: &MetricMap,
    ) -> PlResult<f64> {
        let OrchestratorState {
            phase,
            scorer,
            submissions,
        } = state;
        let Phase::Active(active) = phase else {
            return Err(PlError::InactiveSession);
        };
        self.check_scoreable(setup_id)?;

        let score = self.score_and_persist(scorer, submissions, setup_id, sample)?;
        let session_id = active.id();

        let Some(&trial) = active.trials.get(&setup_id) else {
            warn!(session_id, setup_id, score, "no trial linked to setup, skipping tell");
            self.events.publish(OrchestratorEvent::ObservationScored {
                setup_id,
                score,
                correlated: false,
            });
            return Ok(score);
        };

        active.handle.tell(trial, score)?;
        active.told.insert(trial);
        debug!(session_id, setup_id, trial = %trial, score, "observation told");
        self.events.publish(OrchestratorEvent::ObservationScored {
            setup_id,
            score,
            correlated: true,
        });

        if let Some((best_trial, best_score)) = active.handle.best() {
            let best_setup = active
                .setups
                .get(&best_trial)
                .copied()
                .filter(|id| active.best_setup_id != Some(*id));
            if let Some(best_setup) = best_setup {
                if !self.stores.sessions.update_best(session_id, best_setup) {
                    return Err(store_failure(StoreError::SessionUpdate {
                        session_id,
                        setup_id: best_setup,
                    }));
                }
                active.best_setup_id = Some(best_setup);
                info!(session_id, setup_id = best_setup, score = best_score, "new best setup");
                self.events.publish(OrchestratorEvent::BestImproved {
                    session_id,
                    setup_id: best_setup,
                    score: best_score,
                });
            }
        }
        Ok(score)
    }

    /// Only known setups that may still move to `Tested` accept telemetry.
    fn check_scoreable(&self, setup_id: SetupId) -> PlResult<()> {
        let Some(setup) = self.stores.setups.get(setup_id) else {
            return Err(validation_error!("unknown setup id: {setup_id}"));
        };
        if !setup.status.can_transition_to(SetupStatus::Tested) {
            return Err(validation_error!(
                "setup {setup_id} is {} and cannot be scored",
                setup.status
            ));
        }
        Ok(())
    }

    /// Score against a copy of the history and keep it only once the store
    /// has accepted the result.
    fn score_and_persist(
        &self,
        scorer: &mut ScoringEngine,
        submissions: &mut HashMap<SetupId, Vec<f64>>,
        setup_id: SetupId,
        sample: &MetricMap,
    ) -> PlResult<f64> {
        let mut candidate = scorer.clone();
        let raw = candidate.calculate_score(sample);
        let score = self.persist_score(submissions, setup_id, raw)?;
        *scorer = candidate;
        Ok(score)
    }

    /// Fold `raw` into the setup's submissions and store the combined score.
    fn persist_score(
        &self,
        submissions: &mut HashMap<SetupId, Vec<f64>>,
        setup_id: SetupId,
        raw: f64,
    ) -> PlResult<f64> {
        let previous = submissions
            .get(&setup_id)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let resubmissions = previous.len();
        let score = self.resubmission.combine(previous, raw);

        if !self
            .stores
            .setups
            .update_status(setup_id, SetupStatus::Tested, Some(score))
        {
            return Err(store_failure(StoreError::SetupUpdate { setup_id }));
        }
        submissions.entry(setup_id).or_default().push(raw);
        if resubmissions > 0 {
            debug!(
                setup_id,
                raw,
                score,
                resubmissions,
                policy = ?self.resubmission,
                "combined resubmission"
            );
        }
        Ok(score)
    }
}
