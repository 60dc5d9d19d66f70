//! Ask/tell suggestion service.
//!
//! The orchestrator only talks to [`SuggestionService`] handles produced by a
//! [`SuggestionBackend`]. [`StudyBackend`] is the built-in implementation;
//! an external optimizer can be plugged in behind the same traits.

use pl_types::{ObjectiveDirection, OptimizationConfig, ParameterMap, SuggestionError};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::samplers::{EvolutionSampler, Observation, ParzenSampler, RandomSampler, Sampler};
use crate::space::ParameterSpace;
use crate::trial::{best_of, TrialId, TrialRecord};

/// Sampling strategy requested for a study.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplerKind {
    #[default]
    Tpe,
    CmaEs,
    Random,
}

impl SamplerKind {
    /// Strict name lookup.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "tpe" => Some(Self::Tpe),
            "cmaes" | "cma-es" | "cma_es" => Some(Self::CmaEs),
            "random" => Some(Self::Random),
            _ => None,
        }
    }

    /// Lookup with fallback: unrecognized names yield TPE.
    pub fn resolve(name: &str) -> Self {
        Self::from_name(name).unwrap_or_else(|| {
            warn!(sampler = %name, fallback = "tpe", "unknown sampler, using default");
            Self::default()
        })
    }

    fn build(self, exploration_weight: f64) -> Box<dyn Sampler> {
        match self {
            Self::Tpe => Box::new(ParzenSampler::new(exploration_weight)),
            Self::CmaEs => Box::new(EvolutionSampler::default()),
            Self::Random => Box::new(RandomSampler),
        }
    }
}

/// Early-stopping strategy. Carried through to the handle; the ask/tell loop
/// never reports intermediate values, so it is never consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrunerKind {
    Hyperband,
    Median,
    #[default]
    None,
}

impl PrunerKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "hyperband" => Some(Self::Hyperband),
            "median" => Some(Self::Median),
            "none" | "" => Some(Self::None),
            _ => None,
        }
    }

    /// Lookup with fallback: unrecognized names yield no pruner.
    pub fn resolve(name: &str) -> Self {
        Self::from_name(name).unwrap_or_else(|| {
            warn!(pruner = %name, fallback = "none", "unknown pruner, using default");
            Self::default()
        })
    }
}

/// Resolved arguments for opening a study.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudySettings {
    pub direction: ObjectiveDirection,
    pub sampler: SamplerKind,
    pub pruner: PrunerKind,
    pub seed: u64,
    pub exploration_weight: f64,
}

impl StudySettings {
    /// Resolve the free-form names of a session config, once.
    pub fn from_config(config: &OptimizationConfig) -> Self {
        Self {
            direction: config.direction,
            sampler: SamplerKind::resolve(&config.sampler),
            pruner: PrunerKind::resolve(&config.pruner),
            seed: config.seed,
            exploration_weight: config.exploration_weight,
        }
    }
}

impl Default for StudySettings {
    fn default() -> Self {
        Self::from_config(&OptimizationConfig::default())
    }
}

/// One candidate handed out by `ask`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub trial: TrialId,
    pub parameters: ParameterMap,
}

/// An open ask/tell handle bound to one parameter space.
///
/// Not safe for concurrent mutation; callers serialize access.
pub trait SuggestionService: Send {
    /// Draw one candidate inside the domain.
    fn ask(&mut self) -> Result<Suggestion, SuggestionError>;

    /// Record the reward of an asked trial. Re-telling replaces the reward.
    fn tell(&mut self, trial: TrialId, reward: f64) -> Result<(), SuggestionError>;

    /// Best trial among told trials only.
    fn best(&self) -> Option<(TrialId, f64)>;

    /// Inject an already evaluated trial without asking.
    fn record(
        &mut self,
        parameters: &ParameterMap,
        reward: f64,
    ) -> Result<TrialId, SuggestionError>;

    fn settings(&self) -> &StudySettings;

    /// Number of trials known to the handle (asked or recorded).
    fn n_trials(&self) -> usize;
}

/// Factory for suggestion handles.
pub trait SuggestionBackend: Send + Sync {
    fn open(&self, settings: StudySettings, space: ParameterSpace) -> Box<dyn SuggestionService>;

    fn name(&self) -> &str;
}

/// Backend producing in-process [`Study`] handles.
#[derive(Debug, Clone, Copy, Default)]
pub struct StudyBackend;

impl SuggestionBackend for StudyBackend {
    fn open(&self, settings: StudySettings, space: ParameterSpace) -> Box<dyn SuggestionService> {
        Box::new(Study::new(settings, space))
    }

    fn name(&self) -> &str {
        "builtin"
    }
}

/// In-process study: a seeded sampler plus the trial ledger.
pub struct Study {
    id: Uuid,
    settings: StudySettings,
    space: ParameterSpace,
    sampler: Box<dyn Sampler>,
    rng: ChaCha8Rng,
    trials: Vec<TrialRecord>,
}

impl std::fmt::Debug for Study {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Study")
            .field("id", &self.id)
            .field("sampler", &self.sampler.name())
            .field("trials", &self.trials.len())
            .finish()
    }
}

impl Study {
    pub fn new(settings: StudySettings, space: ParameterSpace) -> Self {
        let sampler = settings.sampler.build(settings.exploration_weight);
        let rng = ChaCha8Rng::seed_from_u64(settings.seed);
        Self {
            id: Uuid::new_v4(),
            settings,
            space,
            sampler,
            rng,
            trials: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn space(&self) -> &ParameterSpace {
        &self.space
    }

    pub fn trials(&self) -> &[TrialRecord] {
        &self.trials
    }

    pub fn sampler_name(&self) -> &str {
        self.sampler.name()
    }

    fn next_id(&self) -> TrialId {
        TrialId(self.trials.len() as u64)
    }

    fn observations(&self) -> Vec<Observation> {
        self.trials
            .iter()
            .filter_map(|t| {
                t.utility(self.settings.direction).map(|utility| Observation {
                    point: t.point.clone(),
                    utility,
                })
            })
            .collect()
    }

    fn trial_mut(&mut self, trial: TrialId) -> Result<&mut TrialRecord, SuggestionError> {
        self.trials
            .get_mut(trial.0 as usize)
            .ok_or(SuggestionError::UnknownTrial { token: trial.0 })
    }
}

impl SuggestionService for Study {
    fn ask(&mut self) -> Result<Suggestion, SuggestionError> {
        if self.space.is_empty() {
            return Err(SuggestionError::EmptyDomain);
        }
        let history = self.observations();
        let raw = self.sampler.sample(self.space.len(), &history, &mut self.rng);
        let parameters = self.space.decode(&raw);
        // Re-encode so the ledger holds the quantized point actually proposed.
        let point = self.space.encode(&parameters).unwrap_or(raw);

        let id = self.next_id();
        self.trials.push(TrialRecord::new(id, parameters.clone(), point));
        debug!(study = %self.id, trial = %id, sampler = self.sampler.name(), "asked");

        Ok(Suggestion {
            trial: id,
            parameters,
        })
    }

    fn tell(&mut self, trial: TrialId, reward: f64) -> Result<(), SuggestionError> {
        let study = self.id;
        let record = self.trial_mut(trial)?;
        if record.reward().is_some() {
            debug!(study = %study, trial = %trial, reward, "re-told, replacing reward");
        }
        record.mark_told(reward);
        debug!(study = %study, trial = %trial, reward, "told");
        Ok(())
    }

    fn best(&self) -> Option<(TrialId, f64)> {
        best_of(&self.trials, self.settings.direction)
    }

    fn record(
        &mut self,
        parameters: &ParameterMap,
        reward: f64,
    ) -> Result<TrialId, SuggestionError> {
        for spec in &self.space.parameters {
            match parameters.get(&spec.name) {
                Some(value) if spec.contains(value) => {}
                Some(value) => {
                    return Err(SuggestionError::OutOfDomain {
                        name: spec.name.clone(),
                        message: format!("value {value} outside domain"),
                    })
                }
                None => {
                    return Err(SuggestionError::OutOfDomain {
                        name: spec.name.clone(),
                        message: "missing".to_string(),
                    })
                }
            }
        }
        let point = self
            .space
            .encode(parameters)
            .ok_or(SuggestionError::EmptyDomain)?;

        let id = self.next_id();
        let mut trial = TrialRecord::new(id, parameters.clone(), point);
        trial.mark_told(reward);
        self.trials.push(trial);
        debug!(study = %self.id, trial = %id, reward, "recorded");
        Ok(id)
    }

    fn settings(&self) -> &StudySettings {
        &self.settings
    }

    fn n_trials(&self) -> usize {
        self.trials.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::VehicleCatalog;
    use proptest::prelude::*;

    fn mx5_study(sampler: SamplerKind, seed: u64) -> Study {
        let space = VehicleCatalog::builtin().domain_for("mx5").unwrap().clone();
        let settings = StudySettings {
            sampler,
            seed,
            ..StudySettings::default()
        };
        Study::new(settings, space)
    }

    #[test]
    fn unknown_sampler_falls_back_to_tpe() {
        assert_eq!(SamplerKind::resolve("bogus"), SamplerKind::Tpe);
        assert_eq!(SamplerKind::resolve("CMAES"), SamplerKind::CmaEs);
        assert_eq!(SamplerKind::resolve("random"), SamplerKind::Random);
    }

    #[test]
    fn unknown_pruner_falls_back_to_none() {
        assert_eq!(PrunerKind::resolve("bogus"), PrunerKind::None);
        assert_eq!(PrunerKind::resolve("hyperband"), PrunerKind::Hyperband);
        assert_eq!(PrunerKind::resolve("median"), PrunerKind::Median);
    }

    #[test]
    fn settings_resolve_from_config() {
        let config = OptimizationConfig::default()
            .with_sampler("simulated-annealing")
            .with_pruner("successive-halving")
            .with_seed(9);
        let settings = StudySettings::from_config(&config);
        assert_eq!(settings.sampler, SamplerKind::Tpe);
        assert_eq!(settings.pruner, PrunerKind::None);
        assert_eq!(settings.seed, 9);
    }

    #[test]
    fn ask_tokens_are_unique() {
        let mut study = mx5_study(SamplerKind::Random, 1);
        let a = study.ask().unwrap();
        let b = study.ask().unwrap();
        assert_ne!(a.trial, b.trial);
        assert_eq!(study.n_trials(), 2);
    }

    #[test]
    fn best_ignores_untold_trials() {
        let mut study = mx5_study(SamplerKind::Random, 2);
        let first = study.ask().unwrap();
        let second = study.ask().unwrap();
        assert_eq!(study.best(), None);

        study.tell(second.trial, 0.3).unwrap();
        assert_eq!(study.best(), Some((second.trial, 0.3)));
        assert_ne!(study.best().map(|b| b.0), Some(first.trial));
    }

    #[test]
    fn best_follows_rewards_in_any_order() {
        let mut study = mx5_study(SamplerKind::Tpe, 3);
        let trials: Vec<_> = (0..3).map(|_| study.ask().unwrap().trial).collect();
        study.tell(trials[2], 0.6).unwrap();
        study.tell(trials[0], 0.4).unwrap();
        study.tell(trials[1], 0.9).unwrap();
        assert_eq!(study.best(), Some((trials[1], 0.9)));
    }

    #[test]
    fn minimize_prefers_lower_rewards() {
        let space = ParameterSpace::new().add_float("x", 0.0, 1.0, None);
        let settings = StudySettings {
            direction: ObjectiveDirection::Minimize,
            ..StudySettings::default()
        };
        let mut study = Study::new(settings, space);
        let a = study.ask().unwrap().trial;
        let b = study.ask().unwrap().trial;
        study.tell(a, 2.0).unwrap();
        study.tell(b, 1.0).unwrap();
        assert_eq!(study.best(), Some((b, 1.0)));
    }

    #[test]
    fn retell_replaces_reward() {
        let mut study = mx5_study(SamplerKind::Random, 4);
        let t = study.ask().unwrap().trial;
        study.tell(t, 0.9).unwrap();
        study.tell(t, 0.2).unwrap();
        assert_eq!(study.best(), Some((t, 0.2)));
    }

    #[test]
    fn tell_unknown_trial_fails() {
        let mut study = mx5_study(SamplerKind::Random, 5);
        assert_eq!(
            study.tell(TrialId(99), 1.0),
            Err(SuggestionError::UnknownTrial { token: 99 })
        );
    }

    #[test]
    fn empty_domain_cannot_ask() {
        let mut study = Study::new(StudySettings::default(), ParameterSpace::new());
        assert_eq!(study.ask(), Err(SuggestionError::EmptyDomain));
    }

    #[test]
    fn record_injects_told_trial() {
        let mut study = mx5_study(SamplerKind::Random, 6);
        let asked = study.ask().unwrap();
        let recorded = study.record(&asked.parameters, 0.8).unwrap();
        assert_ne!(recorded, asked.trial);
        assert_eq!(study.best(), Some((recorded, 0.8)));
    }

    #[test]
    fn record_rejects_out_of_domain_parameters() {
        let mut study = mx5_study(SamplerKind::Random, 7);
        let mut params = study.ask().unwrap().parameters;
        params.insert("front_arb".into(), pl_types::ParameterValue::Int(12));
        assert!(matches!(
            study.record(&params, 0.5),
            Err(SuggestionError::OutOfDomain { ref name, .. }) if name == "front_arb"
        ));
    }

    #[test]
    fn seeded_studies_are_reproducible() {
        let mut a = mx5_study(SamplerKind::Random, 11);
        let mut b = mx5_study(SamplerKind::Random, 11);
        for _ in 0..5 {
            assert_eq!(a.ask().unwrap().parameters, b.ask().unwrap().parameters);
        }
    }

    #[test]
    fn backend_opens_builtin_study() {
        let space = VehicleCatalog::builtin().domain_for("f3").unwrap().clone();
        let mut handle = StudyBackend.open(StudySettings::default(), space);
        assert_eq!(handle.settings().sampler, SamplerKind::Tpe);
        assert!(handle.ask().is_ok());
        assert_eq!(handle.n_trials(), 1);
    }

    fn sampler_kind() -> impl Strategy<Value = SamplerKind> {
        prop_oneof![
            Just(SamplerKind::Tpe),
            Just(SamplerKind::CmaEs),
            Just(SamplerKind::Random),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn asked_values_are_in_domain(
            kind in sampler_kind(),
            seed in any::<u64>(),
            rewards in prop::collection::vec(0.0f64..1.0, 1..25),
        ) {
            let mut study = mx5_study(kind, seed);
            for reward in rewards {
                let suggestion = study.ask().unwrap();
                prop_assert!(
                    study.space().contains(&suggestion.parameters),
                    "{:?}",
                    suggestion.parameters
                );
                study.tell(suggestion.trial, reward).unwrap();
            }
        }
    }
}
