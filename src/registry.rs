use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

use crate::error::{ForecastError, Result};
use crate::history::MatchHistoryStore;
use crate::model::TrainedModel;
use crate::persist;
use crate::resolver::TeamResolver;

/// What a request needs to serve one competition. Cloning is two Arc bumps,
/// and a clone stays valid after the registry swaps in a newer model.
#[derive(Debug, Clone)]
pub struct CompetitionModel {
    pub model: Arc<TrainedModel>,
    pub resolver: Arc<TeamResolver>,
}

#[derive(Debug, Clone)]
struct Blocked {
    expected: Vec<String>,
    found: Vec<String>,
}

#[derive(Debug, Default)]
pub struct LoadSummary {
    pub loaded: Vec<String>,
    pub blocked: Vec<String>,
    pub failed: Vec<(String, String)>,
}

#[derive(Debug, Default)]
pub struct ModelRegistry {
    entries: RwLock<HashMap<String, CompetitionModel>>,
    blocked: RwLock<HashMap<String, Blocked>>,
}

static GLOBAL: Lazy<Arc<ModelRegistry>> = Lazy::new(|| Arc::new(ModelRegistry::new()));

/// Process-wide registry shared by the serving binary.
pub fn global() -> Arc<ModelRegistry> {
    Arc::clone(&GLOBAL)
}

fn key(competition: &str) -> String {
    competition.trim().to_lowercase()
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates the feature schema and atomically replaces any previous
    /// model for the competition. A mismatching model blocks the competition
    /// until a compatible one is installed.
    pub fn install(&self, model: TrainedModel, roster: &[String]) -> Result<Arc<TrainedModel>> {
        let k = key(&model.competition);
        if let Err(err) = model.ensure_schema() {
            if let ForecastError::ModelSchemaMismatch {
                expected, found, ..
            } = &err
            {
                log::error!("{}: {err}", model.competition);
                self.blocked
                    .write()
                    .expect("registry lock poisoned")
                    .insert(
                        k.clone(),
                        Blocked {
                            expected: expected.clone(),
                            found: found.clone(),
                        },
                    );
                self.entries
                    .write()
                    .expect("registry lock poisoned")
                    .remove(&k);
            }
            return Err(err);
        }

        let model = Arc::new(model);
        let entry = CompetitionModel {
            model: Arc::clone(&model),
            resolver: Arc::new(TeamResolver::new(model.competition.clone(), roster)),
        };
        self.entries
            .write()
            .expect("registry lock poisoned")
            .insert(k.clone(), entry);
        self.blocked
            .write()
            .expect("registry lock poisoned")
            .remove(&k);
        Ok(model)
    }

    pub fn get(&self, competition: &str) -> Result<CompetitionModel> {
        let k = key(competition);
        if let Some(b) = self.blocked.read().expect("registry lock poisoned").get(&k) {
            return Err(ForecastError::ModelSchemaMismatch {
                competition: competition.to_string(),
                expected: b.expected.clone(),
                found: b.found.clone(),
            });
        }
        self.entries
            .read()
            .expect("registry lock poisoned")
            .get(&k)
            .cloned()
            .ok_or_else(|| ForecastError::ModelNotLoaded {
                competition: competition.to_string(),
            })
    }

    pub fn resolve_team(&self, competition: &str, query: &str) -> Result<String> {
        self.get(competition)?.resolver.resolve(query)
    }

    pub fn remove(&self, competition: &str) -> Option<Arc<TrainedModel>> {
        self.entries
            .write()
            .expect("registry lock poisoned")
            .remove(&key(competition))
            .map(|e| e.model)
    }

    pub fn competitions(&self) -> Vec<String> {
        let mut out = self
            .entries
            .read()
            .expect("registry lock poisoned")
            .values()
            .map(|e| e.model.competition.clone())
            .collect::<Vec<_>>();
        out.sort();
        out
    }

    pub fn is_blocked(&self, competition: &str) -> bool {
        self.blocked
            .read()
            .expect("registry lock poisoned")
            .contains_key(&key(competition))
    }

    /// Loads every model file in `dir` whose competition exists in `store`.
    /// One bad file never prevents the others from loading.
    pub fn load_dir(&self, dir: &Path, store: &MatchHistoryStore) -> anyhow::Result<LoadSummary> {
        let mut summary = LoadSummary::default();
        for path in persist::list_model_files(dir)? {
            let label = path.display().to_string();
            let model = match persist::load_model(&path) {
                Ok(model) => model,
                Err(err) => {
                    log::error!("skipping {label}: {err:#}");
                    summary.failed.push((label, format!("{err:#}")));
                    continue;
                }
            };
            let competition = model.competition.clone();
            let roster = match store.get(&competition) {
                Ok(history) => history.roster(),
                Err(err) => {
                    log::warn!("skipping {label}: {err}");
                    summary.failed.push((label, err.to_string()));
                    continue;
                }
            };
            match self.install(model, &roster) {
                Ok(_) => {
                    log::info!("loaded model for {competition} from {label}");
                    summary.loaded.push(competition);
                }
                Err(ForecastError::ModelSchemaMismatch { .. }) => summary.blocked.push(competition),
                Err(err) => summary.failed.push((label, err.to_string())),
            }
        }
        Ok(summary)
    }
}
