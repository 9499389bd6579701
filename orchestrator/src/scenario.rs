//! Declarative description of one simulation run.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::{fs::File, path::Path};
use tracing::info;

/// Funding plan for a single wallet client, in satoshis.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct WalletSpec {
    pub funds: Vec<u64>,
}

/// The declarative description of one simulation run: a name (used to key the
/// artifact directory), a round target, and a per-wallet funding plan.
///
/// Built from [`Scenario::default`], optionally shallow-merged by top-level
/// key with a JSON override file. Immutable once constructed.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Scenario {
    pub name: String,
    pub rounds: u64,
    pub wallets: Vec<WalletSpec>,
}

/// Top-level keys recognized in a scenario override file. Keys left out of
/// the file keep their default value (shallow merge).
#[derive(Deserialize, Default)]
struct ScenarioOverride {
    name: Option<String>,
    rounds: Option<u64>,
    wallets: Option<Vec<WalletSpec>>,
}

impl Default for Scenario {
    fn default() -> Self {
        let plans: &[&[u64]] = &[
            &[200_000, 50_000],
            &[3_000_000],
            &[1_000_000, 500_000],
            &[1_000_000, 500_000],
            &[1_000_000, 500_000],
            &[3_000_000, 15_000],
            &[1_000_000, 500_000],
            &[1_000_000, 500_000],
            &[3_000_000, 600_000],
            &[1_000_000, 500_000],
        ];
        Self {
            name: "default".to_string(),
            rounds: 10,
            wallets: plans
                .iter()
                .map(|funds| WalletSpec {
                    funds: funds.to_vec(),
                })
                .collect(),
        }
    }
}

impl Scenario {
    /// Loads the scenario, applying the override file at `path` (if any) over
    /// the built-in default.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let mut scenario = Self::default();
        if let Some(path) = path {
            let file = File::open(path)?;
            let overrides: ScenarioOverride = serde_json::from_reader(file)?;
            scenario.apply(overrides);
            info!(path = %path.display(), name = scenario.name.as_str(), "applied scenario override");
        }
        Ok(scenario)
    }

    fn apply(&mut self, overrides: ScenarioOverride) {
        if let Some(name) = overrides.name {
            self.name = name;
        }
        if let Some(rounds) = overrides.rounds {
            self.rounds = rounds;
        }
        if let Some(wallets) = overrides.wallets {
            self.wallets = wallets;
        }
    }
}
