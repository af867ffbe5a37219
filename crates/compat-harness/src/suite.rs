use crossbeam::channel;
use serde::Serialize;

use crate::backend::Setup;
use crate::config::HarnessConfig;
use crate::scenario::{Divergence, Scenario, ScenarioReport, Status};

/// A set of scenarios run concurrently, each with its own setup.
pub struct Suite {
    config: HarnessConfig,
    scenarios: Vec<Scenario>,
}

impl Suite {
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            config,
            scenarios: Vec::new(),
        }
    }

    pub fn add(&mut self, scenario: Scenario) -> &mut Self {
        self.scenarios.push(scenario);
        self
    }

    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    /// Scenarios carrying a known divergence, whether skipped or expected
    /// to fail.
    pub fn divergences(&self) -> Vec<(&str, &Divergence)> {
        self.scenarios
            .iter()
            .filter_map(|s| s.known_divergence().map(|d| (s.name(), d)))
            .collect()
    }

    /// Run every scenario on up to `parallelism` worker threads. Reports
    /// come back in the order scenarios were added.
    pub fn run(&self, setup: &dyn Setup) -> SuiteReport {
        let workers = self.config.parallelism.clamp(1, self.scenarios.len().max(1));
        let (job_tx, job_rx) = channel::bounded::<(usize, &Scenario)>(workers);
        let (result_tx, result_rx) = channel::unbounded::<(usize, ScenarioReport)>();

        std::thread::scope(|s| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                let config = &self.config;
                s.spawn(move || {
                    for (i, scenario) in job_rx {
                        let report = scenario.run(setup, config);
                        if result_tx.send((i, report)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(job_rx);
            drop(result_tx);

            for job in self.scenarios.iter().enumerate() {
                if job_tx.send(job).is_err() {
                    break;
                }
            }
            drop(job_tx);
        });

        let mut reports: Vec<(usize, ScenarioReport)> = result_rx.into_iter().collect();
        reports.sort_by_key(|(i, _)| *i);
        SuiteReport {
            scenarios: reports.into_iter().map(|(_, r)| r).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub scenarios: Vec<ScenarioReport>,
}

impl SuiteReport {
    pub fn passed(&self) -> bool {
        self.scenarios.iter().all(ScenarioReport::passed)
    }

    pub fn count(&self, status: Status) -> usize {
        self.scenarios.iter().filter(|r| r.status == status).count()
    }

    pub fn get(&self, name: &str) -> Option<&ScenarioReport> {
        self.scenarios.iter().find(|r| r.name == name)
    }

    pub fn assert_passed(&self) {
        let failed: Vec<String> = self
            .scenarios
            .iter()
            .filter(|r| !r.passed())
            .map(ScenarioReport::diagnostics)
            .collect();
        if !failed.is_empty() {
            panic!("{} scenario(s) failed:\n{}", failed.len(), failed.join("\n"));
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
