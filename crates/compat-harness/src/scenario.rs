//! A scenario runs one operation against every paired target and reference
//! collection and compares what comes back.

use std::fmt::Write as _;

use serde::Serialize;

use crate::assert::{
    assert_equal_alt_command_error, assert_equal_document_slices, assert_equal_error,
    assert_equal_keys, assert_matches_error,
};
use crate::backend::{Collection, Context, Setup, SetupOpts};
use crate::check::{Abort, Checker};
use crate::config::HarnessConfig;
use crate::operation::{Observation, Operation, Response};
use crate::server_error::{ServerError, unset_raw};

// ── Descriptor ──────────────────────────────────────────────────

/// Whether a scenario must produce a non-empty result somewhere.
///
/// Guards against malformed queries that trivially match nothing on both
/// sides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultType {
    #[default]
    NonEmpty,
    Empty,
}

/// How errors from both sides are compared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ErrorMode {
    #[default]
    Exact,
    /// Messages may differ.
    Match,
    /// Exact, but this rewording of the message is also accepted.
    Alt(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DocumentMode {
    #[default]
    Full,
    /// Compare field names only.
    Keys,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DivergenceMode {
    /// Do not run the scenario.
    Skip,
    /// Run it and require it to fail.
    ExpectFailure,
}

/// A known, documented difference between the target and the reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Divergence {
    pub reason: String,
    /// Issue or ticket tracking the difference.
    pub tracking: Option<String>,
    pub mode: DivergenceMode,
}

impl Divergence {
    pub fn skip(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            tracking: None,
            mode: DivergenceMode::Skip,
        }
    }

    pub fn expect_failure(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            tracking: None,
            mode: DivergenceMode::ExpectFailure,
        }
    }

    pub fn tracked(mut self, tracking: impl Into<String>) -> Self {
        self.tracking = Some(tracking.into());
        self
    }
}

/// Overrides the per-operation non-empty check.
pub type Probe = fn(&Response) -> bool;

#[derive(Debug, Clone)]
pub struct Scenario {
    name: String,
    operation: Operation,
    result_type: ResultType,
    error_mode: ErrorMode,
    document_mode: DocumentMode,
    setup: SetupOpts,
    divergence: Option<Divergence>,
    probe: Option<Probe>,
}

impl Scenario {
    pub fn new(name: impl Into<String>, operation: Operation) -> Self {
        Self {
            name: name.into(),
            operation,
            result_type: ResultType::default(),
            error_mode: ErrorMode::default(),
            document_mode: DocumentMode::default(),
            setup: SetupOpts::default(),
            divergence: None,
            probe: None,
        }
    }

    pub fn result_type(mut self, result_type: ResultType) -> Self {
        self.result_type = result_type;
        self
    }

    pub fn error_mode(mut self, mode: ErrorMode) -> Self {
        self.error_mode = mode;
        self
    }

    pub fn document_mode(mut self, mode: DocumentMode) -> Self {
        self.document_mode = mode;
        self
    }

    pub fn setup_opts(mut self, opts: SetupOpts) -> Self {
        self.setup = opts;
        self
    }

    pub fn divergence(mut self, divergence: Divergence) -> Self {
        self.divergence = Some(divergence);
        self
    }

    pub fn probe(mut self, probe: Probe) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn known_divergence(&self) -> Option<&Divergence> {
        self.divergence.as_ref()
    }

    fn is_non_empty(&self, response: &Response) -> bool {
        match self.probe {
            Some(probe) => probe(response),
            None => self.operation.is_non_empty(response),
        }
    }
}

// ── Reports ─────────────────────────────────────────────────────

/// Sub-test lifecycle. Terminal phases are `Pass` and `Fail`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Pending,
    Executed,
    Errored,
    Succeeded,
    Compared,
    Pass,
    Fail,
}

impl Phase {
    fn allows(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Pending, Executed)
                | (Executed, Errored | Succeeded)
                | (Errored | Succeeded, Compared)
                | (Compared, Pass)
                | (Pending | Executed | Errored | Succeeded | Compared, Fail)
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubtestReport {
    pub collection: String,
    /// Every phase the sub-test went through, in order.
    pub trail: Vec<Phase>,
    pub non_empty: bool,
    pub failures: Vec<String>,
    pub notes: Vec<String>,
    pub abort: Option<String>,
}

impl SubtestReport {
    fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            trail: vec![Phase::Pending],
            non_empty: false,
            failures: Vec::new(),
            notes: Vec::new(),
            abort: None,
        }
    }

    fn advance(&mut self, next: Phase) {
        let current = self.phase();
        debug_assert!(current.allows(next), "{current:?} -> {next:?}");
        self.trail.push(next);
    }

    pub fn phase(&self) -> Phase {
        self.trail.last().copied().unwrap_or(Phase::Pending)
    }

    pub fn passed(&self) -> bool {
        self.phase() == Phase::Pass
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Passed,
    Failed,
    Skipped,
    ExpectedFailure,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub status: Status,
    pub result_type: ResultType,
    pub non_empty: bool,
    pub divergence: Option<Divergence>,
    pub subtests: Vec<SubtestReport>,
    /// Failures not tied to a single sub-test.
    pub failures: Vec<String>,
}

impl ScenarioReport {
    fn new(scenario: &Scenario) -> Self {
        Self {
            name: scenario.name.clone(),
            status: Status::Passed,
            result_type: scenario.result_type,
            non_empty: false,
            divergence: scenario.divergence.clone(),
            subtests: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn passed(&self) -> bool {
        self.status != Status::Failed
    }

    /// Human-readable summary of everything that went wrong.
    pub fn diagnostics(&self) -> String {
        let mut out = format!("{}: {:?}\n", self.name, self.status);
        for failure in &self.failures {
            let _ = writeln!(out, "  {failure}");
        }
        for sub in &self.subtests {
            if let Some(abort) = &sub.abort {
                let _ = writeln!(out, "  [{}] aborted: {abort}", sub.collection);
            }
            for failure in &sub.failures {
                let _ = writeln!(out, "  [{}] {failure}", sub.collection);
            }
            for note in &sub.notes {
                let _ = writeln!(out, "  [{}] {note}", sub.collection);
            }
        }
        out
    }

    /// Panic with all diagnostics unless the scenario passed.
    pub fn assert_passed(&self) {
        if !self.passed() {
            panic!("{}", self.diagnostics());
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

// ── Run ─────────────────────────────────────────────────────────

impl Scenario {
    pub fn run(&self, setup: &dyn Setup, config: &HarnessConfig) -> ScenarioReport {
        let mut report = ScenarioReport::new(self);

        if let Some(div) = &self.divergence {
            if div.reason.trim().is_empty() {
                report.failures.push("known divergence without a reason".into());
                return self.finish(report);
            }
            if div.mode == DivergenceMode::Skip {
                report.status = Status::Skipped;
                tracing::info!(scenario = %self.name, reason = %div.reason, "skipped");
                return report;
            }
        }

        let compat_setup = match setup.setup(&self.setup) {
            Ok(s) => s,
            Err(e) => {
                report.failures.push(format!("setup: {e}"));
                return self.finish(report);
            }
        };
        if compat_setup.target.len() != compat_setup.compat.len() {
            report.failures.push(format!(
                "setup returned {} target and {} compat collections",
                compat_setup.target.len(),
                compat_setup.compat.len()
            ));
            return self.finish(report);
        }

        let ctx = match config.timeout() {
            Some(timeout) => compat_setup.ctx.with_timeout(timeout),
            None => compat_setup.ctx.clone(),
        };

        let mut interrupted = false;
        for (target, compat) in compat_setup.target.iter().zip(&compat_setup.compat) {
            if let Some(reason) = ctx.err() {
                report.failures.push(format!("{}: {reason}", target.name()));
                interrupted = true;
                break;
            }
            let sub = self.run_subtest(&ctx, config.reference_target(), &**target, &**compat);
            report.non_empty |= sub.non_empty;
            report.subtests.push(sub);
        }

        if !interrupted {
            match self.result_type {
                ResultType::NonEmpty if !report.non_empty => {
                    report.failures.push("expected non-empty results".into());
                }
                ResultType::Empty if report.non_empty => {
                    report.failures.push("expected empty results".into());
                }
                _ => {}
            }
        }

        self.finish(report)
    }

    /// Settle the status, inverting it for an expected failure.
    fn finish(&self, mut report: ScenarioReport) -> ScenarioReport {
        let failed =
            !report.failures.is_empty() || report.subtests.iter().any(|sub| !sub.passed());

        let expect_failure = self
            .divergence
            .as_ref()
            .filter(|d| d.mode == DivergenceMode::ExpectFailure && !d.reason.trim().is_empty());

        report.status = match (expect_failure, failed) {
            (Some(_), true) => Status::ExpectedFailure,
            (Some(div), false) => {
                report
                    .failures
                    .push(format!("test passed unexpectedly: {}", div.reason));
                Status::Failed
            }
            (None, true) => Status::Failed,
            (None, false) => Status::Passed,
        };

        tracing::info!(scenario = %self.name, status = ?report.status, "scenario finished");
        report
    }

    fn run_subtest(
        &self,
        ctx: &Context,
        reference_target: bool,
        target: &dyn Collection,
        compat: &dyn Collection,
    ) -> SubtestReport {
        let mut sub = SubtestReport::new(target.name());
        let mut ck = Checker::new(reference_target);

        let result = self.compare(ctx, &mut ck, &mut sub, target, compat);
        if let Err(abort) = result {
            tracing::warn!(collection = target.name(), reason = %abort.reason, "sub-test aborted");
            sub.abort = Some(abort.reason);
        }

        let passed = sub.abort.is_none() && ck.passed() && sub.phase() == Phase::Compared;
        sub.advance(if passed { Phase::Pass } else { Phase::Fail });

        let (failures, notes) = ck.into_parts();
        sub.failures = failures;
        sub.notes = notes;
        sub
    }

    fn compare(
        &self,
        ctx: &Context,
        ck: &mut Checker,
        sub: &mut SubtestReport,
        target: &dyn Collection,
        compat: &dyn Collection,
    ) -> Result<(), Abort> {
        let target_res = self.operation.execute(ctx, target);
        let compat_res = self.operation.execute(ctx, compat);
        sub.advance(Phase::Executed);

        match target_res {
            Err(target_err) => {
                sub.advance(Phase::Errored);
                tracing::debug!(collection = target.name(), error = %target_err, "target error");
                let compat_err = match compat_res {
                    Err(e) => e,
                    Ok(_) => {
                        return Err(Abort::new(format!(
                            "target error; compat returned no error: {target_err}"
                        )));
                    }
                };
                tracing::debug!(collection = compat.name(), error = %compat_err, "compat error");
                self.compare_errors(ck, compat_err, target_err)?;
            }
            Ok(target_obs) => {
                sub.advance(Phase::Succeeded);
                let compat_obs = compat_res.map_err(|e| {
                    Abort::new(format!("compat error; target returned no error: {e}"))
                })?;
                self.compare_observations(ck, &compat_obs, &target_obs)?;
                sub.non_empty = self.is_non_empty(&target_obs.response)
                    || self.is_non_empty(&compat_obs.response);
            }
        }

        sub.advance(Phase::Compared);
        Ok(())
    }

    fn compare_errors(
        &self,
        ck: &mut Checker,
        mut expected: ServerError,
        mut actual: ServerError,
    ) -> Result<bool, Abort> {
        unset_raw(&mut expected);
        unset_raw(&mut actual);

        match &self.error_mode {
            ErrorMode::Exact => assert_equal_error(ck, &expected, &actual),
            ErrorMode::Match => assert_matches_error(ck, &expected, &actual),
            ErrorMode::Alt(message) => {
                let ServerError::Command(e) = &expected else {
                    return Err(Abort::new(format!(
                        "alternate message needs a CommandError, compat returned {}",
                        expected.kind()
                    )));
                };
                assert_equal_alt_command_error(ck, e, message, &actual)
            }
        }
    }

    fn compare_observations(
        &self,
        ck: &mut Checker,
        expected: &Observation,
        actual: &Observation,
    ) -> Result<bool, Abort> {
        let e = expected.response.to_canonical()?;
        let a = actual.response.to_canonical()?;
        let mut passed = match self.document_mode {
            DocumentMode::Full => assert_equal_document_slices(ck, &e, &a)?,
            DocumentMode::Keys => assert_equal_keys(ck, &e, &a)?,
        };

        match (&expected.state, &actual.state) {
            (Some(e), Some(a)) => passed &= assert_equal_document_slices(ck, e, a)?,
            (None, None) => {}
            _ => {
                ck.fail("only one side reported collection state");
                passed = false;
            }
        }
        Ok(passed)
    }
}
