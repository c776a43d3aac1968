use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{error, info, warn};
use serde::Serialize;

use crate::config::OracleConfig;
use crate::error::Result;
use crate::locate::SourceLayout;
use crate::oracle::{FixOracle, FixRequest};
use crate::output::Spinner;
use crate::report::TestRecord;

/// Attempt bound and backoff between oracle calls for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &OracleConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delay: config.retry_delay(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&OracleConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum RepairState {
    Pending,
    Attempting { attempt: u32 },
    Fixed { attempts: u32 },
    Exhausted { attempts: u32 },
    Skipped { reason: String },
}

impl RepairState {
    fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Fixed { .. } | Self::Exhausted { .. } | Self::Skipped { .. }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Attempting { .. } => "attempting",
            Self::Fixed { .. } => "fixed",
            Self::Exhausted { .. } => "unresolved",
            Self::Skipped { .. } => "skipped",
        }
    }

    /// Oracle calls made for the record.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Fixed { attempts } | Self::Exhausted { attempts } => *attempts,
            Self::Attempting { attempt } => attempt.saturating_sub(1),
            Self::Pending | Self::Skipped { .. } => 0,
        }
    }
}

/// Final state of one failing record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairOutcome {
    pub test: String,
    pub file: Option<PathBuf>,
    #[serde(flatten)]
    pub state: RepairState,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    pub outcomes: Vec<RepairOutcome>,
}

impl RepairReport {
    pub fn fixed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.state, RepairState::Fixed { .. }))
            .count()
    }

    pub fn unresolved(&self) -> Vec<&RepairOutcome> {
        self.outcomes
            .iter()
            .filter(|o| !matches!(o.state, RepairState::Fixed { .. }))
            .collect()
    }
}

/// Asks the oracle for a replacement of each failing test and writes it
/// into the working tree. Fixes are not verified here; the pipeline
/// re-runs the whole suite afterwards.
pub struct RepairLoop<'a, O> {
    oracle: &'a O,
    layout: &'a SourceLayout,
    policy: RetryPolicy,
}

impl<'a, O: FixOracle> RepairLoop<'a, O> {
    pub fn new(oracle: &'a O, layout: &'a SourceLayout, policy: RetryPolicy) -> Self {
        Self {
            oracle,
            layout,
            policy,
        }
    }

    /// Attempts a fix for every failing record, one at a time.
    ///
    /// Unresolved records are reported, not raised. Only a failure to write
    /// a replacement into the working tree is returned as an error.
    pub async fn repair(&self, failing: &[&TestRecord]) -> Result<RepairReport> {
        let mut report = RepairReport::default();
        let mut rewritten: HashMap<PathBuf, u32> = HashMap::new();

        for record in failing {
            info!("Attempting to fix: {}", record.qualified_name());
            let outcome = self.repair_record(record, &mut rewritten).await?;
            match &outcome.state {
                RepairState::Fixed { attempts } => {
                    info!("Fixed {} after {attempts} attempt(s)", outcome.test);
                }
                RepairState::Exhausted { attempts } => {
                    error!(
                        "Failed to fix {} after {attempts} attempts",
                        outcome.test
                    );
                }
                RepairState::Skipped { reason } => {
                    warn!("Skipped {}: {reason}", outcome.test);
                }
                RepairState::Pending | RepairState::Attempting { .. } => {}
            }
            report.outcomes.push(outcome);
        }

        Ok(report)
    }

    async fn repair_record(
        &self,
        record: &TestRecord,
        rewritten: &mut HashMap<PathBuf, u32>,
    ) -> Result<RepairOutcome> {
        let test = record.qualified_name();

        let Some(test_file) = self.layout.locate_test(&record.unit) else {
            return Ok(RepairOutcome {
                test,
                file: None,
                state: RepairState::Skipped {
                    reason: format!("test file for {} not found", record.unit),
                },
            });
        };

        // Re-read on every record: an earlier record may have rewritten this file.
        let test_source = match fs::read_to_string(&test_file) {
            Ok(source) => source,
            Err(e) => {
                return Ok(RepairOutcome {
                    test,
                    file: Some(test_file.clone()),
                    state: RepairState::Skipped {
                        reason: format!("cannot read {}: {e}", test_file.display()),
                    },
                });
            }
        };

        let subject_source = match self.layout.locate_subject(&record.unit) {
            Some(path) => fs::read_to_string(&path).unwrap_or_else(|e| {
                warn!("Cannot read subject {}: {e}", path.display());
                String::new()
            }),
            None => {
                warn!("No subject found for {}; asking without it", record.unit);
                String::new()
            }
        };

        let request = FixRequest {
            test_source: &test_source,
            subject_source: &subject_source,
            failure_detail: record.failure.as_deref().unwrap_or_default(),
        };

        let mut state = RepairState::Pending;
        while !state.is_terminal() {
            state = match state {
                RepairState::Pending => RepairState::Attempting { attempt: 1 },
                RepairState::Attempting { attempt } => {
                    self.attempt(&test, &test_file, &request, attempt, rewritten)
                        .await?
                }
                terminal => terminal,
            };
        }

        Ok(RepairOutcome {
            test,
            file: Some(test_file),
            state,
        })
    }

    async fn attempt(
        &self,
        test: &str,
        test_file: &Path,
        request: &FixRequest<'_>,
        attempt: u32,
        rewritten: &mut HashMap<PathBuf, u32>,
    ) -> Result<RepairState> {
        let max = self.policy.max_attempts;
        let spinner = Spinner::start(format!("Oracle attempt {attempt}/{max} for {test}"));
        let proposal = self.oracle.propose_fix(request).await;

        if let Some(code) = proposal {
            fs::write(test_file, code)?;
            spinner.finish_ok(format!("Updated {}", test_file.display()));

            let writes = rewritten.entry(test_file.to_path_buf()).or_insert(0);
            *writes += 1;
            if *writes > 1 {
                warn!(
                    "{} was rewritten {} times in this repair round; the last fix wins",
                    test_file.display(),
                    writes
                );
            }
            return Ok(RepairState::Fixed { attempts: attempt });
        }

        if attempt >= max {
            spinner.finish_failed(format!("No usable fix for {test}"));
            return Ok(RepairState::Exhausted { attempts: attempt });
        }

        spinner.finish_failed(format!(
            "Oracle did not return valid code for {test}, retrying..."
        ));
        tokio::time::sleep(self.policy.delay).await;
        Ok(RepairState::Attempting {
            attempt: attempt + 1,
        })
    }
}

#[cfg(test)]
mod tests;
