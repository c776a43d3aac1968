use std::collections::VecDeque;
use std::sync::Mutex;

use crate::oracle::{FixOracle, FixRequest};

/// A request as the oracle saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenRequest {
    pub test_source: String,
    pub subject_source: String,
    pub failure_detail: String,
}

/// Oracle that replays queued answers and records every call.
///
/// Answers are picked by the first queue whose key appears in the test
/// source; an exhausted or missing queue answers `None`.
#[derive(Default)]
pub struct ScriptedOracle {
    scripts: Mutex<Vec<(String, VecDeque<Option<String>>)>>,
    seen: Mutex<Vec<SeenRequest>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn answer(self, key: &str, answers: Vec<Option<&str>>) -> Self {
        self.scripts.lock().unwrap().push((
            key.to_string(),
            answers.into_iter().map(|a| a.map(str::to_string)).collect(),
        ));
        self
    }

    pub fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }

    pub fn calls_for(&self, key: &str) -> usize {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.test_source.contains(key))
            .count()
    }
}

impl FixOracle for ScriptedOracle {
    async fn propose_fix(&self, request: &FixRequest<'_>) -> Option<String> {
        self.seen.lock().unwrap().push(SeenRequest {
            test_source: request.test_source.to_string(),
            subject_source: request.subject_source.to_string(),
            failure_detail: request.failure_detail.to_string(),
        });

        let mut scripts = self.scripts.lock().unwrap();
        scripts
            .iter_mut()
            .find(|(key, _)| request.test_source.contains(key.as_str()))
            .and_then(|(_, answers)| answers.pop_front())
            .flatten()
    }
}
