use std::time::Duration;

/// Recorded against a scenario when its body did not finish within the enforced timeout.
///
/// The carried value is the enforced timeout, which is the scenario's total timeout minus the
/// teardown leeway. It is never the raw total, so a report can tell "the journey ran long" apart
/// from "the schedule left no room for it".
#[derive(derive_more::Error, derive_more::Display, Debug, Clone, PartialEq, Eq)]
#[display("test timed out after {millis} milliseconds")]
pub struct TestTimedOutError {
    millis: u64,
}

impl TestTimedOutError {
    pub fn new(timeout: Duration) -> Self {
        Self {
            millis: timeout.as_millis() as u64,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.millis)
    }
}

/// Returned from waits and journey code that stopped early because an interrupt was fired.
///
/// A journey body that observes this should return it (or any error) promptly so that its
/// teardown can run.
#[derive(derive_more::Error, derive_more::Display, Debug)]
pub struct InterruptedError {
    msg: String,
}

impl Default for InterruptedError {
    fn default() -> Self {
        Self {
            msg: "Execution interrupted".to_string(),
        }
    }
}
