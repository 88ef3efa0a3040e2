// Failure policy - what happens on a fatal precondition violation
//
// Shape mismatches between operands are ordinary runtime errors and come
// back as GraphError. Everything else the session or the autograd engine
// detects (an axis outside the operand's rank, a reshape that changes the
// element count, a differentiation rule that does not exist, a binding
// cycle) is a programming error. Those are handed to the FailurePolicy the
// host installed on the Session, which logs them and does not return.

use std::fmt;

/// A fatal precondition violation.
#[derive(Debug, Clone)]
pub struct Failure {
    /// The condition that should have held.
    pub condition: &'static str,
    /// The operation that checked it.
    pub operation: &'static str,
    pub detail: String,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fatal error, assertion failed: `{}` in `{}`: {}",
            self.condition, self.operation, self.detail
        )
    }
}

/// Strategy for reporting fatal failures. Implementations must not return.
pub trait FailurePolicy {
    fn fail(&self, failure: Failure) -> !;
}

/// Log the failure, then panic. The default: tests can catch it with
/// `#[should_panic]`, and a `panic = "abort"` build terminates outright.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanicPolicy;

impl FailurePolicy for PanicPolicy {
    fn fail(&self, failure: Failure) -> ! {
        tracing::error!(
            condition = failure.condition,
            operation = failure.operation,
            detail = %failure.detail,
            "fatal error, assertion failed"
        );
        panic!("{failure}")
    }
}

/// Log the failure, then exit the process with `code`.
#[derive(Debug, Clone, Copy)]
pub struct ExitPolicy {
    pub code: i32,
}

impl Default for ExitPolicy {
    fn default() -> Self {
        ExitPolicy { code: 1 }
    }
}

impl FailurePolicy for ExitPolicy {
    fn fail(&self, failure: Failure) -> ! {
        tracing::error!(
            condition = failure.condition,
            operation = failure.operation,
            detail = %failure.detail,
            code = self.code,
            "fatal error, exiting"
        );
        eprintln!("{failure}");
        std::process::exit(self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_message() {
        let f = Failure {
            condition: "axis < rank",
            operation: "sum",
            detail: "axis 3 for rank 2".to_string(),
        };
        assert_eq!(
            f.to_string(),
            "fatal error, assertion failed: `axis < rank` in `sum`: axis 3 for rank 2"
        );
    }

    #[test]
    #[should_panic(expected = "assertion failed: `x` in `op`")]
    fn test_panic_policy_panics() {
        PanicPolicy.fail(Failure {
            condition: "x",
            operation: "op",
            detail: String::new(),
        });
    }
}
