//! Outcome of one run of the pull script.

use std::fmt;

use crate::protocol::SUCCEEDED;

/// Exit code recorded when the pull script could not report one
/// (spawn failure, killed by a signal).
pub const NO_EXIT_CODE: i32 = -1;

/// Result categories of the pull script, keyed by its exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    /// Exit code 0.
    Succeeded,
    /// Exit code 1; the administrator is notified with the script output.
    UnknownErrorWithNotification,
    /// Exit code 2.
    BadArguments,
    /// Exit code 3.
    ShareMountFailed,
    /// Exit code 4.
    DestinationNotADirectory,
    /// Exit code 5.
    SyncToolFailed,
    /// Any other exit code.
    UnknownError(i32),
}

impl PullOutcome {
    pub fn from_exit_code(code: i32) -> Self {
        match code {
            0 => PullOutcome::Succeeded,
            1 => PullOutcome::UnknownErrorWithNotification,
            2 => PullOutcome::BadArguments,
            3 => PullOutcome::ShareMountFailed,
            4 => PullOutcome::DestinationNotADirectory,
            5 => PullOutcome::SyncToolFailed,
            other => PullOutcome::UnknownError(other),
        }
    }

    /// The single response line sent to the client.
    pub fn wire_message(&self) -> String {
        match self {
            PullOutcome::Succeeded => SUCCEEDED.to_string(),
            PullOutcome::UnknownErrorWithNotification => {
                "An unknown error occurred while pulling; the administrator has been notified"
                    .to_string()
            }
            PullOutcome::BadArguments => {
                "The pull script was called with bad arguments".to_string()
            }
            PullOutcome::ShareMountFailed => "The backup share could not be mounted".to_string(),
            PullOutcome::DestinationNotADirectory => {
                "The backup destination is not a directory".to_string()
            }
            PullOutcome::SyncToolFailed => "The sync tool failed to pull the files".to_string(),
            PullOutcome::UnknownError(code) => {
                format!("An unknown error occurred while pulling (exit code {code})")
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PullOutcome::Succeeded)
    }

    pub fn requires_notification(&self) -> bool {
        matches!(self, PullOutcome::UnknownErrorWithNotification)
    }
}

impl fmt::Display for PullOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.wire_message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, PullOutcome::Succeeded)]
    #[case(1, PullOutcome::UnknownErrorWithNotification)]
    #[case(2, PullOutcome::BadArguments)]
    #[case(3, PullOutcome::ShareMountFailed)]
    #[case(4, PullOutcome::DestinationNotADirectory)]
    #[case(5, PullOutcome::SyncToolFailed)]
    #[case(99, PullOutcome::UnknownError(99))]
    #[case(-1, PullOutcome::UnknownError(-1))]
    fn exit_codes_map_to_outcomes(#[case] code: i32, #[case] expected: PullOutcome) {
        assert_eq!(PullOutcome::from_exit_code(code), expected);
    }

    #[test]
    fn only_success_uses_the_success_token() {
        for code in [1, 2, 3, 4, 5, 6, 99, 255] {
            let message = PullOutcome::from_exit_code(code).wire_message();
            assert_ne!(message, SUCCEEDED, "exit code {code} must not read as success");
            assert!(!message.contains('\n'), "wire messages are single lines");
        }
        assert_eq!(PullOutcome::Succeeded.wire_message(), "Succeeded");
    }

    #[test]
    fn failure_sentences_are_distinct() {
        let mut messages: Vec<String> = (0..=5)
            .chain([99])
            .map(|code| PullOutcome::from_exit_code(code).wire_message())
            .collect();
        messages.sort();
        messages.dedup();
        assert_eq!(messages.len(), 7);
    }

    #[test]
    fn only_exit_code_one_notifies() {
        for code in [0, 2, 3, 4, 5, 99] {
            assert!(!PullOutcome::from_exit_code(code).requires_notification());
        }
        assert!(PullOutcome::from_exit_code(1).requires_notification());
    }

    #[test]
    fn unknown_error_mentions_exit_code() {
        assert!(PullOutcome::UnknownError(42).to_string().contains("42"));
    }
}
