//! Process exit codes
//!
//! Scripts branch on these values, so a code never changes meaning once
//! released. Library errors pick their code through [`Error::exit_code`].

use s3kv_core::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// Store failure, malformed record, compression or local I/O error
    GeneralError = 1,

    /// Bad arguments: malformed location, invalid regex, bad assignment
    UsageError = 2,

    /// Transport failure after the SDK's own retries
    NetworkError = 3,

    /// Credentials rejected or access denied
    AuthError = 4,

    /// Missing object, bucket or profile
    NotFound = 5,

    /// Ctrl-C before the command finished
    Interrupted = 130,
}

impl ExitCode {
    #[inline]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Known code for `code`, if any
    pub const fn from_i32(code: i32) -> Option<Self> {
        Some(match code {
            0 => Self::Success,
            1 => Self::GeneralError,
            2 => Self::UsageError,
            3 => Self::NetworkError,
            4 => Self::AuthError,
            5 => Self::NotFound,
            130 => Self::Interrupted,
            _ => return None,
        })
    }
}

impl From<&Error> for ExitCode {
    fn from(err: &Error) -> Self {
        Self::from_i32(err.exit_code()).unwrap_or(Self::GeneralError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip_through_i32() {
        for code in [
            ExitCode::Success,
            ExitCode::GeneralError,
            ExitCode::UsageError,
            ExitCode::NetworkError,
            ExitCode::AuthError,
            ExitCode::NotFound,
            ExitCode::Interrupted,
        ] {
            assert_eq!(ExitCode::from_i32(code.as_i32()), Some(code));
        }
        assert_eq!(ExitCode::Interrupted.as_i32(), 130);
        assert_eq!(ExitCode::from_i32(6), None);
        assert_eq!(ExitCode::from_i32(-1), None);
    }

    #[test]
    fn test_exit_code_from_error() {
        let cases = [
            (Error::NotFound("b/k".into()), ExitCode::NotFound),
            (Error::ProfileNotFound("prod".into()), ExitCode::NotFound),
            (Error::InvalidArgument("x".into()), ExitCode::UsageError),
            (Error::InvalidPath("x".into()), ExitCode::UsageError),
            (Error::Auth("denied".into()), ExitCode::AuthError),
            (Error::Network("reset".into()), ExitCode::NetworkError),
            (Error::Store("boom".into()), ExitCode::GeneralError),
        ];
        for (err, expected) in &cases {
            assert_eq!(ExitCode::from(err), *expected, "{err}");
        }

        let batch = Error::Batch {
            completed: 3,
            source: Box::new(Error::Network("reset".into())),
        };
        assert_eq!(ExitCode::from(&batch), ExitCode::NetworkError);
    }
}
