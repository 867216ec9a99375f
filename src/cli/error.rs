//! CLI-level errors (wraps infrastructure errors)

use thiserror::Error;

use crate::application::ApplicationError;
use crate::domain::DomainError;
use crate::infrastructure::InfraError;

/// CLI errors are the top-level error type.
/// These are what get displayed to the user.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Infra(#[from] InfraError),

    #[error("{0}")]
    Usage(String),

    #[error("validation failed: {invalid} of {total} school(s) have errors")]
    ValidationFailed { invalid: usize, total: usize },
}

impl From<ApplicationError> for CliError {
    fn from(e: ApplicationError) -> Self {
        CliError::Infra(InfraError::Application(e))
    }
}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

impl CliError {
    /// Get the appropriate exit code for this error.
    pub fn exit_code(&self) -> i32 {
        use crate::exitcode;
        match self {
            CliError::Usage(_) => exitcode::USAGE,
            CliError::ValidationFailed { .. } => exitcode::DATAERR,
            CliError::Infra(e) => match e {
                InfraError::Io { .. } => exitcode::IOERR,
                InfraError::Json { .. } => exitcode::DATAERR,
                InfraError::Application(app) => match app {
                    ApplicationError::Config { .. } => exitcode::CONFIG,
                    ApplicationError::InvalidInput(_) => exitcode::DATAERR,
                    ApplicationError::OperationFailed { .. } => exitcode::IOERR,
                    ApplicationError::Domain(DomainError::EmptySchool(_)) => exitcode::NOINPUT,
                    ApplicationError::Domain(_) => exitcode::SOFTWARE,
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(CliError::Usage("x".into()), 64)]
    #[case(CliError::ValidationFailed { invalid: 1, total: 2 }, 65)]
    #[case(ApplicationError::Config { message: "x".into() }.into(), 78)]
    #[case(ApplicationError::InvalidInput("x".into()).into(), 65)]
    #[case(InfraError::io("write", std::io::Error::other("x")).into(), 74)]
    fn given_error_when_mapping_then_sysexits_code(#[case] error: CliError, #[case] expected: i32) {
        assert_eq!(error.exit_code(), expected);
    }
}
