use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success,
    Denied,
    InvalidArgs,
    Failed,
    ExternalCommandFailed,
}

impl ExitCode {
    pub const fn as_i32(self) -> i32 {
        match self {
            ExitCode::Success => 0,
            ExitCode::Denied => 1,
            ExitCode::InvalidArgs => 2,
            ExitCode::Failed => 10,
            ExitCode::ExternalCommandFailed => 20,
        }
    }
}

#[derive(Debug)]
pub struct ExitError {
    pub code: ExitCode,
    pub err: anyhow::Error,
}

impl ExitError {
    pub fn new(code: ExitCode, err: anyhow::Error) -> Self {
        Self { code, err }
    }
}

impl fmt::Display for ExitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.err.fmt(f)
    }
}

impl std::error::Error for ExitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.err.source()
    }
}

pub fn exit_code(err: &anyhow::Error) -> i32 {
    if let Some(exit) = err.downcast_ref::<ExitError>() {
        return exit.code.as_i32();
    }
    ExitCode::Failed.as_i32()
}

/// Denied decisions are not errors; this only carries the exit status.
pub fn denied(reason: impl Into<String>) -> anyhow::Error {
    ExitError::new(ExitCode::Denied, anyhow::anyhow!(reason.into())).into()
}

pub fn is_denied(err: &anyhow::Error) -> bool {
    err.downcast_ref::<ExitError>()
        .is_some_and(|e| e.code == ExitCode::Denied)
}

pub fn invalid_args(message: impl Into<String>) -> anyhow::Error {
    ExitError::new(ExitCode::InvalidArgs, anyhow::anyhow!(message.into())).into()
}

pub fn invalid_args_err(err: anyhow::Error) -> anyhow::Error {
    ExitError::new(ExitCode::InvalidArgs, err).into()
}

pub fn external_cmd_err(err: anyhow::Error) -> anyhow::Error {
    ExitError::new(ExitCode::ExternalCommandFailed, err).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn exit_code_survives_added_context() {
        let err = invalid_args("bad flag");
        assert_eq!(exit_code(&err), 2);

        let err = Err::<(), _>(external_cmd_err(anyhow::anyhow!("bind")))
            .context("serve")
            .expect_err("err");
        assert_eq!(exit_code(&err), 20);

        assert_eq!(exit_code(&anyhow::anyhow!("plain")), 10);
        assert!(is_denied(&denied("image a has vulnerabilities")));
    }
}
