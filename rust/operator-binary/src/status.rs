//! Unit status reported at the end of every reconciliation.

use std::fmt;

use strum::IntoStaticStr;

#[derive(Clone, Debug, Eq, IntoStaticStr, PartialEq)]
#[strum(serialize_all = "lowercase")]
pub enum Status {
    Active,
    Maintenance(String),
    Waiting(String),
    Blocked(String),
}

impl Status {
    pub fn maintenance(message: impl Into<String>) -> Self {
        Self::Maintenance(message.into())
    }

    pub fn waiting(message: impl Into<String>) -> Self {
        Self::Waiting(message.into())
    }

    pub fn blocked(message: impl Into<String>) -> Self {
        Self::Blocked(message.into())
    }

    /// The status name, e.g. `waiting`.
    pub fn name(&self) -> &'static str {
        self.into()
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Active => "",
            Self::Maintenance(message) | Self::Waiting(message) | Self::Blocked(message) => {
                message
            }
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message() {
            "" => f.write_str(self.name()),
            message => write!(f, "{}: {message}", self.name()),
        }
    }
}

/// How a failed reconciliation is reported.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Severity {
    /// Transient, the next triggering event is expected to succeed.
    Waiting,
    /// The operator of the deployment has to fix the input.
    Blocked,
    /// Unexpected failure, propagated to the caller.
    Fatal,
}

impl Severity {
    /// The status to report for an error of this severity, `None` for [`Severity::Fatal`].
    pub fn status(self, message: impl Into<String>) -> Option<Status> {
        match self {
            Self::Waiting => Some(Status::waiting(message)),
            Self::Blocked => Some(Status::blocked(message)),
            Self::Fatal => None,
        }
    }
}
