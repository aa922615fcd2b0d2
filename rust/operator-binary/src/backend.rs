//! Errors raised by the collaborators the core talks to (secret store, relation store, unit,
//! workload). The core never inspects these, it only wraps them with context.

use std::{path::PathBuf, process::ExitStatus};

use snafu::Snafu;

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("failed to read {path:?}"))]
    Read {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to write {path:?}"))]
    Write {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to remove {path:?}"))]
    Remove {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to parse {path:?}"))]
    Parse {
        source: serde_yaml::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to serialize {what}"))]
    Serialize {
        source: serde_yaml::Error,
        what: &'static str,
    },

    #[snafu(display("relation {endpoint}:{relation_id} does not exist"))]
    UnknownRelation { endpoint: String, relation_id: u32 },

    #[snafu(display("failed to run restart command {command:?}"))]
    RunRestartCommand {
        source: std::io::Error,
        command: String,
    },

    #[snafu(display("restart command {command:?} exited with {status}"))]
    RestartCommandFailed { command: String, status: ExitStatus },
}
