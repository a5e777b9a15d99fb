//! Error types for the CLI

use yaks_common::crd::TestPhase;
use yaks_common::kube_utils::api_error_status;

/// CLI Result type
pub type Result<T> = std::result::Result<T, Error>;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Common(#[from] yaks_common::Error),

    /// Missing or invalid run configuration, settings or resource file
    #[error("config error: {message}")]
    Config { message: String },

    /// Create/get/update/list failure against the cluster API
    #[error("{kind} '{name}': {message}")]
    Resource {
        kind: String,
        name: String,
        reason: String,
        message: String,
    },

    #[error("timeout: {message}")]
    Timeout { message: String },

    /// Nonzero exit or I/O failure in a pre/post step
    #[error("{message}")]
    Hook { message: String },

    #[error("{message}")]
    Format { message: String },

    /// The run was cancelled before the work finished
    #[error("interrupted: {message}")]
    Interrupted { message: String },

    #[error("test '{name}' finished with status {phase}")]
    TestFailed { name: String, phase: TestPhase },

    #[error("There are test failures!")]
    TestFailures,
}

/// Reason used when a kube error did not come from the API server
const CLIENT_ERROR_REASON: &str = "ClientError";

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
        }
    }

    pub fn hook(message: impl Into<String>) -> Self {
        Error::Hook {
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Error::Timeout {
            message: message.into(),
        }
    }

    pub fn format(message: impl Into<String>) -> Self {
        Error::Format {
            message: message.into(),
        }
    }

    pub fn interrupted(message: impl Into<String>) -> Self {
        Error::Interrupted {
            message: message.into(),
        }
    }

    /// Build a resource error with an explicit API reason
    pub fn resource(
        kind: impl Into<String>,
        name: impl Into<String>,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Resource {
            kind: kind.into(),
            name: name.into(),
            reason: reason.into(),
            message: message.into(),
        }
    }

    /// Classify a kube error raised while acting on `kind`/`name`
    pub fn from_kube(kind: &str, name: &str, err: kube::Error) -> Self {
        let reason = api_error_status(&err)
            .map(|(reason, _)| reason.to_string())
            .filter(|reason| !reason.is_empty())
            .unwrap_or_else(|| CLIENT_ERROR_REASON.to_string());
        let message = match &err {
            kube::Error::Api(response) => response.message.clone(),
            other => other.to_string(),
        };
        Self::resource(kind, name, reason, message)
    }

    /// Short category used as prefix of suite error lines
    pub fn reason(&self) -> &str {
        match self {
            Error::Resource { reason, .. } => reason,
            Error::Config { .. } | Error::Yaml(_) => "ConfigError",
            Error::Io(_) => "IoError",
            Error::Json(_) => "SerializationError",
            Error::Common(yaks_common::Error::Kube { source }) => api_error_status(source)
                .map(|(reason, _)| reason)
                .unwrap_or(CLIENT_ERROR_REASON),
            Error::Common(_) => "InternalError",
            Error::Timeout { .. } => "Timeout",
            Error::Hook { .. } => "HookError",
            Error::Format { .. } => "FormatError",
            Error::Interrupted { .. } => "Interrupted",
            Error::TestFailed { .. } => "TestFailed",
            Error::TestFailures => "TestFailures",
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.reason() == "NotFound"
    }

    pub fn is_already_exists(&self) -> bool {
        self.reason() == "AlreadyExists"
    }

    pub fn is_conflict(&self) -> bool {
        self.reason() == "Conflict"
    }

    /// One-line suite entry: `"<reason> - <message>"`
    pub fn suite_line(&self) -> String {
        format!("{} - {}", self.reason(), self)
    }
}

/// Maps a test phase to the outcome of the test
pub trait PhaseExt {
    /// `Err(TestFailed)` for `Failed` and `Error`, `Ok` otherwise
    fn as_error(&self, name: &str) -> Result<()>;
}

impl PhaseExt for TestPhase {
    fn as_error(&self, name: &str) -> Result<()> {
        if self.is_failure() {
            return Err(Error::TestFailed {
                name: name.to_string(),
                phase: *self,
            });
        }
        Ok(())
    }
}
