use strum_macros::Display;
use thiserror::Error;

/// Which registration table an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TableKind {
    #[strum(serialize = "process")]
    Process,
    #[strum(serialize = "protocol")]
    Protocol,
}

/// Raised synchronously by `register`; never deferred to a cycle.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistrationError {
    #[error("Registration name must not be empty ({table})")]
    EmptyName { table: TableKind },
    #[error("Duplicate {table} name: {name}")]
    DuplicateName { table: TableKind, name: String },
    #[error("Invalid registration config: {message}")]
    InvalidConfig { message: String },
}

pub type RegistrationResult<T> = Result<T, RegistrationError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CapabilityError {
    #[error("Capability member not found: {0}")]
    NotFound(String),
    #[error("Capability member is not callable: {0}")]
    NotCallable(String),
    #[error("Invalid argument for {member}: {message}")]
    InvalidArgument { member: String, message: String },
    #[error("Capability call failed: {0}")]
    Failed(String),
}

pub type CapabilityResult<T> = Result<T, CapabilityError>;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("Shared state value for {key} could not be converted: {source}")]
    Serde {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Shared state value for {key} overflowed")]
    Overflow { key: String },
}

/// Failure returned by a unit's `run`. The scheduler contains it and keeps going.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("{0}")]
    Failed(String),
    #[error("Capability error")]
    Capability(#[from] CapabilityError),
    #[error("State error")]
    State(#[from] StateError),
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl ProcessError {
    pub fn failed<S: Into<String>>(message: S) -> Self {
        ProcessError::Failed(message.into())
    }
}

pub type ProcessResult<T> = Result<T, ProcessError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Emergency threshold must be in (0, 1], got {0}")]
    InvalidThreshold(f64),
    #[error("Tick interval must be greater than 0")]
    InvalidTickInterval,
    #[error("Failed to open config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Registration error: {0}")]
    Registration(#[from] RegistrationError),
    #[error("Capability error: {0}")]
    Capability(#[from] CapabilityError),
    #[error("State error: {0}")]
    State(#[from] StateError),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type TickResult<T> = Result<T, Error>;

impl Error {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal(message.into())
    }
}
