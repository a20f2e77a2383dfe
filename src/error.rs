use thiserror::Error;

/// Result type for receiver operations
pub type Result<T> = std::result::Result<T, AvrError>;

/// Errors that can occur when composing or controlling a receiver
#[derive(Error, Debug)]
pub enum AvrError {
    /// The capability descriptor is missing required sections or zone ids
    #[error("Malformed capability descriptor: {0}")]
    MalformedDescriptor(String),

    /// No composed definition exists for the zone
    #[error("Unknown zone: {0}")]
    UnknownZone(String),

    /// The zone does not expose the command
    #[error("Command {command} is not supported by zone {zone}")]
    UnsupportedCommand {
        /// Zone the command was addressed to
        zone: String,
        /// Host command name
        command: String,
    },

    /// A numeric argument falls outside the declared range
    #[error("Value {value} for {command} on zone {zone} is outside [{min}, {max}]")]
    OutOfRange {
        /// Zone the command was addressed to
        zone: String,
        /// Host command name
        command: String,
        /// Rejected argument
        value: f64,
        /// Lower bound of the declared range
        min: f64,
        /// Upper bound of the declared range
        max: f64,
    },

    /// An enumerated argument is not one of the zone's declared choices
    #[error("{choice:?} is not a valid choice for {command} on zone {zone}")]
    InvalidChoice {
        /// Zone the command was addressed to
        zone: String,
        /// Host command name
        command: String,
        /// Rejected token
        choice: String,
    },

    /// A host command arrived without a required parameter
    #[error("Command {command} requires parameter {parameter}")]
    MissingParameter { command: String, parameter: String },

    /// A host command parameter has the wrong shape
    #[error("Invalid parameter {parameter} for {command}: {detail}")]
    InvalidParameter {
        command: String,
        parameter: String,
        detail: String,
    },

    /// Entity id does not belong to this receiver
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    /// Receiver configuration is invalid
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The transport side of the request channel was dropped
    #[error("Connection closed")]
    ConnectionClosed,
}

impl AvrError {
    /// Whether this error rejects a single command while leaving the session usable
    pub fn is_command_rejection(&self) -> bool {
        matches!(
            self,
            AvrError::UnknownZone(_)
                | AvrError::UnsupportedCommand { .. }
                | AvrError::OutOfRange { .. }
                | AvrError::InvalidChoice { .. }
                | AvrError::MissingParameter { .. }
                | AvrError::InvalidParameter { .. }
                | AvrError::UnknownEntity(_)
        )
    }
}
