use std::error::Error;
use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub enum DisplayError {
    /// Rejected synchronously; prior state is left untouched.
    InvalidArgument(String),
    Decode { source_id: String, reason: String },
    Build { reason: String },
    Hardware(String),
    Storage(String),
    Config(String),
}

impl DisplayError {
    pub fn decode(source_id: &str, reason: impl Into<String>) -> Self {
        Self::Decode {
            source_id: source_id.to_string(),
            reason: reason.into(),
        }
    }

    pub fn build(reason: impl Into<String>) -> Self {
        Self::Build {
            reason: reason.into(),
        }
    }

    /// Whether playback can carry on with the previous valid frames.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Hardware(_))
    }
}

impl fmt::Display for DisplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(message) => {
                write!(f, "invalid argument: {}", message)
            }
            Self::Decode { source_id, reason } => {
                write!(f, "failed to decode '{}': {}", source_id, reason)
            }
            Self::Build { reason } => {
                write!(f, "failed to build frames: {}", reason)
            }
            Self::Hardware(message) => write!(f, "hardware error: {}", message),
            Self::Storage(message) => write!(f, "storage error: {}", message),
            Self::Config(message) => write!(f, "config error: {}", message),
        }
    }
}

impl Error for DisplayError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_hardware_errors_are_fatal_for_playback() {
        assert!(DisplayError::decode("a.gif", "missing").is_recoverable());
        assert!(DisplayError::build("decode failure").is_recoverable());
        assert!(!DisplayError::Hardware("gone".into()).is_recoverable());
    }

    #[test]
    fn decode_error_names_the_source() {
        let err = DisplayError::decode("missing.gif", "not found");
        assert_eq!(
            err.to_string(),
            "failed to decode 'missing.gif': not found"
        );
    }
}
