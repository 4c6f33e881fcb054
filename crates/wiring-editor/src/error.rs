use wiring::FormatError;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Port names must not include \".\"")]
    PortContainsDot { port: String },
}

/// Port names become the part after the first `.` of a reference, so
/// they cannot contain one themselves.
pub fn validate_port_name(port: &str) -> Result<(), ValidationError> {
    if port.contains('.') {
        return Err(ValidationError::PortContainsDot {
            port: port.to_string(),
        });
    }
    Ok(())
}

/// Inline message shown next to the wiring editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WiringIssue {
    Format(FormatError),
    Validation(ValidationError),
}

impl WiringIssue {
    pub fn banner(&self) -> String {
        match self {
            WiringIssue::Format(e) => format!("Invalid wiring JSON: {e}"),
            WiringIssue::Validation(e) => e.to_string(),
        }
    }
}

impl From<FormatError> for WiringIssue {
    fn from(e: FormatError) -> Self {
        WiringIssue::Format(e)
    }
}

impl From<ValidationError> for WiringIssue {
    fn from(e: ValidationError) -> Self {
        WiringIssue::Validation(e)
    }
}
