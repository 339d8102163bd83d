use std::error::Error;
use std::fmt::{Display, Formatter};

pub type PspmtResult<T> = Result<T, PspmtError>;
pub type FitResult<T> = PspmtResult<T>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PspmtErrorCategory {
    InsufficientSamples,
    OutOfDomain,
    FitDidNotConverge,
    InvalidChannel,
    CalibrationMapUnavailable,
    InputValidation,
    IoSystem,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Warning,
    Error,
}

impl PspmtErrorCategory {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InsufficientSamples => "InsufficientSamples",
            Self::OutOfDomain => "OutOfDomain",
            Self::FitDidNotConverge => "FitDidNotConverge",
            Self::InvalidChannel => "InvalidChannel",
            Self::CalibrationMapUnavailable => "CalibrationMapUnavailable",
            Self::InputValidation => "InputValidation",
            Self::IoSystem => "IoSystem",
            Self::Internal => "Internal",
        }
    }

    pub const fn severity(self) -> Severity {
        match self {
            Self::CalibrationMapUnavailable => Severity::Warning,
            _ => Severity::Error,
        }
    }

    pub const fn exit_code(self) -> i32 {
        match self {
            Self::InputValidation | Self::InvalidChannel => 2,
            Self::IoSystem | Self::CalibrationMapUnavailable => 3,
            Self::InsufficientSamples | Self::OutOfDomain | Self::FitDidNotConverge => 4,
            Self::Internal => 5,
        }
    }

    /// Per-(event, channel) conditions: the caller drops that contribution and
    /// keeps going.
    pub const fn is_recoverable(self) -> bool {
        matches!(
            self,
            Self::InsufficientSamples
                | Self::OutOfDomain
                | Self::FitDidNotConverge
                | Self::InvalidChannel
                | Self::CalibrationMapUnavailable
        )
    }
}

impl Display for PspmtErrorCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PspmtError {
    category: PspmtErrorCategory,
    placeholder: &'static str,
    message: String,
}

impl PspmtError {
    pub fn new(
        category: PspmtErrorCategory,
        placeholder: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            placeholder,
            message: message.into(),
        }
    }

    pub fn insufficient_samples(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(PspmtErrorCategory::InsufficientSamples, placeholder, message)
    }

    pub fn out_of_domain(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(PspmtErrorCategory::OutOfDomain, placeholder, message)
    }

    pub fn fit_did_not_converge(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(PspmtErrorCategory::FitDidNotConverge, placeholder, message)
    }

    pub fn invalid_channel(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(PspmtErrorCategory::InvalidChannel, placeholder, message)
    }

    pub fn calibration_map_unavailable(
        placeholder: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::new(
            PspmtErrorCategory::CalibrationMapUnavailable,
            placeholder,
            message,
        )
    }

    pub fn input_validation(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(PspmtErrorCategory::InputValidation, placeholder, message)
    }

    pub fn io_system(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(PspmtErrorCategory::IoSystem, placeholder, message)
    }

    pub fn internal(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(PspmtErrorCategory::Internal, placeholder, message)
    }

    pub const fn category(&self) -> PspmtErrorCategory {
        self.category
    }

    pub const fn placeholder(&self) -> &'static str {
        self.placeholder
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn exit_code(&self) -> i32 {
        self.category.exit_code()
    }

    pub const fn severity(&self) -> Severity {
        self.category.severity()
    }

    pub fn diagnostic_line(&self) -> String {
        let severity = match self.severity() {
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        };
        format!("{}: [{}] {}", severity, self.placeholder, self.message)
    }
}

impl Display for PspmtError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.category.as_str(),
            self.placeholder,
            self.message
        )
    }
}

impl Error for PspmtError {}

#[cfg(test)]
mod tests {
    use super::{PspmtError, PspmtErrorCategory, Severity};

    #[test]
    fn exit_mapping_is_stable() {
        let cases = [
            (PspmtErrorCategory::InputValidation, 2, Severity::Error),
            (PspmtErrorCategory::InvalidChannel, 2, Severity::Error),
            (PspmtErrorCategory::IoSystem, 3, Severity::Error),
            (
                PspmtErrorCategory::CalibrationMapUnavailable,
                3,
                Severity::Warning,
            ),
            (PspmtErrorCategory::FitDidNotConverge, 4, Severity::Error),
            (PspmtErrorCategory::OutOfDomain, 4, Severity::Error),
            (PspmtErrorCategory::Internal, 5, Severity::Error),
        ];

        for (category, exit_code, severity) in cases {
            assert_eq!(category.exit_code(), exit_code);
            assert_eq!(category.severity(), severity);
        }
    }

    #[test]
    fn per_event_conditions_are_recoverable() {
        assert!(PspmtErrorCategory::FitDidNotConverge.is_recoverable());
        assert!(PspmtErrorCategory::OutOfDomain.is_recoverable());
        assert!(PspmtErrorCategory::CalibrationMapUnavailable.is_recoverable());
        assert!(!PspmtErrorCategory::IoSystem.is_recoverable());
        assert!(!PspmtErrorCategory::Internal.is_recoverable());
    }

    #[test]
    fn diagnostic_line_reflects_severity() {
        let error = PspmtError::out_of_domain(
            "MODEL.RISE_POWER_DOMAIN",
            "position 0.45 outside [0.1, 0.4]",
        );
        assert_eq!(
            error.diagnostic_line(),
            "ERROR: [MODEL.RISE_POWER_DOMAIN] position 0.45 outside [0.1, 0.4]"
        );

        let warning =
            PspmtError::calibration_map_unavailable("IO.CALIBRATION_MAP", "map file missing");
        assert_eq!(
            warning.diagnostic_line(),
            "WARNING: [IO.CALIBRATION_MAP] map file missing"
        );
        assert_eq!(
            warning.to_string(),
            "CalibrationMapUnavailable [IO.CALIBRATION_MAP] map file missing"
        );
    }
}
