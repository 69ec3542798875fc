//! Device-reported error codes (`E01`, `E10`, ...)

/// Description returned for codes the table does not know
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// Error codes a switcher may report in place of a normal reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DeviceErrorCode {
    InvalidInput,
    InvalidCommand,
    InvalidPreset,
    InvalidOutput,
    InvalidValue,
    InvalidForConfiguration,
    Timeout,
    Busy,
    PrivilegesViolation,
    DeviceNotPresent,
    TooManyConnections,
    InvalidEvent,
    FileNotFound,
    BadFileType,
}

impl DeviceErrorCode {
    /// Every documented code
    pub const ALL: [DeviceErrorCode; 14] = [
        DeviceErrorCode::InvalidInput,
        DeviceErrorCode::InvalidCommand,
        DeviceErrorCode::InvalidPreset,
        DeviceErrorCode::InvalidOutput,
        DeviceErrorCode::InvalidValue,
        DeviceErrorCode::InvalidForConfiguration,
        DeviceErrorCode::Timeout,
        DeviceErrorCode::Busy,
        DeviceErrorCode::PrivilegesViolation,
        DeviceErrorCode::DeviceNotPresent,
        DeviceErrorCode::TooManyConnections,
        DeviceErrorCode::InvalidEvent,
        DeviceErrorCode::FileNotFound,
        DeviceErrorCode::BadFileType,
    ];

    /// Look up a numeric code
    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.code() == code)
    }

    /// Numeric value as it appears on the wire
    pub fn code(&self) -> u16 {
        match self {
            DeviceErrorCode::InvalidInput => 1,
            DeviceErrorCode::InvalidCommand => 10,
            DeviceErrorCode::InvalidPreset => 11,
            DeviceErrorCode::InvalidOutput => 12,
            DeviceErrorCode::InvalidValue => 13,
            DeviceErrorCode::InvalidForConfiguration => 14,
            DeviceErrorCode::Timeout => 17,
            DeviceErrorCode::Busy => 22,
            DeviceErrorCode::PrivilegesViolation => 24,
            DeviceErrorCode::DeviceNotPresent => 25,
            DeviceErrorCode::TooManyConnections => 26,
            DeviceErrorCode::InvalidEvent => 27,
            DeviceErrorCode::FileNotFound => 28,
            DeviceErrorCode::BadFileType => 33,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            DeviceErrorCode::InvalidInput => "Invalid input number",
            DeviceErrorCode::InvalidCommand => "Invalid command",
            DeviceErrorCode::InvalidPreset => "Invalid preset number",
            DeviceErrorCode::InvalidOutput => "Invalid output number",
            DeviceErrorCode::InvalidValue => "Invalid value",
            DeviceErrorCode::InvalidForConfiguration => "Invalid command for this configuration",
            DeviceErrorCode::Timeout => "Timeout",
            DeviceErrorCode::Busy => "Busy",
            DeviceErrorCode::PrivilegesViolation => "Privileges violation",
            DeviceErrorCode::DeviceNotPresent => "Device not present",
            DeviceErrorCode::TooManyConnections => "Maximum number of connections exceeded",
            DeviceErrorCode::InvalidEvent => "Invalid event number",
            DeviceErrorCode::FileNotFound => "Bad filename or file not found",
            DeviceErrorCode::BadFileType => "Bad file type or size",
        }
    }
}

/// Human-readable description for a numeric device error code
pub fn describe(code: u16) -> &'static str {
    DeviceErrorCode::from_code(code)
        .map(|e| e.description())
        .unwrap_or(UNKNOWN_ERROR)
}

/// Format a code the way it is logged, e.g. `E12: Invalid output number`
pub fn format_error(code: u16) -> String {
    format!("E{:02}: {}", code, describe(code))
}
