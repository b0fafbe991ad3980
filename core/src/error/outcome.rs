use std::fmt;

/// Value returned by a task; for external tasks this is the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskOutcome {
    /// Continue the pipeline.
    Normal,
    Fail,
    MechanismFail,
    ConfigurationError,
    PipelineAborted,
    /// Authorizers and elevators return this to approve a request.
    Success,
    /// Domain-specific exit code, interpreted by the caller.
    Code(i32),
}

impl TaskOutcome {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Normal,
            1 => Self::Fail,
            2 => Self::MechanismFail,
            3 => Self::ConfigurationError,
            4 => Self::PipelineAborted,
            7 => Self::Success,
            other => Self::Code(other),
        }
    }

    pub fn as_code(self) -> i32 {
        match self {
            Self::Normal => 0,
            Self::Fail => 1,
            Self::MechanismFail => 2,
            Self::ConfigurationError => 3,
            Self::PipelineAborted => 4,
            Self::Success => 7,
            Self::Code(c) => c,
        }
    }

    pub fn is_normal(self) -> bool {
        self == Self::Normal
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => f.write_str("Normal"),
            Self::Fail => f.write_str("Fail"),
            Self::MechanismFail => f.write_str("MechanismFail"),
            Self::ConfigurationError => f.write_str("ConfigurationError"),
            Self::PipelineAborted => f.write_str("PipelineAborted"),
            Self::Success => f.write_str("Success"),
            Self::Code(c) => write!(f, "Code({c})"),
        }
    }
}

/// Result of a robot API call made by a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum RetVal {
    Ok = 0,
    UserNotFound = 1,
    ChannelNotFound = 2,
    AttributeNotFound = 3,
    FailedMessageSend = 4,
    FailedChannelJoin = 5,
    TimeoutExpired = 10,
    Interrupted = 11,
    UseDefaultValue = 12,
    ReplyNotMatched = 13,
    MatcherNotFound = 14,
    RetryPrompt = 15,
    TaskNotFound = 20,
    MissingArguments = 21,
    InvalidParameterName = 22,
    NoConfigFound = 30,
    InvalidConfigType = 31,
    MechanismFail = 40,
}

impl RetVal {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}

impl fmt::Display for RetVal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
