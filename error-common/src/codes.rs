// Standardized error codes for the transcription engine.
// One base code per category plus finer-grained codes for log correlation.

/// Base code for configuration failures.
pub const CONFIGURATION: &str = "CONFIG_1000";
/// Base code for audio device failures.
pub const DEVICE_UNAVAILABLE: &str = "DEVICE_2000";
/// Base code for stream transport failures.
pub const TRANSPORT: &str = "STREAM_3000";
/// Base code for malformed service messages.
pub const PROTOCOL: &str = "PROTO_4000";

pub mod configuration {
    pub const MISSING_CREDENTIALS: &str = "CONFIG_1001";
    pub const INVALID_CREDENTIALS: &str = "CONFIG_1002";
    pub const UNSUPPORTED_COMBINATION: &str = "CONFIG_1003";
}

pub mod device {
    pub const PERMISSION_DENIED: &str = "DEVICE_2001";
    pub const NO_INPUT_DEVICE: &str = "DEVICE_2002";
    pub const CAPTURE_FAILED: &str = "DEVICE_2003";
}

pub mod transport {
    pub const CONNECT_FAILED: &str = "STREAM_3001";
    pub const ABNORMAL_CLOSURE: &str = "STREAM_3002";
    pub const AUTH_REJECTED: &str = "STREAM_3003";
    pub const QUOTA_EXHAUSTED: &str = "STREAM_3004";
}

pub mod protocol {
    pub const MALFORMED_MESSAGE: &str = "PROTO_4001";
}
