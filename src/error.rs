use derive_more::derive::{Display, Error};

/// A specialized `Result` where the error is this crate's `Error` type.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Define a unified error type for this crate.
#[derive(Debug, Display, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    // Hardware errors are logged where they are converted; the variants carry no payload so
    // `Error` stays `Copy + Eq` on every build.
    #[cfg(feature = "pico1")]
    #[display("Task spawn failed")]
    TaskSpawn,

    #[cfg(feature = "pico1")]
    #[display("Flash access failed")]
    Flash,

    #[display("Stored credentials are corrupted")]
    StorageCorrupted,

    #[display("WiFi is not connected")]
    WifiUnavailable,

    #[display("WiFi provisioning failed")]
    ProvisioningFailed,

    #[display("HTTP request failed with status {_0}")]
    HttpStatus(#[error(not(source))] u16),

    #[display("HTTP response is malformed")]
    HttpResponseMalformed,

    #[display("HTTP transport error")]
    HttpTransport,

    #[display("Timezone response is not valid JSON")]
    JsonParse,

    #[display("Timezone service reported a failure status")]
    TimezoneStatus,

    #[display("Timezone lease offset {_0} s is out of bounds")]
    LeaseRejected(#[error(not(source))] i32),

    #[display("Timezone lease expired before it was committed")]
    LeaseExpired,

    #[display("Request URL does not fit its buffer")]
    UrlTooLong,

    #[display("Request URL is not an http:// URL")]
    InvalidUrl,

    #[display("Format error")]
    FormatError,
}

impl From<core::fmt::Error> for Error {
    fn from(_: core::fmt::Error) -> Self {
        Self::FormatError
    }
}

impl From<serde_json_core::de::Error> for Error {
    fn from(_: serde_json_core::de::Error) -> Self {
        Self::JsonParse
    }
}

#[cfg(feature = "pico1")]
impl From<embassy_executor::SpawnError> for Error {
    fn from(err: embassy_executor::SpawnError) -> Self {
        error!("task spawn failed: {}", err);
        Self::TaskSpawn
    }
}

#[cfg(feature = "pico1")]
impl From<embassy_rp::flash::Error> for Error {
    fn from(err: embassy_rp::flash::Error) -> Self {
        error!("flash access failed: {}", err);
        Self::Flash
    }
}
