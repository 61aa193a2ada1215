use crate::FourCC;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(std::io::Error),

    #[error("cannot decode {} at offset {offset}: {reason}", describe(.box_type))]
    Decode {
        box_type: Option<FourCC>,
        offset: u64,
        reason: String,
    },

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("frame {sample} carries an initialization vector but no content key is configured")]
    MissingKey { sample: u64 },

    #[error("decryption unavailable: {0}")]
    LicenseUnavailable(String),

    #[error("invalid voucher document: {0}")]
    Voucher(#[from] serde_json::Error),

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("frame {sample} rejected by '{stage}': {reason}")]
    InvalidFrame {
        stage: &'static str,
        sample: u64,
        reason: String,
    },

    #[error("stage '{stage}' failed: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: Box<Error>,
    },

    #[error("frame {current} delivered after frame {previous}")]
    OutOfOrder { previous: u64, current: u64 },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("stopped: {0}")]
    Stopped(enough::StopReason),
}

fn describe(box_type: &Option<FourCC>) -> String {
    match box_type {
        Some(x) => format!("'{}' box", x),
        None => "data".to_owned(),
    }
}

impl Error {
    pub fn decode<T: Into<String>>(offset: u64, reason: T) -> Self {
        Self::Decode {
            box_type: None,
            offset,
            reason: reason.into(),
        }
    }

    pub fn unsupported<T: Into<String>>(msg: T) -> Self {
        Self::Unsupported(msg.into())
    }

    pub fn invalid_input<T: Into<String>>(msg: T) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Attaches the innermost box type to a decode error that has none yet.
    pub fn with_box_type(self, box_type: FourCC) -> Self {
        match self {
            Self::Decode {
                box_type: None,
                offset,
                reason,
            } => Self::Decode {
                box_type: Some(box_type),
                offset,
                reason,
            },
            x => x,
        }
    }

    /// Wraps an error raised inside a pipeline stage.
    pub fn in_stage(self, stage: &'static str) -> Self {
        match self {
            x @ (Self::Stage { .. } | Self::Stopped(_)) => x,
            x => Self::Stage {
                stage,
                source: Box::new(x),
            },
        }
    }

    pub fn is_decode_err(&self) -> bool {
        match self {
            Self::Decode { .. } => true,
            Self::Stage { source, .. } => source.is_decode_err(),
            _ => false,
        }
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped(_))
    }

    /// Returns the error that caused a stage failure, or `self`.
    pub fn root(&self) -> &Error {
        match self {
            Self::Stage { source, .. } => source.root(),
            x => x,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<enough::StopReason> for Error {
    fn from(reason: enough::StopReason) -> Self {
        Self::Stopped(reason)
    }
}

impl From<bitreader::BitReaderError> for Error {
    fn from(err: bitreader::BitReaderError) -> Self {
        Self::decode(0, format!("truncated bit field ({})", err))
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(_: std::string::FromUtf8Error) -> Self {
        Self::decode(0, "invalid utf-8 string")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_box_type_keeps_innermost() {
        let err = Error::decode(24, "too short")
            .with_box_type(FourCC::from(*b"senc"))
            .with_box_type(FourCC::from(*b"traf"));
        assert_eq!(
            err.to_string(),
            "cannot decode 'senc' box at offset 24: too short"
        );
    }

    #[test]
    fn test_stage_wrapping() {
        let err = Error::MissingKey { sample: 3 }.in_stage("decrypt");
        assert!(matches!(err.root(), Error::MissingKey { sample: 3 }));
        assert!(err.to_string().starts_with("stage 'decrypt' failed"));

        let stopped = Error::Stopped(enough::StopReason::Cancelled).in_stage("decrypt");
        assert!(stopped.is_stopped());
    }
}
