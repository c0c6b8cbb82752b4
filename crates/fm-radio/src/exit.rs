//! Process exit codes.
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | clean exit (end of playlist or stopped by a signal) |
//! | 1 | configuration: bad arguments, settings, or an unreachable carrier |
//! | 3 | hardware access or unsupported platform |
//! | 4 | priming timeout or session fault |
//! | 5 | input stream error |

use std::process::ExitCode;

use platform::HardwareError;
use transmitter::{ConfigError, FeedError, ModulationError, TransmitError};

/// Failure class of a run, decided by the first typed error in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Config,
    Hardware,
    Fault,
    Input,
}

impl Outcome {
    /// Classify `err`. Untyped errors count as configuration problems.
    pub fn of(err: &anyhow::Error) -> Self {
        err.chain()
            .find_map(|cause| {
                if let Some(e) = cause.downcast_ref::<TransmitError>() {
                    return Some(Self::of_transmit(e));
                }
                if let Some(e) = cause.downcast_ref::<HardwareError>() {
                    return Some(Self::of_hardware(e));
                }
                if cause.is::<ConfigError>() {
                    return Some(Self::Config);
                }
                if cause.is::<FeedError>() || cause.is::<ModulationError>() {
                    return Some(Self::Input);
                }
                None
            })
            .unwrap_or(Self::Config)
    }

    fn of_transmit(err: &TransmitError) -> Self {
        match err {
            TransmitError::Hardware(e) => Self::of_hardware(e),
            TransmitError::Config(_) => Self::Config,
            TransmitError::Input(_) | TransmitError::Modulation(_) => Self::Input,
            TransmitError::PrimingTimeout(_)
            | TransmitError::UnderrunLimit { .. }
            | TransmitError::Faulted => Self::Fault,
        }
    }

    fn of_hardware(err: &HardwareError) -> Self {
        match err {
            HardwareError::InvalidDmaChannel(_) | HardwareError::PacingOutOfRange { .. } => {
                Self::Config
            }
            _ => Self::Hardware,
        }
    }

    /// Numeric exit status.
    pub fn code(self) -> u8 {
        match self {
            Self::Config => 1,
            Self::Hardware => 3,
            Self::Fault => 4,
            Self::Input => 5,
        }
    }
}

impl From<Outcome> for ExitCode {
    fn from(outcome: Outcome) -> Self {
        ExitCode::from(outcome.code())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io;
    use std::time::Duration;

    use anyhow::Context;

    fn classify<E: std::error::Error + Send + Sync + 'static>(err: E) -> Outcome {
        let wrapped: anyhow::Result<()> = Err(err).context("session");
        Outcome::of(&wrapped.unwrap_err())
    }

    #[test]
    fn test_config_errors_exit_1() {
        assert_eq!(classify(ConfigError::InvalidSampleRate).code(), 1);
        assert_eq!(
            classify(TransmitError::Config(ConfigError::InvalidFrequency(-1.0))).code(),
            1
        );
        assert_eq!(classify(HardwareError::InvalidDmaChannel(16)).code(), 1);
    }

    #[test]
    fn test_hardware_errors_exit_3() {
        let open = HardwareError::Open {
            path: "/dev/mem".into(),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert_eq!(classify(open).code(), 3);
        assert_eq!(
            classify(HardwareError::UnsupportedPlatform("unknown".into())).code(),
            3
        );
        let during_session = TransmitError::Hardware(HardwareError::DmaOutOfBounds { offset: 8, size: 4 });
        assert_eq!(classify(during_session).code(), 3);
    }

    #[test]
    fn test_faults_exit_4() {
        assert_eq!(classify(TransmitError::PrimingTimeout(Duration::from_secs(2))).code(), 4);
        assert_eq!(
            classify(TransmitError::UnderrunLimit {
                count: 9,
                window: Duration::from_secs(5)
            })
            .code(),
            4
        );
        assert_eq!(classify(TransmitError::Faulted).code(), 4);
    }

    #[test]
    fn test_input_errors_exit_5() {
        assert_eq!(classify(FeedError::EmptyPlaylist).code(), 5);
        assert_eq!(
            classify(TransmitError::Modulation(ModulationError::SampleOutOfRange(2.0))).code(),
            5
        );
    }

    #[test]
    fn test_untyped_error_is_configuration() {
        assert_eq!(Outcome::of(&anyhow::anyhow!("bad")), Outcome::Config);
    }
}
