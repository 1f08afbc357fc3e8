//! Scan-path error taxonomy.
//!
//! The acquisition path never panics and never hangs: transaction failures
//! and exhausted EOC waits surface as values for the session layer to
//! report-and-continue or abort-and-reset.

use crate::config::AdcId;

/// Low-level transaction failure while driving the mat hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PortError {
    /// SPI transfer to an ADC failed.
    Spi,
    /// A GPIO read or write failed.
    Gpio,
}

impl core::fmt::Display for PortError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Spi => write!(f, "SPI transfer failed"),
            Self::Gpio => write!(f, "GPIO access failed"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for PortError {}

/// Errors surfaced by a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScanError {
    /// A hardware transaction failed mid-scan.
    Port(PortError),
    /// An ADC never signalled end-of-conversion within the bounded wait —
    /// miswired or dead hardware. The engine parks in
    /// [`crate::engine::ScanState::Fault`], which records the column.
    EocTimeout {
        /// The converter that stalled.
        adc: AdcId,
    },
    /// The row sink refused a completed row (queue backpressure).
    SinkFull,
}

impl From<PortError> for ScanError {
    fn from(err: PortError) -> Self {
        Self::Port(err)
    }
}

impl core::fmt::Display for ScanError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Port(err) => write!(f, "scan aborted: {err}"),
            Self::EocTimeout { adc } => {
                let name = match adc {
                    AdcId::A => "A",
                    AdcId::B => "B",
                };
                write!(f, "ADC {name} never signalled end of conversion")
            }
            Self::SinkFull => write!(f, "row sink rejected a completed row"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ScanError {}

/// A scan that could not finish: what went wrong and where the sweep stood.
///
/// This is what the engine's `Fault` state carries and what the command
/// layer reports to the host before re-arming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScanFault {
    /// Column the sweep was on when the scan died.
    pub column: u8,
    /// The underlying failure.
    pub error: ScanError,
}

impl core::fmt::Display for ScanFault {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "scan fault at column {}: {}", self.column, self.error)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ScanFault {}
