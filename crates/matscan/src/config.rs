//! Scan configuration.
//!
//! The board exists in two hardware revisions that differ in ADC reference
//! wiring, shift-register clear polarity, and SPI layout. Those differences
//! are collapsed into one configuration struct instead of parallel forks.

use embassy_time::Duration;

/// Which of the two ADCs a value or event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdcId {
    /// First converter — samples land in the first half of a row.
    A,
    /// Second converter — samples land in the second half of a row.
    B,
}

/// ADC voltage reference selection (setup register bits 3:2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReferenceMode {
    /// Internal reference, no wake-up delay (rev 1 boards).
    Internal,
    /// External reference (rev 2 boards).
    External,
}

/// Shift-register clear line polarity. Rev 1 clears on a high pulse, rev 2
/// on a low pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClearPolarity {
    /// Clear is asserted by driving the line high.
    ActiveHigh,
    /// Clear is asserted by driving the line low.
    ActiveLow,
}

/// A full frame must reach the host within this budget.
pub const FRAME_BUDGET_MS: u64 = 250;

/// Per-row share of the frame budget (~4.46 ms for 56 rows).
pub const ROW_BUDGET_US: u64 = FRAME_BUDGET_MS * 1000 / super::COL_HEIGHT as u64;

/// Scan-path configuration, fixed at session start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScanConfig {
    /// ADC reference wiring for this board revision.
    pub reference: ReferenceMode,
    /// Shift-register clear polarity for this board revision.
    pub clear_polarity: ClearPolarity,
    /// Minimum shift-register clock/clear pulse width in microseconds.
    /// Also serves as the settle interval between conversion rounds.
    pub pulse_us: u32,
    /// Bounded busy-wait budget for one EOC wait, in poll iterations.
    /// Exhaustion faults the scan instead of hanging on dead hardware.
    pub eoc_spin_limit: u32,
    /// Bounded wall-clock wait for one EOC event in the event-driven design.
    pub eoc_timeout: Duration,
}

impl ScanConfig {
    /// Rev 2 defaults: external reference, active-low clear, 1 µs pulses,
    /// and an EOC wait bounded at roughly twice the per-row budget.
    pub const fn rev2() -> Self {
        Self {
            reference: ReferenceMode::External,
            clear_polarity: ClearPolarity::ActiveLow,
            pulse_us: 1,
            eoc_spin_limit: 400_000,
            eoc_timeout: Duration::from_micros(2 * ROW_BUDGET_US),
        }
    }

    /// Rev 1 defaults: internal reference, active-high clear.
    pub const fn rev1() -> Self {
        Self {
            reference: ReferenceMode::Internal,
            clear_polarity: ClearPolarity::ActiveHigh,
            pulse_us: 1,
            eoc_spin_limit: 400_000,
            eoc_timeout: Duration::from_micros(2 * ROW_BUDGET_US),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::rev2()
    }
}

#[cfg(test)]
#[allow(clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    #[test]
    fn test_row_budget_fits_frame_budget() {
        assert_eq!(ROW_BUDGET_US, 4464);
        assert!(ROW_BUDGET_US * crate::COL_HEIGHT as u64 <= FRAME_BUDGET_MS * 1000);
    }

    #[test]
    fn test_revisions_differ_only_in_wiring() {
        let rev1 = ScanConfig::rev1();
        let rev2 = ScanConfig::rev2();
        assert_eq!(rev1.reference, ReferenceMode::Internal);
        assert_eq!(rev2.reference, ReferenceMode::External);
        assert_eq!(rev1.clear_polarity, ClearPolarity::ActiveHigh);
        assert_eq!(rev2.clear_polarity, ClearPolarity::ActiveLow);
        assert_eq!(rev1.pulse_us, rev2.pulse_us);
        assert_eq!(rev1.eoc_spin_limit, rev2.eoc_spin_limit);
    }
}
