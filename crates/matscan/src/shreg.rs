//! Column-select shift register chain.
//!
//! The mat's columns are energised one at a time by a serial-in shift
//! register chain: seed a single 1, then clock in zeros so the selected
//! column sweeps left to right. At most one column output may ever be high —
//! two energised columns would short neighbouring sensor lines and corrupt
//! every reading on them.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

use crate::config::ClearPolarity;
use crate::error::PortError;

/// Column selection as the scan engine sees it.
///
/// The hardware implementation is [`ShiftRegister`]; the mock rig provides a
/// chain model for host tests.
pub trait ColumnSelect {
    /// Reset every column output to 0. Idempotent; safe before any scan.
    fn clear(&mut self) -> Result<(), PortError>;

    /// Shift `bit` into the chain and pulse the clock once.
    fn advance(&mut self, bit: bool) -> Result<(), PortError>;

    /// Select the first column: shift the single selector 1 into the chain.
    fn seed(&mut self) -> Result<(), PortError> {
        self.advance(true)
    }

    /// Move the selector one column to the right.
    fn advance_column(&mut self) -> Result<(), PortError> {
        self.advance(false)
    }
}

/// Driver for the physical chain: clock, clear and serial-in lines.
///
/// Every clock and clear pulse is held for a minimum width so the register's
/// setup/hold timing is met regardless of how fast the MCU toggles GPIO.
pub struct ShiftRegister<Clk, Clr, Si, D> {
    clock: Clk,
    clear: Clr,
    serial_in: Si,
    delay: D,
    clear_polarity: ClearPolarity,
    pulse_us: u32,
}

impl<Clk, Clr, Si, D> ShiftRegister<Clk, Clr, Si, D>
where
    Clk: OutputPin,
    Clr: OutputPin,
    Si: OutputPin,
    D: DelayNs,
{
    /// Bind the chain's control lines.
    ///
    /// Drives clock low and clear to its idle (deasserted) level so the
    /// chain starts in a known state.
    pub fn new(
        mut clock: Clk,
        mut clear: Clr,
        serial_in: Si,
        delay: D,
        clear_polarity: ClearPolarity,
        pulse_us: u32,
    ) -> Result<Self, PortError> {
        clock.set_low().map_err(|_| PortError::Gpio)?;
        let idle = match clear_polarity {
            ClearPolarity::ActiveHigh => clear.set_low(),
            ClearPolarity::ActiveLow => clear.set_high(),
        };
        idle.map_err(|_| PortError::Gpio)?;
        Ok(Self {
            clock,
            clear,
            serial_in,
            delay,
            clear_polarity,
            pulse_us,
        })
    }

    fn pulse_clock(&mut self) -> Result<(), PortError> {
        self.clock.set_high().map_err(|_| PortError::Gpio)?;
        self.delay.delay_us(self.pulse_us);
        self.clock.set_low().map_err(|_| PortError::Gpio)?;
        // The clock-low hold doubles as the settle interval before the
        // engine's next conversion round.
        self.delay.delay_us(self.pulse_us);
        Ok(())
    }
}

impl<Clk, Clr, Si, D> ColumnSelect for ShiftRegister<Clk, Clr, Si, D>
where
    Clk: OutputPin,
    Clr: OutputPin,
    Si: OutputPin,
    D: DelayNs,
{
    fn clear(&mut self) -> Result<(), PortError> {
        match self.clear_polarity {
            ClearPolarity::ActiveHigh => {
                self.clear.set_high().map_err(|_| PortError::Gpio)?;
                self.delay.delay_us(self.pulse_us);
                self.clear.set_low().map_err(|_| PortError::Gpio)?;
            }
            ClearPolarity::ActiveLow => {
                self.clear.set_low().map_err(|_| PortError::Gpio)?;
                self.delay.delay_us(self.pulse_us);
                self.clear.set_high().map_err(|_| PortError::Gpio)?;
            }
        }
        Ok(())
    }

    fn advance(&mut self, bit: bool) -> Result<(), PortError> {
        let set = if bit {
            self.serial_in.set_high()
        } else {
            self.serial_in.set_low()
        };
        set.map_err(|_| PortError::Gpio)?;
        self.pulse_clock()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;
    use crate::frame::COL_HEIGHT;
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::vec::Vec;

    /// Pin-level model of the register chain: tracks the control lines and
    /// shifts its bits on every rising clock edge, flagging any instant at
    /// which more than one column output is high.
    #[derive(Default)]
    struct Chain {
        clock: bool,
        serial_in: bool,
        bits: Vec<bool>,
        multi_hot_seen: bool,
        selections: Vec<Option<usize>>,
    }

    impl Chain {
        fn new() -> Rc<RefCell<Self>> {
            Rc::new(RefCell::new(Self {
                bits: vec![false; COL_HEIGHT],
                ..Self::default()
            }))
        }

        fn on_clock_rise(&mut self) {
            self.bits.insert(0, self.serial_in);
            self.bits.truncate(COL_HEIGHT);
            if self.bits.iter().filter(|&&b| b).count() > 1 {
                self.multi_hot_seen = true;
            }
            let selected = self.bits.iter().position(|&b| b);
            self.selections.push(selected);
        }

        fn clear_all(&mut self) {
            self.bits.iter_mut().for_each(|b| *b = false);
        }
    }

    #[derive(Clone, Copy)]
    enum Role {
        Clock,
        Clear { polarity: ClearPolarity },
        SerialIn,
    }

    struct ChainPin {
        role: Role,
        chain: Rc<RefCell<Chain>>,
    }

    impl embedded_hal::digital::ErrorType for ChainPin {
        type Error = core::convert::Infallible;
    }

    impl OutputPin for ChainPin {
        fn set_high(&mut self) -> Result<(), Self::Error> {
            let mut chain = self.chain.borrow_mut();
            match self.role {
                Role::Clock => {
                    if !chain.clock {
                        chain.clock = true;
                        chain.on_clock_rise();
                    }
                }
                Role::Clear { polarity } => {
                    if matches!(polarity, ClearPolarity::ActiveHigh) {
                        chain.clear_all();
                    }
                }
                Role::SerialIn => chain.serial_in = true,
            }
            Ok(())
        }

        fn set_low(&mut self) -> Result<(), Self::Error> {
            let mut chain = self.chain.borrow_mut();
            match self.role {
                Role::Clock => chain.clock = false,
                Role::Clear { polarity } => {
                    if matches!(polarity, ClearPolarity::ActiveLow) {
                        chain.clear_all();
                    }
                }
                Role::SerialIn => chain.serial_in = false,
            }
            Ok(())
        }
    }

    fn rig(polarity: ClearPolarity) -> (ShiftRegister<ChainPin, ChainPin, ChainPin, NoopDelay>, Rc<RefCell<Chain>>) {
        let chain = Chain::new();
        let pin = |role| ChainPin {
            role,
            chain: Rc::clone(&chain),
        };
        let shreg = ShiftRegister::new(
            pin(Role::Clock),
            pin(Role::Clear { polarity }),
            pin(Role::SerialIn),
            NoopDelay::new(),
            polarity,
            1,
        )
        .unwrap();
        (shreg, chain)
    }

    #[test]
    fn test_selector_sweeps_one_hot_across_all_columns() {
        let (mut shreg, chain) = rig(ClearPolarity::ActiveLow);
        shreg.clear().unwrap();
        shreg.seed().unwrap();
        for _ in 1..COL_HEIGHT {
            shreg.advance_column().unwrap();
        }

        let chain = chain.borrow();
        assert!(!chain.multi_hot_seen, "two columns were selected at once");
        // One selection observed per advance, sweeping 0..COL_HEIGHT.
        let expected: Vec<Option<usize>> = (0..COL_HEIGHT).map(Some).collect();
        assert_eq!(chain.selections, expected);
    }

    #[test]
    fn test_one_more_advance_wraps_selector_off_the_end() {
        let (mut shreg, chain) = rig(ClearPolarity::ActiveLow);
        shreg.clear().unwrap();
        shreg.seed().unwrap();
        for _ in 1..COL_HEIGHT {
            shreg.advance_column().unwrap();
        }
        shreg.advance_column().unwrap();
        assert_eq!(chain.borrow().selections.last(), Some(&None));
    }

    #[test]
    fn test_clear_is_idempotent_and_deselects() {
        let (mut shreg, chain) = rig(ClearPolarity::ActiveLow);
        shreg.seed().unwrap();
        assert_eq!(chain.borrow().bits.iter().filter(|&&b| b).count(), 1);
        shreg.clear().unwrap();
        shreg.clear().unwrap();
        assert!(chain.borrow().bits.iter().all(|&b| !b));
    }

    #[test]
    fn test_active_high_clear_polarity() {
        let (mut shreg, chain) = rig(ClearPolarity::ActiveHigh);
        shreg.seed().unwrap();
        shreg.clear().unwrap();
        assert!(chain.borrow().bits.iter().all(|&b| !b));
    }
}
