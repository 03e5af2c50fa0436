//! Drive-side interface of the IWM.
//!
//! The controller addresses up to two drive units. Four lines (CA0-CA2
//! and SEL) select one of a drive's internal registers, LSTRB strobes a
//! command write to the selected register, and a single RD/SENSE line
//! carries the selected register's level back to the controller. Timing
//! flows the other way: the controller ticks the active drive on its own
//! clock and the drive reports flux transitions and index wraps as they
//! pass under the head.

use bitflags::bitflags;

bitflags! {
    /// Control lines the IWM presents to the selected drive.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ControlLines: u8 {
        /// Drive register address, bit 0.
        const CA0 = 1 << 0;
        /// Drive register address, bit 1.
        const CA1 = 1 << 1;
        /// Drive register address, bit 2.
        const CA2 = 1 << 2;
        /// Drive register address, bit 3 (head select on two-headed units).
        const SEL = 1 << 3;
        /// Register write strobe; commands execute on the rising edge.
        const LSTRB = 1 << 4;
    }
}

impl ControlLines {
    /// The drive register these lines currently address, as a 4-bit
    /// value ordered CA2, CA1, CA0, SEL (most to least significant).
    #[must_use]
    pub fn register_select(self) -> u8 {
        (u8::from(self.contains(Self::CA2)) << 3)
            | (u8::from(self.contains(Self::CA1)) << 2)
            | (u8::from(self.contains(Self::CA0)) << 1)
            | u8::from(self.contains(Self::SEL))
    }
}

/// Event a spinning drive reports to the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriveEvent {
    /// A magnetic polarity change passed under the head (a "1" cell).
    FluxTransition,
    /// The head crossed the track's index position.
    IndexHole,
}

/// Capability set of a drive unit attached to the IWM.
///
/// The controller holds drives behind this trait and never assumes a
/// concrete mechanism; single- and double-sided units plug in alike.
pub trait IwmDrive {
    /// Assert or release the drive's enable line.
    fn set_enabled(&mut self, enabled: bool);

    /// Latch the control-line state. The drive decodes register selects
    /// and LSTRB edges from successive calls.
    fn set_control_lines(&mut self, lines: ControlLines);

    /// Level of the RD/SENSE output for the currently addressed register.
    fn sense(&self) -> bool;

    /// Advance the mechanism by one controller clock cycle, reporting
    /// at most one event per cycle.
    fn tick(&mut self) -> Option<DriveEvent>;
}
