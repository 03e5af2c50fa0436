//! Apple IWM (Integrated Woz Machine) floppy disk controller.
//!
//! The IWM sits between the CPU bus and up to two disk drives. Its bus
//! interface is eight soft switches toggled by address pairs: accessing
//! the even address of a pair clears the switch, the odd address sets
//! it, regardless of whether the access is a read or a write. Three
//! switches (Q6, Q7, ENABLE) pick which internal register a read or
//! write reaches; the others drive motor enable, drive select, and the
//! control lines of the selected drive. Incoming data self-clocks: a
//! flux transition from the drive shifts in a one, and a bit cell that
//! expires without one shifts in a zero.
//!
//! # Switches ($0-$F, one per address pair)
//!
//! | Addresses | Switch   | Function                                  |
//! |-----------|----------|-------------------------------------------|
//! | $0/$1     | CA0      | Drive register address bit 0              |
//! | $2/$3     | CA1      | Drive register address bit 1              |
//! | $4/$5     | CA2      | Drive register address bit 2              |
//! | $6/$7     | LSTRB    | Drive register write strobe               |
//! | $8/$9     | ENABLE   | Motor enable for the selected drive       |
//! | $A/$B     | DRIVESEL | Drive select (0 = lower, 1 = upper slot)  |
//! | $C/$D     | Q6       | Register select                           |
//! | $E/$F     | Q7       | Register select                           |
//!
//! The SEL line is a ninth input without an address pair; the host
//! machine drives it directly (on the Macintosh, from a VIA port bit)
//! through [`Iwm::set_select`].
//!
//! # Register decode (Q7, Q6)
//!
//! | Q7 | Q6 | Read                | Write                                |
//! |----|----|---------------------|--------------------------------------|
//! | 0  | 0  | Data register       | (none)                               |
//! | 0  | 1  | Status register     | (none)                               |
//! | 1  | 0  | Write handshake     | (none)                               |
//! | 1  | 1  | Invalid (all ones)  | Mode (ENABLE off) / data (ENABLE on) |
//!
//! # Mode register
//!
//! | Bit | Meaning                                          |
//! |-----|--------------------------------------------------|
//! | 0   | 1 = latch mode                                   |
//! | 1   | 0 = synchronous handshake, 1 = asynchronous      |
//! | 2   | 0 = 1-second motor-off timer enabled, 1 = off    |
//! | 3   | 0 = slow mode, 1 = fast mode                     |
//! | 4   | 0 = 7 MHz clock descriptor, 1 = 8 MHz            |
//! | 5   | 1 = test mode                                    |
//! | 6   | 1 = MZ-reset                                     |
//! | 7   | reserved                                         |
//!
//! Bits 3-4 select the bit cell length used by the read logic:
//! 24 cycles (slow/7 MHz), 12 (fast/7 MHz), 32 (slow/8 MHz) or
//! 16 (fast/8 MHz).

mod bus;

pub use bus::{ControlLines, DriveEvent, IwmDrive};

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use bitflags::bitflags;
use log::{debug, trace, warn};

bitflags! {
    /// Soft-switch state. Each address-paired switch holds the last
    /// level written to its pair; SEL is a pin, latched by
    /// [`Iwm::set_select`].
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Switches: u16 {
        /// Drive register address bit 0.
        const CA0 = 1 << 0;
        /// Drive register address bit 1.
        const CA1 = 1 << 1;
        /// Drive register address bit 2.
        const CA2 = 1 << 2;
        /// Drive register write strobe.
        const LSTRB = 1 << 3;
        /// Motor enable for the selected drive.
        const ENABLE = 1 << 4;
        /// Selects which of the two drive slots is active.
        const DRIVESEL = 1 << 5;
        /// Register select, low bit.
        const Q6 = 1 << 6;
        /// Register select, high bit.
        const Q7 = 1 << 7;
        /// Head/register select input; no address pair on any variant.
        const SEL = 1 << 8;
    }
}

/// Apple IWM floppy disk controller.
pub struct Iwm {
    /// Input clock in Hz (7,833,600 on the Macintosh).
    clock_hz: u64,
    /// Latched soft-switch state.
    switches: Switches,
    /// Mode register; its low five bits read back through status.
    mode: u8,
    /// Bit cell length in clock cycles, from mode bits 3-4.
    bit_length: u64,
    /// Cycles since a bit last shifted in. Reaching `bit_length + 2`
    /// without a flux transition shifts a zero.
    cycles_since_shift: u64,
    /// Recovered bits accumulate here, MSB first.
    shift_register: u8,
    /// Last completed byte; top bit set marks it not yet consumed.
    data_register: u8,
    /// Slot currently wired to the control and enable lines.
    active_drive: usize,
    /// Attached drives. Weak references: the machine owns the drives.
    drives: [Option<Weak<RefCell<dyn IwmDrive>>>; 2],
}

impl Iwm {
    /// Create an IWM running from a `clock_hz` input clock.
    #[must_use]
    pub fn new(clock_hz: u64) -> Self {
        Self {
            clock_hz,
            switches: Switches::empty(),
            mode: 0,
            bit_length: 24, // mode bits 3-4 are 00 at power-on
            cycles_since_shift: 0,
            shift_register: 0,
            data_register: 0,
            active_drive: 0,
            drives: [None, None],
        }
    }

    /// Read one of the sixteen bus addresses.
    ///
    /// The access itself toggles the addressed switch before the read
    /// value is decoded, so a read is never side-effect free.
    pub fn read(&mut self, address: u8) -> u8 {
        self.access(address);

        // Odd addresses don't gate a register onto the bus.
        if address & 1 != 0 {
            return 0xFF;
        }

        let select = self.switches & (Switches::Q6 | Switches::Q7 | Switches::ENABLE);
        if select.is_empty() || select == Switches::ENABLE {
            // Data register; a byte with the top bit set is consumed
            // by the read and the register clears behind it.
            let result = self.data_register;
            if self.data_register & 0x80 != 0 {
                self.data_register = 0;
            }
            result
        } else if select.contains(Switches::Q6) && !select.contains(Switches::Q7) {
            // Status register:
            //   bits 0-4: low five mode bits
            //   bit 5: motor enable switch
            //   bit 6: reserved, reads 0
            //   bit 7: RD/SENSE from the selected drive register
            let sense = match self.selected_drive() {
                Some(drive) => u8::from(drive.borrow().sense()),
                None => 1, // the line floats high with nothing attached
            };
            let enable_bit = if self.switches.contains(Switches::ENABLE) {
                0x20
            } else {
                0x00
            };
            (self.mode & 0x1F) | enable_bit | (sense << 7)
        } else if select.contains(Switches::Q7) && !select.contains(Switches::Q6) {
            // Write handshake: bits 0-5 reserved (read as 1), bit 6 =
            // no underrun, bit 7 = data buffer ready.
            trace!("write handshake read");
            0x1F | 0x40 | 0x80
        } else {
            warn!("read with Q6 and Q7 both set, returning open bus");
            0xFF
        }
    }

    /// Write one of the sixteen bus addresses.
    ///
    /// Like [`Iwm::read`], the access toggles the addressed switch
    /// first; the value only lands somewhere under Q6 | Q7.
    pub fn write(&mut self, address: u8, value: u8) {
        self.access(address);

        let select = self.switches & (Switches::Q6 | Switches::Q7 | Switches::ENABLE);
        if select == (Switches::Q6 | Switches::Q7) {
            self.mode = value;
            self.bit_length = match value & 0x18 {
                0x00 => 24, // slow mode, 7 MHz
                0x08 => 12, // fast mode, 7 MHz
                0x10 => 32, // slow mode, 8 MHz
                0x18 => 16, // fast mode, 8 MHz
                _ => unreachable!(),
            };
            debug!(
                "mode register {value:02X}, bit cell {} cycles",
                self.bit_length
            );
        } else if select == (Switches::Q6 | Switches::Q7 | Switches::ENABLE) {
            // Write data register. Serial write-out (synchronous mode)
            // is not modelled; the byte is accepted and dropped.
            trace!("data register write {value:02X}");
        }
    }

    /// Drive the SEL input. No address pair exists for this line; the
    /// host machine owns it and changes propagate to the selected
    /// drive immediately.
    pub fn set_select(&mut self, selected: bool) {
        self.switches.set(Switches::SEL, selected);
        self.push_control_lines();
    }

    /// Attach a drive to slot 0 or 1, replacing any prior attachment.
    ///
    /// Only a weak reference is kept; the caller owns the drive and may
    /// drop it at any time, after which the slot reads as unattached.
    pub fn set_drive(&mut self, slot: usize, drive: Weak<RefCell<dyn IwmDrive>>) {
        self.drives[slot] = Some(drive);
    }

    /// Advance the controller by one clock cycle.
    pub fn tick(&mut self) {
        self.tick_n(1);
    }

    /// Advance the controller by `cycles` clock cycles.
    ///
    /// With Q6 and Q7 clear the read logic runs: the selected drive is
    /// ticked cycle by cycle, flux transitions shift in ones, and bit
    /// cells that reach `bit_length + 2` cycles shift in zeros. Under
    /// any other register select, time is still forwarded to the drive
    /// but no zero bits are synthesized.
    pub fn tick_n(&mut self, cycles: u64) {
        let drive = self.selected_drive();
        let select = self.switches & (Switches::Q6 | Switches::Q7 | Switches::ENABLE);
        let read_mode = select.is_empty() || select == Switches::ENABLE;

        for _ in 0..cycles {
            if let Some(drive) = &drive {
                if let Some(event) = drive.borrow_mut().tick() {
                    self.process_event(event);
                }
            }
            if read_mode {
                self.cycles_since_shift += 1;
                if self.cycles_since_shift == self.bit_length + 2 {
                    self.propose_shift(0);
                }
            }
        }
    }

    /// Latched switch state.
    #[must_use]
    pub fn switches(&self) -> Switches {
        self.switches
    }

    /// Mode register.
    #[must_use]
    pub fn mode(&self) -> u8 {
        self.mode
    }

    /// Data register, without the consuming effect of a bus read.
    #[must_use]
    pub fn data_register(&self) -> u8 {
        self.data_register
    }

    /// Shift register (for diagnostic use).
    #[must_use]
    pub fn shift_register(&self) -> u8 {
        self.shift_register
    }

    /// Current bit cell length in clock cycles.
    #[must_use]
    pub fn bit_length(&self) -> u64 {
        self.bit_length
    }

    /// Input clock in Hz.
    #[must_use]
    pub fn clock_hz(&self) -> u64 {
        self.clock_hz
    }

    /// Index of the slot currently receiving control signals.
    #[must_use]
    pub fn active_drive(&self) -> usize {
        self.active_drive
    }

    /// Control-line view of the current switch state, as the selected
    /// drive sees it.
    #[must_use]
    pub fn control_lines(&self) -> ControlLines {
        let mut lines = ControlLines::empty();
        lines.set(ControlLines::CA0, self.switches.contains(Switches::CA0));
        lines.set(ControlLines::CA1, self.switches.contains(Switches::CA1));
        lines.set(ControlLines::CA2, self.switches.contains(Switches::CA2));
        lines.set(ControlLines::SEL, self.switches.contains(Switches::SEL));
        lines.set(ControlLines::LSTRB, self.switches.contains(Switches::LSTRB));
        lines
    }

    // --- Internal helpers ---

    /// Decoder half of every bus access: bits 3-1 of the address pick a
    /// switch, bit 0 picks set or clear. Side effects fire only on a
    /// net change.
    fn access(&mut self, address: u8) {
        let address = address & 0xF;
        let mask = Switches::from_bits_truncate(1 << (address >> 1));
        let old = self.switches;

        if address & 1 != 0 {
            self.switches |= mask;
        } else {
            self.switches &= !mask;
        }

        if self.switches == old {
            return;
        }

        if mask == Switches::ENABLE {
            // Mode bit 2's one-second motor-off delay is not modelled;
            // disable takes effect immediately.
            let enabled = address & 1 != 0;
            if let Some(drive) = self.selected_drive() {
                drive.borrow_mut().set_enabled(enabled);
            }
        } else if mask == Switches::DRIVESEL {
            let new_drive = usize::from(address & 1);
            if new_drive != self.active_drive {
                if let Some(drive) = self.selected_drive() {
                    drive.borrow_mut().set_enabled(false);
                }
                self.active_drive = new_drive;
                if let Some(drive) = self.selected_drive() {
                    drive
                        .borrow_mut()
                        .set_enabled(self.switches.contains(Switches::ENABLE));
                }
            }
        }

        self.push_control_lines();
    }

    /// Re-present the control lines to the selected drive, if one is
    /// attached.
    fn push_control_lines(&mut self) {
        if let Some(drive) = self.selected_drive() {
            drive.borrow_mut().set_control_lines(self.control_lines());
        }
    }

    /// The attached drive at the active slot, if it is still alive.
    fn selected_drive(&self) -> Option<Rc<RefCell<dyn IwmDrive>>> {
        self.drives[self.active_drive].as_ref()?.upgrade()
    }

    fn process_event(&mut self, event: DriveEvent) {
        match event {
            DriveEvent::FluxTransition => self.propose_shift(1),
            DriveEvent::IndexHole => {}
        }
    }

    /// Shift one recovered bit in, MSB first. A completed byte (top bit
    /// set) latches into the data register; every shift restarts the
    /// bit cell window.
    fn propose_shift(&mut self, bit: u8) {
        self.shift_register = (self.shift_register << 1) | bit;
        if self.shift_register & 0x80 != 0 {
            self.data_register = self.shift_register;
            self.shift_register = 0;
        }
        self.cycles_since_shift = 0;
    }
}
