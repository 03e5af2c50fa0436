//! Macintosh 3.5" floppy drive mechanism.
//!
//! Models the Sony drive units the Mac pairs with its IWM controller:
//! the single-sided 400K unit and the double-sided 800K unit. The
//! controller addresses a bank of one-bit drive registers over four
//! shared lines (CA0-CA2 and SEL); reading a register answers on the
//! sense line, and a rising LSTRB edge writes the addressed register.
//!
//! Sense registers (addressed CA2 CA1 CA0 SEL; most read active low):
//!
//! | Select | Register  | Reads 0 when                               |
//! |--------|-----------|--------------------------------------------|
//! | `0000` | DIRTN     | step direction is toward the hub           |
//! | `0001` | CISTN     | media is in place                          |
//! | `0010` | STEP      | a head step is still settling              |
//! | `0011` | WRTPRT    | the write-protect tab protects the disk    |
//! | `0100` | MOTORON   | the spindle is turning media               |
//! | `0101` | TKO       | the head sits on track 0                   |
//! | `0111` | TACH      | the tachometer output is low               |
//! | `1000` | RDDATA0   | no flux is under head 0                    |
//! | `1001` | RDDATA1   | no flux is under head 1                    |
//! | `1100` | SIDES     | the mechanism has a single head            |
//! | `1101` | READY     | the mechanism has settled                  |
//! | `1110` | INSTALLED | a drive answers at this position           |
//! | `1111` | PRESENT   | a drive answers at this position           |
//!
//! Strobe registers (written by a rising LSTRB edge):
//!
//! | Select | Register  | Effect                                     |
//! |--------|-----------|--------------------------------------------|
//! | `0000` | TRACKUP   | latch step direction toward the hub        |
//! | `1000` | TRACKDN   | latch step direction toward the rim        |
//! | `0010` | TRACKSTEP | step one track in the latched direction    |
//! | `0100` | MOTORON   | start the spindle motor                    |
//! | `1100` | MOTOROFF  | stop the spindle motor                     |
//! | `1110` | EJECT     | eject the disk if LSTRB is held 500 ms     |
//!
//! The spindle turns at a zoned, track-dependent speed on 800K units;
//! 400K units are speed-controlled by the host (the Mac drives them from
//! a PWM channel), modelled here as [`MacFloppyDrive::set_rotation_speed`].
//! While the motor turns media, each elapsed bit cell reports back to the
//! controller as a [`DriveEvent`].

mod media;

pub use media::{Disk, DiskError, Track, TrackError, TRACKS_PER_SIDE};

use apple_iwm::{ControlLines, DriveEvent, IwmDrive};
use log::{info, warn};

/// Time for one head step to settle, in milliseconds.
const STEP_TIME_MS: u64 = 30;

/// LSTRB hold time needed on the eject register, in milliseconds.
const EJECT_HOLD_MS: u64 = 500;

/// Tachometer pulses per spindle revolution.
const TACH_PULSES_PER_REVOLUTION: u64 = 60;

/// Power-on spindle speed of a single-sided unit, in RPM.
const DEFAULT_COMMANDED_RPM: u64 = 390;

// Sense registers, addressed CA2 CA1 CA0 SEL.

/// Step direction; 0 steps toward the hub.
const SENSE_DIRTN: u8 = 0b0000;
/// Disk in place; 0 when media is present.
const SENSE_CISTN: u8 = 0b0001;
/// Step in progress; 0 while the head is still settling.
const SENSE_STEP: u8 = 0b0010;
/// Write protect; 0 when the tab protects the disk.
const SENSE_WRTPRT: u8 = 0b0011;
/// Spindle motor; 0 while turning media.
const SENSE_MOTORON: u8 = 0b0100;
/// Track zero; 0 with the head on the outermost track.
const SENSE_TKO: u8 = 0b0101;
/// Spindle tachometer; [`TACH_PULSES_PER_REVOLUTION`] pulses per turn.
const SENSE_TACH: u8 = 0b0111;
/// Instantaneous read level under head 0.
const SENSE_RDDATA0: u8 = 0b1000;
/// Instantaneous read level under head 1.
const SENSE_RDDATA1: u8 = 0b1001;
/// Head count; 1 on a double-sided mechanism.
const SENSE_SIDES: u8 = 0b1100;
/// Drive ready; 0 once the mechanism has settled.
const SENSE_READY: u8 = 0b1101;
/// Drive installed; 0 when a drive answers at this position.
const SENSE_INSTALLED: u8 = 0b1110;
/// Drive present; 0 when a drive answers at this position.
const SENSE_PRESENT: u8 = 0b1111;

// Strobe registers, written on a rising LSTRB edge.

/// Latch the step direction toward the hub (higher tracks).
const WRITE_TRACK_UP: u8 = 0b0000;
/// Latch the step direction toward the rim (lower tracks).
const WRITE_TRACK_DOWN: u8 = 0b1000;
/// Step one track in the latched direction.
const WRITE_TRACK_STEP: u8 = 0b0010;
/// Start the spindle motor.
const WRITE_MOTOR_ON: u8 = 0b0100;
/// Stop the spindle motor.
const WRITE_MOTOR_OFF: u8 = 0b1100;
/// Eject the disk; LSTRB must stay high for [`EJECT_HOLD_MS`].
const WRITE_EJECT: u8 = 0b1110;

/// One Macintosh 3.5" drive unit.
pub struct MacFloppyDrive {
    /// Controller clock feeding the drive, in Hz.
    clock_hz: u64,
    /// Double-sided (800K) mechanism; `false` is the 400K unit.
    double_sided: bool,
    /// Selected by the controller's enable output.
    enabled: bool,
    /// Control lines as last driven by the controller.
    lines: ControlLines,
    /// Spindle motor state.
    motor_on: bool,
    /// Latched step direction; `true` steps toward the hub.
    step_up: bool,
    /// Track under the head, 0 to [`TRACKS_PER_SIDE`] - 1.
    cylinder: usize,
    /// Cycles left before an in-progress head step settles.
    stepping: u64,
    /// Eject deadline while LSTRB is held on the eject register.
    ejecting: Option<u64>,
    /// Lifetime cycle count; phase reference for the tachometer.
    cycles: u64,
    /// Spindle speed commanded by the host, for single-sided units.
    commanded_rpm: u64,
    /// Inserted media, if any.
    disk: Option<Disk>,
    /// Bit cell under the head within the current track.
    head_bit: usize,
    /// Cycles accumulated toward the current bit cell.
    cell_progress: u64,
}

impl MacFloppyDrive {
    /// Creates a drive fed by a controller clock of `clock_hz`.
    ///
    /// `double_sided` selects the 800K mechanism, which manages its own
    /// zoned spindle speed; the single-sided 400K unit spins at whatever
    /// [`Self::set_rotation_speed`] last commanded.
    #[must_use]
    pub fn new(clock_hz: u64, double_sided: bool) -> Self {
        Self {
            clock_hz,
            double_sided,
            enabled: false,
            lines: ControlLines::empty(),
            motor_on: false,
            step_up: true,
            cylinder: 0,
            stepping: 0,
            ejecting: None,
            cycles: 0,
            commanded_rpm: DEFAULT_COMMANDED_RPM,
            disk: None,
            head_bit: 0,
            cell_progress: 0,
        }
    }

    /// Loads media. Any disk already in the drive is replaced.
    pub fn insert_disk(&mut self, disk: Disk) {
        info!(
            "disk inserted: {} side(s)",
            if disk.is_double_sided() { 2 } else { 1 }
        );
        self.disk = Some(disk);
        self.head_bit = 0;
        self.cell_progress = 0;
        self.ejecting = None;
    }

    /// Removes the media immediately, bypassing the eject strobe.
    pub fn eject_disk(&mut self) {
        if self.disk.take().is_some() {
            info!("disk ejected");
        }
        self.ejecting = None;
    }

    /// Commands the spindle speed of a single-sided unit, in RPM.
    ///
    /// The Mac varies the 400K spindle from a PWM channel to trade speed
    /// for density across the disk; 800K units pick their own zoned
    /// speed and ignore this.
    pub fn set_rotation_speed(&mut self, rpm: u64) {
        if !self.double_sided {
            self.commanded_rpm = rpm;
        }
    }

    #[must_use]
    pub fn has_disk(&self) -> bool {
        self.disk.is_some()
    }

    /// Track the head currently sits on.
    #[must_use]
    pub fn cylinder(&self) -> usize {
        self.cylinder
    }

    #[must_use]
    pub fn motor_on(&self) -> bool {
        self.motor_on
    }

    /// Head selected by the SEL line; always 0 on single-sided units.
    #[must_use]
    pub fn head(&self) -> usize {
        usize::from(self.double_sided && self.lines.contains(ControlLines::SEL))
    }

    // --- Internal helpers ---

    /// Executes a strobe write to the currently addressed register.
    fn write_register(&mut self) {
        match self.lines.register_select() {
            WRITE_TRACK_UP => self.step_up = true,
            WRITE_TRACK_DOWN => self.step_up = false,
            WRITE_TRACK_STEP => self.step(),
            WRITE_MOTOR_ON => self.motor_on = true,
            WRITE_MOTOR_OFF => self.motor_on = false,
            WRITE_EJECT => {
                // The eject motor only runs if LSTRB stays high for the
                // full hold time; tick() watches the line.
                if self.disk.is_some() {
                    self.ejecting = Some(self.cycles + self.cycles_in_ms(EJECT_HOLD_MS));
                }
            }
            other => warn!("write to unimplemented drive register {other:04b}"),
        }
    }

    fn step(&mut self) {
        self.cylinder = if self.step_up {
            (self.cylinder + 1).min(TRACKS_PER_SIDE - 1)
        } else {
            self.cylinder.saturating_sub(1)
        };
        // The head picks the new track up from a standing start.
        self.head_bit = 0;
        self.cell_progress = 0;
        self.stepping = self.cycles_in_ms(STEP_TIME_MS);
    }

    fn tachometer(&self) -> bool {
        if !self.motor_on {
            return false;
        }
        let rpm = self.rotation_rpm();
        if rpm == 0 {
            return false;
        }
        // Two edges per pulse.
        let cycles_per_edge = self.clock_hz * 60 / (rpm * TACH_PULSES_PER_REVOLUTION * 2);
        (self.cycles / cycles_per_edge) % 2 != 0
    }

    /// Read level under the given head, without advancing the disk.
    fn head_bit_level(&self, head: usize) -> bool {
        let Some(disk) = self.disk.as_ref() else {
            return false;
        };
        let track = disk.track(self.side_track_index(head));
        track.bit(self.head_bit % track.bit_len())
    }

    fn side_track_index(&self, head: usize) -> usize {
        match self.disk.as_ref() {
            Some(disk) if head == 1 && disk.is_double_sided() => self.cylinder + TRACKS_PER_SIDE,
            _ => self.cylinder,
        }
    }

    fn track_index(&self) -> usize {
        self.side_track_index(self.head())
    }

    fn write_protected(&self) -> bool {
        self.disk.as_ref().is_some_and(Disk::write_protected)
    }

    /// Current spindle speed in RPM.
    ///
    /// Double-sided media record at constant bit density, so the 800K
    /// spindle slows toward the rim where tracks hold more cells.
    fn rotation_rpm(&self) -> u64 {
        if self.double_sided {
            match self.cylinder {
                0..=15 => 402,
                16..=31 => 438,
                32..=47 => 482,
                48..=63 => 536,
                64..=79 => 603,
                _ => unreachable!(),
            }
        } else {
            self.commanded_rpm
        }
    }

    /// Controller cycles one bit cell spends under the head.
    fn cycles_per_cell(&self) -> u64 {
        let rpm = self.rotation_rpm();
        let Some(disk) = self.disk.as_ref() else {
            return u64::MAX;
        };
        if rpm == 0 {
            return u64::MAX;
        }
        let bits = disk.track(self.track_index()).bit_len() as u64;
        (self.clock_hz * 60).div_ceil(rpm * bits)
    }

    fn cycles_in_ms(&self, millis: u64) -> u64 {
        self.clock_hz / 1_000 * millis
    }
}

impl IwmDrive for MacFloppyDrive {
    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn set_control_lines(&mut self, lines: ControlLines) {
        let rising =
            lines.contains(ControlLines::LSTRB) && !self.lines.contains(ControlLines::LSTRB);
        self.lines = lines;
        // Deselected mechanisms latch the shared lines but ignore strobes.
        if rising && self.enabled {
            self.write_register();
        }
    }

    fn sense(&self) -> bool {
        // A deselected mechanism leaves its sense output floating high.
        if !self.enabled {
            return true;
        }
        match self.lines.register_select() {
            SENSE_DIRTN => !self.step_up,
            SENSE_CISTN => self.disk.is_none(),
            SENSE_STEP => self.stepping == 0,
            SENSE_WRTPRT => !self.write_protected(),
            SENSE_MOTORON => !(self.motor_on && self.disk.is_some()),
            SENSE_TKO => self.cylinder != 0,
            SENSE_TACH => self.tachometer(),
            SENSE_RDDATA0 => self.head_bit_level(0),
            SENSE_RDDATA1 => self.head_bit_level(1),
            SENSE_SIDES => self.double_sided,
            SENSE_READY => false,
            SENSE_INSTALLED => false,
            SENSE_PRESENT => false,
            other => {
                warn!("read from unimplemented drive register {other:04b}");
                true
            }
        }
    }

    fn tick(&mut self) -> Option<DriveEvent> {
        self.cycles += 1;

        if let Some(deadline) = self.ejecting {
            if !self.lines.contains(ControlLines::LSTRB) {
                // Releasing the strobe early cancels the eject.
                self.ejecting = None;
            } else if self.cycles >= deadline {
                self.eject_disk();
            }
        }

        self.stepping = self.stepping.saturating_sub(1);

        if !self.motor_on {
            return None;
        }
        let Some(disk) = self.disk.as_ref() else {
            return None;
        };

        self.cell_progress += 1;
        if self.cell_progress < self.cycles_per_cell() {
            return None;
        }
        self.cell_progress = 0;

        let track = disk.track(self.track_index());
        // A head switch can land past the end of a shorter track.
        if self.head_bit >= track.bit_len() {
            self.head_bit = 0;
        }
        let cell = track.bit(self.head_bit);
        let wrapped = self.head_bit + 1 == track.bit_len();
        self.head_bit = if wrapped { 0 } else { self.head_bit + 1 };

        // A magnetised cell pulses the read head; the index sensor fires
        // as the revolution wraps. Flux on the wrap cell wins.
        if cell {
            Some(DriveEvent::FluxTransition)
        } else if wrapped {
            Some(DriveEvent::IndexHole)
        } else {
            None
        }
    }
}
