use std::cell::RefCell;
use std::rc::Rc;

use apple_iwm::Iwm;
use drive_mac_floppy::{Disk, MacFloppyDrive, Track, TRACKS_PER_SIDE};

// A clock slow enough to keep the numbers round: 600 RPM over a
// 1000-bit track gives one bit cell every 16 controller cycles.
const CLOCK: u64 = 160_000;

// Switch addresses: even clears, odd sets.
const CLR_CA0: u8 = 0x00;
const CLR_CA1: u8 = 0x02;
const SET_CA1: u8 = 0x03;
const CLR_LSTRB: u8 = 0x06;
const SET_LSTRB: u8 = 0x07;
const SET_ENABLE: u8 = 0x09;
const CLR_Q6: u8 = 0x0C;
const SET_Q6: u8 = 0x0D;
const CLR_Q7: u8 = 0x0E;
const SET_Q7: u8 = 0x0F;

fn make_disk(first_byte: u8) -> Disk {
    let mut data = vec![0u8; 125];
    data[0] = first_byte;
    let track = Track::new(data, 1000).expect("valid track");
    Disk::new(vec![track; TRACKS_PER_SIDE], false).expect("valid disk")
}

fn strobe(iwm: &mut Iwm) {
    let _ = iwm.read(SET_LSTRB);
    let _ = iwm.read(CLR_LSTRB);
}

#[test]
fn recovers_a_gcr_byte_from_flux() {
    let mut iwm = Iwm::new(CLOCK);
    let drive = Rc::new(RefCell::new(MacFloppyDrive::new(CLOCK, false)));
    drive.borrow_mut().insert_disk(make_disk(0xD5));
    drive.borrow_mut().set_rotation_speed(600);
    iwm.set_drive(0, Rc::<RefCell<MacFloppyDrive>>::downgrade(&drive));

    // Fast/8 MHz timing: 16-cycle bit cells. The mode register only
    // accepts writes while the drive enable is off.
    let _ = iwm.read(SET_Q6);
    iwm.write(SET_Q7, 0x18);
    let _ = iwm.read(CLR_Q6);
    let _ = iwm.read(CLR_Q7);
    assert_eq!(iwm.bit_length(), 16);

    // Enable the drive and strobe its motor on; CA1 alone addresses the
    // MOTORON register.
    let _ = iwm.read(SET_ENABLE);
    let _ = iwm.read(SET_CA1);
    strobe(&mut iwm);
    let _ = iwm.read(CLR_CA1);
    assert!(drive.borrow().motor_on());

    // The first recorded byte is 0xD5 (1101 0101): five flux edges and
    // three timed-out zero cells, all shifted in by cycle 128.
    iwm.tick_n(128);
    assert_eq!(iwm.read(CLR_CA0), 0xD5, "recovered byte should have latched");
    assert_eq!(iwm.read(CLR_CA0), 0x00, "a completed byte clears once read");
}

#[test]
fn zero_filled_track_never_completes_a_byte() {
    let mut iwm = Iwm::new(CLOCK);
    let drive = Rc::new(RefCell::new(MacFloppyDrive::new(CLOCK, false)));
    drive.borrow_mut().insert_disk(make_disk(0x00));
    drive.borrow_mut().set_rotation_speed(600);
    iwm.set_drive(0, Rc::<RefCell<MacFloppyDrive>>::downgrade(&drive));

    let _ = iwm.read(SET_Q6);
    iwm.write(SET_Q7, 0x18);
    let _ = iwm.read(CLR_Q6);
    let _ = iwm.read(CLR_Q7);
    let _ = iwm.read(SET_ENABLE);
    let _ = iwm.read(SET_CA1);
    strobe(&mut iwm);
    let _ = iwm.read(CLR_CA1);

    // Without flux edges the shifter only ever sees zeros, and a byte is
    // only complete once a one reaches bit 7.
    iwm.tick_n(2_000);
    assert_eq!(iwm.read(CLR_CA0), 0x00);
}
