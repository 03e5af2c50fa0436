//! Bit-level track and disk containers.
//!
//! A [`Track`] holds the recorded flux pattern of one disk revolution as a
//! packed bit string, most significant bit first: cell 0 of the track is bit
//! 7 of byte 0. There is no sector structure at this level; GCR framing, sync
//! bytes and checksums are whatever the recorded bits say they are.
//!
//! A [`Disk`] is a full set of tracks. Macintosh 3.5" media record 80 tracks
//! per side, so a valid disk carries either 80 tracks (single-sided, 400K) or
//! 160 (double-sided, 800K), side 0 first.

use std::fmt;

/// Tracks recorded on each side of the disk.
pub const TRACKS_PER_SIDE: usize = 80;

/// Error building a [`Track`] from raw bytes.
#[derive(Debug)]
pub enum TrackError {
    /// The declared bit count does not fit in the supplied buffer.
    BitLength { bits: usize, bytes: usize },
    /// A track with no bit cells cannot be spun under a head.
    Empty,
}

impl fmt::Display for TrackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackError::BitLength { bits, bytes } => {
                write!(f, "track of {bits} bits does not fit in {bytes} bytes")
            }
            TrackError::Empty => write!(f, "track has no bit cells"),
        }
    }
}

impl std::error::Error for TrackError {}

/// Error building a [`Disk`] from a track list.
#[derive(Debug)]
pub enum DiskError {
    /// The track list is not one or two full sides.
    TrackCount(usize),
}

impl fmt::Display for DiskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiskError::TrackCount(count) => {
                write!(
                    f,
                    "disk has {count} tracks, expected {TRACKS_PER_SIDE} or {}",
                    2 * TRACKS_PER_SIDE
                )
            }
        }
    }
}

impl std::error::Error for DiskError {}

/// One revolution of recorded bit cells.
#[derive(Clone, Debug)]
pub struct Track {
    data: Vec<u8>,
    bit_len: usize,
}

impl Track {
    /// Builds a track from packed bytes and an explicit bit count.
    ///
    /// Tracks rarely end on a byte boundary, so the final byte may be only
    /// partially used; `bit_len` says where the revolution wraps.
    ///
    /// # Errors
    ///
    /// Returns [`TrackError`] if `bit_len` is zero or needs more bytes than
    /// `data` provides.
    pub fn new(data: Vec<u8>, bit_len: usize) -> Result<Self, TrackError> {
        if bit_len == 0 {
            return Err(TrackError::Empty);
        }
        if bit_len.div_ceil(8) > data.len() {
            return Err(TrackError::BitLength {
                bits: bit_len,
                bytes: data.len(),
            });
        }
        Ok(Self { data, bit_len })
    }

    /// Builds a track that uses every bit of `data`, eight cells per byte.
    ///
    /// # Errors
    ///
    /// Returns [`TrackError::Empty`] if `data` is empty.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, TrackError> {
        let bit_len = data.len() * 8;
        Self::new(data, bit_len)
    }

    /// Reads the cell at `index`, most significant bit of each byte first.
    ///
    /// # Panics
    ///
    /// Panics if `index` is at or past [`Self::bit_len`].
    #[must_use]
    pub fn bit(&self, index: usize) -> bool {
        assert!(index < self.bit_len, "bit {index} out of {}", self.bit_len);
        (self.data[index / 8] >> (7 - (index % 8))) & 1 != 0
    }

    /// Number of bit cells in one revolution.
    #[must_use]
    pub fn bit_len(&self) -> usize {
        self.bit_len
    }
}

/// A full disk: one or two sides of tracks plus the write-protect tab.
#[derive(Clone, Debug)]
pub struct Disk {
    tracks: Vec<Track>,
    write_protected: bool,
}

impl Disk {
    /// Builds a disk from a track list, side 0 tracks first.
    ///
    /// # Errors
    ///
    /// Returns [`DiskError::TrackCount`] unless `tracks` holds exactly one
    /// or two full sides.
    pub fn new(tracks: Vec<Track>, write_protected: bool) -> Result<Self, DiskError> {
        if tracks.len() != TRACKS_PER_SIDE && tracks.len() != 2 * TRACKS_PER_SIDE {
            return Err(DiskError::TrackCount(tracks.len()));
        }
        Ok(Self {
            tracks,
            write_protected,
        })
    }

    /// Track at `index`; side 1 tracks start at [`TRACKS_PER_SIDE`].
    #[must_use]
    pub fn track(&self, index: usize) -> &Track {
        &self.tracks[index]
    }

    #[must_use]
    pub fn is_double_sided(&self) -> bool {
        self.tracks.len() > TRACKS_PER_SIDE
    }

    #[must_use]
    pub fn write_protected(&self) -> bool {
        self.write_protected
    }
}
