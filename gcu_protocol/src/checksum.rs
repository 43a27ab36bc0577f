//! # Frame checksum
//!
//! Every frame sent to the GCU ends with a 16-bit checksum over all bytes
//! before it. The algorithm is CRC-16/CCITT with an initial value of `0`
//! (also known as CRC-16/XMODEM), computed four bits at a time with a 16-entry
//! lookup table. The high nibble of each byte is processed first.
//!
//! The checksum is always transmitted _big-endian_, even though every other
//! multi-byte field in the protocol is little-endian.
use std::io::{Read, Seek, SeekFrom, Write};

/// Nibble lookup table for polynomial `0x1021`.
pub const CRC_TABLE: [u16; 16] = [
    0x0000, 0x1021, 0x2042, 0x3063, 0x4084, 0x50a5, 0x60c6, 0x70e7, //
    0x8108, 0x9129, 0xa14a, 0xb16b, 0xc18c, 0xd1ad, 0xe1ce, 0xf1ef,
];

/// Length of the checksum field, in bytes.
pub const CHECKSUM_LENGTH: usize = 2;

#[inline]
const fn step(crc: u16, nibble: u8) -> u16 {
    (crc << 4) ^ CRC_TABLE[((crc >> 12) as u8 ^ nibble) as usize]
}

/// Calculates the frame checksum of `data`.
#[must_use]
pub const fn checksum(data: &[u8]) -> u16 {
    let mut crc = 0;
    let mut i = 0;
    while i < data.len() {
        crc = step(crc, data[i] >> 4);
        crc = step(crc, data[i] & 0x0f);
        i += 1;
    }
    crc
}

/// Incremental frame checksum calculation.
///
/// Feeding a sequence of slices to [`update()`][Self::update] gives the same
/// result as calling [`checksum()`] on their concatenation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Crc16Digest {
    crc: u16,
}

impl Crc16Digest {
    #[must_use]
    pub const fn new() -> Self {
        Self { crc: 0 }
    }

    pub fn update(&mut self, data: &[u8]) {
        for b in data {
            self.crc = step(self.crc, b >> 4);
            self.crc = step(self.crc, b & 0x0f);
        }
    }

    #[must_use]
    pub const fn finalize(self) -> u16 {
        self.crc
    }
}

/// Wrapper for [Read] and [Write] streams which digests every byte passing
/// through it.
///
/// Frame layouts use this as a `map_stream`, so that the checksum field can be
/// calculated (on write) or checked (on read) against exactly the bytes that
/// preceded it.
///
/// Seeks are passed through to the inner stream and are not digested, so
/// layouts using this wrapper must not skip over bytes with padding
/// directives.
pub struct Crc16Stream<T> {
    digest: Crc16Digest,
    inner: T,
}

impl<T> Crc16Stream<T> {
    pub fn new(inner: T) -> Self {
        Self {
            digest: Crc16Digest::new(),
            inner,
        }
    }

    /// Checksum of all bytes read or written so far.
    pub const fn checksum(&self) -> u16 {
        self.digest.finalize()
    }
}

impl<T: Read> Read for Crc16Stream<T> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let r = self.inner.read(buf)?;
        self.digest.update(&buf[..r]);
        Ok(r)
    }
}

impl<T: Write> Write for Crc16Stream<T> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let w = self.inner.write(buf)?;
        self.digest.update(&buf[..w]);
        Ok(w)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl<T: Seek> Seek for Crc16Stream<T> {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.inner.seek(pos)
    }
}
