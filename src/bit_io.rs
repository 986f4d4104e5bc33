/*!
Bit IO for compressed instruction streams

Bits are packed MSB first. Fixed-width fields are written high bit first,
varints are little-endian groups of 7 bits, each group preceded by a
continuation bit.

# Examples

```
use opmodel::bit_io::{BitReader, BitWriter};

let mut writer = BitWriter::new(Vec::new());
writer.write_bits(0b101, 3).unwrap();
writer.write_varint(300).unwrap();
let bytes = writer.finish().unwrap();

let mut reader = BitReader::new(bytes.as_slice());
assert_eq!(reader.read_bits(3).unwrap(), 0b101);
assert_eq!(reader.read_varint().unwrap(), 300);
```
*/

use core::slice;
use std::io::{self, ErrorKind, Read, Write};

use self::bit_helpers::BitQueue;
use crate::error::CodecError;

const VARINT_GROUP_BITS: u8 = 7;
const VARINT_GROUP_MASK: u64 = (1 << VARINT_GROUP_BITS) - 1;

/// A BitReader reads bits from an internal `std::io::Read` stream
#[derive(Debug)]
pub struct BitReader<R> {
    bit_queue: BitQueue,
    inner: R,
}

impl<R: Read> BitReader<R> {
    pub fn new(inner: R) -> Self {
        Self { bit_queue: BitQueue::default(), inner }
    }

    /// Reads a bit, running past the end of the stream is `UnexpectedEof`
    pub fn read_bit(&mut self) -> Result<u8, CodecError> {
        if let Some(bit) = self.bit_queue.pop() {
            return Ok(bit);
        }

        let mut byte: u8 = 0;
        match self.inner.read_exact(slice::from_mut(&mut byte)) {
            Ok(()) => self.bit_queue.fill(byte),
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => return Err(CodecError::UnexpectedEof),
            Err(err) => return Err(err.into()),
        }
        self.bit_queue.pop().ok_or(CodecError::UnexpectedEof)
    }

    /// Reads `len` bits (at most 64), high bit first
    pub fn read_bits(&mut self, len: u8) -> Result<u64, CodecError> {
        debug_assert!(len <= 64);
        let mut value = 0;
        for _ in 0..len {
            value = (value << 1) | u64::from(self.read_bit()?);
        }
        Ok(value)
    }

    pub fn read_varint(&mut self) -> Result<u64, CodecError> {
        let mut value = 0;
        let mut shift = 0;
        loop {
            let more = self.read_bit()?;
            let group = self.read_bits(VARINT_GROUP_BITS)?;
            if shift >= u64::BITS || (shift > 0 && group >> (u64::BITS - shift) != 0) {
                return Err(CodecError::Corrupt("varint overflows 64 bits"));
            }
            value |= group << shift;
            shift += u32::from(VARINT_GROUP_BITS);
            if more == 0 {
                return Ok(value);
            }
        }
    }
}

/// A BitWriter writes bits to an internal `std::io::Write` stream
#[derive(Debug)]
pub struct BitWriter<W> {
    inner: W,
    bit_queue: BitQueue,
    bits_written: u64,
}

impl<W: Write> BitWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, bit_queue: BitQueue::default(), bits_written: 0 }
    }

    pub fn write_bit(&mut self, bit: u8) -> io::Result<()> {
        debug_assert!(bit <= 1, "Tried to write invalid bit");
        self.bit_queue.push(bit & 1);
        self.bits_written += 1;
        match self.bit_queue.try_flush() {
            Some(byte) => self.inner.write_all(&[byte]),
            None => Ok(()),
        }
    }

    /// Writes the low `len` bits of `value` (at most 64), high bit first
    pub fn write_bits(&mut self, value: u64, len: u8) -> io::Result<()> {
        debug_assert!(len <= 64);
        for i in (0..len).rev() {
            self.write_bit(((value >> i) & 1) as u8)?;
        }
        Ok(())
    }

    pub fn write_varint(&mut self, mut value: u64) -> io::Result<()> {
        loop {
            let group = value & VARINT_GROUP_MASK;
            value >>= VARINT_GROUP_BITS;
            self.write_bit(u8::from(value != 0))?;
            self.write_bits(group, VARINT_GROUP_BITS)?;
            if value == 0 {
                return Ok(());
            }
        }
    }

    /// Number of bits written so far, padding excluded
    pub fn bits_written(&self) -> u64 {
        self.bits_written
    }

    /// Pads the last byte with zeroes, flushes and hands back the inner writer
    pub fn finish(mut self) -> io::Result<W> {
        while !self.bit_queue.is_empty() {
            self.bit_queue.push(0);
            if let Some(byte) = self.bit_queue.try_flush() {
                self.inner.write_all(&[byte])?;
            }
        }
        self.inner.flush()?;
        Ok(self.inner)
    }
}

mod bit_helpers {
    /// An 8 element bit queue (with internal store u8)
    /// Handling overflow: panics in debug and discards elements in release
    #[derive(Debug, Default)]
    pub struct BitQueue {
        /// Byte buffer
        t: u8,
        /// Number of bits being held
        count: u8,
    }

    impl BitQueue {
        /// Push a bit in the queue, only 0 and 1 are valid
        pub fn push(&mut self, bit: u8) {
            debug_assert!(!self.is_full()); // looses bits
            self.t = (self.t << 1) | bit;
            self.count += 1;
        }

        /// Pop the oldest bit, `None` if the queue is empty
        pub fn pop(&mut self) -> Option<u8> {
            if self.is_empty() {
                return None;
            }

            self.count -= 1;
            Some((self.t >> self.count) & 1)
        }

        /// Hands out the byte once 8 bits have been pushed
        pub fn try_flush(&mut self) -> Option<u8> {
            if !self.is_full() {
                return None;
            }

            self.count = 0;
            Some(self.t)
        }

        /// Loads a whole byte into an empty queue
        pub fn fill(&mut self, byte: u8) {
            debug_assert!(self.is_empty()); // we shouldn't skip bits
            self.count = 8;
            self.t = byte;
        }

        fn is_full(&self) -> bool {
            self.count == 8
        }

        pub fn is_empty(&self) -> bool {
            self.count == 0
        }
    }
}
