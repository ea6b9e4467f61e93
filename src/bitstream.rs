//! Bit-addressable cursor over a fixed byte buffer.
//!
//! Bits are little-endian at both levels: bit `k` of the stream is bit
//! `k % 8` (counted from the LSB) of byte `k / 8`. Reads and writes keep
//! separate cursors over the same buffer. Nothing ever touches memory past
//! the end of the buffer: reads past the end yield zeros, writes past the
//! end are dropped.

/// Position of a cursor inside the buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    pub byte_offset: usize,
    pub bit_offset: u8,
}

impl Cursor {
    fn from_bits(bits: usize) -> Self {
        Self {
            byte_offset: bits / 8,
            bit_offset: (bits % 8) as u8,
        }
    }

    pub fn bits(self) -> usize {
        self.byte_offset * 8 + self.bit_offset as usize
    }
}

/// Addressing mode for [`BitStream::seek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekFrom {
    /// Absolute bit position from the start of the buffer.
    Start(usize),
    /// Signed bit delta from the current cursor position.
    Current(isize),
}

#[derive(Debug)]
pub struct BitStream<'a> {
    buf: &'a mut [u8],
    read: Cursor,
    write: Cursor,
}

impl<'a> BitStream<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self {
            buf,
            read: Cursor::default(),
            write: Cursor::default(),
        }
    }

    /// Packs `bits` into `buf` and opens a stream over it. Bits that do not
    /// fit are dropped, bytes the sequence does not cover are left as-is.
    pub fn from_bits(bits: &[bool], buf: &'a mut [u8]) -> Self {
        let mut stream = Self::new(buf);
        stream.write_bits(bits);
        stream.write = Cursor::default();
        stream
    }

    pub fn len_bits(&self) -> usize {
        self.buf.len() * 8
    }

    pub fn read_position(&self) -> usize {
        self.read.bits()
    }

    pub fn write_position(&self) -> usize {
        self.write.bits()
    }

    pub fn read_cursor(&self) -> Cursor {
        self.read
    }

    pub fn write_cursor(&self) -> Cursor {
        self.write
    }

    pub fn remaining_read(&self) -> usize {
        self.len_bits() - self.read.bits()
    }

    pub fn remaining_write(&self) -> usize {
        self.len_bits() - self.write.bits()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.buf
    }

    fn bit_at(&self, pos: usize) -> bool {
        self.buf
            .get(pos / 8)
            .map_or(false, |byte| (byte >> (pos % 8)) & 1 == 1)
    }

    fn set_bit(&mut self, pos: usize, value: bool) -> bool {
        match self.buf.get_mut(pos / 8) {
            Some(byte) => {
                let mask = 1u8 << (pos % 8);
                if value {
                    *byte |= mask;
                } else {
                    *byte &= !mask;
                }
                true
            }
            None => false,
        }
    }

    fn clamp(&self, pos: isize) -> usize {
        pos.clamp(0, self.len_bits() as isize) as usize
    }

    /// Moves the read cursor. The result is clamped into the buffer.
    pub fn seek(&mut self, from: SeekFrom) -> usize {
        let target = self.resolve(self.read.bits(), from);
        self.read = Cursor::from_bits(target);
        target
    }

    /// Moves the write cursor. The result is clamped into the buffer.
    pub fn seek_write(&mut self, from: SeekFrom) -> usize {
        let target = self.resolve(self.write.bits(), from);
        self.write = Cursor::from_bits(target);
        target
    }

    fn resolve(&self, current: usize, from: SeekFrom) -> usize {
        match from {
            SeekFrom::Start(bits) => bits.min(self.len_bits()),
            SeekFrom::Current(delta) => self.clamp((current as isize).saturating_add(delta)),
        }
    }

    /// Assembles the next `n` bits (at most 64) into an integer without
    /// advancing. Bits past the end of the buffer read as zero.
    pub fn peek(&self, n: usize) -> u64 {
        let n = n.min(64);
        let start = self.read.bits();
        (0..n).fold(0u64, |acc, i| {
            if self.bit_at(start + i) {
                acc | (1u64 << i)
            } else {
                acc
            }
        })
    }

    pub fn read(&mut self, n: usize) -> u64 {
        let value = self.peek(n);
        self.advance_read(n.min(64));
        value
    }

    /// Copies `n` bits into `dest` using the stream's bit order. High bits of
    /// the final partial byte are cleared and no byte past `ceil(n/8)` is
    /// touched. Returns the number of bits copied.
    pub fn peek_into_bytes(&self, n: usize, dest: &mut [u8]) -> usize {
        let n = n.min(dest.len() * 8);
        let start = self.read.bits();
        for (index, byte) in dest.iter_mut().take(n.div_ceil(8)).enumerate() {
            let bits_here = (n - index * 8).min(8);
            let mut value = 0u8;
            for bit in 0..bits_here {
                if self.bit_at(start + index * 8 + bit) {
                    value |= 1 << bit;
                }
            }
            *byte = value;
        }
        n
    }

    pub fn read_into_bytes(&mut self, n: usize, dest: &mut [u8]) -> usize {
        let copied = self.peek_into_bytes(n, dest);
        self.advance_read(copied);
        copied
    }

    /// Copies `n` bits into the first `n` entries of `dest`. Later entries
    /// are not modified.
    pub fn peek_into_bits(&self, n: usize, dest: &mut [bool]) -> usize {
        let n = n.min(dest.len());
        let start = self.read.bits();
        for (i, slot) in dest.iter_mut().take(n).enumerate() {
            *slot = self.bit_at(start + i);
        }
        n
    }

    pub fn read_into_bits(&mut self, n: usize, dest: &mut [bool]) -> usize {
        let copied = self.peek_into_bits(n, dest);
        self.advance_read(copied);
        copied
    }

    fn advance_read(&mut self, n: usize) {
        let target = (self.read.bits() + n).min(self.len_bits());
        self.read = Cursor::from_bits(target);
    }

    /// Writes the low `n` bits of `value` (at most 64). Returns how many bits
    /// landed inside the buffer.
    pub fn write(&mut self, value: u64, n: usize) -> usize {
        let n = n.min(64);
        let start = self.write.bits();
        let mut written = 0;
        for i in 0..n {
            if !self.set_bit(start + i, (value >> i) & 1 == 1) {
                break;
            }
            written += 1;
        }
        self.write = Cursor::from_bits(start + written);
        written
    }

    pub fn write_bits(&mut self, bits: &[bool]) -> usize {
        let start = self.write.bits();
        let mut written = 0;
        for &bit in bits {
            if !self.set_bit(start + written, bit) {
                break;
            }
            written += 1;
        }
        self.write = Cursor::from_bits(start + written);
        written
    }

    /// Copies the unread remainder of `src` into this stream. Exactly
    /// `min(src.remaining_read(), self.remaining_write())` bits move and both
    /// cursors advance by that count.
    pub fn write_stream(&mut self, src: &mut BitStream<'_>) -> usize {
        let count = src.remaining_read().min(self.remaining_write());
        let mut left = count;
        while left > 0 {
            let chunk = left.min(64);
            let value = src.read(chunk);
            self.write(value, chunk);
            left -= chunk;
        }
        count
    }
}

/// Bits needed to represent every integer in `0..=max_value`.
pub const fn bits_for(max_value: u64) -> usize {
    (u64::BITS - max_value.leading_zeros()) as usize
}
