//! NDR encoding trait and write cursor

use crate::referent::ReferentAllocator;
use crate::{NdrContext, Result};
use bytes::{BufMut, Bytes, BytesMut};

/// Trait for types that can be encoded to NDR format
///
/// Encoding runs in two phases. `ndr_encode` writes the inline representation
/// (scalars, conformance words, pointer referent ids). `ndr_encode_deferred`
/// then writes the pointees that the inline phase deferred, in the same order
/// the pointers were written. Containers call the inline phase of every member
/// first and the deferred phase of every member afterwards.
pub trait NdrEncode {
    /// Write the inline part of this value.
    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()>;

    /// Write the pointees deferred by [`NdrEncode::ndr_encode`].
    fn ndr_encode_deferred(&self, _w: &mut NdrWriter) -> Result<()> {
        Ok(())
    }

    /// Get the NDR alignment requirement for this type
    fn ndr_align() -> usize
    where
        Self: Sized,
    {
        1
    }
}

/// Write cursor for one NDR call
///
/// The position is the number of bytes written so far, so alignment is always
/// measured from the start of the message. The cursor also owns the referent
/// allocator for the call; a writer must not be reused across calls.
pub struct NdrWriter {
    buf: BytesMut,
    ctx: NdrContext,
    referents: ReferentAllocator,
}

impl NdrWriter {
    /// Create a writer for a new message
    pub fn new(ctx: NdrContext) -> Self {
        Self::with_capacity(ctx, 256)
    }

    /// Create a writer with a preallocated buffer
    pub fn with_capacity(ctx: NdrContext, capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            ctx,
            referents: ReferentAllocator::new(),
        }
    }

    /// Encoding context
    pub fn context(&self) -> &NdrContext {
        &self.ctx
    }

    /// Current offset from the start of the message
    #[inline]
    pub fn position(&self) -> usize {
        self.buf.len()
    }

    /// Bytes written so far
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Finish the call and hand out the message
    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }

    pub(crate) fn referents(&mut self) -> &mut ReferentAllocator {
        &mut self.referents
    }

    /// Encode a complete value: inline part followed by its deferred pointees
    pub fn encode_value<T: NdrEncode + ?Sized>(&mut self, value: &T) -> Result<()> {
        value.ndr_encode(self)?;
        value.ndr_encode_deferred(self)
    }

    /// Write zero padding up to the given boundary
    #[inline]
    pub fn align(&mut self, alignment: usize) {
        let padding = NdrContext::align_padding(self.position(), alignment);
        self.buf.put_bytes(0, padding);
    }

    /// Write raw bytes without alignment
    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buf.put_slice(data);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn write_i8(&mut self, value: i8) {
        self.buf.put_i8(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.align(2);
        self.write_u16_unaligned(value);
    }

    pub fn write_i16(&mut self, value: i16) {
        self.write_u16(value as u16);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.align(4);
        self.write_u32_unaligned(value);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.write_u32(value as u32);
    }

    pub fn write_u64(&mut self, value: u64) {
        self.align(8);
        self.write_u64_unaligned(value);
    }

    pub fn write_i64(&mut self, value: i64) {
        self.write_u64(value as u64);
    }

    pub fn write_f32(&mut self, value: f32) {
        self.write_u32(value.to_bits());
    }

    pub fn write_f64(&mut self, value: f64) {
        self.write_u64(value.to_bits());
    }

    /// Write a u16 at the current position, ignoring alignment
    pub fn write_u16_unaligned(&mut self, value: u16) {
        if self.ctx.little_endian {
            self.buf.put_u16_le(value);
        } else {
            self.buf.put_u16(value);
        }
    }

    /// Write a u32 at the current position, ignoring alignment
    pub fn write_u32_unaligned(&mut self, value: u32) {
        if self.ctx.little_endian {
            self.buf.put_u32_le(value);
        } else {
            self.buf.put_u32(value);
        }
    }

    /// Write a u64 at the current position, ignoring alignment
    pub fn write_u64_unaligned(&mut self, value: u64) {
        if self.ctx.little_endian {
            self.buf.put_u64_le(value);
        } else {
            self.buf.put_u64(value);
        }
    }

    /// Reserve an aligned u32 slot to be filled in later with [`NdrWriter::patch_u32`].
    ///
    /// Returns the offset of the slot.
    pub fn reserve_u32(&mut self) -> usize {
        self.align(4);
        let offset = self.position();
        self.buf.put_u32(0);
        offset
    }

    /// Overwrite a slot previously returned by [`NdrWriter::reserve_u32`]
    pub fn patch_u32(&mut self, offset: usize, value: u32) {
        let bytes = if self.ctx.little_endian {
            value.to_le_bytes()
        } else {
            value.to_be_bytes()
        };
        self.buf[offset..offset + 4].copy_from_slice(&bytes);
    }
}

impl Default for NdrWriter {
    fn default() -> Self {
        Self::new(NdrContext::default())
    }
}

/// Encode a value as a complete NDR message
pub fn encode<T: NdrEncode + ?Sized>(value: &T, ctx: NdrContext) -> Result<Bytes> {
    let mut w = NdrWriter::new(ctx);
    w.encode_value(value)?;
    Ok(w.into_bytes())
}
