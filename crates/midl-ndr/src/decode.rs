//! NDR decoding trait and read cursor

use crate::referent::ReferentTable;
use crate::{NdrContext, NdrError, Result};
use bytes::Buf;

/// Trait for types that can be decoded from NDR format
///
/// Decoding mirrors [`crate::NdrEncode`]: `ndr_decode` reads the inline part and
/// registers the referents it meets; `ndr_decode_deferred` resolves them in the
/// order they were registered. A value is only handed to the caller after both
/// phases succeeded.
pub trait NdrDecode: Sized {
    /// Read the inline part of a value.
    fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self>;

    /// Read the pointees registered by [`NdrDecode::ndr_decode`].
    fn ndr_decode_deferred(&mut self, _r: &mut NdrReader<'_>) -> Result<()> {
        Ok(())
    }

    /// Get the NDR alignment requirement for this type
    fn ndr_align() -> usize {
        1
    }

    /// Smallest inline size of one value, used to bound element counts
    /// against the remaining buffer before allocating.
    fn ndr_min_size() -> usize {
        1
    }
}

/// Read cursor for one NDR call
///
/// Borrows the whole message; the position is an offset from the message start
/// so that alignment matches the writer. Holds the referent arena for the call.
pub struct NdrReader<'a> {
    buf: &'a [u8],
    pos: usize,
    ctx: NdrContext,
    referents: ReferentTable,
    depth: usize,
}

impl<'a> NdrReader<'a> {
    /// Create a reader positioned at the start of the message
    pub fn new(buf: &'a [u8], ctx: NdrContext) -> Self {
        Self::with_offset(buf, 0, ctx)
    }

    /// Create a reader positioned `offset` bytes into the message
    pub fn with_offset(buf: &'a [u8], offset: usize, ctx: NdrContext) -> Self {
        Self {
            buf,
            pos: offset.min(buf.len()),
            ctx,
            referents: ReferentTable::new(),
            depth: 0,
        }
    }

    /// Decoding context
    pub fn context(&self) -> &NdrContext {
        &self.ctx
    }

    /// Current offset from the start of the message
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left after the current position
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub(crate) fn referents(&mut self) -> &mut ReferentTable {
        &mut self.referents
    }

    /// Fail with `MalformedLength` unless `needed` bytes remain
    #[inline]
    pub fn ensure(&self, what: &'static str, needed: usize) -> Result<()> {
        if needed > self.remaining() {
            return Err(NdrError::MalformedLength {
                what,
                needed,
                remaining: self.remaining(),
            });
        }
        Ok(())
    }

    /// Validate a wire element count before anything is allocated for it.
    ///
    /// `min_size` is the smallest inline size of one element.
    pub fn check_count(&self, what: &'static str, count: usize, min_size: usize) -> Result<usize> {
        let limits = &self.ctx.limits;
        let needed = count.checked_mul(min_size.max(1)).ok_or(NdrError::IntegerOverflow(what))?;
        if count > limits.max_elements || needed > limits.max_allocation {
            return Err(NdrError::MalformedLength {
                what,
                needed,
                remaining: self.remaining().min(limits.max_allocation),
            });
        }
        self.ensure(what, needed)?;
        Ok(count)
    }

    /// Decode a complete value: inline part followed by its deferred pointees
    pub fn decode_value<T: NdrDecode>(&mut self) -> Result<T> {
        let mut value = T::ndr_decode(self)?;
        value.ndr_decode_deferred(self)?;
        Ok(value)
    }

    /// Step one level deeper into a self-referential value
    pub fn enter_nested(&mut self) -> Result<()> {
        if self.depth >= self.ctx.limits.max_depth {
            return Err(NdrError::violation(format!(
                "nesting deeper than {} levels",
                self.ctx.limits.max_depth
            )));
        }
        self.depth += 1;
        Ok(())
    }

    /// Leave a level entered with [`NdrReader::enter_nested`]
    pub fn leave_nested(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Skip padding up to the given boundary
    #[inline]
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        let padding = NdrContext::align_padding(self.pos, alignment);
        self.ensure("alignment padding", padding)?;
        self.pos += padding;
        Ok(())
    }

    /// Skip padding up to the given boundary if the buffer still holds it.
    ///
    /// Used for trailing pad at the very end of a message, which some encoders omit.
    pub fn align_lenient(&mut self, alignment: usize) {
        let padding = NdrContext::align_padding(self.pos, alignment);
        self.pos += padding.min(self.remaining());
    }

    /// Read raw bytes without alignment
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        self.ensure("byte run", len)?;
        let out = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    #[inline]
    fn take<const N: usize>(&mut self, what: &'static str) -> Result<&'a [u8]> {
        self.ensure(what, N)?;
        let out = &self.buf[self.pos..self.pos + N];
        self.pos += N;
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let mut b = self.take::<1>("u8")?;
        Ok(b.get_u8())
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.align(2)?;
        self.read_u16_unaligned()
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.align(4)?;
        self.read_u32_unaligned()
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.align(8)?;
        self.read_u64_unaligned()
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(self.read_u64()? as i64)
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    /// Read a u16 at the current position, ignoring alignment
    pub fn read_u16_unaligned(&mut self) -> Result<u16> {
        let little_endian = self.ctx.little_endian;
        let mut b = self.take::<2>("u16")?;
        Ok(if little_endian { b.get_u16_le() } else { b.get_u16() })
    }

    /// Read a u32 at the current position, ignoring alignment
    pub fn read_u32_unaligned(&mut self) -> Result<u32> {
        let little_endian = self.ctx.little_endian;
        let mut b = self.take::<4>("u32")?;
        Ok(if little_endian { b.get_u32_le() } else { b.get_u32() })
    }

    /// Read a u64 at the current position, ignoring alignment
    pub fn read_u64_unaligned(&mut self) -> Result<u64> {
        let little_endian = self.ctx.little_endian;
        let mut b = self.take::<8>("u64")?;
        Ok(if little_endian { b.get_u64_le() } else { b.get_u64() })
    }

    /// End the call, checking that every full-pointer referent got its body.
    ///
    /// Returns the final position.
    pub fn finish(self) -> Result<usize> {
        if let Some(referent) = self.referents.unresolved() {
            return Err(NdrError::violation(format!(
                "full pointer referent {referent:#010x} never received a body"
            )));
        }
        Ok(self.pos)
    }
}

/// Decode a value from the start of a complete NDR message
pub fn decode<T: NdrDecode>(buf: &[u8], ctx: NdrContext) -> Result<T> {
    decode_at(buf, 0, ctx).map(|(value, _)| value)
}

/// Decode a value starting `offset` bytes into a message.
///
/// Returns the value and the position just past it.
pub fn decode_at<T: NdrDecode>(buf: &[u8], offset: usize, ctx: NdrContext) -> Result<(T, usize)> {
    let mut r = NdrReader::with_offset(buf, offset, ctx);
    let value = r.decode_value::<T>()?;
    let end = r.finish()?;
    Ok((value, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NdrWriter;

    #[test]
    fn test_primitive_roundtrip_le() {
        let mut w = NdrWriter::default();
        w.write_u16(0x1234);
        w.write_i32(-42);
        w.write_u64(0xDEADBEEF12345678);
        w.write_f32(3.14);
        w.write_f64(2.71828);
        let bytes = w.into_bytes();

        let mut r = NdrReader::new(&bytes, NdrContext::new());
        assert_eq!(r.read_u16().unwrap(), 0x1234);
        assert_eq!(r.read_i32().unwrap(), -42);
        assert_eq!(r.read_u64().unwrap(), 0xDEADBEEF12345678);
        assert!((r.read_f32().unwrap() - 3.14).abs() < 0.001);
        assert!((r.read_f64().unwrap() - 2.71828).abs() < 0.00001);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_primitive_roundtrip_be() {
        let ctx = NdrContext::big_endian();
        let mut w = NdrWriter::new(ctx);
        w.write_u32(0x12345678);
        let bytes = w.into_bytes();

        let mut r = NdrReader::new(&bytes, ctx);
        assert_eq!(r.read_u32().unwrap(), 0x12345678);
    }

    #[test]
    fn test_short_buffer_is_malformed_length() {
        let bytes = [0u8, 0, 0, 0, 1, 2];
        let mut r = NdrReader::new(&bytes, NdrContext::new());
        r.read_u8().unwrap();
        let err = r.read_u64().unwrap_err();
        assert!(matches!(err, NdrError::MalformedLength { .. }));
    }

    #[test]
    fn test_check_count_rejects_before_allocation() {
        let bytes = [0u8; 16];
        let r = NdrReader::new(&bytes, NdrContext::new());
        assert_eq!(r.check_count("elements", 4, 4).unwrap(), 4);
        assert!(matches!(
            r.check_count("elements", 5, 4),
            Err(NdrError::MalformedLength { needed: 20, remaining: 16, .. })
        ));
        assert!(r.check_count("elements", usize::MAX, 8).is_err());
    }

    #[test]
    fn test_nesting_limit() {
        let bytes = [0u8; 4];
        let mut r = NdrReader::new(&bytes, NdrContext::new().with_max_depth(2));
        r.enter_nested().unwrap();
        r.enter_nested().unwrap();
        assert!(matches!(r.enter_nested(), Err(NdrError::ProtocolViolation(_))));
        r.leave_nested();
        r.enter_nested().unwrap();
    }

    mod props {
        use super::*;
        use crate::{encode, ConformantArray, UniquePtr};
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn arbitrary_input_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
                let _ = decode::<ConformantArray<UniquePtr<u16>>>(&bytes, NdrContext::new());
                let _ = decode::<(u32, UniquePtr<u64>)>(&bytes, NdrContext::new());
            }

            #[test]
            fn truncated_message_is_malformed(values in proptest::collection::vec(any::<u32>(), 1..32), cut in 1usize..8) {
                let msg = ConformantArray::new(values.into_iter().map(UniquePtr::new).collect());
                let bytes = encode(&msg, NdrContext::new()).unwrap();
                let short = &bytes[..bytes.len() - cut];
                let result = decode::<ConformantArray<UniquePtr<u32>>>(short, NdrContext::new());
                prop_assert!(matches!(result, Err(NdrError::MalformedLength { .. })), "expected MalformedLength");
            }
        }
    }
}
