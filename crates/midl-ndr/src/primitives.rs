//! NDR primitive type implementations
//!
//! NDR primitive types and their encodings:
//!
//! | MIDL Type     | Rust Type | Size | Alignment |
//! |---------------|-----------|------|-----------|
//! | boolean       | bool      | 1    | 1         |
//! | byte/char     | u8        | 1    | 1         |
//! | small         | i8        | 1    | 1         |
//! | short         | i16       | 2    | 2         |
//! | long/int      | i32       | 4    | 4         |
//! | hyper         | i64       | 8    | 8         |
//! | unsigned short| u16       | 2    | 2         |
//! | unsigned long | u32       | 4    | 4         |
//! | unsigned hyper| u64       | 8    | 8         |
//! | float         | f32       | 4    | 4         |
//! | double        | f64       | 8    | 8         |
//! | wchar_t       | u16       | 2    | 2         |
//! | GUID          | NdrUuid   | 16   | 4         |

use crate::{NdrDecode, NdrEncode, NdrReader, NdrWriter, Result};

// Scalars carry no pointers, so only the inline phase does anything
macro_rules! impl_ndr_primitive {
    ($ty:ty, $size:expr, $write:ident, $read:ident) => {
        impl NdrEncode for $ty {
            fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
                w.$write(*self);
                Ok(())
            }

            fn ndr_align() -> usize {
                $size
            }
        }

        impl NdrDecode for $ty {
            fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
                r.$read()
            }

            fn ndr_align() -> usize {
                $size
            }

            fn ndr_min_size() -> usize {
                $size
            }
        }
    };
}

impl_ndr_primitive!(u8, 1, write_u8, read_u8);
impl_ndr_primitive!(i8, 1, write_i8, read_i8);
impl_ndr_primitive!(u16, 2, write_u16, read_u16);
impl_ndr_primitive!(i16, 2, write_i16, read_i16);
impl_ndr_primitive!(u32, 4, write_u32, read_u32);
impl_ndr_primitive!(i32, 4, write_i32, read_i32);
impl_ndr_primitive!(u64, 8, write_u64, read_u64);
impl_ndr_primitive!(i64, 8, write_i64, read_i64);
impl_ndr_primitive!(f32, 4, write_f32, read_f32);
impl_ndr_primitive!(f64, 8, write_f64, read_f64);

/// NDR boolean - encoded as a single byte (0x00 = false, 0x01 = true)
impl NdrEncode for bool {
    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        w.write_u8(u8::from(*self));
        Ok(())
    }
}

impl NdrDecode for bool {
    fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
        Ok(r.read_u8()? != 0)
    }
}

// Tuples behave like anonymous structures: every member's inline part, then
// every member's pointees
macro_rules! impl_ndr_tuple {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name: NdrEncode),+> NdrEncode for ($($name,)+) {
            fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
                $(self.$idx.ndr_encode(w)?;)+
                Ok(())
            }

            fn ndr_encode_deferred(&self, w: &mut NdrWriter) -> Result<()> {
                $(self.$idx.ndr_encode_deferred(w)?;)+
                Ok(())
            }

            fn ndr_align() -> usize {
                [$($name::ndr_align()),+].into_iter().max().unwrap_or(1)
            }
        }

        impl<$($name: NdrDecode),+> NdrDecode for ($($name,)+) {
            fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
                Ok(($($name::ndr_decode(r)?,)+))
            }

            fn ndr_decode_deferred(&mut self, r: &mut NdrReader<'_>) -> Result<()> {
                $(self.$idx.ndr_decode_deferred(r)?;)+
                Ok(())
            }

            fn ndr_align() -> usize {
                [$(<$name as NdrDecode>::ndr_align()),+].into_iter().max().unwrap_or(1)
            }

            fn ndr_min_size() -> usize {
                0 $(+ $name::ndr_min_size())+
            }
        }
    };
}

impl_ndr_tuple!(A: 0, B: 1);
impl_ndr_tuple!(A: 0, B: 1, C: 2);
impl_ndr_tuple!(A: 0, B: 1, C: 2, D: 3);

/// GUID/UUID type for NDR encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NdrUuid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl NdrUuid {
    /// Nil UUID
    pub const NIL: Self = Self {
        data1: 0,
        data2: 0,
        data3: 0,
        data4: [0; 8],
    };

    /// Build from the field values
    pub const fn from_fields(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        Self { data1, data2, data3, data4 }
    }

    pub fn is_nil(&self) -> bool {
        *self == Self::NIL
    }

    /// Parse from string "xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx", braces optional
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().trim_start_matches('{').trim_end_matches('}');
        if s.len() != 36 || !s.is_ascii() {
            return None;
        }
        let parts: Vec<&str> = s.split('-').collect();
        if parts.len() != 5 || parts[4].len() != 12 {
            return None;
        }

        let data1 = u32::from_str_radix(parts[0], 16).ok()?;
        let data2 = u16::from_str_radix(parts[1], 16).ok()?;
        let data3 = u16::from_str_radix(parts[2], 16).ok()?;
        let clock = u16::from_str_radix(parts[3], 16).ok()?;

        let mut data4 = [0u8; 8];
        data4[..2].copy_from_slice(&clock.to_be_bytes());
        for (i, byte) in data4[2..].iter_mut().enumerate() {
            *byte = u8::from_str_radix(&parts[4][i * 2..i * 2 + 2], 16).ok()?;
        }

        Some(Self { data1, data2, data3, data4 })
    }

    /// Read the 16-byte little-endian (mixed-endian GUID) layout
    pub fn from_le_bytes(b: [u8; 16]) -> Self {
        let mut data4 = [0u8; 8];
        data4.copy_from_slice(&b[8..]);
        Self {
            data1: u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            data2: u16::from_le_bytes([b[4], b[5]]),
            data3: u16::from_le_bytes([b[6], b[7]]),
            data4,
        }
    }

    /// The 16-byte little-endian (mixed-endian GUID) layout
    pub fn to_le_bytes(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[..4].copy_from_slice(&self.data1.to_le_bytes());
        out[4..6].copy_from_slice(&self.data2.to_le_bytes());
        out[6..8].copy_from_slice(&self.data3.to_le_bytes());
        out[8..].copy_from_slice(&self.data4);
        out
    }
}

impl std::fmt::Display for NdrUuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            self.data1,
            self.data2,
            self.data3,
            self.data4[0],
            self.data4[1],
            self.data4[2],
            self.data4[3],
            self.data4[4],
            self.data4[5],
            self.data4[6],
            self.data4[7],
        )
    }
}

impl NdrEncode for NdrUuid {
    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        // UUID aligns to 4 bytes (same as first field)
        w.write_u32(self.data1);
        w.write_u16(self.data2);
        w.write_u16(self.data3);
        w.write_bytes(&self.data4);
        Ok(())
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for NdrUuid {
    fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
        r.align(4)?;
        r.ensure("GUID", 16)?;
        let data1 = r.read_u32()?;
        let data2 = r.read_u16()?;
        let data3 = r.read_u16()?;
        let mut data4 = [0u8; 8];
        data4.copy_from_slice(r.read_bytes(8)?);
        Ok(Self { data1, data2, data3, data4 })
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_min_size() -> usize {
        16
    }
}
