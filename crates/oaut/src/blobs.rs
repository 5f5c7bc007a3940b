//! Automation payload blobs: BSTR, interface pointers, records, CURRENCY, DECIMAL

use midl_ndr::{
    read_pointee, read_unique_referent, read_utf16_units, reconcile_count, write_referent, write_utf16_units, Bytes,
    NdrContext, NdrDecode, NdrEncode, NdrError, NdrReader, NdrUuid, NdrWriter, Result,
};
use std::fmt;
use tracing::trace;

/// Wire form of a BSTR (FLAGGED_WORD_BLOB)
///
/// ```text
/// max_count: u32   # conformance
/// fFlags: u32      # byte length
/// clSize: u32      # UTF-16 units
/// asData[clSize]
/// ```
struct BstrBlob {
    units: Vec<u16>,
}

impl NdrEncode for BstrBlob {
    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        let len = u32::try_from(self.units.len()).map_err(|_| NdrError::IntegerOverflow("BSTR length"))?;
        let byte_len = len.checked_mul(2).ok_or(NdrError::IntegerOverflow("BSTR length"))?;
        w.write_u32(len);
        w.write_u32(byte_len);
        w.write_u32(len);
        write_utf16_units(w, &self.units);
        Ok(())
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for BstrBlob {
    fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
        let max_count = r.read_u32()?;
        let _byte_len = r.read_u32()?;
        let cl_size = r.read_u32()?;
        let count = reconcile_count("BSTR", cl_size, max_count);
        Ok(Self {
            units: read_utf16_units(r, count as usize)?,
        })
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_min_size() -> usize {
        12
    }
}

/// Write the body of a non-null BSTR
pub(crate) fn encode_bstr_body(w: &mut NdrWriter, s: &str) -> Result<()> {
    w.encode_value(&BstrBlob {
        units: s.encode_utf16().collect(),
    })
}

/// Read the body of a non-null BSTR
pub(crate) fn decode_bstr_body(r: &mut NdrReader<'_>) -> Result<String> {
    let blob = read_pointee::<BstrBlob>(r)?;
    midl_ndr::decode_utf16(blob.units)
}

/// Marshaled interface pointer (MInterfacePointer)
///
/// The OBJREF bytes are kept opaque; activation is not this crate's concern.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InterfacePointer {
    data: Bytes,
}

/// `MEOW` signature at the start of every OBJREF
pub const OBJREF_SIGNATURE: u32 = 0x574F_454D;
/// OBJREF flavour carrying a custom-marshaled payload
pub const OBJREF_CUSTOM: u32 = 0x0000_0004;
/// IID of IRecordInfo, the interface a record's type description travels as
pub const IID_IRECORDINFO: NdrUuid = NdrUuid::from_fields(
    0x0000_002F,
    0x0000,
    0x0000,
    [0xC0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x46],
);

impl InterfacePointer {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// Raw OBJREF bytes
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Custom-marshaled IRecordInfo reference describing a record type
    pub fn record_info(identity: &RecordIdentity) -> Self {
        let mut payload = Vec::with_capacity(40);
        payload.extend_from_slice(&identity.library.to_le_bytes());
        payload.extend_from_slice(&identity.major_version.to_le_bytes());
        payload.extend_from_slice(&identity.minor_version.to_le_bytes());
        payload.extend_from_slice(&identity.lcid.to_le_bytes());
        payload.extend_from_slice(&identity.type_info.to_le_bytes());

        let mut data = Vec::with_capacity(48 + payload.len());
        data.extend_from_slice(&OBJREF_SIGNATURE.to_le_bytes());
        data.extend_from_slice(&OBJREF_CUSTOM.to_le_bytes());
        data.extend_from_slice(&IID_IRECORDINFO.to_le_bytes());
        data.extend_from_slice(&IID_IRECORDINFO.to_le_bytes()); // unmarshaler CLSID
        data.extend_from_slice(&0u32.to_le_bytes()); // cbExtension
        data.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        data.extend_from_slice(&payload);
        Self::new(data)
    }

    /// Record type identity carried by a custom-marshaled IRecordInfo.
    ///
    /// `None` when the bytes are not laid out that way.
    pub fn record_identity(&self) -> Option<RecordIdentity> {
        let mut r = NdrReader::new(&self.data, NdrContext::new());
        if r.read_u32_unaligned().ok()? != OBJREF_SIGNATURE || r.read_u32_unaligned().ok()? != OBJREF_CUSTOM {
            return None;
        }
        r.read_bytes(32).ok()?; // iid, clsid
        let extension = r.read_u32_unaligned().ok()?;
        let _size = r.read_u32_unaligned().ok()?;
        r.read_bytes(extension as usize).ok()?;

        let library = read_guid(&mut r)?;
        let major_version = r.read_u16_unaligned().ok()?;
        let minor_version = r.read_u16_unaligned().ok()?;
        let lcid = r.read_u32_unaligned().ok()?;
        let type_info = read_guid(&mut r)?;
        Some(RecordIdentity {
            library,
            major_version,
            minor_version,
            lcid,
            type_info,
        })
    }
}

fn read_guid(r: &mut NdrReader<'_>) -> Option<NdrUuid> {
    let bytes: [u8; 16] = r.read_bytes(16).ok()?.try_into().ok()?;
    Some(NdrUuid::from_le_bytes(bytes))
}

impl From<Vec<u8>> for InterfacePointer {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

/// Conformant structure `{max_count, ulCntData, abData[ulCntData]}`
impl NdrEncode for InterfacePointer {
    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        let len = u32::try_from(self.data.len()).map_err(|_| NdrError::IntegerOverflow("interface pointer"))?;
        w.write_u32(len);
        w.write_u32(len);
        w.write_bytes(&self.data);
        Ok(())
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for InterfacePointer {
    fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
        let max_count = r.read_u32()?;
        let cnt_data = r.read_u32()?;
        let count = reconcile_count("MInterfacePointer", cnt_data, max_count) as usize;
        r.check_count("MInterfacePointer", count, 1)?;
        Ok(Self {
            data: Bytes::copy_from_slice(r.read_bytes(count)?),
        })
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_min_size() -> usize {
        8
    }
}

/// Type identity of a user-defined record, for diagnostics only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordIdentity {
    /// Type library GUID
    pub library: NdrUuid,
    pub major_version: u16,
    pub minor_version: u16,
    pub lcid: u32,
    /// GUID of the record's type description
    pub type_info: NdrUuid,
}

impl fmt::Display for RecordIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{{}}} in library {{{}}} v{}.{}",
            self.type_info, self.library, self.major_version, self.minor_version
        )
    }
}

#[derive(Debug, Clone, Copy)]
struct RecordPending {
    record_info: bool,
    data: Option<u32>,
}

/// User-defined record value (BRECORD)
///
/// Wire form:
/// ```text
/// fFlags: u32
/// clSize: u32           # size of the record data
/// pRecInfo: unique MInterfacePointer
/// pRecord: unique byte[clSize]
/// ```
#[derive(Clone)]
pub struct Record {
    flags: u32,
    record_info: Option<InterfacePointer>,
    data: Option<Bytes>,
    // referents read by the inline pass and not yet resolved
    pending: Option<RecordPending>,
}

impl Record {
    pub fn new(flags: u32, record_info: Option<InterfacePointer>, data: Option<Bytes>) -> Self {
        Self {
            flags,
            record_info,
            data,
            pending: None,
        }
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn record_info(&self) -> Option<&InterfacePointer> {
        self.record_info.as_ref()
    }

    pub fn data(&self) -> Option<&Bytes> {
        self.data.as_ref()
    }

    /// Type identity of the record, when its IRecordInfo can be parsed
    pub fn identity(&self) -> Option<RecordIdentity> {
        self.record_info.as_ref().and_then(InterfacePointer::record_identity)
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.flags == other.flags && self.record_info == other.record_info && self.data == other.data
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("flags", &self.flags)
            .field("identity", &self.identity())
            .field("data_len", &self.data.as_ref().map(Bytes::len))
            .finish()
    }
}

impl NdrEncode for Record {
    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        let size = self.data.as_ref().map_or(0, Bytes::len);
        w.write_u32(self.flags);
        w.write_u32(u32::try_from(size).map_err(|_| NdrError::IntegerOverflow("record size"))?);
        write_referent(w, self.record_info.is_some());
        write_referent(w, self.data.is_some());
        Ok(())
    }

    fn ndr_encode_deferred(&self, w: &mut NdrWriter) -> Result<()> {
        if let Some(info) = &self.record_info {
            w.encode_value(info)?;
        }
        if let Some(data) = &self.data {
            w.write_u32(u32::try_from(data.len()).map_err(|_| NdrError::IntegerOverflow("record data"))?);
            w.write_bytes(data);
        }
        Ok(())
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for Record {
    fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
        let flags = r.read_u32()?;
        let size = r.read_u32()?;
        let record_info = read_unique_referent(r)?;
        let data = read_unique_referent(r)?.then_some(size);
        Ok(Self {
            flags,
            record_info: None,
            data: None,
            pending: Some(RecordPending { record_info, data }),
        })
    }

    fn ndr_decode_deferred(&mut self, r: &mut NdrReader<'_>) -> Result<()> {
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };
        if pending.record_info {
            self.record_info = Some(read_pointee::<InterfacePointer>(r)?);
        }
        if let Some(size) = pending.data {
            let max_count = r.read_u32()?;
            let count = reconcile_count("record data", size, max_count) as usize;
            r.check_count("record data", count, 1)?;
            self.data = Some(Bytes::copy_from_slice(r.read_bytes(count)?));
        }
        trace!(identity = ?self.identity(), "record");
        Ok(())
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_min_size() -> usize {
        16
    }
}

/// CURRENCY: a 64-bit integer scaled by 10 000
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Currency(pub i64);

impl Currency {
    pub const SCALE: i64 = 10_000;

    /// Whole units and the ten-thousandths remainder
    pub fn split(self) -> (i64, i64) {
        (self.0 / Self::SCALE, self.0 % Self::SCALE)
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (whole, frac) = self.split();
        let sign = if self.0 < 0 && whole == 0 { "-" } else { "" };
        write!(f, "{sign}{whole}.{:04}", frac.abs())
    }
}

impl NdrEncode for Currency {
    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        w.write_i64(self.0);
        Ok(())
    }

    fn ndr_align() -> usize {
        8
    }
}

impl NdrDecode for Currency {
    fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
        Ok(Self(r.read_i64()?))
    }

    fn ndr_align() -> usize {
        8
    }

    fn ndr_min_size() -> usize {
        8
    }
}

/// DECIMAL: 96-bit unsigned mantissa, power-of-ten scale and sign
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Decimal {
    pub scale: u8,
    pub sign: u8,
    pub hi32: u32,
    pub lo64: u64,
}

impl Decimal {
    /// Sign byte of a negative value
    pub const NEGATIVE: u8 = 0x80;

    pub fn new(mantissa: u128, scale: u8, negative: bool) -> Result<Self> {
        if mantissa >> 96 != 0 || scale > 28 {
            return Err(NdrError::violation(format!(
                "DECIMAL out of range (scale {scale})"
            )));
        }
        Ok(Self {
            scale,
            sign: if negative { Self::NEGATIVE } else { 0 },
            hi32: (mantissa >> 64) as u32,
            lo64: mantissa as u64,
        })
    }

    pub fn mantissa(&self) -> u128 {
        (u128::from(self.hi32) << 64) | u128::from(self.lo64)
    }

    pub fn is_negative(&self) -> bool {
        self.sign & Self::NEGATIVE != 0
    }
}

/// `{wReserved u16, scale u8, sign u8, Hi32 u32, Lo64 u64}`, 8-byte aligned
impl NdrEncode for Decimal {
    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        w.align(8);
        w.write_u16(0);
        w.write_u8(self.scale);
        w.write_u8(self.sign);
        w.write_u32(self.hi32);
        w.write_u64(self.lo64);
        Ok(())
    }

    fn ndr_align() -> usize {
        8
    }
}

impl NdrDecode for Decimal {
    fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
        r.align(8)?;
        let _reserved = r.read_u16()?;
        let scale = r.read_u8()?;
        let sign = r.read_u8()?;
        let hi32 = r.read_u32()?;
        let lo64 = r.read_u64()?;
        Ok(Self { scale, sign, hi32, lo64 })
    }

    fn ndr_align() -> usize {
        8
    }

    fn ndr_min_size() -> usize {
        16
    }
}
