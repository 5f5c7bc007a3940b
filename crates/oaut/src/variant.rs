//! VARIANT wire codec
//!
//! ```text
//! clSize: u32      # whole variant in 8-byte units, pointees and trailing pad included
//! reserved: u16
//! vt: u16
//! <pad to 8>
//! payload          # arm selected by vt, pointees right behind it
//! <pad to 8>
//! ```
//!
//! A variant is always marshaled as a pointee, so its own deferred data is
//! written before the variant ends and clSize can cover it.
//!
//! BYREF of a fixed-size scalar (integers, floats, BOOL, ERROR, DATE, CY and
//! DECIMAL) and of a record keeps the plain arm inline. BYREF of a BSTR,
//! interface pointer, SAFEARRAY or VARIANT adds one unique-pointer layer,
//! carried as [`VariantValue::Ref`]. A nested VARIANT is itself a unique
//! pointer, so `VT_VARIANT | VT_BYREF` puts two referents before the nested
//! header.

use crate::blobs::{decode_bstr_body, encode_bstr_body};
use crate::safearray::is_element_type;
use crate::vartype::*;
use crate::{Currency, Decimal, InterfacePointer, Record, SafeArray};
use midl_ndr::{
    decode_union, encode_union, read_pointee, read_unique_referent, write_referent, ArmTable, NdrDecode, NdrEncode,
    NdrError, NdrReader, NdrUnion, NdrWriter, Result,
};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arm {
    Empty,
    Null,
    I1,
    UI1,
    I2,
    UI2,
    I4,
    UI4,
    I8,
    UI8,
    Int,
    UInt,
    R4,
    R8,
    Bool,
    Error,
    Date,
    Currency,
    Decimal,
    Bstr,
    Unknown,
    Dispatch,
    Record,
    Variant,
    Array,
    RefBstr,
    RefUnknown,
    RefDispatch,
    RefArray,
    RefVariant,
}

impl Arm {
    /// Arm behind the extra pointer layer of a BYREF arm
    fn pointee(self) -> Option<Arm> {
        match self {
            Arm::RefBstr => Some(Arm::Bstr),
            Arm::RefUnknown => Some(Arm::Unknown),
            Arm::RefDispatch => Some(Arm::Dispatch),
            Arm::RefArray => Some(Arm::Array),
            Arm::RefVariant => Some(Arm::Variant),
            _ => None,
        }
    }
}

const fn tag(vt: u16) -> u32 {
    vt as u32
}

const fn byref(vt: u16) -> u32 {
    (vt | VT_BYREF) as u32
}

/// Non-array tags. The first entry of an arm is its canonical tag.
const VARIANT_ARMS: ArmTable<Arm> = ArmTable::new(
    "VARIANT type",
    &[
        (tag(VT_EMPTY), Arm::Empty),
        (tag(VT_NULL), Arm::Null),
        (tag(VT_I1), Arm::I1),
        (tag(VT_UI1), Arm::UI1),
        (tag(VT_I2), Arm::I2),
        (tag(VT_UI2), Arm::UI2),
        (tag(VT_I4), Arm::I4),
        (tag(VT_UI4), Arm::UI4),
        (tag(VT_I8), Arm::I8),
        (tag(VT_UI8), Arm::UI8),
        (tag(VT_INT), Arm::Int),
        (tag(VT_UINT), Arm::UInt),
        (tag(VT_R4), Arm::R4),
        (tag(VT_R8), Arm::R8),
        (tag(VT_BOOL), Arm::Bool),
        (tag(VT_ERROR), Arm::Error),
        (tag(VT_DATE), Arm::Date),
        (tag(VT_CY), Arm::Currency),
        (tag(VT_DECIMAL), Arm::Decimal),
        (tag(VT_BSTR), Arm::Bstr),
        (tag(VT_UNKNOWN), Arm::Unknown),
        (tag(VT_DISPATCH), Arm::Dispatch),
        (tag(VT_RECORD), Arm::Record),
        (byref(VT_I1), Arm::I1),
        (byref(VT_UI1), Arm::UI1),
        (byref(VT_I2), Arm::I2),
        (byref(VT_UI2), Arm::UI2),
        (byref(VT_I4), Arm::I4),
        (byref(VT_UI4), Arm::UI4),
        (byref(VT_I8), Arm::I8),
        (byref(VT_UI8), Arm::UI8),
        (byref(VT_INT), Arm::Int),
        (byref(VT_UINT), Arm::UInt),
        (byref(VT_R4), Arm::R4),
        (byref(VT_R8), Arm::R8),
        (byref(VT_BOOL), Arm::Bool),
        (byref(VT_ERROR), Arm::Error),
        (byref(VT_DATE), Arm::Date),
        (byref(VT_CY), Arm::Currency),
        (byref(VT_DECIMAL), Arm::Decimal),
        (byref(VT_RECORD), Arm::Record),
        (byref(VT_BSTR), Arm::RefBstr),
        (byref(VT_UNKNOWN), Arm::RefUnknown),
        (byref(VT_DISPATCH), Arm::RefDispatch),
        (byref(VT_VARIANT), Arm::RefVariant),
    ],
    None,
);

fn variant_arm(vt: VarType) -> Result<Arm> {
    if vt.is_array() {
        if !is_element_type(vt.base()) {
            return Err(NdrError::UnsupportedDiscriminant {
                context: "SAFEARRAY element type",
                value: u32::from(vt.base()),
            });
        }
        return Ok(if vt.is_byref() { Arm::RefArray } else { Arm::Array });
    }
    VARIANT_ARMS.select(u32::from(vt.raw()))
}

/// Payload of a VARIANT, one variant per wire arm
#[derive(Debug, Clone, PartialEq)]
pub enum VariantValue {
    Empty,
    Null,
    I1(i8),
    UI1(u8),
    I2(i16),
    UI2(u16),
    I4(i32),
    UI4(u32),
    I8(i64),
    UI8(u64),
    Int(i32),
    UInt(u32),
    R4(f32),
    R8(f64),
    /// VARIANT_BOOL: -1 on the wire for true
    Bool(bool),
    /// SCODE
    Error(u32),
    /// OLE automation date: days since 1899-12-30
    Date(f64),
    Currency(Currency),
    Decimal(Decimal),
    Bstr(Option<String>),
    Unknown(Option<InterfacePointer>),
    Dispatch(Option<InterfacePointer>),
    Record(Option<Record>),
    Array(Option<SafeArray>),
    /// Pointer to a nested VARIANT; only valid behind [`VariantValue::Ref`]
    Variant(Option<Box<Variant>>),
    /// Extra pointer layer of a BYREF BSTR, interface, SAFEARRAY or VARIANT
    Ref(Option<Box<VariantValue>>),
}

impl VariantValue {
    /// Arm of a value that is neither an array nor a reference layer
    fn scalar_arm(&self) -> Option<Arm> {
        Some(match self {
            VariantValue::Empty => Arm::Empty,
            VariantValue::Null => Arm::Null,
            VariantValue::I1(_) => Arm::I1,
            VariantValue::UI1(_) => Arm::UI1,
            VariantValue::I2(_) => Arm::I2,
            VariantValue::UI2(_) => Arm::UI2,
            VariantValue::I4(_) => Arm::I4,
            VariantValue::UI4(_) => Arm::UI4,
            VariantValue::I8(_) => Arm::I8,
            VariantValue::UI8(_) => Arm::UI8,
            VariantValue::Int(_) => Arm::Int,
            VariantValue::UInt(_) => Arm::UInt,
            VariantValue::R4(_) => Arm::R4,
            VariantValue::R8(_) => Arm::R8,
            VariantValue::Bool(_) => Arm::Bool,
            VariantValue::Error(_) => Arm::Error,
            VariantValue::Date(_) => Arm::Date,
            VariantValue::Currency(_) => Arm::Currency,
            VariantValue::Decimal(_) => Arm::Decimal,
            VariantValue::Bstr(_) => Arm::Bstr,
            VariantValue::Unknown(_) => Arm::Unknown,
            VariantValue::Dispatch(_) => Arm::Dispatch,
            VariantValue::Record(_) => Arm::Record,
            VariantValue::Variant(_) => Arm::Variant,
            VariantValue::Array(_) | VariantValue::Ref(_) => return None,
        })
    }

    /// Tag this value gets when nothing else is said
    pub fn natural_type(&self) -> Option<VarType> {
        match self {
            VariantValue::Array(sa) => sa.as_ref().map(|sa| sa.element_type().with_array()),
            VariantValue::Ref(inner) => match inner.as_deref() {
                Some(
                    inner @ (VariantValue::Bstr(_)
                    | VariantValue::Unknown(_)
                    | VariantValue::Dispatch(_)
                    | VariantValue::Array(_)
                    | VariantValue::Variant(_)),
                ) => inner.natural_type().map(VarType::with_byref),
                _ => None,
            },
            VariantValue::Variant(_) => Some(VarType(VT_VARIANT)),
            other => other
                .scalar_arm()
                .and_then(|arm| VARIANT_ARMS.discriminant_of(arm))
                .map(|vt| VarType(vt as u16)),
        }
    }

    /// Short name of the payload shape, for messages
    pub fn kind(&self) -> &'static str {
        match self {
            VariantValue::Empty => "empty",
            VariantValue::Null => "null",
            VariantValue::I1(_) | VariantValue::I2(_) | VariantValue::I4(_) | VariantValue::I8(_) => "signed integer",
            VariantValue::UI1(_) | VariantValue::UI2(_) | VariantValue::UI4(_) | VariantValue::UI8(_) => {
                "unsigned integer"
            }
            VariantValue::Int(_) | VariantValue::UInt(_) => "machine integer",
            VariantValue::R4(_) | VariantValue::R8(_) => "float",
            VariantValue::Bool(_) => "bool",
            VariantValue::Error(_) => "scode",
            VariantValue::Date(_) => "date",
            VariantValue::Currency(_) => "currency",
            VariantValue::Decimal(_) => "decimal",
            VariantValue::Bstr(_) => "BSTR",
            VariantValue::Unknown(_) | VariantValue::Dispatch(_) => "interface",
            VariantValue::Record(_) => "record",
            VariantValue::Array(_) => "SAFEARRAY",
            VariantValue::Variant(_) => "variant reference",
            VariantValue::Ref(_) => "reference",
        }
    }
}

fn shape_matches(arm: Arm, vt: VarType, value: &VariantValue) -> bool {
    match (arm, value) {
        (Arm::Array, VariantValue::Array(sa)) => sa.as_ref().map_or(true, |sa| sa.element_type().base() == vt.base()),
        (arm, VariantValue::Ref(inner)) => match (arm.pointee(), inner) {
            (Some(pointee), Some(inner)) => shape_matches(pointee, vt, inner),
            (Some(_), None) => true,
            (None, _) => false,
        },
        (arm, value) => value.scalar_arm() == Some(arm),
    }
}

fn check_shape(vt: VarType, value: &VariantValue) -> Result<()> {
    if shape_matches(variant_arm(vt)?, vt, value) {
        Ok(())
    } else {
        Err(NdrError::violation(format!("{vt} cannot carry a {} value", value.kind())))
    }
}

fn write_unique_with<T: ?Sized>(
    w: &mut NdrWriter,
    value: Option<&T>,
    body: impl FnOnce(&mut NdrWriter, &T) -> Result<()>,
) -> Result<()> {
    write_referent(w, value.is_some());
    match value {
        Some(value) => body(w, value),
        None => Ok(()),
    }
}

fn read_unique_with<T>(
    r: &mut NdrReader<'_>,
    body: impl FnOnce(&mut NdrReader<'_>) -> Result<T>,
) -> Result<Option<T>> {
    if read_unique_referent(r)? {
        body(r).map(Some)
    } else {
        Ok(None)
    }
}

/// The payload is the only field after the tag, so each arm's pointee is
/// written right behind its referent.
impl NdrUnion for VariantValue {
    const ALIGN: usize = 8;

    fn discriminant(&self) -> u32 {
        self.natural_type().map_or(0, |vt| u32::from(vt.raw()))
    }

    fn encode_arm(&self, w: &mut NdrWriter) -> Result<()> {
        match self {
            VariantValue::Empty | VariantValue::Null => {}
            VariantValue::I1(v) => w.write_i8(*v),
            VariantValue::UI1(v) => w.write_u8(*v),
            VariantValue::I2(v) => w.write_i16(*v),
            VariantValue::UI2(v) => w.write_u16(*v),
            VariantValue::I4(v) | VariantValue::Int(v) => w.write_i32(*v),
            VariantValue::UI4(v) | VariantValue::UInt(v) | VariantValue::Error(v) => w.write_u32(*v),
            VariantValue::I8(v) => w.write_i64(*v),
            VariantValue::UI8(v) => w.write_u64(*v),
            VariantValue::R4(v) => w.write_f32(*v),
            VariantValue::R8(v) | VariantValue::Date(v) => w.write_f64(*v),
            VariantValue::Bool(v) => w.write_i16(if *v { -1 } else { 0 }),
            VariantValue::Currency(v) => v.ndr_encode(w)?,
            VariantValue::Decimal(v) => v.ndr_encode(w)?,
            VariantValue::Bstr(s) => write_unique_with(w, s.as_deref(), encode_bstr_body)?,
            VariantValue::Unknown(ip) | VariantValue::Dispatch(ip) => {
                write_unique_with(w, ip.as_ref(), |w, ip| w.encode_value(ip))?
            }
            VariantValue::Record(rec) => write_unique_with(w, rec.as_ref(), |w, rec| w.encode_value(rec))?,
            VariantValue::Array(sa) => write_unique_with(w, sa.as_ref(), |w, sa| w.encode_value(sa))?,
            VariantValue::Variant(v) => write_unique_with(w, v.as_deref(), |w, v| w.encode_value(v))?,
            VariantValue::Ref(inner) => write_unique_with(w, inner.as_deref(), |w, inner| inner.encode_arm(w))?,
        }
        Ok(())
    }

    fn decode_arm(discriminant: u32, r: &mut NdrReader<'_>) -> Result<Self> {
        let vt = VarType(u16::try_from(discriminant).map_err(|_| NdrError::UnsupportedDiscriminant {
            context: "VARIANT type",
            value: discriminant,
        })?);
        decode_value(variant_arm(vt)?, vt, r)
    }
}

fn decode_value(arm: Arm, vt: VarType, r: &mut NdrReader<'_>) -> Result<VariantValue> {
    Ok(match arm {
        Arm::Empty => VariantValue::Empty,
        Arm::Null => VariantValue::Null,
        Arm::I1 => VariantValue::I1(r.read_i8()?),
        Arm::UI1 => VariantValue::UI1(r.read_u8()?),
        Arm::I2 => VariantValue::I2(r.read_i16()?),
        Arm::UI2 => VariantValue::UI2(r.read_u16()?),
        Arm::I4 => VariantValue::I4(r.read_i32()?),
        Arm::UI4 => VariantValue::UI4(r.read_u32()?),
        Arm::I8 => VariantValue::I8(r.read_i64()?),
        Arm::UI8 => VariantValue::UI8(r.read_u64()?),
        Arm::Int => VariantValue::Int(r.read_i32()?),
        Arm::UInt => VariantValue::UInt(r.read_u32()?),
        Arm::R4 => VariantValue::R4(r.read_f32()?),
        Arm::R8 => VariantValue::R8(r.read_f64()?),
        Arm::Bool => VariantValue::Bool(r.read_i16()? != 0),
        Arm::Error => VariantValue::Error(r.read_u32()?),
        Arm::Date => VariantValue::Date(r.read_f64()?),
        Arm::Currency => VariantValue::Currency(r.decode_value()?),
        Arm::Decimal => VariantValue::Decimal(r.decode_value()?),
        Arm::Bstr => VariantValue::Bstr(read_unique_with(r, decode_bstr_body)?),
        Arm::Unknown => VariantValue::Unknown(read_unique_with(r, read_pointee::<InterfacePointer>)?),
        Arm::Dispatch => VariantValue::Dispatch(read_unique_with(r, read_pointee::<InterfacePointer>)?),
        Arm::Record => VariantValue::Record(read_unique_with(r, read_pointee::<Record>)?),
        Arm::Variant => VariantValue::Variant(read_unique_with(r, read_pointee::<Variant>)?.map(Box::new)),
        Arm::Array => VariantValue::Array(read_unique_with(r, |r| {
            let mut sa = read_pointee::<SafeArray>(r)?;
            sa.apply_element_hint(vt.base())?;
            Ok(sa)
        })?),
        Arm::RefBstr => decode_ref(Arm::Bstr, vt, r)?,
        Arm::RefUnknown => decode_ref(Arm::Unknown, vt, r)?,
        Arm::RefDispatch => decode_ref(Arm::Dispatch, vt, r)?,
        Arm::RefArray => decode_ref(Arm::Array, vt, r)?,
        Arm::RefVariant => decode_ref(Arm::Variant, vt, r)?,
    })
}

fn decode_ref(pointee: Arm, vt: VarType, r: &mut NdrReader<'_>) -> Result<VariantValue> {
    let inner = read_unique_with(r, |r| {
        r.enter_nested()?;
        let value = decode_value(pointee, vt, r);
        r.leave_nested();
        value.map(Box::new)
    })?;
    Ok(VariantValue::Ref(inner))
}

/// OLE Automation VARIANT
///
/// The tag and payload always agree; constructors reject mismatches.
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    vt: VarType,
    value: VariantValue,
}

impl Variant {
    /// Variant tagged with the value's natural type
    pub fn new(value: VariantValue) -> Result<Self> {
        let vt = value.natural_type().ok_or_else(|| {
            NdrError::violation(format!("a null {} needs an explicit VARTYPE", value.kind()))
        })?;
        check_shape(vt, &value)?;
        Ok(Self { vt, value })
    }

    /// Variant with an explicit tag, checked against the payload shape
    pub fn with_type(vt: impl Into<VarType>, value: VariantValue) -> Result<Self> {
        let vt = vt.into();
        check_shape(vt, &value)?;
        Ok(Self { vt, value })
    }

    /// BYREF variant of a value, adding the pointer layer where the wire has one
    pub fn byref(value: VariantValue) -> Result<Self> {
        let natural = value.natural_type().filter(|vt| !vt.is_byref()).ok_or_else(|| {
            NdrError::violation(format!("cannot pass a {} value by reference", value.kind()))
        })?;
        let vt = natural.with_byref();
        let value = match variant_arm(vt)?.pointee() {
            Some(_) => VariantValue::Ref(Some(Box::new(value))),
            None => value,
        };
        Ok(Self { vt, value })
    }

    pub fn empty() -> Self {
        Self {
            vt: VarType(VT_EMPTY),
            value: VariantValue::Empty,
        }
    }

    pub fn null() -> Self {
        Self {
            vt: VarType(VT_NULL),
            value: VariantValue::Null,
        }
    }

    pub fn vt(&self) -> VarType {
        self.vt
    }

    pub fn value(&self) -> &VariantValue {
        &self.value
    }

    pub fn into_value(self) -> VariantValue {
        self.value
    }

    pub fn is_byref(&self) -> bool {
        self.vt.is_byref()
    }
}

impl Default for Variant {
    fn default() -> Self {
        Self::empty()
    }
}

macro_rules! variant_from {
    ($($ty:ty => $vt:expr, $arm:ident;)+) => {
        $(
            impl From<$ty> for Variant {
                fn from(v: $ty) -> Self {
                    Self {
                        vt: VarType($vt),
                        value: VariantValue::$arm(v.into()),
                    }
                }
            }
        )+
    };
}

variant_from! {
    i8 => VT_I1, I1;
    u8 => VT_UI1, UI1;
    i16 => VT_I2, I2;
    u16 => VT_UI2, UI2;
    i32 => VT_I4, I4;
    u32 => VT_UI4, UI4;
    i64 => VT_I8, I8;
    u64 => VT_UI8, UI8;
    f32 => VT_R4, R4;
    f64 => VT_R8, R8;
    bool => VT_BOOL, Bool;
    Currency => VT_CY, Currency;
    Decimal => VT_DECIMAL, Decimal;
}

impl From<String> for Variant {
    fn from(s: String) -> Self {
        Self {
            vt: VarType(VT_BSTR),
            value: VariantValue::Bstr(Some(s)),
        }
    }
}

impl From<&str> for Variant {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<SafeArray> for Variant {
    fn from(sa: SafeArray) -> Self {
        Self {
            vt: sa.element_type().with_array(),
            value: VariantValue::Array(Some(sa)),
        }
    }
}

impl NdrEncode for Variant {
    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        w.align(8);
        let start = w.position();
        let size_slot = w.reserve_u32();
        w.write_u16(0);
        w.write_u16(self.vt.raw());
        encode_union(w, &self.value)?;
        w.align(8);

        let units = u32::try_from((w.position() - start) / 8).map_err(|_| NdrError::IntegerOverflow("VARIANT size"))?;
        w.patch_u32(size_slot, units);
        Ok(())
    }

    fn ndr_align() -> usize {
        8
    }
}

impl NdrDecode for Variant {
    fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
        r.align(8)?;
        let start = r.position();
        let cl_size = r.read_u32()?;
        let _reserved = r.read_u16()?;
        let vt = VarType(r.read_u16()?);
        trace!(%vt, cl_size, "variant");

        r.enter_nested()?;
        let value = decode_union::<VariantValue>(u32::from(vt.raw()), r);
        r.leave_nested();
        let value = value?;

        r.align_lenient(8);
        let units = (r.position() - start + 7) / 8;
        if units != cl_size as usize {
            debug!(%vt, cl_size, units, "VARIANT clSize does not match its content");
        }
        Ok(Self { vt, value })
    }

    fn ndr_align() -> usize {
        8
    }

    fn ndr_min_size() -> usize {
        8
    }
}
