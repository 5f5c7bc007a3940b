//! SAFEARRAY wire codec
//!
//! Wire form (a conformant structure, `cDims` hoisted as the conformance word):
//!
//! ```text
//! max_count: u32          # == cDims
//! cDims: u16
//! fFeatures: u16
//! cbElements: u32
//! cLocks: u32             # ignored
//! sfType: u32             # SAFEARRAYUNION switch
//! <arm>                   # {Size, pointer[, iid]}
//! rgsabound[cDims]        # {cElements: u32, lLbound: i32}
//! <deferred element data>
//! ```
//!
//! The element type on the wire is the narrower `sfType`. A SAFEARRAY reached
//! through a VARIANT learns its exact element VARTYPE from the variant tag.

use crate::blobs::{decode_bstr_body, encode_bstr_body};
use crate::vartype::*;
use crate::{InterfacePointer, Record, Variant};
use midl_ndr::{
    read_elements, read_pointee, read_ref_referent, read_unique_referent, reconcile_count, write_conformance,
    write_elements, write_referent, ArmTable, NdrDecode, NdrEncode, NdrError, NdrReader, NdrUuid, NdrWriter, Result,
};
use tracing::{debug, trace};

/// SAFEARRAY feature flags (`fFeatures`)
pub mod fadf {
    pub const AUTO: u16 = 0x0001;
    pub const STATIC: u16 = 0x0002;
    pub const EMBEDDED: u16 = 0x0004;
    pub const FIXEDSIZE: u16 = 0x0010;
    pub const RECORD: u16 = 0x0020;
    pub const HAVEIID: u16 = 0x0040;
    pub const HAVEVARTYPE: u16 = 0x0080;
    pub const BSTR: u16 = 0x0100;
    pub const UNKNOWN: u16 = 0x0200;
    pub const DISPATCH: u16 = 0x0400;
    pub const VARIANT: u16 = 0x0800;
}

pub const SF_I1: u32 = 0x0010;
pub const SF_I2: u32 = 0x0002;
pub const SF_I4: u32 = 0x0003;
pub const SF_I8: u32 = 0x0014;
pub const SF_BSTR: u32 = 0x0008;
pub const SF_UNKNOWN: u32 = 0x000D;
pub const SF_DISPATCH: u32 = 0x0009;
pub const SF_VARIANT: u32 = 0x000C;
pub const SF_RECORD: u32 = 0x0024;
pub const SF_HAVEIID: u32 = 0x800D;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SfArm {
    Bstr,
    Unknown,
    Dispatch,
    Variant,
    Record,
    HaveIid,
    Byte,
    Word,
    DWord,
    Hyper,
}

const SF_ARMS: ArmTable<SfArm> = ArmTable::new(
    "SAFEARRAY sfType",
    &[
        (SF_BSTR, SfArm::Bstr),
        (SF_UNKNOWN, SfArm::Unknown),
        (SF_DISPATCH, SfArm::Dispatch),
        (SF_VARIANT, SfArm::Variant),
        (SF_RECORD, SfArm::Record),
        (SF_HAVEIID, SfArm::HaveIid),
        (SF_I1, SfArm::Byte),
        (SF_I2, SfArm::Word),
        (SF_I4, SfArm::DWord),
        (SF_I8, SfArm::Hyper),
    ],
    None,
);

/// Element VARTYPE to `sfType` arm
static ELEMENT_ARMS: &[(u16, SfArm)] = &[
    (VT_I1, SfArm::Byte),
    (VT_UI1, SfArm::Byte),
    (VT_I2, SfArm::Word),
    (VT_UI2, SfArm::Word),
    (VT_BOOL, SfArm::Word),
    (VT_I4, SfArm::DWord),
    (VT_UI4, SfArm::DWord),
    (VT_INT, SfArm::DWord),
    (VT_UINT, SfArm::DWord),
    (VT_R4, SfArm::DWord),
    (VT_ERROR, SfArm::DWord),
    (VT_I8, SfArm::Hyper),
    (VT_UI8, SfArm::Hyper),
    (VT_R8, SfArm::Hyper),
    (VT_CY, SfArm::Hyper),
    (VT_DATE, SfArm::Hyper),
    (VT_BSTR, SfArm::Bstr),
    (VT_VARIANT, SfArm::Variant),
    (VT_UNKNOWN, SfArm::Unknown),
    (VT_DISPATCH, SfArm::Dispatch),
    (VT_RECORD, SfArm::Record),
];

fn element_arm(vt: u16) -> Option<SfArm> {
    ELEMENT_ARMS.iter().find(|(t, _)| *t == vt).map(|(_, arm)| *arm)
}

/// True when `vt` may be the element type of a SAFEARRAY
pub fn is_element_type(vt: u16) -> bool {
    element_arm(vt).is_some()
}

fn compatible(vt: u16, arm: SfArm) -> bool {
    element_arm(vt) == Some(arm) || (arm == SfArm::HaveIid && matches!(vt, VT_UNKNOWN | VT_DISPATCH))
}

/// One dimension: element count and lower index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafeArrayBound {
    pub elements: u32,
    pub lower_bound: i32,
}

impl SafeArrayBound {
    pub fn new(elements: u32, lower_bound: i32) -> Self {
        Self { elements, lower_bound }
    }
}

impl NdrEncode for SafeArrayBound {
    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        w.write_u32(self.elements);
        w.write_i32(self.lower_bound);
        Ok(())
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for SafeArrayBound {
    fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
        Ok(Self {
            elements: r.read_u32()?,
            lower_bound: r.read_i32()?,
        })
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_min_size() -> usize {
        8
    }
}

/// Element storage, one variant per `sfType` arm
///
/// Scalar arms hold raw little-endian-agnostic integers of the arm width; the
/// array's element type says how to read them.
#[derive(Debug, Clone, PartialEq)]
pub enum SafeArrayData {
    Bstr(Vec<Option<String>>),
    Unknown(Vec<Option<InterfacePointer>>),
    Dispatch(Vec<Option<InterfacePointer>>),
    /// Every slot holds a variant; a null element pointer is rejected on decode
    /// and an empty slot is carried as [`Variant::empty`].
    Variant(Vec<Variant>),
    Record(Vec<Option<Record>>),
    HaveIid {
        iid: NdrUuid,
        items: Vec<Option<InterfacePointer>>,
    },
    Byte(Vec<u8>),
    Word(Vec<u16>),
    DWord(Vec<u32>),
    Hyper(Vec<u64>),
}

impl SafeArrayData {
    fn arm(&self) -> SfArm {
        match self {
            SafeArrayData::Bstr(_) => SfArm::Bstr,
            SafeArrayData::Unknown(_) => SfArm::Unknown,
            SafeArrayData::Dispatch(_) => SfArm::Dispatch,
            SafeArrayData::Variant(_) => SfArm::Variant,
            SafeArrayData::Record(_) => SfArm::Record,
            SafeArrayData::HaveIid { .. } => SfArm::HaveIid,
            SafeArrayData::Byte(_) => SfArm::Byte,
            SafeArrayData::Word(_) => SfArm::Word,
            SafeArrayData::DWord(_) => SfArm::DWord,
            SafeArrayData::Hyper(_) => SfArm::Hyper,
        }
    }

    fn empty(arm: SfArm, iid: Option<NdrUuid>) -> Self {
        match arm {
            SfArm::Bstr => SafeArrayData::Bstr(Vec::new()),
            SfArm::Unknown => SafeArrayData::Unknown(Vec::new()),
            SfArm::Dispatch => SafeArrayData::Dispatch(Vec::new()),
            SfArm::Variant => SafeArrayData::Variant(Vec::new()),
            SfArm::Record => SafeArrayData::Record(Vec::new()),
            SfArm::HaveIid => SafeArrayData::HaveIid {
                iid: iid.unwrap_or(NdrUuid::NIL),
                items: Vec::new(),
            },
            SfArm::Byte => SafeArrayData::Byte(Vec::new()),
            SfArm::Word => SafeArrayData::Word(Vec::new()),
            SfArm::DWord => SafeArrayData::DWord(Vec::new()),
            SfArm::Hyper => SafeArrayData::Hyper(Vec::new()),
        }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        match self {
            SafeArrayData::Bstr(v) => v.len(),
            SafeArrayData::Unknown(v) | SafeArrayData::Dispatch(v) => v.len(),
            SafeArrayData::HaveIid { items, .. } => items.len(),
            SafeArrayData::Variant(v) => v.len(),
            SafeArrayData::Record(v) => v.len(),
            SafeArrayData::Byte(v) => v.len(),
            SafeArrayData::Word(v) => v.len(),
            SafeArrayData::DWord(v) => v.len(),
            SafeArrayData::Hyper(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sf_type(&self) -> u32 {
        match self.arm() {
            SfArm::Bstr => SF_BSTR,
            SfArm::Unknown => SF_UNKNOWN,
            SfArm::Dispatch => SF_DISPATCH,
            SfArm::Variant => SF_VARIANT,
            SfArm::Record => SF_RECORD,
            SfArm::HaveIid => SF_HAVEIID,
            SfArm::Byte => SF_I1,
            SfArm::Word => SF_I2,
            SfArm::DWord => SF_I4,
            SfArm::Hyper => SF_I8,
        }
    }

    /// `cbElements` for this arm, with 32-bit interface and string pointers
    fn element_size(&self) -> u32 {
        match self.arm() {
            SfArm::Byte => 1,
            SfArm::Word => 2,
            SfArm::DWord | SfArm::Bstr | SfArm::Unknown | SfArm::Dispatch | SfArm::HaveIid => 4,
            SfArm::Hyper => 8,
            SfArm::Variant => 16,
            SfArm::Record => 0,
        }
    }
}

fn element_count(bounds: &[SafeArrayBound]) -> Result<usize> {
    bounds.iter().try_fold(1usize, |acc, b| {
        acc.checked_mul(b.elements as usize)
            .ok_or(NdrError::IntegerOverflow("SAFEARRAY element count"))
    })
}

fn default_features(element_type: u16, data: &SafeArrayData) -> u16 {
    let kind = match element_type {
        VT_BSTR => fadf::BSTR,
        VT_UNKNOWN => fadf::UNKNOWN,
        VT_DISPATCH => fadf::DISPATCH,
        VT_VARIANT => fadf::VARIANT,
        VT_RECORD => fadf::RECORD,
        _ => fadf::HAVEVARTYPE,
    };
    match data {
        SafeArrayData::HaveIid { .. } => kind | fadf::HAVEIID,
        _ => kind,
    }
}

/// Element type assumed for an arm until a variant tag says otherwise
fn default_element_type(arm: SfArm, features: u16) -> u16 {
    match arm {
        SfArm::Bstr => VT_BSTR,
        SfArm::Unknown => VT_UNKNOWN,
        SfArm::Dispatch => VT_DISPATCH,
        SfArm::Variant => VT_VARIANT,
        SfArm::Record => VT_RECORD,
        SfArm::HaveIid if features & fadf::DISPATCH != 0 => VT_DISPATCH,
        SfArm::HaveIid => VT_UNKNOWN,
        SfArm::Byte => VT_UI1,
        SfArm::Word => VT_I2,
        SfArm::DWord => VT_I4,
        SfArm::Hyper => VT_I8,
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingData {
    size: u32,
    present: bool,
}

/// Bounded, typed, possibly multi-dimensional array
#[derive(Debug, Clone)]
pub struct SafeArray {
    features: u16,
    element_type: u16,
    bounds: Vec<SafeArrayBound>,
    data: SafeArrayData,
    // element data announced by the inline pass
    pending: Option<PendingData>,
}

macro_rules! scalar_vector {
    ($from:ident, $as:ident, $ty:ty, $vt:expr, $arm:ident, |$x:ident| $to:expr, |$y:ident| $back:expr) => {
        #[doc = concat!("One-dimensional `", stringify!($vt), "` array")]
        pub fn $from(lower_bound: i32, values: &[$ty]) -> Result<Self> {
            Self::vector($vt, lower_bound, SafeArrayData::$arm(values.iter().map(|&$x| $to).collect()))
        }

        #[doc = concat!("Elements of a `", stringify!($vt), "` array")]
        pub fn $as(&self) -> Option<Vec<$ty>> {
            match &self.data {
                SafeArrayData::$arm(raw) if self.element_type == $vt => Some(raw.iter().map(|&$y| $back).collect()),
                _ => None,
            }
        }
    };
}

impl SafeArray {
    /// Build an array; the element count must equal the product of the
    /// bound lengths and the data arm must suit `element_type`
    pub fn new(element_type: u16, bounds: Vec<SafeArrayBound>, data: SafeArrayData) -> Result<Self> {
        if bounds.is_empty() {
            return Err(NdrError::violation("SAFEARRAY needs at least one dimension"));
        }
        if bounds.len() > usize::from(u16::MAX) {
            return Err(NdrError::IntegerOverflow("SAFEARRAY dimensions"));
        }
        if !compatible(element_type, data.arm()) {
            return Err(NdrError::violation(format!(
                "{} elements cannot be stored as {:?}",
                VarType(element_type),
                data.arm()
            )));
        }
        let expected = element_count(&bounds)?;
        if expected != data.len() {
            return Err(NdrError::violation(format!(
                "SAFEARRAY bounds describe {expected} elements, data holds {}",
                data.len()
            )));
        }
        Ok(Self {
            features: default_features(element_type, &data),
            element_type,
            bounds,
            data,
            pending: None,
        })
    }

    /// One-dimensional array starting at `lower_bound`
    pub fn vector(element_type: u16, lower_bound: i32, data: SafeArrayData) -> Result<Self> {
        let elements = u32::try_from(data.len()).map_err(|_| NdrError::IntegerOverflow("SAFEARRAY length"))?;
        Self::new(element_type, vec![SafeArrayBound::new(elements, lower_bound)], data)
    }

    /// Replace the feature flags
    pub fn with_features(mut self, features: u16) -> Self {
        self.features = features;
        self
    }

    scalar_vector!(from_u8s, as_u8s, u8, VT_UI1, Byte, |v| v, |v| v);
    scalar_vector!(from_i8s, as_i8s, i8, VT_I1, Byte, |v| v as u8, |v| v as i8);
    scalar_vector!(from_i16s, as_i16s, i16, VT_I2, Word, |v| v as u16, |v| v as i16);
    scalar_vector!(from_u16s, as_u16s, u16, VT_UI2, Word, |v| v, |v| v);
    scalar_vector!(from_bools, as_bools, bool, VT_BOOL, Word, |v| if v { 0xFFFF } else { 0 }, |v| v != 0);
    scalar_vector!(from_i32s, as_i32s, i32, VT_I4, DWord, |v| v as u32, |v| v as i32);
    scalar_vector!(from_u32s, as_u32s, u32, VT_UI4, DWord, |v| v, |v| v);
    scalar_vector!(from_f32s, as_f32s, f32, VT_R4, DWord, |v| v.to_bits(), |v| f32::from_bits(v));
    scalar_vector!(from_i64s, as_i64s, i64, VT_I8, Hyper, |v| v as u64, |v| v as i64);
    scalar_vector!(from_u64s, as_u64s, u64, VT_UI8, Hyper, |v| v, |v| v);
    scalar_vector!(from_f64s, as_f64s, f64, VT_R8, Hyper, |v| v.to_bits(), |v| f64::from_bits(v));

    /// One-dimensional BSTR array; `None` entries are null strings
    pub fn from_strings(lower_bound: i32, values: Vec<Option<String>>) -> Result<Self> {
        Self::vector(VT_BSTR, lower_bound, SafeArrayData::Bstr(values))
    }

    pub fn as_strings(&self) -> Option<&[Option<String>]> {
        match &self.data {
            SafeArrayData::Bstr(v) => Some(v),
            _ => None,
        }
    }

    /// One-dimensional VARIANT array
    pub fn from_variants(lower_bound: i32, values: Vec<Variant>) -> Result<Self> {
        Self::vector(VT_VARIANT, lower_bound, SafeArrayData::Variant(values))
    }

    pub fn as_variants(&self) -> Option<&[Variant]> {
        match &self.data {
            SafeArrayData::Variant(v) => Some(v),
            _ => None,
        }
    }

    pub fn dims(&self) -> usize {
        self.bounds.len()
    }

    pub fn features(&self) -> u16 {
        self.features
    }

    /// Element VARTYPE (base type only)
    pub fn element_type(&self) -> VarType {
        VarType(self.element_type)
    }

    /// Bounds in wire order
    pub fn bounds(&self) -> &[SafeArrayBound] {
        &self.bounds
    }

    pub fn data(&self) -> &SafeArrayData {
        &self.data
    }

    pub fn into_data(self) -> SafeArrayData {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Narrow the element type using the tag of the enclosing VARIANT
    pub fn apply_element_hint(&mut self, element_type: u16) -> Result<()> {
        if !compatible(element_type, self.data.arm()) {
            return Err(NdrError::violation(format!(
                "variant says {} elements, SAFEARRAY carries {:?}",
                VarType(element_type),
                self.data.arm()
            )));
        }
        self.element_type = element_type;
        Ok(())
    }
}

impl PartialEq for SafeArray {
    fn eq(&self, other: &Self) -> bool {
        self.features == other.features
            && self.element_type == other.element_type
            && self.bounds == other.bounds
            && self.data == other.data
    }
}

fn write_pointer_elements<T>(
    w: &mut NdrWriter,
    items: &[Option<T>],
    mut body: impl FnMut(&mut NdrWriter, &T) -> Result<()>,
) -> Result<()> {
    for item in items {
        write_referent(w, item.is_some());
    }
    for item in items.iter().flatten() {
        body(w, item)?;
    }
    Ok(())
}

fn read_pointer_elements<T>(
    r: &mut NdrReader<'_>,
    count: usize,
    mut body: impl FnMut(&mut NdrReader<'_>) -> Result<T>,
) -> Result<Vec<Option<T>>> {
    r.check_count("SAFEARRAY element pointers", count, 4)?;
    let mut present = Vec::with_capacity(count);
    for _ in 0..count {
        present.push(read_unique_referent(r)?);
    }
    present
        .into_iter()
        .map(|p| if p { body(r).map(Some) } else { Ok(None) })
        .collect()
}

impl NdrEncode for SafeArray {
    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        let dims = u16::try_from(self.bounds.len()).map_err(|_| NdrError::IntegerOverflow("SAFEARRAY dimensions"))?;
        let size = u32::try_from(self.data.len()).map_err(|_| NdrError::IntegerOverflow("SAFEARRAY length"))?;

        write_conformance(w, &[u32::from(dims)]);
        w.write_u16(dims);
        w.write_u16(self.features);
        w.write_u32(self.data.element_size());
        w.write_u32(0); // cLocks

        // encapsulated SAFEARRAYUNION
        w.write_u32(self.data.sf_type());
        w.write_u32(size);
        write_referent(w, true);
        if let SafeArrayData::HaveIid { iid, .. } = &self.data {
            iid.ndr_encode(w)?;
        }

        write_elements(w, &self.bounds)
    }

    fn ndr_encode_deferred(&self, w: &mut NdrWriter) -> Result<()> {
        let len = u32::try_from(self.data.len()).map_err(|_| NdrError::IntegerOverflow("SAFEARRAY length"))?;
        write_conformance(w, &[len]);
        match &self.data {
            SafeArrayData::Bstr(items) => write_pointer_elements(w, items, |w, s| encode_bstr_body(w, s)),
            SafeArrayData::Unknown(items)
            | SafeArrayData::Dispatch(items)
            | SafeArrayData::HaveIid { items, .. } => write_pointer_elements(w, items, |w, ip| w.encode_value(ip)),
            SafeArrayData::Record(items) => write_pointer_elements(w, items, |w, rec| w.encode_value(rec)),
            SafeArrayData::Variant(items) => {
                for _ in items {
                    write_referent(w, true);
                }
                items.iter().try_for_each(|v| w.encode_value(v))
            }
            SafeArrayData::Byte(v) => write_elements(w, v),
            SafeArrayData::Word(v) => write_elements(w, v),
            SafeArrayData::DWord(v) => write_elements(w, v),
            SafeArrayData::Hyper(v) => write_elements(w, v),
        }
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for SafeArray {
    fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
        let conformance = r.read_u32()?;
        let dims = r.read_u16()?;
        if u32::from(dims) != conformance {
            return Err(NdrError::violation(format!(
                "SAFEARRAY conformance {conformance} does not match cDims {dims}"
            )));
        }
        if dims == 0 {
            return Err(NdrError::violation("SAFEARRAY without dimensions"));
        }
        let features = r.read_u16()?;
        let element_size = r.read_u32()?;
        let _locks = r.read_u32()?;

        let sf_type = r.read_u32()?;
        let arm = SF_ARMS.select(sf_type)?;
        let size = r.read_u32()?;
        let (present, iid) = match arm {
            SfArm::Byte | SfArm::Word | SfArm::DWord | SfArm::Hyper => (read_unique_referent(r)?, None),
            SfArm::HaveIid => {
                read_ref_referent(r)?;
                (true, Some(NdrUuid::ndr_decode(r)?))
            }
            _ => {
                read_ref_referent(r)?;
                (true, None)
            }
        };

        let bounds = read_elements::<SafeArrayBound>(r, "SAFEARRAY bounds", usize::from(dims))?;
        let expected = element_count(&bounds)?;
        if expected != size as usize || (!present && size != 0) {
            return Err(NdrError::violation(format!(
                "SAFEARRAY bounds describe {expected} elements, arm announces {size}"
            )));
        }

        let data = SafeArrayData::empty(arm, iid);
        if element_size != data.element_size() {
            debug!(element_size, expected = data.element_size(), "SAFEARRAY cbElements differs");
        }
        trace!(sf_type, dims, size, "SAFEARRAY");

        Ok(Self {
            features,
            element_type: default_element_type(arm, features),
            bounds,
            data,
            pending: Some(PendingData { size, present }),
        })
    }

    fn ndr_decode_deferred(&mut self, r: &mut NdrReader<'_>) -> Result<()> {
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };
        if !pending.present {
            return Ok(());
        }
        let max_count = r.read_u32()?;
        let count = reconcile_count("SAFEARRAY elements", pending.size, max_count) as usize;
        let expected = element_count(&self.bounds)?;
        if count != expected {
            return Err(NdrError::violation(format!(
                "SAFEARRAY bounds describe {expected} elements, data carries {count}"
            )));
        }

        match &mut self.data {
            SafeArrayData::Bstr(items) => *items = read_pointer_elements(r, count, decode_bstr_body)?,
            SafeArrayData::Unknown(items)
            | SafeArrayData::Dispatch(items)
            | SafeArrayData::HaveIid { items, .. } => {
                *items = read_pointer_elements(r, count, read_pointee::<InterfacePointer>)?
            }
            SafeArrayData::Record(items) => *items = read_pointer_elements(r, count, read_pointee::<Record>)?,
            SafeArrayData::Variant(items) => {
                *items = read_pointer_elements(r, count, read_pointee::<Variant>)?
                    .into_iter()
                    .map(|v| v.ok_or_else(|| NdrError::violation("null VARIANT in SAFEARRAY")))
                    .collect::<Result<_>>()?
            }
            SafeArrayData::Byte(v) => *v = read_elements(r, "SAFEARRAY bytes", count)?,
            SafeArrayData::Word(v) => *v = read_elements(r, "SAFEARRAY words", count)?,
            SafeArrayData::DWord(v) => *v = read_elements(r, "SAFEARRAY dwords", count)?,
            SafeArrayData::Hyper(v) => *v = read_elements(r, "SAFEARRAY hypers", count)?,
        }
        Ok(())
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_min_size() -> usize {
        28
    }
}
