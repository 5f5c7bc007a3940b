//! NDR pointer types
//!
//! NDR supports three pointer semantics:
//!
//! - Reference (`[ref]`): Non-null. At top level it has no wire representation
//!   and the data follows inline ([`RefPtr`]); embedded in a structure it is a
//!   non-zero referent word with the data deferred ([`EmbeddedRef`]).
//! - Unique (`[unique]`): Nullable, 4-byte referent ID, no aliasing
//! - Full (`[ptr]`): Nullable, 4-byte referent ID, aliasing allowed
//!
//! Pointee bodies are written by the deferred phase of the codec traits, so a
//! structure's pointees always follow all of its inline fields, depth first.

use crate::{NdrDecode, NdrEncode, NdrError, NdrReader, NdrWriter, Result};
use std::any::TypeId;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, OnceLock};

/// Trait for NDR pointer types
pub trait NdrPtr {
    type Target;

    /// Check if the pointer is null
    fn is_null(&self) -> bool;

    /// Get the inner value, if any
    fn get(&self) -> Option<&Self::Target>;

    /// Get a mutable reference to the inner value, if any
    fn get_mut(&mut self) -> Option<&mut Self::Target>;
}

/// Write the referent word of a unique or embedded reference pointer:
/// a fresh id when the pointee is present, 0 otherwise
pub fn write_referent(w: &mut NdrWriter, present: bool) {
    let id = if present { w.referents().allocate() } else { 0 };
    w.write_u32(id);
}

/// Read the referent word of a unique pointer, returning whether a pointee follows
pub fn read_unique_referent(r: &mut NdrReader<'_>) -> Result<bool> {
    let id = r.read_u32()?;
    if id == 0 {
        return Ok(false);
    }
    r.referents().claim_exclusive(id, "unique")?;
    Ok(true)
}

/// Read the referent word of an embedded reference pointer
pub fn read_ref_referent(r: &mut NdrReader<'_>) -> Result<()> {
    let id = r.read_u32()?;
    if id == 0 {
        return Err(NdrError::violation("null reference pointer"));
    }
    r.referents().claim_exclusive(id, "reference")
}

/// Decode one pointee (inline and deferred) one nesting level down
pub fn read_pointee<T: NdrDecode>(r: &mut NdrReader<'_>) -> Result<T> {
    r.enter_nested()?;
    let value = r.decode_value::<T>();
    r.leave_nested();
    value
}

/// Reference pointer - non-null, data follows inline
///
/// The `[ref]` attribute in MIDL on a top-level parameter. The pointer itself is
/// not transmitted; the pointee data is always present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefPtr<T>(pub T);

impl<T> RefPtr<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: Default> Default for RefPtr<T> {
    fn default() -> Self {
        Self(T::default())
    }
}

impl<T> Deref for RefPtr<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> DerefMut for RefPtr<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<T> NdrPtr for RefPtr<T> {
    type Target = T;

    fn is_null(&self) -> bool {
        false
    }

    fn get(&self) -> Option<&T> {
        Some(&self.0)
    }

    fn get_mut(&mut self) -> Option<&mut T> {
        Some(&mut self.0)
    }
}

impl<T: NdrEncode> NdrEncode for RefPtr<T> {
    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        // Reference pointers have no wire representation - just encode the data
        self.0.ndr_encode(w)
    }

    fn ndr_encode_deferred(&self, w: &mut NdrWriter) -> Result<()> {
        self.0.ndr_encode_deferred(w)
    }

    fn ndr_align() -> usize {
        T::ndr_align()
    }
}

impl<T: NdrDecode> NdrDecode for RefPtr<T> {
    fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
        Ok(Self(T::ndr_decode(r)?))
    }

    fn ndr_decode_deferred(&mut self, r: &mut NdrReader<'_>) -> Result<()> {
        self.0.ndr_decode_deferred(r)
    }

    fn ndr_align() -> usize {
        T::ndr_align()
    }

    fn ndr_min_size() -> usize {
        T::ndr_min_size()
    }
}

/// Reference pointer embedded in a structure or array
///
/// Transmitted as a non-zero referent ID with the pointee deferred. A zero ID on
/// the wire is rejected.
#[derive(Clone, PartialEq, Eq)]
pub struct EmbeddedRef<T> {
    // None only between the inline and deferred decode passes
    value: Option<Box<T>>,
}

impl<T> EmbeddedRef<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: Some(Box::new(value)),
        }
    }

    pub fn into_inner(self) -> Option<T> {
        self.value.map(|b| *b)
    }
}

impl<T: fmt::Debug> fmt::Debug for EmbeddedRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EmbeddedRef").field(&self.value).finish()
    }
}

impl<T> NdrPtr for EmbeddedRef<T> {
    type Target = T;

    fn is_null(&self) -> bool {
        false
    }

    fn get(&self) -> Option<&T> {
        self.value.as_deref()
    }

    fn get_mut(&mut self) -> Option<&mut T> {
        self.value.as_deref_mut()
    }
}

impl<T: NdrEncode> NdrEncode for EmbeddedRef<T> {
    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        if self.value.is_none() {
            return Err(NdrError::violation("reference pointer without a pointee"));
        }
        write_referent(w, true);
        Ok(())
    }

    fn ndr_encode_deferred(&self, w: &mut NdrWriter) -> Result<()> {
        match &self.value {
            Some(value) => w.encode_value(value.as_ref()),
            None => Ok(()),
        }
    }

    fn ndr_align() -> usize {
        4
    }
}

impl<T: NdrDecode> NdrDecode for EmbeddedRef<T> {
    fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
        read_ref_referent(r)?;
        Ok(Self { value: None })
    }

    fn ndr_decode_deferred(&mut self, r: &mut NdrReader<'_>) -> Result<()> {
        if self.value.is_none() {
            self.value = Some(Box::new(read_pointee::<T>(r)?));
        }
        Ok(())
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_min_size() -> usize {
        4
    }
}

/// Unique pointer - nullable, no aliasing
///
/// The `[unique]` attribute in MIDL. Encoded as:
/// - 4-byte referent ID (0 = null, non-zero = valid, never reused in a call)
/// - If non-null, pointee data follows in the deferred phase
#[derive(Clone)]
pub struct UniquePtr<T> {
    value: Option<Box<T>>,
    // set between the inline and deferred decode passes
    pending: bool,
}

impl<T> UniquePtr<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: Some(Box::new(value)),
            pending: false,
        }
    }

    pub fn null() -> Self {
        Self {
            value: None,
            pending: false,
        }
    }

    pub fn from_option(opt: Option<T>) -> Self {
        opt.map_or_else(Self::null, Self::new)
    }

    pub fn into_option(self) -> Option<T> {
        self.value.map(|b| *b)
    }

    pub fn as_ref(&self) -> Option<&T> {
        self.value.as_deref()
    }

    pub fn as_mut(&mut self) -> Option<&mut T> {
        self.value.as_deref_mut()
    }
}

impl<T> Default for UniquePtr<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> From<Option<T>> for UniquePtr<T> {
    fn from(opt: Option<T>) -> Self {
        Self::from_option(opt)
    }
}

impl<T: PartialEq> PartialEq for UniquePtr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T: Eq> Eq for UniquePtr<T> {}

impl<T: fmt::Debug> fmt::Debug for UniquePtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("UniquePtr").field(&self.value).finish()
    }
}

impl<T> NdrPtr for UniquePtr<T> {
    type Target = T;

    fn is_null(&self) -> bool {
        self.value.is_none() && !self.pending
    }

    fn get(&self) -> Option<&T> {
        self.value.as_deref()
    }

    fn get_mut(&mut self) -> Option<&mut T> {
        self.value.as_deref_mut()
    }
}

impl<T: NdrEncode> NdrEncode for UniquePtr<T> {
    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        write_referent(w, self.value.is_some());
        Ok(())
    }

    fn ndr_encode_deferred(&self, w: &mut NdrWriter) -> Result<()> {
        match &self.value {
            Some(value) => w.encode_value(value.as_ref()),
            None => Ok(()),
        }
    }

    fn ndr_align() -> usize {
        4 // For referent ID
    }
}

impl<T: NdrDecode> NdrDecode for UniquePtr<T> {
    fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
        Ok(Self {
            value: None,
            pending: read_unique_referent(r)?,
        })
    }

    fn ndr_decode_deferred(&mut self, r: &mut NdrReader<'_>) -> Result<()> {
        if std::mem::take(&mut self.pending) {
            self.value = Some(Box::new(read_pointee::<T>(r)?));
        }
        Ok(())
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_min_size() -> usize {
        4
    }
}

/// Full pointer - nullable, aliasing allowed
///
/// The `[ptr]` attribute in MIDL. Clones share the pointee, and two full
/// pointers sharing a pointee are written as the same referent ID with a single
/// body. Decoding restores the sharing, so decode followed by encode
/// reproduces the aliasing.
pub struct FullPtr<T> {
    cell: Option<Arc<OnceLock<T>>>,
    // referent whose body this pointer must read in the deferred pass
    owned_referent: Option<u32>,
}

impl<T> FullPtr<T> {
    pub fn new(value: T) -> Self {
        Self {
            cell: Some(Arc::new(OnceLock::from(value))),
            owned_referent: None,
        }
    }

    pub fn null() -> Self {
        Self {
            cell: None,
            owned_referent: None,
        }
    }

    pub fn from_option(opt: Option<T>) -> Self {
        opt.map_or_else(Self::null, Self::new)
    }

    pub fn as_ref(&self) -> Option<&T> {
        self.cell.as_ref().and_then(|cell| cell.get())
    }

    /// True when both pointers are null or share one pointee
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.cell, &other.cell) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    fn site(&self) -> usize {
        self as *const Self as usize
    }
}

impl<T> Clone for FullPtr<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            owned_referent: None,
        }
    }
}

impl<T> Default for FullPtr<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> From<Option<T>> for FullPtr<T> {
    fn from(opt: Option<T>) -> Self {
        Self::from_option(opt)
    }
}

impl<T: PartialEq> PartialEq for FullPtr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.as_ref() == other.as_ref()
    }
}

impl<T: fmt::Debug> fmt::Debug for FullPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FullPtr").field(&self.as_ref()).finish()
    }
}

impl<T> NdrPtr for FullPtr<T> {
    type Target = T;

    fn is_null(&self) -> bool {
        self.cell.is_none()
    }

    fn get(&self) -> Option<&T> {
        self.as_ref()
    }

    /// Only available while the pointee is not shared
    fn get_mut(&mut self) -> Option<&mut T> {
        self.cell.as_mut().and_then(Arc::get_mut).and_then(OnceLock::get_mut)
    }
}

impl<T: NdrEncode + 'static> NdrEncode for FullPtr<T> {
    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        let Some(cell) = &self.cell else {
            w.write_u32(0);
            return Ok(());
        };
        if cell.get().is_none() {
            return Err(NdrError::violation("full pointer to an unfilled pointee"));
        }
        let target = (TypeId::of::<T>(), Arc::as_ptr(cell) as *const () as usize);
        let id = w.referents().full_referent(target, self.site());
        w.write_u32(id);
        Ok(())
    }

    fn ndr_encode_deferred(&self, w: &mut NdrWriter) -> Result<()> {
        let Some(cell) = &self.cell else {
            return Ok(());
        };
        let target = (TypeId::of::<T>(), Arc::as_ptr(cell) as *const () as usize);
        let id = w.referents().full_referent(target, self.site());
        if w.referents().take_full_body(id, self.site()) {
            if let Some(value) = cell.get() {
                w.encode_value(value)?;
            }
        }
        Ok(())
    }

    fn ndr_align() -> usize {
        4
    }
}

impl<T: NdrDecode + 'static> NdrDecode for FullPtr<T> {
    fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
        let id = r.read_u32()?;
        if id == 0 {
            return Ok(Self::null());
        }
        let claim = r.referents().claim_full::<T>(id)?;
        Ok(Self {
            cell: Some(claim.cell),
            owned_referent: claim.owner.then_some(id),
        })
    }

    fn ndr_decode_deferred(&mut self, r: &mut NdrReader<'_>) -> Result<()> {
        let (Some(id), Some(cell)) = (self.owned_referent.take(), &self.cell) else {
            return Ok(());
        };
        r.referents().begin_body(id);
        let value = read_pointee::<T>(r)?;
        r.referents().end_body(id);
        cell.set(value).map_err(|_| NdrError::AliasMismatch {
            referent: id,
            reason: "received a second body",
        })
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_min_size() -> usize {
        4
    }
}
