//! NDR array types
//!
//! NDR supports several array types:
//!
//! - Fixed arrays: size known at compile time
//! - Conformant arrays: size determined at runtime, transmitted as prefix
//! - Varying arrays: subset of elements transmitted
//! - Conformant varying arrays: both conformant and varying
//! - Multi-dimensional conformant arrays: one conformance word per dimension
//!
//! Element pointees are deferred to after the last element, so an array of
//! unique pointers is written as all referent ids followed by all pointees.

use crate::{NdrDecode, NdrEncode, NdrError, NdrReader, NdrWriter, Result};
use std::marker::PhantomData;
use tracing::debug;

fn wire_count(what: &'static str, count: usize) -> Result<u32> {
    u32::try_from(count).map_err(|_| NdrError::IntegerOverflow(what))
}

/// Write conformance (max_count) words, e.g. hoisted to the start of a
/// conformant structure
pub fn write_conformance(w: &mut NdrWriter, counts: &[u32]) {
    for count in counts {
        w.write_u32(*count);
    }
}

/// Read `n` conformance words
pub fn read_conformance(r: &mut NdrReader<'_>, n: usize) -> Result<Vec<u32>> {
    r.check_count("conformance", n, 4)?;
    (0..n).map(|_| r.read_u32()).collect()
}

/// Pick the element count of a conformant structure that carries its length
/// twice: in a structure field and in the array's conformance word.
///
/// A non-zero structural field wins.
pub fn reconcile_count(what: &'static str, structural: u32, embedded: u32) -> u32 {
    if structural == 0 {
        return embedded;
    }
    if structural != embedded {
        debug!(what, structural, embedded, "length fields disagree, using the structure field");
    }
    structural
}

/// Write the inline part of each element
pub fn write_elements<T: NdrEncode>(w: &mut NdrWriter, elements: &[T]) -> Result<()> {
    if !elements.is_empty() {
        w.align(T::ndr_align());
    }
    for elem in elements {
        elem.ndr_encode(w)?;
    }
    Ok(())
}

/// Write the deferred pointees of each element, in element order
pub fn write_elements_deferred<T: NdrEncode>(w: &mut NdrWriter, elements: &[T]) -> Result<()> {
    for elem in elements {
        elem.ndr_encode_deferred(w)?;
    }
    Ok(())
}

/// Read the inline part of `count` elements, after checking the count
/// against the limits and the remaining buffer
pub fn read_elements<T: NdrDecode>(r: &mut NdrReader<'_>, what: &'static str, count: usize) -> Result<Vec<T>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    r.align(T::ndr_align())?;
    r.check_count(what, count, T::ndr_min_size())?;
    let mut elements = Vec::with_capacity(count);
    for _ in 0..count {
        elements.push(T::ndr_decode(r)?);
    }
    Ok(elements)
}

/// Read the deferred pointees of each element, in element order
pub fn read_elements_deferred<T: NdrDecode>(r: &mut NdrReader<'_>, elements: &mut [T]) -> Result<()> {
    for elem in elements {
        elem.ndr_decode_deferred(r)?;
    }
    Ok(())
}

/// Fixed-size array
///
/// Wire format: just the elements (no size prefix)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedArray<T, const N: usize> {
    pub elements: [T; N],
}

impl<T: Default + Copy, const N: usize> Default for FixedArray<T, N> {
    fn default() -> Self {
        Self {
            elements: [T::default(); N],
        }
    }
}

impl<T, const N: usize> FixedArray<T, N> {
    pub fn new(elements: [T; N]) -> Self {
        Self { elements }
    }
}

impl<T: NdrEncode, const N: usize> NdrEncode for FixedArray<T, N> {
    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        write_elements(w, &self.elements)
    }

    fn ndr_encode_deferred(&self, w: &mut NdrWriter) -> Result<()> {
        write_elements_deferred(w, &self.elements)
    }

    fn ndr_align() -> usize {
        T::ndr_align()
    }
}

impl<T: NdrDecode, const N: usize> NdrDecode for FixedArray<T, N> {
    fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
        let elements = read_elements::<T>(r, "fixed array", N)?;
        let elements: [T; N] = elements
            .try_into()
            .map_err(|_| NdrError::violation("fixed array length"))?;
        Ok(Self { elements })
    }

    fn ndr_decode_deferred(&mut self, r: &mut NdrReader<'_>) -> Result<()> {
        read_elements_deferred(r, &mut self.elements)
    }

    fn ndr_align() -> usize {
        T::ndr_align()
    }

    fn ndr_min_size() -> usize {
        T::ndr_min_size().saturating_mul(N)
    }
}

/// Conformant array - size determined at runtime
///
/// Wire format:
/// ```text
/// max_count: u32      # Maximum elements
/// elements[max_count] # Element data
/// ```
///
/// Note: In struct context, max_count may be at struct start while
/// elements are at end (conformant data comes last). Such structures use
/// [`write_conformance`] and [`write_elements`] directly.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConformantArray<T> {
    pub elements: Vec<T>,
}

impl<T> ConformantArray<T> {
    pub fn new(elements: Vec<T>) -> Self {
        Self { elements }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn into_vec(self) -> Vec<T> {
        self.elements
    }
}

impl<T> From<Vec<T>> for ConformantArray<T> {
    fn from(elements: Vec<T>) -> Self {
        Self { elements }
    }
}

impl<T: NdrEncode> NdrEncode for ConformantArray<T> {
    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        write_conformance(w, &[wire_count("conformant array", self.elements.len())?]);
        write_elements(w, &self.elements)
    }

    fn ndr_encode_deferred(&self, w: &mut NdrWriter) -> Result<()> {
        write_elements_deferred(w, &self.elements)
    }

    fn ndr_align() -> usize {
        4 // For max_count
    }
}

impl<T: NdrDecode> NdrDecode for ConformantArray<T> {
    fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
        let max_count = r.read_u32()? as usize;
        Ok(Self {
            elements: read_elements(r, "conformant array", max_count)?,
        })
    }

    fn ndr_decode_deferred(&mut self, r: &mut NdrReader<'_>) -> Result<()> {
        read_elements_deferred(r, &mut self.elements)
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_min_size() -> usize {
        4
    }
}

/// Varying array - subset of fixed array transmitted
///
/// Wire format:
/// ```text
/// offset: u32       # First transmitted element
/// actual_count: u32 # Number of transmitted elements
/// elements[actual_count]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaryingArray<T, const N: usize> {
    pub offset: u32,
    pub elements: Vec<T>,
    _marker: PhantomData<[T; N]>,
}

impl<T, const N: usize> Default for VaryingArray<T, N> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<T, const N: usize> VaryingArray<T, N> {
    pub fn new(elements: Vec<T>) -> Self {
        Self::with_offset(0, elements)
    }

    pub fn with_offset(offset: u32, elements: Vec<T>) -> Self {
        Self {
            offset,
            elements,
            _marker: PhantomData,
        }
    }
}

fn check_window(offset: u32, actual: u32, max: usize) -> Result<()> {
    let end = offset.checked_add(actual).ok_or(NdrError::IntegerOverflow("array window"))?;
    if end as usize > max {
        return Err(NdrError::violation(format!(
            "array window {offset}+{actual} exceeds bound {max}"
        )));
    }
    Ok(())
}

impl<T: NdrEncode, const N: usize> NdrEncode for VaryingArray<T, N> {
    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        let actual = wire_count("varying array", self.elements.len())?;
        check_window(self.offset, actual, N)?;
        w.write_u32(self.offset);
        w.write_u32(actual);
        write_elements(w, &self.elements)
    }

    fn ndr_encode_deferred(&self, w: &mut NdrWriter) -> Result<()> {
        write_elements_deferred(w, &self.elements)
    }

    fn ndr_align() -> usize {
        4
    }
}

impl<T: NdrDecode, const N: usize> NdrDecode for VaryingArray<T, N> {
    fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
        let offset = r.read_u32()?;
        let actual_count = r.read_u32()?;
        check_window(offset, actual_count, N)?;
        Ok(Self::with_offset(
            offset,
            read_elements(r, "varying array", actual_count as usize)?,
        ))
    }

    fn ndr_decode_deferred(&mut self, r: &mut NdrReader<'_>) -> Result<()> {
        read_elements_deferred(r, &mut self.elements)
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_min_size() -> usize {
        8
    }
}

/// Conformant varying array - size and subset determined at runtime
///
/// Wire format:
/// ```text
/// max_count: u32    # Maximum elements (conformance)
/// offset: u32       # First transmitted element
/// actual_count: u32 # Number of transmitted elements
/// elements[actual_count]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConformantVaryingArray<T> {
    pub max_count: u32,
    pub offset: u32,
    pub elements: Vec<T>,
}

impl<T> ConformantVaryingArray<T> {
    /// Array whose maximum count is its length
    pub fn new(elements: Vec<T>) -> Result<Self> {
        Ok(Self {
            max_count: wire_count("conformant varying array", elements.len())?,
            offset: 0,
            elements,
        })
    }

    pub fn with_max(max_count: u32, elements: Vec<T>) -> Self {
        Self {
            max_count,
            offset: 0,
            elements,
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl<T: NdrEncode> NdrEncode for ConformantVaryingArray<T> {
    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        let actual = wire_count("conformant varying array", self.elements.len())?;
        check_window(self.offset, actual, self.max_count as usize)?;
        w.write_u32(self.max_count);
        w.write_u32(self.offset);
        w.write_u32(actual);
        write_elements(w, &self.elements)
    }

    fn ndr_encode_deferred(&self, w: &mut NdrWriter) -> Result<()> {
        write_elements_deferred(w, &self.elements)
    }

    fn ndr_align() -> usize {
        4
    }
}

impl<T: NdrDecode> NdrDecode for ConformantVaryingArray<T> {
    fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
        let max_count = r.read_u32()?;
        let offset = r.read_u32()?;
        let actual_count = r.read_u32()?;
        check_window(offset, actual_count, max_count as usize)?;

        Ok(Self {
            max_count,
            offset,
            elements: read_elements(r, "conformant varying array", actual_count as usize)?,
        })
    }

    fn ndr_decode_deferred(&mut self, r: &mut NdrReader<'_>) -> Result<()> {
        read_elements_deferred(r, &mut self.elements)
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_min_size() -> usize {
        12
    }
}

/// Multi-dimensional conformant array
///
/// One conformance word per dimension, followed by the elements with the
/// last dimension varying fastest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConformantMatrix<T, const D: usize> {
    dims: [u32; D],
    elements: Vec<T>,
}

impl<T, const D: usize> ConformantMatrix<T, D> {
    /// Build a matrix; the element count must equal the product of `dims`
    pub fn new(dims: [u32; D], elements: Vec<T>) -> Result<Self> {
        let expected = element_count(&dims)?;
        if expected != elements.len() {
            return Err(NdrError::violation(format!(
                "matrix of {dims:?} needs {expected} elements, got {}",
                elements.len()
            )));
        }
        Ok(Self { dims, elements })
    }

    pub fn dims(&self) -> [u32; D] {
        self.dims
    }

    pub fn elements(&self) -> &[T] {
        &self.elements
    }

    /// Element at the given index, one coordinate per dimension
    pub fn get(&self, index: [u32; D]) -> Option<&T> {
        let mut flat = 0usize;
        for (i, dim) in index.iter().zip(self.dims.iter()) {
            if i >= dim {
                return None;
            }
            flat = flat * (*dim as usize) + *i as usize;
        }
        self.elements.get(flat)
    }
}

fn element_count(dims: &[u32]) -> Result<usize> {
    dims.iter().try_fold(1usize, |acc, d| {
        acc.checked_mul(*d as usize)
            .ok_or(NdrError::IntegerOverflow("matrix dimensions"))
    })
}

impl<T: NdrEncode, const D: usize> NdrEncode for ConformantMatrix<T, D> {
    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        write_conformance(w, &self.dims);
        write_elements(w, &self.elements)
    }

    fn ndr_encode_deferred(&self, w: &mut NdrWriter) -> Result<()> {
        write_elements_deferred(w, &self.elements)
    }

    fn ndr_align() -> usize {
        4
    }
}

impl<T: NdrDecode, const D: usize> NdrDecode for ConformantMatrix<T, D> {
    fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
        let mut dims = [0u32; D];
        for dim in &mut dims {
            *dim = r.read_u32()?;
        }
        let count = element_count(&dims)?;
        Ok(Self {
            dims,
            elements: read_elements(r, "conformant matrix", count)?,
        })
    }

    fn ndr_decode_deferred(&mut self, r: &mut NdrReader<'_>) -> Result<()> {
        read_elements_deferred(r, &mut self.elements)
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_min_size() -> usize {
        4 * D
    }
}
