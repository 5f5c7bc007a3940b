//! NDR discriminated unions
//!
//! A union is a switch value plus the one arm it selects. Non-encapsulated
//! unions take the switch from elsewhere in the enclosing structure; an
//! encapsulated union carries it in front of the arm:
//!
//! ```text
//! switch: u32
//! <pad to the union alignment>
//! arm
//! ```
//!
//! The union as a whole aligns to its most-aligned arm, not to the arm that is
//! actually present.

use crate::{NdrDecode, NdrEncode, NdrError, NdrReader, NdrWriter, Result};

/// Immutable discriminant to arm mapping.
///
/// Several discriminants may select the same arm. When an arm is encoded its
/// canonical discriminant is the first entry that maps to it.
#[derive(Debug)]
pub struct ArmTable<A: 'static> {
    context: &'static str,
    arms: &'static [(u32, A)],
    default: Option<A>,
}

impl<A: Copy + PartialEq + 'static> ArmTable<A> {
    /// `context` names the union in `UnsupportedDiscriminant` errors
    pub const fn new(context: &'static str, arms: &'static [(u32, A)], default: Option<A>) -> Self {
        Self { context, arms, default }
    }

    /// Arm selected by a wire discriminant
    pub fn select(&self, discriminant: u32) -> Result<A> {
        self.arms
            .iter()
            .find(|(value, _)| *value == discriminant)
            .map(|(_, arm)| *arm)
            .or(self.default)
            .ok_or(NdrError::UnsupportedDiscriminant {
                context: self.context,
                value: discriminant,
            })
    }

    /// Canonical discriminant of an arm, if it has an explicit case
    pub fn discriminant_of(&self, arm: A) -> Option<u32> {
        self.arms.iter().find(|(_, a)| *a == arm).map(|(value, _)| *value)
    }

    pub fn context(&self) -> &'static str {
        self.context
    }
}

/// A union type whose arms are chosen by a u32 discriminant
pub trait NdrUnion: Sized {
    /// Alignment of the most-aligned arm
    const ALIGN: usize;

    /// Discriminant that selects the current arm
    fn discriminant(&self) -> u32;

    /// Write the inline part of the current arm
    fn encode_arm(&self, w: &mut NdrWriter) -> Result<()>;

    /// Write pointees deferred by the current arm
    fn encode_arm_deferred(&self, _w: &mut NdrWriter) -> Result<()> {
        Ok(())
    }

    /// Read the inline part of the arm selected by `discriminant`
    fn decode_arm(discriminant: u32, r: &mut NdrReader<'_>) -> Result<Self>;

    /// Read pointees deferred by the arm
    fn decode_arm_deferred(&mut self, _r: &mut NdrReader<'_>) -> Result<()> {
        Ok(())
    }
}

/// Write a non-encapsulated union; the caller has already written the switch
pub fn encode_union<U: NdrUnion>(w: &mut NdrWriter, value: &U) -> Result<()> {
    w.align(U::ALIGN);
    value.encode_arm(w)
}

/// Read a non-encapsulated union given the switch value read elsewhere
pub fn decode_union<U: NdrUnion>(discriminant: u32, r: &mut NdrReader<'_>) -> Result<U> {
    r.align(U::ALIGN)?;
    U::decode_arm(discriminant, r)
}

/// Encapsulated union: the u32 switch is transmitted in front of the arm
#[derive(Debug, Clone, PartialEq)]
pub struct Encapsulated<U>(pub U);

impl<U> Encapsulated<U> {
    pub fn into_inner(self) -> U {
        self.0
    }
}

impl<U: NdrUnion> NdrEncode for Encapsulated<U> {
    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        w.align(U::ALIGN.max(4));
        w.write_u32(self.0.discriminant());
        encode_union(w, &self.0)
    }

    fn ndr_encode_deferred(&self, w: &mut NdrWriter) -> Result<()> {
        self.0.encode_arm_deferred(w)
    }

    fn ndr_align() -> usize {
        U::ALIGN.max(4)
    }
}

impl<U: NdrUnion> NdrDecode for Encapsulated<U> {
    fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
        r.align(U::ALIGN.max(4))?;
        let discriminant = r.read_u32()?;
        Ok(Self(decode_union(discriminant, r)?))
    }

    fn ndr_decode_deferred(&mut self, r: &mut NdrReader<'_>) -> Result<()> {
        self.0.decode_arm_deferred(r)
    }

    fn ndr_align() -> usize {
        U::ALIGN.max(4)
    }

    fn ndr_min_size() -> usize {
        4
    }
}
