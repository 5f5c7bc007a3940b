//! Packed framing helpers shared by the object parts

use midl_ndr::{NdrContext, NdrError, NdrReader, NdrWriter, Result};
use tracing::debug;

/// Read `size` raw bytes after checking they are present
pub(crate) fn take<'a>(r: &mut NdrReader<'a>, what: &'static str, size: u32) -> Result<&'a [u8]> {
    let size = size as usize;
    r.ensure(what, size)?;
    r.read_bytes(size)
}

/// Read a block whose `EncodingLength` prefix counts itself
pub(crate) fn read_encoded<'a>(r: &mut NdrReader<'a>, what: &'static str) -> Result<&'a [u8]> {
    let len = r.read_u32_unaligned()?;
    let body = len
        .checked_sub(4)
        .ok_or_else(|| NdrError::violation(format!("{what} encoding length {len} is shorter than its header")))?;
    take(r, what, body)
}

/// Write a block behind an `EncodingLength` prefix that counts itself
pub(crate) fn write_encoded(w: &mut NdrWriter, what: &'static str, body: &[u8]) -> Result<()> {
    let len = body
        .len()
        .checked_add(4)
        .and_then(|len| u32::try_from(len).ok())
        .ok_or(NdrError::IntegerOverflow(what))?;
    w.write_u32_unaligned(len);
    w.write_bytes(body);
    Ok(())
}

/// Scratch writer for a part that is length-prefixed or stored on a heap
pub(crate) fn scratch() -> NdrWriter {
    NdrWriter::new(NdrContext::new())
}

pub(crate) fn wire_len(what: &'static str, len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| NdrError::IntegerOverflow(what))
}

/// Depth of an object embedded one level below `depth`
pub(crate) fn nested(ctx: &NdrContext, depth: usize) -> Result<usize> {
    if depth >= ctx.limits.max_depth {
        return Err(NdrError::violation(format!(
            "embedded objects nested deeper than {} levels",
            ctx.limits.max_depth
        )));
    }
    Ok(depth + 1)
}

pub(crate) fn trailing(what: &'static str, r: &NdrReader<'_>) {
    if r.remaining() > 0 {
        debug!(what, remaining = r.remaining(), "ignoring trailing bytes");
    }
}
