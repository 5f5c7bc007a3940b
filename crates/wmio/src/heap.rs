//! Heaps, heap references and encoded strings
//!
//! Every class part, instance part and method part ends with a heap. Fixed
//! fields point into it with a 32-bit `HeapRef`:
//!
//! ```text
//! heapLength u32      # high bit always set on the wire
//! data[heapLength & 0x7FFFFFFF]
//! ```
//!
//! A reference with the high bit set is not an offset but an index into a
//! small dictionary of common qualifier names. `0xFFFFFFFF` means "none".
//!
//! Strings are stored as `EncodedString`: a flag byte (0 for 8-bit
//! characters, 1 for UTF-16LE) followed by the characters and a terminator of
//! the same width.

use midl_ndr::{decode_utf16, NdrContext, NdrError, NdrReader, NdrWriter, Result};

/// Heap reference meaning "no value"
pub(crate) const NO_REF: u32 = 0xFFFF_FFFF;

const DICTIONARY_BIT: u32 = 0x8000_0000;
const HEAP_LENGTH_BIT: u32 = 0x8000_0000;

const DICTIONARY: [&str; 11] = [
    "\"", "key", "\"\"", "read", "write", "volatile", "provider", "dynamic", "cimwin32", "DWORD", "CIMTYPE",
];

/// Dictionary reference for a well-known string
pub(crate) fn dictionary_ref(s: &str) -> Option<u32> {
    DICTIONARY
        .iter()
        .position(|entry| *entry == s)
        .map(|index| index as u32 | DICTIONARY_BIT)
}

fn dictionary_string(href: u32) -> Result<&'static str> {
    DICTIONARY
        .get((href & !DICTIONARY_BIT) as usize)
        .copied()
        .ok_or(NdrError::UnsupportedDiscriminant {
            context: "heap dictionary entry",
            value: href,
        })
}

/// Read an `EncodedString` at the reader position
pub(crate) fn read_encoded_string(r: &mut NdrReader<'_>) -> Result<String> {
    match r.read_u8()? {
        0 => {
            let mut s = String::new();
            loop {
                match r.read_u8()? {
                    0 => return Ok(s),
                    b => s.push(char::from(b)),
                }
            }
        }
        1 => {
            let mut units = Vec::new();
            loop {
                match r.read_u16_unaligned()? {
                    0 => return decode_utf16(units),
                    unit => units.push(unit),
                }
            }
        }
        flag => Err(NdrError::InvalidString(format!("encoded string flag {flag:#04x}"))),
    }
}

/// Write an `EncodedString`, 8-bit when the text is ASCII. Returns its size.
pub(crate) fn write_encoded_string(w: &mut NdrWriter, s: &str) -> usize {
    let start = w.position();
    if s.is_ascii() {
        w.write_u8(0);
        w.write_bytes(s.as_bytes());
        w.write_u8(0);
    } else {
        w.write_u8(1);
        for unit in s.encode_utf16() {
            w.write_u16_unaligned(unit);
        }
        w.write_u16_unaligned(0);
    }
    w.position() - start
}

/// Decoded view of a heap, with the context of the object it belongs to
#[derive(Clone, Copy)]
pub(crate) struct Heap<'a> {
    data: &'a [u8],
    ctx: NdrContext,
    depth: usize,
}

impl<'a> Heap<'a> {
    /// Read the heap length and contents
    pub fn read(r: &mut NdrReader<'a>, depth: usize) -> Result<Self> {
        let len = (r.read_u32_unaligned()? & !HEAP_LENGTH_BIT) as usize;
        r.ensure("heap", len)?;
        Ok(Self {
            data: r.read_bytes(len)?,
            ctx: *r.context(),
            depth,
        })
    }

    pub fn context(&self) -> NdrContext {
        self.ctx
    }

    /// Object nesting level of the part that owns this heap
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Reader positioned at a heap offset
    pub fn at(&self, what: &'static str, href: u32) -> Result<NdrReader<'a>> {
        if href & DICTIONARY_BIT != 0 {
            return Err(NdrError::violation(format!("{what} refers to the dictionary ({href:#010x})")));
        }
        let offset = href as usize;
        if offset > self.data.len() {
            return Err(NdrError::MalformedLength {
                what,
                needed: offset,
                remaining: self.data.len(),
            });
        }
        Ok(NdrReader::new(&self.data[offset..], self.ctx))
    }

    /// String behind a heap reference, resolving dictionary references
    pub fn string(&self, href: u32) -> Result<String> {
        if href & DICTIONARY_BIT != 0 {
            return dictionary_string(href).map(str::to_owned);
        }
        read_encoded_string(&mut self.at("heap string", href)?)
    }

    /// Like [`Heap::string`], with [`NO_REF`] meaning no string
    pub fn optional_string(&self, href: u32) -> Result<Option<String>> {
        if href == NO_REF {
            return Ok(None);
        }
        self.string(href).map(Some)
    }
}

/// Heap under construction
pub(crate) struct HeapWriter {
    w: NdrWriter,
}

impl HeapWriter {
    pub fn new() -> Self {
        Self {
            w: NdrWriter::new(NdrContext::new()),
        }
    }

    fn next_ref(&self) -> Result<u32> {
        u32::try_from(self.w.position())
            .ok()
            .filter(|offset| offset & DICTIONARY_BIT == 0)
            .ok_or(NdrError::IntegerOverflow("heap offset"))
    }

    /// Store a string value
    pub fn string(&mut self, s: &str) -> Result<u32> {
        let href = self.next_ref()?;
        write_encoded_string(&mut self.w, s);
        Ok(href)
    }

    /// Store a name, or reference the dictionary when it is a well-known one
    pub fn name(&mut self, s: &str) -> Result<u32> {
        match dictionary_ref(s) {
            Some(href) => Ok(href),
            None => self.string(s),
        }
    }

    pub fn optional_name(&mut self, s: Option<&str>) -> Result<u32> {
        match s {
            Some(s) => self.name(s),
            None => Ok(NO_REF),
        }
    }

    /// Store an already encoded structure
    pub fn bytes(&mut self, data: &[u8]) -> Result<u32> {
        let href = self.next_ref()?;
        self.w.write_bytes(data);
        Ok(href)
    }

    /// Write the heap length and contents at the end of a part
    pub fn finish(self, w: &mut NdrWriter) -> Result<()> {
        let data = self.w.into_bytes();
        let len = u32::try_from(data.len())
            .ok()
            .filter(|len| len & HEAP_LENGTH_BIT == 0)
            .ok_or(NdrError::IntegerOverflow("heap length"))?;
        w.write_u32_unaligned(len | HEAP_LENGTH_BIT);
        w.write_bytes(&data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(bytes: &[u8]) -> NdrReader<'_> {
        NdrReader::new(bytes, NdrContext::new())
    }

    #[test]
    fn test_encoded_strings() {
        let mut w = NdrWriter::new(NdrContext::new());
        assert_eq!(write_encoded_string(&mut w, "Name"), 6);
        assert_eq!(write_encoded_string(&mut w, "n\u{e9}"), 7);
        let bytes = w.into_bytes();
        assert_eq!(&bytes[..6], &[0, b'N', b'a', b'm', b'e', 0]);
        assert_eq!(&bytes[6..], &[1, b'n', 0, 0xE9, 0, 0, 0]);

        let mut r = reader(&bytes);
        assert_eq!(read_encoded_string(&mut r).unwrap(), "Name");
        assert_eq!(read_encoded_string(&mut r).unwrap(), "n\u{e9}");
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_encoded_string_errors() {
        let err = read_encoded_string(&mut reader(&[0, b'a', b'b'])).unwrap_err();
        assert!(matches!(err, NdrError::MalformedLength { .. }));
        let err = read_encoded_string(&mut reader(&[2, 0])).unwrap_err();
        assert!(matches!(err, NdrError::InvalidString(_)));
    }

    #[test]
    fn test_heap_strings_and_dictionary() {
        let mut heap = HeapWriter::new();
        assert_eq!(heap.name("key").unwrap(), 0x8000_0001);
        assert_eq!(heap.name("CIMTYPE").unwrap(), 0x8000_000A);
        assert_eq!(heap.optional_name(None).unwrap(), NO_REF);
        let name = heap.name("Handle").unwrap();
        let blob = heap.bytes(&[9, 9]).unwrap();
        assert_eq!((name, blob), (0, 8));

        let mut w = NdrWriter::new(NdrContext::new());
        heap.finish(&mut w).unwrap();
        let bytes = w.into_bytes();
        assert_eq!(&bytes[..4], &[10, 0, 0, 0x80]);

        let mut r = reader(&bytes);
        let heap = Heap::read(&mut r, 0).unwrap();
        assert_eq!(heap.string(0).unwrap(), "Handle");
        assert_eq!(heap.string(0x8000_0001).unwrap(), "key");
        assert_eq!(heap.optional_string(NO_REF).unwrap(), None);
        assert_eq!(heap.at("blob", 8).unwrap().read_u8().unwrap(), 9);
        assert!(heap.string(0x8000_0040).unwrap_err().is_unsupported());
        assert!(matches!(heap.at("blob", 11), Err(NdrError::MalformedLength { .. })));
    }
}
