//! Object blocks and encoding units
//!
//! ```text
//! encoding unit:  signature u32 = 0x12345678, objectEncodingLength u32, object block
//! object block:   flags u8, [decoration], class type | instance type
//! decoration:     server EncodedString, namespace EncodedString
//! class type:     class definition
//! instance type:  class part, instance part
//! ```

use crate::class::{ClassDefinition, ClassPart};
use crate::error::Result as WmioResult;
use crate::heap::{read_encoded_string, write_encoded_string};
use crate::instance::Instance;
use crate::provider::ClassSchema;
use crate::value::CimValue;
use crate::wire::{scratch, take, trailing, wire_len};
use bytes::Bytes;
use midl_ndr::{NdrContext, NdrError, NdrReader, NdrWriter, Result};
use std::sync::Arc;
use tracing::trace;

/// First word of an encoding unit
pub const ENCODING_SIGNATURE: u32 = 0x1234_5678;

const FLAG_CLASS: u8 = 0x01;
const FLAG_INSTANCE: u8 = 0x02;
const FLAG_DECORATED: u8 = 0x04;

/// Origin of an object: the server and namespace it came from
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Decoration {
    pub server: String,
    pub namespace: String,
}

impl Decoration {
    pub fn new(server: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            namespace: namespace.into(),
        }
    }

    fn read(r: &mut NdrReader<'_>) -> Result<Self> {
        Ok(Self {
            server: read_encoded_string(r)?,
            namespace: read_encoded_string(r)?,
        })
    }

    fn write(&self, w: &mut NdrWriter) {
        write_encoded_string(w, &self.server);
        write_encoded_string(w, &self.namespace);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectBody {
    Class(ClassDefinition),
    Instance(Instance),
}

/// A class or instance with its optional decoration
#[derive(Debug, Clone, PartialEq)]
pub struct ManagementObject {
    pub decoration: Option<Decoration>,
    pub body: ObjectBody,
}

impl ManagementObject {
    pub fn class(definition: ClassDefinition) -> Self {
        Self {
            decoration: None,
            body: ObjectBody::Class(definition),
        }
    }

    pub fn instance(instance: Instance) -> Self {
        Self {
            decoration: None,
            body: ObjectBody::Instance(instance),
        }
    }

    pub fn with_decoration(mut self, decoration: Decoration) -> Self {
        self.decoration = Some(decoration);
        self
    }

    pub fn class_definition(&self) -> Option<&ClassDefinition> {
        match &self.body {
            ObjectBody::Class(definition) => Some(definition),
            ObjectBody::Instance(_) => None,
        }
    }

    pub fn as_instance(&self) -> Option<&Instance> {
        match &self.body {
            ObjectBody::Instance(instance) => Some(instance),
            ObjectBody::Class(_) => None,
        }
    }

    pub fn is_instance(&self) -> bool {
        matches!(self.body, ObjectBody::Instance(_))
    }

    /// Name of the class, or of the instance's class
    pub fn class_name(&self) -> Option<&str> {
        match &self.body {
            ObjectBody::Class(definition) => definition.name(),
            ObjectBody::Instance(instance) => instance.class_name(),
        }
    }

    /// Effective property value of an instance
    pub fn value(&self, name: &str) -> Option<&CimValue> {
        self.as_instance()?.value(name)
    }

    /// Decode one encoding unit
    pub fn decode(buf: &[u8]) -> WmioResult<Self> {
        Self::decode_with(buf, NdrContext::new())
    }

    pub fn decode_with(buf: &[u8], ctx: NdrContext) -> WmioResult<Self> {
        let mut r = NdrReader::new(buf, ctx);
        let signature = r.read_u32_unaligned()?;
        if signature != ENCODING_SIGNATURE {
            return Err(NdrError::violation(format!("encoding signature {signature:#010x}")).into());
        }
        let len = r.read_u32_unaligned()?;
        let block = take(&mut r, "object block", len)?;
        trailing("encoding unit", &r);
        Ok(Self::decode_block(block, ctx, 0)?)
    }

    /// Encode as one encoding unit
    pub fn encode(&self) -> WmioResult<Bytes> {
        let block = self.encode_block()?;
        let mut w = NdrWriter::with_capacity(NdrContext::new(), block.len() + 8);
        w.write_u32_unaligned(ENCODING_SIGNATURE);
        w.write_u32_unaligned(wire_len("object block", block.len())?);
        w.write_bytes(&block);
        Ok(w.into_bytes())
    }

    /// Decode an object block that carries its class
    pub(crate) fn decode_block(block: &[u8], ctx: NdrContext, depth: usize) -> Result<Self> {
        let mut r = NdrReader::new(block, ctx);
        let (flags, decoration) = read_header(&mut r)?;
        let body = match flags & (FLAG_CLASS | FLAG_INSTANCE) {
            FLAG_CLASS => ObjectBody::Class(ClassDefinition::read(&mut r, depth)?),
            FLAG_INSTANCE => {
                let class = Arc::new(ClassSchema::new(None, ClassPart::read(&mut r, depth)?));
                ObjectBody::Instance(Instance::read(&mut r, class, depth)?)
            }
            _ => {
                return Err(NdrError::violation(format!(
                    "object flags {flags:#04x} mark neither a class nor an instance"
                )))
            }
        };
        trailing("object block", &r);
        let object = Self { decoration, body };
        trace!(class = ?object.class_name(), instance = object.is_instance(), "object block");
        Ok(object)
    }

    pub(crate) fn encode_block(&self) -> Result<Bytes> {
        let mut w = scratch();
        self.write_header(&mut w);
        match &self.body {
            ObjectBody::Class(definition) => definition.write(&mut w)?,
            ObjectBody::Instance(instance) => {
                instance.class().class().write(&mut w)?;
                instance.write(&mut w)?;
            }
        }
        Ok(w.into_bytes())
    }

    /// Decode an instance whose class part was left out, against `class`
    pub(crate) fn decode_elided(body: &[u8], ctx: NdrContext, class: Arc<ClassSchema>) -> Result<Self> {
        let mut r = NdrReader::new(body, ctx);
        let (flags, decoration) = read_header(&mut r)?;
        if flags & (FLAG_CLASS | FLAG_INSTANCE) != FLAG_INSTANCE {
            return Err(NdrError::violation(format!(
                "object flags {flags:#04x} do not mark an instance"
            )));
        }
        let instance = Instance::read(&mut r, class, 0)?;
        trailing("instance record", &r);
        Ok(Self {
            decoration,
            body: ObjectBody::Instance(instance),
        })
    }

    /// Encode an instance without its class part
    pub(crate) fn encode_elided(&self) -> Result<Bytes> {
        let ObjectBody::Instance(instance) = &self.body else {
            return Err(NdrError::violation("only instances may omit their class"));
        };
        let mut w = scratch();
        self.write_header(&mut w);
        instance.write(&mut w)?;
        Ok(w.into_bytes())
    }

    fn write_header(&self, w: &mut NdrWriter) {
        let mut flags = match self.body {
            ObjectBody::Class(_) => FLAG_CLASS,
            ObjectBody::Instance(_) => FLAG_INSTANCE,
        };
        if self.decoration.is_some() {
            flags |= FLAG_DECORATED;
        }
        w.write_u8(flags);
        if let Some(decoration) = &self.decoration {
            decoration.write(w);
        }
    }
}

fn read_header(r: &mut NdrReader<'_>) -> Result<(u8, Option<Decoration>)> {
    let flags = r.read_u8()?;
    let decoration = if flags & FLAG_DECORATED != 0 {
        Some(Decoration::read(r)?)
    } else {
        None
    };
    Ok((flags, decoration))
}

impl From<ClassDefinition> for ManagementObject {
    fn from(definition: ClassDefinition) -> Self {
        Self::class(definition)
    }
}

impl From<Instance> for ManagementObject {
    fn from(instance: Instance) -> Self {
        Self::instance(instance)
    }
}
