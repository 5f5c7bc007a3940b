//! Management object stream codec
//!
//! A batch carries many management objects in one buffer. Consecutive
//! instances of one class may omit the class part; the decoder resolves
//! them against the class definitions earlier in the same batch, falling
//! back to a host [`ClassProvider`].
//!
//! Objects are decoded down to typed property values, resolved against the
//! class part that describes them.
//!
//! ```
//! use std::sync::Arc;
//! use midl_ndr::NdrUuid;
//! use wmio::{CimType, CimValue, ClassDefinition, ClassPart, Instance, ObjectBatch, ObjectRecord, Property};
//!
//! let part = ClassPart::new(
//!     "Win32_Process",
//!     Vec::new(),
//!     Vec::new(),
//!     vec![Property::new("Name", CimType::STRING), Property::new("ProcessId", CimType::UINT32)],
//! )
//! .unwrap();
//! let class = ObjectRecord::class_definition(ClassDefinition::new(part));
//! let instance = Instance::new(Arc::clone(class.class()))
//!     .with_value("ProcessId", 4u32)
//!     .unwrap();
//! let id = NdrUuid::from_fields(1, 2, 3, [0; 8]);
//! let batch = ObjectBatch::new(vec![class, ObjectRecord::instance_without_class(id, instance)]);
//!
//! let decoded = ObjectBatch::decode(&batch.encode().unwrap()).unwrap();
//! assert_eq!(decoded, batch);
//! let process = decoded.instances().next().unwrap().object();
//! assert_eq!(process.value("ProcessId"), Some(&CimValue::Uint32(4)));
//! ```

mod batch;
mod class;
mod error;
mod heap;
mod instance;
mod object;
mod provider;
mod qualifier;
mod value;
mod wire;

pub use batch::{ObjectBatch, ObjectKind, ObjectRecord, SIGNATURE, VERSION};
pub use class::{ClassDefinition, ClassPart, Method, Property};
pub use error::{Result, WmioError};
pub use instance::Instance;
pub use object::{Decoration, ManagementObject, ObjectBody, ENCODING_SIGNATURE};
pub use provider::{ClassCache, ClassProvider, ClassSchema, NoClassProvider};
pub use qualifier::{find_qualifier, Flavor, Qualifier};
pub use value::{CimType, CimValue, PropertyValue, CIM_ARRAY, CIM_INHERITED};
