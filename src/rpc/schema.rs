//! Static method schema consumed by the codec.
//!
//! A [`Schema`] maps each method id to the binary layout of its arguments
//! and of its result.  It is built once (normally by generated service
//! code, see [`crate::service`]) and never mutated afterwards.
//!
//! Primitive encodings, all little-endian:
//!
//! | Type        | Wire form                                   |
//! |-------------|---------------------------------------------|
//! | `i32`/enum  | 4 bytes, signed                             |
//! | `i64`       | 8 bytes, signed                             |
//! | `u32`/`u64` | 4 / 8 bytes                                 |
//! | `bool`      | 1 byte, 0 or 1                              |
//! | `f32`/`f64` | IEEE-754, 4 / 8 bytes                       |
//! | string      | `u16` byte length, then UTF-8               |
//! | optional    | 1-byte presence flag, then the value if 1   |
//! | struct      | fields in declaration order                 |
//! | list        | `u32` element count, then the elements      |

use std::collections::BTreeMap;
use std::time::Duration;

/// Binary layout of a single value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    I32,
    I64,
    U32,
    U64,
    Bool,
    F32,
    F64,
    /// Enumeration, carried as a 4-byte signed integer.
    Enum,
    Str,
    Optional(Box<FieldType>),
    Struct(Vec<Field>),
    List(Box<FieldType>),
}

impl FieldType {
    pub fn optional(inner: FieldType) -> Self {
        Self::Optional(Box::new(inner))
    }

    pub fn list(inner: FieldType) -> Self {
        Self::List(Box::new(inner))
    }

    /// Encoded size in bytes when it does not depend on the value.
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            Self::Bool => Some(1),
            Self::I32 | Self::U32 | Self::F32 | Self::Enum => Some(4),
            Self::I64 | Self::U64 | Self::F64 => Some(8),
            Self::Struct(fields) => fields.iter().map(|f| f.ty.fixed_size()).sum(),
            Self::Str | Self::Optional(_) | Self::List(_) => None,
        }
    }

    /// Short name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::Bool => "bool",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Enum => "enum",
            Self::Str => "string",
            Self::Optional(_) => "optional",
            Self::Struct(_) => "struct",
            Self::List(_) => "list",
        }
    }
}

/// A named field of a struct or a named method parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: FieldType,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Invocation style of a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    /// Request/response through `call`.
    Unary,
    /// Server push delivered to a subscriber.
    Stream,
}

/// Argument and result layout of one method.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodSchema {
    pub id: u8,
    pub name: String,
    pub kind: MethodKind,
    pub params: Vec<Field>,
    /// `None` for methods without a result (`void`).
    pub result: Option<FieldType>,
    /// Overrides the transport's default call timeout.
    pub timeout: Option<Duration>,
}

impl MethodSchema {
    pub fn unary(id: u8, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: MethodKind::Unary,
            params: Vec::new(),
            result: None,
            timeout: None,
        }
    }

    pub fn stream(id: u8, name: impl Into<String>) -> Self {
        Self {
            kind: MethodKind::Stream,
            ..Self::unary(id, name)
        }
    }

    pub fn param(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.params.push(Field::new(name, ty));
        self
    }

    pub fn returns(mut self, ty: FieldType) -> Self {
        self.result = Some(ty);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Immutable table of every method a peer exposes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    methods: BTreeMap<u8, MethodSchema>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a method; a later entry with the same id replaces the earlier.
    pub fn method(mut self, method: MethodSchema) -> Self {
        self.methods.insert(method.id, method);
        self
    }

    pub fn get(&self, id: u8) -> Option<&MethodSchema> {
        self.methods.get(&id)
    }

    pub fn methods(&self) -> impl Iterator<Item = &MethodSchema> {
        self.methods.values()
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}
