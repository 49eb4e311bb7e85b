//! Per-method binary codec.
//!
//! The [`Codec`] is a registry of [`MethodCodec`]s indexed by method id,
//! built once from a [`Schema`].  Each entry encodes the method's
//! *arguments* and decodes its *result*; the two layouts are independent.
//!
//! Decoding is purely positional: declared lengths are trusted and the
//! payload is only checked as far as slicing requires.  A decode error is
//! local to one frame; the transport drops the frame and carries on.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::CodecError;

use super::schema::{Field, FieldType, MethodKind, MethodSchema, Schema};
use super::value::Value;

/// Initial capacity of the encode buffer; grows by doubling.
const INITIAL_CAPACITY: usize = 256;

// ── Growable writer ─────────────────────────────────────────

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn new() -> Self {
        Self {
            buf: Vec::with_capacity(INITIAL_CAPACITY),
        }
    }

    /// Make room for `n` more bytes, doubling capacity on overflow.
    fn ensure(&mut self, n: usize) {
        let needed = self.buf.len() + n;
        if needed <= self.buf.capacity() {
            return;
        }
        let mut cap = self.buf.capacity().max(1);
        while cap < needed {
            cap *= 2;
        }
        self.buf.reserve_exact(cap - self.buf.len());
    }

    fn put(&mut self, bytes: &[u8]) {
        self.ensure(bytes.len());
        self.buf.extend_from_slice(bytes);
    }

    /// Trim to the bytes actually written.
    fn finish(mut self) -> Vec<u8> {
        self.buf.shrink_to_fit();
        self.buf
    }
}

// ── Positional reader ───────────────────────────────────────

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::Truncated {
                needed: n,
                available: self.remaining(),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }
}

// ── Value encoding ──────────────────────────────────────────

fn mismatch(path: &str, ty: &FieldType) -> CodecError {
    CodecError::TypeMismatch {
        field: path.to_owned(),
        expected: ty.name(),
    }
}

fn encode_value(w: &mut Writer, ty: &FieldType, value: &Value, path: &str) -> Result<(), CodecError> {
    match ty {
        FieldType::I32 | FieldType::Enum => {
            let v = value
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .ok_or_else(|| mismatch(path, ty))?;
            w.put(&v.to_le_bytes());
        }
        FieldType::I64 => {
            let v = value.as_i64().ok_or_else(|| mismatch(path, ty))?;
            w.put(&v.to_le_bytes());
        }
        FieldType::U32 => {
            let v = value
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| mismatch(path, ty))?;
            w.put(&v.to_le_bytes());
        }
        FieldType::U64 => {
            let v = value.as_u64().ok_or_else(|| mismatch(path, ty))?;
            w.put(&v.to_le_bytes());
        }
        FieldType::Bool => {
            let v = value.as_bool().ok_or_else(|| mismatch(path, ty))?;
            w.put(&[u8::from(v)]);
        }
        FieldType::F32 => {
            let v = float_of(value).ok_or_else(|| mismatch(path, ty))?;
            w.put(&(v as f32).to_le_bytes());
        }
        FieldType::F64 => {
            let v = float_of(value).ok_or_else(|| mismatch(path, ty))?;
            w.put(&v.to_le_bytes());
        }
        FieldType::Str => {
            let s = value.as_str().ok_or_else(|| mismatch(path, ty))?;
            let len = u16::try_from(s.len()).map_err(|_| CodecError::TooLong(path.to_owned()))?;
            w.put(&len.to_le_bytes());
            w.put(s.as_bytes());
        }
        FieldType::Optional(inner) => {
            if value.is_null() {
                w.put(&[0]);
            } else {
                w.put(&[1]);
                encode_value(w, inner, value, path)?;
            }
        }
        FieldType::Struct(fields) => {
            if !matches!(value, Value::Record(_)) {
                return Err(mismatch(path, ty));
            }
            for field in fields {
                let field_path = format!("{path}.{}", field.name);
                match value.get(&field.name) {
                    Some(v) => encode_value(w, &field.ty, v, &field_path)?,
                    None if matches!(field.ty, FieldType::Optional(_)) => w.put(&[0]),
                    None => return Err(CodecError::MissingField(field_path)),
                }
            }
        }
        FieldType::List(inner) => {
            let items = value.as_list().ok_or_else(|| mismatch(path, ty))?;
            let count =
                u32::try_from(items.len()).map_err(|_| CodecError::TooLong(path.to_owned()))?;
            w.put(&count.to_le_bytes());
            for (i, item) in items.iter().enumerate() {
                encode_value(w, inner, item, &format!("{path}[{i}]"))?;
            }
        }
    }
    Ok(())
}

fn float_of(value: &Value) -> Option<f64> {
    match *value {
        Value::Float(v) => Some(v),
        Value::Int(v) => Some(v as f64),
        Value::UInt(v) => Some(v as f64),
        _ => None,
    }
}

// ── Value decoding ──────────────────────────────────────────

fn decode_value(r: &mut Reader<'_>, ty: &FieldType, path: &str) -> Result<Value, CodecError> {
    let value = match ty {
        FieldType::I32 | FieldType::Enum => Value::Int(i32::from_le_bytes(r.array()?).into()),
        FieldType::I64 => Value::Int(i64::from_le_bytes(r.array()?)),
        FieldType::U32 => Value::UInt(u32::from_le_bytes(r.array()?).into()),
        FieldType::U64 => Value::UInt(u64::from_le_bytes(r.array()?)),
        FieldType::Bool => Value::Bool(r.take(1)?[0] != 0),
        FieldType::F32 => Value::Float(f32::from_le_bytes(r.array()?).into()),
        FieldType::F64 => Value::Float(f64::from_le_bytes(r.array()?)),
        FieldType::Str => {
            let len = u16::from_le_bytes(r.array()?) as usize;
            let bytes = r.take(len)?;
            let s = core::str::from_utf8(bytes)
                .map_err(|_| CodecError::InvalidUtf8(path.to_owned()))?;
            Value::Str(s.to_owned())
        }
        FieldType::Optional(inner) => {
            if r.take(1)?[0] != 0 {
                decode_value(r, inner, path)?
            } else {
                Value::Null
            }
        }
        FieldType::Struct(fields) => {
            let mut out = Vec::with_capacity(fields.len());
            for Field { name, ty } in fields {
                let v = decode_value(r, ty, &format!("{path}.{name}"))?;
                out.push((name.clone(), v));
            }
            Value::Record(out)
        }
        FieldType::List(inner) => {
            let count = u32::from_le_bytes(r.array()?) as usize;
            // A corrupt count must not drive a huge allocation.
            let mut items = Vec::with_capacity(count.min(r.remaining()));
            for i in 0..count {
                items.push(decode_value(r, inner, &format!("{path}[{i}]"))?);
            }
            Value::List(items)
        }
    };
    Ok(value)
}

// ── Per-method entry ────────────────────────────────────────

/// Encoder/decoder pair for one method.
#[derive(Debug, Clone)]
pub struct MethodCodec {
    schema: MethodSchema,
}

impl MethodCodec {
    pub fn new(schema: MethodSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &MethodSchema {
        &self.schema
    }

    /// Encode positional arguments in parameter order.
    ///
    /// Trailing optional parameters may be omitted.
    pub fn encode(&self, args: &[Value]) -> Result<Vec<u8>, CodecError> {
        let params = &self.schema.params;
        let required = params
            .iter()
            .rposition(|p| !matches!(p.ty, FieldType::Optional(_)))
            .map_or(0, |i| i + 1);
        if args.len() > params.len() || args.len() < required {
            return Err(CodecError::ArgumentCount {
                expected: params.len(),
                got: args.len(),
            });
        }

        let mut w = Writer::new();
        for (i, param) in params.iter().enumerate() {
            let arg = args.get(i).unwrap_or(&Value::Null);
            encode_value(&mut w, &param.ty, arg, &param.name)?;
        }
        Ok(w.finish())
    }

    /// Decode the method's result from a response or push payload.
    pub fn decode(&self, payload: &[u8]) -> Result<Value, CodecError> {
        match &self.schema.result {
            None => Ok(Value::Null),
            Some(ty) => decode_value(&mut Reader::new(payload), ty, &self.schema.name),
        }
    }

    /// Peer side: encode a result value.  Void methods encode to nothing.
    pub fn encode_result(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        let mut w = Writer::new();
        if let Some(ty) = &self.schema.result {
            encode_value(&mut w, ty, value, &self.schema.name)?;
        }
        Ok(w.finish())
    }

    /// Peer side: decode positional arguments.
    pub fn decode_args(&self, payload: &[u8]) -> Result<Vec<Value>, CodecError> {
        let mut r = Reader::new(payload);
        self.schema
            .params
            .iter()
            .map(|p| decode_value(&mut r, &p.ty, &p.name))
            .collect()
    }
}

// ── Registry ────────────────────────────────────────────────

/// Registry of method codecs, built once from a schema.
#[derive(Debug, Clone, Default)]
pub struct Codec {
    methods: HashMap<u8, MethodCodec>,
}

impl Codec {
    pub fn new(schema: &Schema) -> Self {
        let methods = schema
            .methods()
            .map(|m| (m.id, MethodCodec::new(m.clone())))
            .collect();
        Self { methods }
    }

    pub fn method(&self, method_id: u8) -> Result<&MethodCodec, CodecError> {
        self.methods
            .get(&method_id)
            .ok_or(CodecError::UnknownMethod(method_id))
    }

    pub fn encode(&self, method_id: u8, args: &[Value]) -> Result<Vec<u8>, CodecError> {
        self.method(method_id)?.encode(args)
    }

    pub fn decode(&self, method_id: u8, payload: &[u8]) -> Result<Value, CodecError> {
        self.method(method_id)?.decode(payload)
    }

    pub fn encode_result(&self, method_id: u8, value: &Value) -> Result<Vec<u8>, CodecError> {
        self.method(method_id)?.encode_result(value)
    }

    pub fn decode_args(&self, method_id: u8, payload: &[u8]) -> Result<Vec<Value>, CodecError> {
        self.method(method_id)?.decode_args(payload)
    }

    /// Schema-declared default timeout of a method, if any.
    pub fn timeout_of(&self, method_id: u8) -> Option<Duration> {
        self.methods.get(&method_id).and_then(|m| m.schema.timeout)
    }

    pub fn kind_of(&self, method_id: u8) -> Option<MethodKind> {
        self.methods.get(&method_id).map(|m| m.schema.kind)
    }
}

impl From<&Schema> for Codec {
    fn from(schema: &Schema) -> Self {
        Self::new(schema)
    }
}

// ── Tests ────────────────────────────────────────────────────
