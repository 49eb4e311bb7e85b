//! Generated-style typed client facades.
//!
//! A facade owns no state: it maps each typed method onto
//! [`RpcTransport::call`](crate::transport::RpcTransport::call),
//! `send_stream_request`, or subscribe plus stream request, and converts
//! decoded [`Value`] trees into plain structs.

pub mod user;

use crate::error::CodecError;
use crate::rpc::value::Value;

fn mismatch(field: &str, expected: &'static str) -> CodecError {
    CodecError::TypeMismatch {
        field: field.to_owned(),
        expected,
    }
}

fn take(record: &mut Value, name: &str) -> Result<Value, CodecError> {
    record
        .take(name)
        .ok_or_else(|| CodecError::MissingField(name.to_owned()))
}

pub(crate) fn take_i32(record: &mut Value, name: &str) -> Result<i32, CodecError> {
    take(record, name)?
        .as_i32()
        .ok_or_else(|| mismatch(name, "i32"))
}

pub(crate) fn take_string(record: &mut Value, name: &str) -> Result<String, CodecError> {
    take(record, name)?
        .into_string()
        .ok_or_else(|| mismatch(name, "string"))
}

/// Absent and null both map to `None`.
pub(crate) fn take_opt_string(record: &mut Value, name: &str) -> Result<Option<String>, CodecError> {
    match record.take(name) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v.into_string().map(Some).ok_or_else(|| mismatch(name, "string")),
    }
}

pub(crate) fn take_strings(record: &mut Value, name: &str) -> Result<Vec<String>, CodecError> {
    take(record, name)?
        .into_list()
        .ok_or_else(|| mismatch(name, "list"))?
        .into_iter()
        .map(|v| v.into_string().ok_or_else(|| mismatch(name, "string")))
        .collect()
}
