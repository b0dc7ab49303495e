//! JSON Patch (RFC 6902) operations emitted by the mutators.
//!
//! Paths are always built from unescaped reference tokens, so every operation
//! carries a syntactically valid JSON Pointer. The API server applies the
//! operations strictly in order: callers must emit them in the order they
//! depend on each other.

use base64::{engine::general_purpose, Engine as _};
use json_patch::jsonptr::{PointerBuf, Token};
use json_patch::{AddOperation, PatchOperation, RemoveOperation, ReplaceOperation};
use serde_json::Value;

/// Token used to address the position past the last element of an array.
pub const APPEND: &str = "-";

pub fn add<'t, I, T>(tokens: I, value: Value) -> PatchOperation
where
    I: IntoIterator<Item = T>,
    T: Into<Token<'t>>,
{
    PatchOperation::Add(AddOperation {
        path: PointerBuf::from_tokens(tokens),
        value,
    })
}

pub fn replace<'t, I, T>(tokens: I, value: Value) -> PatchOperation
where
    I: IntoIterator<Item = T>,
    T: Into<Token<'t>>,
{
    PatchOperation::Replace(ReplaceOperation {
        path: PointerBuf::from_tokens(tokens),
        value,
    })
}

pub fn remove<'t, I, T>(tokens: I) -> PatchOperation
where
    I: IntoIterator<Item = T>,
    T: Into<Token<'t>>,
{
    PatchOperation::Remove(RemoveOperation {
        path: PointerBuf::from_tokens(tokens),
    })
}

/// Serialize the operations into a JSON array, preserving their order.
pub fn serialize(operations: &[PatchOperation]) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(operations)
}

/// Serialize the operations and encode them the way `AdmissionResponse.patch`
/// expects them.
pub fn encode(operations: &[PatchOperation]) -> Result<String, serde_json::Error> {
    serialize(operations).map(|bytes| general_purpose::STANDARD.encode(bytes))
}
