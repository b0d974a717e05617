//! Binary encoding of modules
//!
//! A module is written as a four byte magic, a format version byte and the
//! bincode serialization of its [`wire::ModuleRecord`]. Decoding a module's
//! encoding yields a module whose disassembly matches the original's.

pub mod wire;

mod decode;
mod encode;

use crate::module::Module;
use bincode::Options;
use log::debug;
use shir_common::Failure;
use thiserror::Error;

pub const MAGIC: &[u8; 4] = b"SHIR";
pub const VERSION: u8 = 1;

/// Upper bound on how much memory a decode may allocate
const SIZE_LIMIT: u64 = 64 << 20;

const HEADER_LEN: usize = MAGIC.len() + 1;

fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_limit(SIZE_LIMIT)
        .reject_trailing_bytes()
}

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("cannot encode a destroyed {what} ({handle})")]
    Destroyed { what: &'static str, handle: String },

    #[error("cannot encode module: {0}")]
    Unresolved(String),

    #[error("serialization failed: {0}")]
    Serialize(#[from] bincode::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("input does not start with the module magic")]
    BadMagic,

    #[error("input is too short to hold a module header")]
    Truncated,

    #[error("unsupported module format version {0} (expected {VERSION})")]
    UnsupportedVersion(u8),

    #[error("malformed module encoding: {0}")]
    Malformed(#[from] bincode::Error),

    #[error("invalid module encoding: {reason}")]
    Invalid { reason: String },
}

impl From<EncodeError> for Failure {
    fn from(err: EncodeError) -> Self {
        Failure::new(err.to_string())
    }
}

impl From<DecodeError> for Failure {
    fn from(err: DecodeError) -> Self {
        Failure::new(err.to_string())
    }
}

/// The serializable record of `module`
pub fn record(module: &Module) -> Result<wire::ModuleRecord, EncodeError> {
    encode::Encoder::new(module).finish()
}

pub fn encode(module: &Module) -> Result<Vec<u8>, EncodeError> {
    let record = record(module)?;
    let mut bytes = Vec::with_capacity(HEADER_LEN + 256);
    bytes.extend_from_slice(MAGIC);
    bytes.push(VERSION);
    options().serialize_into(&mut bytes, &record)?;
    debug!("encoded module into {} bytes", bytes.len());
    Ok(bytes)
}

pub fn decode(bytes: &[u8]) -> Result<Module, DecodeError> {
    if bytes.len() < HEADER_LEN {
        if !MAGIC.starts_with(&bytes[..bytes.len().min(MAGIC.len())]) {
            return Err(DecodeError::BadMagic);
        }
        return Err(DecodeError::Truncated);
    }
    if &bytes[..MAGIC.len()] != MAGIC {
        return Err(DecodeError::BadMagic);
    }
    let version = bytes[MAGIC.len()];
    if version != VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }
    let record: wire::ModuleRecord = options().deserialize(&bytes[HEADER_LEN..])?;
    debug!(
        "decoding module with {} types, {} constants and {} functions",
        record.types.len(),
        record.constants.len(),
        record.functions.len()
    );
    decode::Decoder::decode(record)
}

/// Human-readable JSON dump of the module's wire record
pub fn to_json(module: &Module) -> Result<String, EncodeError> {
    Ok(serde_json::to_string_pretty(&record(module)?)?)
}
