//! Signed, compressed wire codec.
//!
//! Encoding: canonicalize a JSON object (keys sorted at every level, no
//! insignificant whitespace), HMAC-SHA256 it, attach `_signature` /
//! `_algorithm`, re-canonicalize, then zlib-compress the result.
//! Decoding reverses this and verifies the signature in constant time
//! before handing the caller the original object.
//!
//! `serde_json::Map` is backed by a `BTreeMap` as long as the
//! `preserve_order` feature is not enabled anywhere in the dependency
//! graph, so `serde_json::to_vec` on a `Value::Object` already produces
//! canonical, sorted-key JSON; no separate canonicalization pass is needed.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha2::Sha256;
use std::io::{Read, Write};

use dispatch_shared::{DispatchError, TaskMessage};

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_KEY: &str = "_signature";
const ALGORITHM_KEY: &str = "_algorithm";
const ALGORITHM: &str = "sha256";

#[derive(Clone)]
pub struct Codec {
    secret_key: Vec<u8>,
}

impl Codec {
    pub fn new(secret_key: impl Into<Vec<u8>>) -> Self {
        Self {
            secret_key: secret_key.into(),
        }
    }

    /// Signs, canonicalizes and compresses a JSON object into a wire frame.
    pub fn encode(&self, value: &Value) -> Result<Vec<u8>, DispatchError> {
        let object = value
            .as_object()
            .ok_or_else(|| DispatchError::NotSerializable("top-level value must be an object".into()))?;

        let canonical = canonical_bytes(object)?;
        let signature = self.sign(&canonical);

        let mut signed = object.clone();
        signed.insert(SIGNATURE_KEY.to_string(), Value::String(signature));
        signed.insert(ALGORITHM_KEY.to_string(), Value::String(ALGORITHM.to_string()));

        let signed_bytes = canonical_bytes(&signed)?;
        compress(&signed_bytes)
    }

    /// Decompresses a wire frame, verifies its signature, and returns the
    /// object with the signature fields stripped.
    pub fn decode(&self, frame: &[u8]) -> Result<Value, DispatchError> {
        let decompressed = decompress(frame)?;
        let value: Value = serde_json::from_slice(&decompressed)
            .map_err(|e| DispatchError::InvalidFrame(e.to_string()))?;
        let mut object = value
            .as_object()
            .cloned()
            .ok_or_else(|| DispatchError::InvalidFrame("frame is not a JSON object".into()))?;

        let signature = object
            .remove(SIGNATURE_KEY)
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or(DispatchError::InvalidChecksum)?;
        object.remove(ALGORITHM_KEY);

        let canonical = canonical_bytes(&object)?;
        self.verify(&canonical, &signature)?;

        Ok(Value::Object(object))
    }

    pub fn encode_task_message(&self, message: &TaskMessage) -> Result<Vec<u8>, DispatchError> {
        let value = serde_json::to_value(message)
            .map_err(|e| DispatchError::NotSerializable(e.to_string()))?;
        self.encode(&value)
    }

    pub fn decode_task_message(&self, frame: &[u8]) -> Result<TaskMessage, DispatchError> {
        let value = self.decode(frame)?;
        serde_json::from_value(value).map_err(|e| DispatchError::InvalidFrame(e.to_string()))
    }

    pub fn encode_value<T: serde::Serialize>(&self, value: &T) -> Result<Vec<u8>, DispatchError> {
        let value = serde_json::to_value(value).map_err(|e| DispatchError::NotSerializable(e.to_string()))?;
        self.encode(&value)
    }

    fn sign(&self, canonical: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.secret_key).expect("HMAC accepts any key length");
        mac.update(canonical);
        BASE64.encode(mac.finalize().into_bytes())
    }

    fn verify(&self, canonical: &[u8], signature_b64: &str) -> Result<(), DispatchError> {
        let expected = BASE64
            .decode(signature_b64)
            .map_err(|_| DispatchError::InvalidChecksum)?;
        let mut mac = HmacSha256::new_from_slice(&self.secret_key).expect("HMAC accepts any key length");
        mac.update(canonical);
        mac.verify_slice(&expected).map_err(|_| DispatchError::InvalidChecksum)
    }
}

fn canonical_bytes(object: &Map<String, Value>) -> Result<Vec<u8>, DispatchError> {
    serde_json::to_vec(&Value::Object(object.clone()))
        .map_err(|e| DispatchError::NotSerializable(e.to_string()))
}

fn compress(bytes: &[u8]) -> Result<Vec<u8>, DispatchError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).map_err(DispatchError::Io)?;
    encoder.finish().map_err(DispatchError::Io)
}

fn decompress(bytes: &[u8]) -> Result<Vec<u8>, DispatchError> {
    let mut decoder = ZlibDecoder::new(bytes);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| DispatchError::InvalidFrame(e.to_string()))?;
    Ok(out)
}
