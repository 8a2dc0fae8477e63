//! Keyfile loader: turns an arbitrary file into key-token bytes
//!
//! Detection order: XML `<KeyFile><Key><Data>` (base64), 32 raw bytes,
//! 64 hex characters, otherwise the SHA-256 of the whole file.

use std::path::Path;

use anyhow::Context;
use base64::Engine;
use quick_xml::events::Event;
use quick_xml::Reader;
use sha2::{Digest, Sha256};

/// Read `path` and extract its key data.
pub fn load_keyfile(path: &Path) -> anyhow::Result<Vec<u8>> {
    let data = std::fs::read(path)
        .with_context(|| format!("reading keyfile {}", path.display()))?;
    tracing::debug!(path = %path.display(), size = data.len(), "loading keyfile");
    Ok(key_data_from_bytes(&data))
}

pub fn key_data_from_bytes(data: &[u8]) -> Vec<u8> {
    if let Some(key) = xml_key_data(data) {
        return key;
    }
    match data.len() {
        32 => return data.to_vec(),
        64 => {
            if let Ok(decoded) = hex::decode(data) {
                return decoded;
            }
        }
        _ => {}
    }
    Sha256::digest(data).to_vec()
}

/// Base64 payload of `KeyFile/Key/Data`, if `data` is such a document.
fn xml_key_data(data: &[u8]) -> Option<Vec<u8>> {
    let text = std::str::from_utf8(data).ok()?;
    let mut reader = Reader::from_str(text);
    let mut path: Vec<Vec<u8>> = Vec::new();

    loop {
        match reader.read_event().ok()? {
            Event::Start(e) => {
                let name = e.name().as_ref().to_vec();
                if path.is_empty() && name != b"KeyFile" {
                    return None;
                }
                path.push(name);
            }
            Event::End(_) => {
                path.pop();
            }
            Event::Text(t) if is_data_path(&path) => {
                let value = t.unescape().ok()?;
                return base64::engine::general_purpose::STANDARD
                    .decode(value.trim())
                    .ok();
            }
            Event::Eof => return None,
            _ => {}
        }
    }
}

fn is_data_path(path: &[Vec<u8>]) -> bool {
    path.len() == 3 && path[0] == b"KeyFile" && path[1] == b"Key" && path[2] == b"Data"
}
