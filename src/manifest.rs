use serde::{Deserialize, Serialize};

use crate::error::{ContentError, Result};

/// Well-known logical path of the manifest inside every content source.
pub const MANIFEST_PATH: &str = "mod.json";

/// Identity and metadata of a mod, decoded from [`MANIFEST_PATH`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl Manifest {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let text = decode_text(bytes, MANIFEST_PATH)?;
        let manifest: Manifest = serde_json::from_str(&text).map_err(|e| {
            ContentError::Format(format!("{MANIFEST_PATH} could not be decoded: {e}"))
        })?;
        if manifest.id.trim().is_empty() {
            return Err(ContentError::Format(format!("{MANIFEST_PATH} has an empty id")));
        }
        Ok(manifest)
    }
}

/// UTF-8 decode with a leading byte-order mark removed.
pub fn decode_text(bytes: &[u8], path: &str) -> Result<String> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|e| ContentError::Format(format!("{path} is not valid UTF-8: {e}")))
}
