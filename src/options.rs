//! Generator configuration

use crate::error::CopyError;
use serde::{Deserialize, Serialize};

/// What a pass is allowed to do beyond producing output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    /// Collect detailed diagnostics; when off only the failure flag is kept
    pub diagnostics: bool,
    /// Consult and fill the result cache handed to the pass
    pub cache: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            diagnostics: true,
            cache: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorOptions {
    pub capabilities: Capabilities,
    /// First line of every output unit
    pub header_comment: String,
    /// Extension appended to output unit names, without the leading dot
    pub file_extension: String,
    /// One level of indentation in rendered output
    pub indent: String,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            capabilities: Capabilities::default(),
            header_comment: "// <auto-generated/>".to_string(),
            file_extension: "g.cs".to_string(),
            indent: "    ".to_string(),
        }
    }
}

impl GeneratorOptions {
    pub fn from_json(json: &str) -> Result<Self, CopyError> {
        serde_json::from_str(json).map_err(CopyError::Options)
    }

    /// Fast mode: pass/fail only, no diagnostic detail
    pub fn quiet() -> Self {
        Self {
            capabilities: Capabilities {
                diagnostics: false,
                ..Capabilities::default()
            },
            ..Self::default()
        }
    }

    pub fn with_cache(mut self) -> Self {
        self.capabilities.cache = true;
        self
    }
}
