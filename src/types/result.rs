use serde::{Deserialize, Serialize};

/// Version information reported by the browser engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BrowserVersion {
    pub product: String,
    pub protocol_version: String,
    pub revision: String,
    pub user_agent: String,
    pub js_version: String,
}

impl BrowserVersion {
    /// Compact form used in logs and the `X-Browser-Version` header.
    pub fn summary(&self) -> String {
        if self.revision.is_empty() {
            self.product.clone()
        } else {
            format!("{} ({})", self.product, self.revision)
        }
    }
}

/// A completed render.
///
/// Always holds the full document; partial output is never surfaced.
#[derive(Debug, Clone)]
pub struct RenderResult {
    pub data: Vec<u8>,
    pub browser: BrowserVersion,
}
