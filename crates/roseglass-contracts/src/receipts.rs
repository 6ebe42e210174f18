use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use crate::analysis::AnalysisResult;

pub const RECEIPT_SCHEMA_VERSION: u64 = 1;

/// Describes an uploaded file without carrying its bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileManifest {
    pub field: String,
    pub file_name: String,
    pub mime_type: String,
    pub byte_len: u64,
    pub sha256: String,
}

impl FileManifest {
    pub fn describe(field: &str, file_name: &str, mime_type: &str, bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self {
            field: field.to_string(),
            file_name: file_name.to_string(),
            mime_type: mime_type.to_string(),
            byte_len: bytes.len() as u64,
            sha256: hex::encode(hasher.finalize()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RequestManifest {
    pub files: Vec<FileManifest>,
    pub user_context: Option<String>,
    pub use_premium: bool,
}

impl RequestManifest {
    pub fn count_for(&self, field: &str) -> usize {
        self.files.iter().filter(|file| file.field == field).count()
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|file| file.byte_len).sum()
    }
}

pub fn build_receipt(
    request: &RequestManifest,
    result: &AnalysisResult,
    opener: Option<&str>,
    markdown_path: &Path,
) -> Value {
    let mut root = Map::new();
    root.insert(
        "schema_version".to_string(),
        Value::Number(RECEIPT_SCHEMA_VERSION.into()),
    );
    root.insert(
        "request".to_string(),
        serde_json::to_value(request).unwrap_or(Value::Null),
    );
    root.insert(
        "analysis_id".to_string(),
        result
            .analysis_id
            .clone()
            .map(Value::String)
            .unwrap_or(Value::Null),
    );
    root.insert(
        "usage".to_string(),
        serde_json::to_value(&result.usage).unwrap_or(Value::Null),
    );
    root.insert("remaining_credits".to_string(), json!(result.remaining_credits));
    root.insert(
        "suggested_opener".to_string(),
        opener
            .map(|text| Value::String(text.to_string()))
            .unwrap_or(Value::Null),
    );
    root.insert(
        "artifacts".to_string(),
        json!({ "markdown_path": markdown_path.to_string_lossy() }),
    );
    Value::Object(root)
}

pub fn write_receipt(path: &Path, payload: &Value) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(payload)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{build_receipt, write_receipt, FileManifest, RequestManifest, RECEIPT_SCHEMA_VERSION};
    use crate::analysis::AnalysisResult;

    #[test]
    fn manifest_hashes_bytes() {
        let manifest = FileManifest::describe("profile_images", "a.png", "image/png", b"abc");
        assert_eq!(manifest.byte_len, 3);
        assert_eq!(
            manifest.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn receipt_writes_expected_shape() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let receipt_path = temp.path().join("receipt-an-7.json");
        let markdown_path = temp.path().join("analysis-an-7.md");

        let request = RequestManifest {
            files: vec![
                FileManifest::describe("profile_images", "p1.png", "image/png", b"one"),
                FileManifest::describe("conversation_images", "c1.webp", "image/webp", b"two!"),
            ],
            user_context: Some("likes climbing".to_string()),
            use_premium: true,
        };
        assert_eq!(request.count_for("profile_images"), 1);
        assert_eq!(request.total_bytes(), 7);

        let result: AnalysisResult = serde_json::from_value(json!({
            "success": true,
            "analysis": "body",
            "usage": {
                "input_tokens": 10,
                "output_tokens": 20,
                "cost_usd": 0.01,
                "charge_usd": 0.02,
                "model_used": "claude-opus"
            },
            "remaining_credits": 4.5,
            "analysis_id": "an-7"
        }))?;

        let payload = build_receipt(&request, &result, Some("Hi!"), &markdown_path);
        write_receipt(&receipt_path, &payload)?;

        let parsed: Value = serde_json::from_str(&std::fs::read_to_string(&receipt_path)?)?;
        assert_eq!(parsed["schema_version"], json!(RECEIPT_SCHEMA_VERSION));
        assert_eq!(parsed["analysis_id"], json!("an-7"));
        assert_eq!(parsed["usage"]["charge_usd"], json!(0.02));
        assert_eq!(parsed["request"]["files"][1]["mime_type"], json!("image/webp"));
        assert_eq!(parsed["request"]["use_premium"], json!(true));
        assert_eq!(parsed["suggested_opener"], json!("Hi!"));
        assert!(parsed["request"]["files"][0].get("bytes").is_none());
        Ok(())
    }
}
