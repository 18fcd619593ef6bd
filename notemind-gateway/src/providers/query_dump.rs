//! Raw request/response dumps for upstream LLM calls.
//!
//! Enabled with `dump_queries = true` under `[logging]`. Files land in
//! `./logs/queries/{timestamp}-{provider}-{model}.{phase}.json`; a failed
//! write is only a warning.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::Value;
use tracing::warn;

const QUERY_DIR: &str = "./logs/queries";

/// Pairs the request and response files of one upstream call.
pub struct QueryDump {
    base: PathBuf,
}

impl QueryDump {
    /// Write `{base}.request.json` and return the handle for the response.
    pub async fn request(provider: &str, model: &str, value: &Value) -> Option<Self> {
        Self::request_in(Path::new(QUERY_DIR), provider, model, value).await
    }

    pub(crate) async fn request_in(
        dir: &Path,
        provider: &str,
        model: &str,
        value: &Value,
    ) -> Option<Self> {
        let timestamp = Utc::now().format("%Y%m%d-%H%M%S%.3f");
        let base = dir.join(format!(
            "{}-{}-{}",
            timestamp,
            provider,
            sanitize_model(model)
        ));

        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            warn!("dump_queries: failed to create dir: {}", e);
            return None;
        }

        write_json(&base.with_extension("request.json"), value).await;
        Some(Self { base })
    }

    pub async fn response(&self, value: &Value) {
        write_json(&self.base.with_extension("response.json"), value).await;
    }
}

fn sanitize_model(model: &str) -> String {
    model
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

async fn write_json(path: &Path, value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            if let Err(e) = tokio::fs::write(path, json).await {
                warn!("dump_queries: failed to write {}: {}", path.display(), e);
            }
        }
        Err(e) => warn!("dump_queries: failed to serialize: {}", e),
    }
}
