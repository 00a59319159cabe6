//! Shared helpers for command handlers.

use std::io::Read;

use confly_core::Selection;
use serde_json::Value;

use crate::cli::PayloadArgs;
use crate::error::CliError;

/// Split `a/b=k/c` into (`a/b=k`, `c`).
pub fn split_last(path: &str) -> (&str, &str) {
    let path = path.trim_matches('/');
    path.rsplit_once('/').unwrap_or(("", path))
}

/// The selection at `rel`, or `root` itself for an empty path.
pub async fn locate(root: &Selection, rel: &str) -> Result<Selection, CliError> {
    let rel = rel.trim_matches('/');
    if rel.is_empty() {
        return Ok(root.clone());
    }
    root.find(rel)
        .await?
        .ok_or_else(|| CliError::NotFound { path: rel.into() })
}

/// Parse the payload given by `--data` or `--file`.
pub async fn read_payload(args: &PayloadArgs) -> Result<Option<Value>, CliError> {
    let text = match (&args.data, &args.file) {
        (Some(data), _) => data.clone(),
        (None, Some(file)) if file.as_os_str() == "-" => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
        (None, Some(file)) => tokio::fs::read_to_string(file).await?,
        (None, None) => return Ok(None),
    };
    Ok(Some(serde_json::from_str(&text)?))
}

/// Like [`read_payload`], for commands that cannot run without one.
pub async fn require_payload(args: &PayloadArgs) -> Result<Value, CliError> {
    read_payload(args).await?.ok_or_else(|| CliError::Validation {
        field: "payload".into(),
        reason: "pass --data or --file".into(),
    })
}
