// Client-side input validation.
// Runs before any optimistic state change or network call.

use url::Url;

use crate::types::errors::{SyncError, ValidationErrors};

pub const TITLE_MAX_CHARS: usize = 500;
pub const COLLECTION_NAME_MAX_CHARS: usize = 50;

/// Checks a bookmark title and URL, reporting every bad field at once.
///
/// Returns the trimmed title and URL on success.
pub fn validate_bookmark(title: &str, url: &str) -> Result<(String, String), SyncError> {
    let title = title.trim();
    let url = url.trim();
    let mut errors = ValidationErrors::new();

    let title_len = title.chars().count();
    if title_len == 0 {
        errors.push("title", "must not be empty");
    } else if title_len > TITLE_MAX_CHARS {
        errors.push(
            "title",
            format!("must be at most {} characters", TITLE_MAX_CHARS),
        );
    }

    if let Err(message) = check_http_url(url) {
        errors.push("url", message);
    }

    errors.into_result()?;
    Ok((title.to_string(), url.to_string()))
}

fn check_http_url(raw: &str) -> Result<(), String> {
    if raw.is_empty() {
        return Err("must not be empty".to_string());
    }
    let parsed = Url::parse(raw).map_err(|e| format!("is not a valid URL ({})", e))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(format!("scheme '{}' is not http or https", other)),
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err("must include a host".to_string());
    }
    Ok(())
}

/// Checks a collection name. Returns it trimmed.
pub fn validate_collection_name(name: &str) -> Result<String, SyncError> {
    let name = name.trim();
    let len = name.chars().count();
    if len == 0 {
        return Err(SyncError::validation("name", "must not be empty"));
    }
    if len > COLLECTION_NAME_MAX_CHARS {
        return Err(SyncError::validation(
            "name",
            format!("must be at most {} characters", COLLECTION_NAME_MAX_CHARS),
        ));
    }
    Ok(name.to_string())
}
