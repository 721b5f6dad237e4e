//! Human-readable error descriptions, structured JSON errors, and stable
//! exit codes.

use bartrack_core::error::BuildError;
use serde_json::json;

/// Map an error to a short explanation with a fix hint.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Out-of-range values in the parameter file.\nHow to fix: Edit the user's TOML under --params-dir, or delete it to fall back to defaults."
            ),
        };
    }

    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();
    if lower.contains("read frame log") || lower.contains("no such file") {
        return format!(
            "What happened: The frame log could not be read.\nLikely causes: Wrong --input path.\nHow to fix: Point --input at a recorded frame log. Original: {msg}"
        );
    }

    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!("Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}")
}

pub fn format_error_json(err: &eyre::Report) -> String {
    json!({
        "type": "error",
        "message": err.to_string(),
        "detail": format!("{err:#}"),
    })
    .to_string()
}

/// Stable exit codes: 2 for configuration problems, 1 otherwise.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if err.downcast_ref::<BuildError>().is_some() {
        2
    } else {
        1
    }
}
