// file: src/utils/validation.rs
// description: data validation utilities and helpers
// reference: input validation patterns

use crate::error::{PipelineError, Result};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

static OBJECT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9._\-/]+$").expect("valid object name pattern"));
static DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9._\-/]").expect("valid sanitize pattern"));
static REPEATED_SLASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/+").expect("valid slash pattern"));

pub struct Validator;

impl Validator {
    pub fn validate_directory(path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(PipelineError::Validation(format!(
                "Directory does not exist: {}",
                path.display()
            )));
        }

        if !path.is_dir() {
            return Err(PipelineError::Validation(format!(
                "Path is not a directory: {}",
                path.display()
            )));
        }

        Ok(())
    }

    /// Non-empty base name ending in `.zip`, any case.
    pub fn is_zip_filename(name: &str) -> bool {
        Path::new(name)
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase())
            .is_some_and(|n| n.len() > ".zip".len() && n.ends_with(".zip"))
    }

    pub fn is_valid_object_name(name: &str) -> bool {
        !name.is_empty()
            && !name.starts_with('/')
            && !name.ends_with('/')
            && OBJECT_NAME.is_match(name)
    }

    pub fn sanitize_object_name(name: &str) -> String {
        let replaced = DISALLOWED.replace_all(name, "_");
        let collapsed = REPEATED_SLASH.replace_all(&replaced, "/");
        collapsed.trim_matches('/').to_string()
    }
}
