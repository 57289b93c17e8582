use crate::error::ApiError;

/// Cleans free-text request fields before they reach the service or the logs.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    max_length: usize,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self {
            max_length: 100_000,
        }
    }
}

impl Sanitizer {
    pub fn new(max_length: usize) -> Self {
        Self { max_length }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Strip control characters (newlines and tabs survive) and bound the
    /// length. A field that is blank afterwards is rejected.
    pub fn clean(&self, field: &str, input: &str) -> Result<String, ApiError> {
        if input.chars().count() > self.max_length {
            return Err(ApiError::BadRequest(format!(
                "{field} exceeds {} characters",
                self.max_length
            )));
        }

        let cleaned: String = input
            .chars()
            .filter(|c| !c.is_control() || matches!(c, '\n' | '\t' | '\r'))
            .collect();

        if cleaned.trim().is_empty() {
            return Err(ApiError::BadRequest(format!("{field} must not be empty")));
        }
        Ok(cleaned)
    }
}
