pub mod formula;

pub use formula::{
    build_search_formula, prevalidate, screen_search_query, validate_filter_formula,
    ParsedFormula, SanitizeError,
};

use crate::error::ToolError;

impl From<SanitizeError> for ToolError {
    fn from(err: SanitizeError) -> Self {
        ToolError::Security(err.to_string())
    }
}
