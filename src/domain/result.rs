//! Result type alias for Tabport

use super::errors::TabportError;

/// Result type alias for Tabport operations
///
/// # Examples
///
/// ```
/// use tabport::domain::result::Result;
/// use tabport::domain::errors::TabportError;
///
/// fn failing_function() -> Result<()> {
///     Err(TabportError::Configuration("batch_size must be > 0".to_string()))
/// }
/// assert!(failing_function().is_err());
/// ```
pub type Result<T> = std::result::Result<T, TabportError>;
