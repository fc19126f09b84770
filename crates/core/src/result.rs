//! Result type of the horde crates.

use crate::error::Error;

/// The standard Result type for horde operations.
///
/// # Examples
///
/// ```ignore
/// fn load() -> Result<HordeConfig> {
///     let raw = std::fs::read_to_string("horde.toml")?;
///     Ok(toml::from_str(&raw)?)
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;
