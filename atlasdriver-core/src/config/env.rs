//! Environment variable resolution.
//!
//! Variables follow the Cube naming scheme: `CUBEJS_<SUFFIX>` for the
//! default data source and `CUBEJS_DS_<NAME>_<SUFFIX>` for named ones.

use crate::Result;
use crate::error::AtlasDriverError;

/// Name of the implicit data source.
pub const DEFAULT_DATA_SOURCE: &str = "default";

/// Lists the data sources a deployment declares, comma separated.
const DATA_SOURCES_VAR: &str = "CUBEJS_DATASOURCES";

/// Builds the variable name for `suffix` in the given data source.
pub fn env_var_name(suffix: &str, data_source: &str) -> String {
    if data_source == DEFAULT_DATA_SOURCE {
        format!("CUBEJS_{}", suffix)
    } else {
        format!(
            "CUBEJS_DS_{}_{}",
            data_source.to_uppercase().replace('-', "_"),
            suffix
        )
    }
}

/// Reads a non-empty variable for the data source.
pub fn get_env(suffix: &str, data_source: &str) -> Option<String> {
    std::env::var(env_var_name(suffix, data_source))
        .ok()
        .filter(|value| !value.trim().is_empty())
}

/// Reads and parses a variable, reporting unparsable values as configuration errors.
pub fn get_env_parsed<T>(suffix: &str, data_source: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(suffix, data_source)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| {
                AtlasDriverError::configuration(format!(
                    "Invalid value for {}: {}",
                    env_var_name(suffix, data_source),
                    e
                ))
            })
        })
        .transpose()
}

/// Checks that the data source is declared when the deployment lists its data sources.
///
/// # Errors
/// Returns a configuration error for an undeclared data source name
pub fn assert_data_source(data_source: &str) -> Result<()> {
    if data_source.trim().is_empty() {
        return Err(AtlasDriverError::configuration(
            "data source name cannot be empty",
        ));
    }

    let Ok(declared) = std::env::var(DATA_SOURCES_VAR) else {
        return Ok(());
    };

    if data_source == DEFAULT_DATA_SOURCE
        || declared
            .split(',')
            .map(str::trim)
            .any(|name| name == data_source)
    {
        Ok(())
    } else {
        Err(AtlasDriverError::configuration(format!(
            "data source '{}' is not declared in {}",
            data_source, DATA_SOURCES_VAR
        )))
    }
}
