use std::env;
use std::str::FromStr;

/// Read an environment variable, treating empty values as unset
pub(super) fn env_string(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Parse an environment variable, falling back to `default` when unset
pub(super) fn env_parse<T>(name: &str, default: T) -> Result<T, Box<dyn std::error::Error>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(name) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| format!("Invalid value for {name}: '{raw}' ({e})").into()),
        None => Ok(default),
    }
}

/// Parse an optional environment variable
pub(super) fn env_parse_opt<T>(name: &str) -> Result<Option<T>, Box<dyn std::error::Error>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(name) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid value for {name}: '{raw}' ({e})").into()),
        None => Ok(None),
    }
}
