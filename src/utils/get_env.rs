use anyhow::{Error, anyhow};
use dotenv::dotenv;
use std::env;
use std::str::FromStr;

pub fn get_env_var(key: &str) -> Result<String, Error> {
    dotenv().ok();
    Ok(env::var(key)?)
}

pub fn get_env_var_or(key: &str, default: &str) -> String {
    get_env_var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

// parses a numeric env var, falling back to `default` when unset or blank
pub fn get_env_parsed<T: FromStr>(key: &str, default: T) -> Result<T, Error> {
    match get_env_var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|_| anyhow!("invalid value for {}: {:?}", key, raw)),
        _ => Ok(default),
    }
}

pub fn env_var_to_vec(key: &str) -> Vec<String> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => split_list(&raw),
        _ => Vec::new(),
    }
}

pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
