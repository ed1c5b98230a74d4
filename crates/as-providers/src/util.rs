//! Shared utility functions for provider adapters.

use as_domain::config::AuthConfig;
use as_domain::error::{Error, Result};

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
///
/// Timeout errors map to [`Error::Timeout`]; everything else maps to
/// [`Error::Http`].
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

/// Resolve the API key from an [`AuthConfig`].
///
/// Precedence: `key` (plaintext, warns), then the first of `keys` whose
/// env var is set (round-robin rotation pool), then `env`.
pub fn resolve_api_key(auth: &AuthConfig) -> Result<String> {
    if let Some(ref key) = auth.key {
        tracing::warn!("API key loaded from plaintext config field 'key' — prefer 'env' instead");
        return Ok(key.clone());
    }

    if !auth.keys.is_empty() {
        for env_var in &auth.keys {
            if let Ok(val) = std::env::var(env_var) {
                return Ok(val);
            }
        }
        return Err(Error::Auth(format!(
            "none of the configured key rotation env vars are set: {:?}",
            auth.keys
        )));
    }

    if let Some(ref env_var) = auth.env {
        return std::env::var(env_var)
            .map_err(|_| Error::Auth(format!("environment variable '{env_var}' not set or not valid UTF-8")));
    }

    Err(Error::Auth("no API key configured: set 'key', 'env', or 'keys' in AuthConfig".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_api_key_plaintext() {
        let auth = AuthConfig {
            key: Some("sk-test-123".into()),
            ..Default::default()
        };
        let result = resolve_api_key(&auth).unwrap();
        assert_eq!(result, "sk-test-123");
    }

    #[test]
    fn resolve_api_key_env_var() {
        let var_name = "AS_TEST_RESOLVE_ENV_KEY_1234";
        std::env::set_var(var_name, "env-secret-value");
        let auth = AuthConfig {
            env: Some(var_name.into()),
            ..Default::default()
        };
        let result = resolve_api_key(&auth).unwrap();
        assert_eq!(result, "env-secret-value");
        std::env::remove_var(var_name);
    }

    #[test]
    fn resolve_api_key_env_var_missing() {
        let auth = AuthConfig {
            env: Some("AS_TEST_NONEXISTENT_VAR_8888".into()),
            ..Default::default()
        };
        let err = resolve_api_key(&auth).unwrap_err();
        assert!(err.to_string().contains("AS_TEST_NONEXISTENT_VAR_8888"));
    }

    #[test]
    fn resolve_api_key_no_config() {
        let auth = AuthConfig::default();
        let err = resolve_api_key(&auth).unwrap_err();
        assert!(err.to_string().contains("no API key configured"));
    }

    #[test]
    fn resolve_api_key_plaintext_takes_precedence_over_env() {
        let auth = AuthConfig {
            key: Some("plaintext-wins".into()),
            env: Some("AS_TEST_SHOULD_NOT_BE_READ".into()),
            ..Default::default()
        };
        let result = resolve_api_key(&auth).unwrap();
        assert_eq!(result, "plaintext-wins");
    }

    #[test]
    fn resolve_api_key_rotation_pool_picks_first_set_var() {
        let var_a = "AS_TEST_ROTATION_A";
        let var_b = "AS_TEST_ROTATION_B";
        std::env::remove_var(var_a);
        std::env::set_var(var_b, "rotation-b-value");
        let auth = AuthConfig {
            keys: vec![var_a.into(), var_b.into()],
            ..Default::default()
        };
        let result = resolve_api_key(&auth).unwrap();
        assert_eq!(result, "rotation-b-value");
        std::env::remove_var(var_b);
    }
}
