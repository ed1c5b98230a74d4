//! `env(NAME)` / `vault(path#key)` secret references.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use as_domain::error::{Error, Result};
use parking_lot::Mutex;

use crate::redact::SecretRegistry;

/// A parsed secret reference, selected by the reference prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretRef {
    Env { name: String },
    Vault { path: String, key: String },
}

impl SecretRef {
    /// Parse `"env(NAME)"` or `"vault(path#key)"`. Any other prefix is
    /// `secret_format_unsupported`.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if let Some(inner) = strip_call(raw, "env") {
            if inner.is_empty() {
                return Err(Error::SecretFormatUnsupported(raw.to_string()));
            }
            return Ok(SecretRef::Env {
                name: inner.to_string(),
            });
        }
        if let Some(inner) = strip_call(raw, "vault") {
            let (path, key) = inner
                .split_once('#')
                .ok_or_else(|| Error::SecretFormatUnsupported(raw.to_string()))?;
            if path.is_empty() || key.is_empty() {
                return Err(Error::SecretFormatUnsupported(raw.to_string()));
            }
            return Ok(SecretRef::Vault {
                path: path.to_string(),
                key: key.to_string(),
            });
        }
        Err(Error::SecretFormatUnsupported(raw.to_string()))
    }
}

fn strip_call<'a>(raw: &'a str, func: &str) -> Option<&'a str> {
    let prefix = format!("{func}(");
    let rest = raw.strip_prefix(&prefix)?;
    rest.strip_suffix(')')
}

/// Resolves `env(NAME)` references from the process environment.
pub struct EnvResolver;

impl EnvResolver {
    pub fn resolve(&self, name: &str) -> Result<String> {
        std::env::var(name).map_err(|_| Error::SecretUnresolved(name.to_string()))
    }
}

/// Resolves `vault(path#key)` references against a KV-v2-shaped HTTP
/// secret store, caching successful lookups for `ttl`.
pub struct VaultResolver {
    base_url: String,
    token: String,
    ttl: Duration,
    client: reqwest::Client,
    cache: Mutex<HashMap<String, (HashMap<String, String>, Instant)>>,
}

impl VaultResolver {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, ttl: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            ttl,
            client: reqwest::Client::new(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn resolve(&self, path: &str, key: &str) -> Result<String> {
        if let Some((data, fetched_at)) = self.cache.lock().get(path).cloned() {
            if fetched_at.elapsed() < self.ttl {
                return data
                    .get(key)
                    .cloned()
                    .ok_or_else(|| Error::SecretUnresolved(format!("vault({path}#{key})")));
            }
        }

        let url = format!("{}/v1/secret/data/{}", self.base_url.trim_end_matches('/'), path);
        let resp = self
            .client
            .get(&url)
            .header("X-Vault-Token", &self.token)
            .send()
            .await
            .map_err(|e| Error::SecretUnresolved(format!("vault fetch {path}: {e}")))?;

        if !resp.status().is_success() {
            return Err(Error::SecretUnresolved(format!(
                "vault({path}#{key}): server returned {}",
                resp.status()
            )));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::SecretUnresolved(format!("vault({path}#{key}): {e}")))?;
        let data_obj = body
            .pointer("/data/data")
            .and_then(|v| v.as_object())
            .ok_or_else(|| Error::SecretUnresolved(format!("vault({path}#{key}): malformed response")))?;

        let data: HashMap<String, String> = data_obj
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect();

        self.cache.lock().insert(path.to_string(), (data.clone(), Instant::now()));

        data.get(key)
            .cloned()
            .ok_or_else(|| Error::SecretUnresolved(format!("vault({path}#{key})")))
    }
}

/// Resolve a raw reference string, registering the result with the
/// redaction sink on success so it never surfaces in logs.
pub async fn resolve(
    raw: &str,
    env: &EnvResolver,
    vault: Option<&VaultResolver>,
    registry: &SecretRegistry,
) -> Result<String> {
    let value = match SecretRef::parse(raw)? {
        SecretRef::Env { name } => env.resolve(&name)?,
        SecretRef::Vault { path, key } => {
            let vault = vault.ok_or_else(|| {
                Error::SecretUnresolved(format!("vault({path}#{key}): no vault resolver configured"))
            })?;
            vault.resolve(&path, &key).await?
        }
    };
    registry.register(&value);
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_env_ref() {
        assert_eq!(
            SecretRef::parse("env(API_KEY)").unwrap(),
            SecretRef::Env { name: "API_KEY".into() }
        );
    }

    #[test]
    fn parses_vault_ref() {
        assert_eq!(
            SecretRef::parse("vault(secret/data/app#token)").unwrap(),
            SecretRef::Vault {
                path: "secret/data/app".into(),
                key: "token".into(),
            }
        );
    }

    #[test]
    fn rejects_unsupported_prefix() {
        let err = SecretRef::parse("plaintext(hello)").unwrap_err();
        assert_eq!(err.kind(), "secret_format_unsupported");
    }

    #[test]
    fn rejects_vault_without_key() {
        let err = SecretRef::parse("vault(secret/app)").unwrap_err();
        assert_eq!(err.kind(), "secret_format_unsupported");
    }

    #[test]
    fn env_resolver_reports_unresolved() {
        let r = EnvResolver;
        let err = r.resolve("AGENTSPEC_DEFINITELY_UNSET_VAR").unwrap_err();
        assert_eq!(err.kind(), "secret_unresolved");
    }

    #[test]
    fn env_resolver_reads_value() {
        std::env::set_var("AS_SECRETS_TEST_VAR", "shh");
        let r = EnvResolver;
        assert_eq!(r.resolve("AS_SECRETS_TEST_VAR").unwrap(), "shh");
        std::env::remove_var("AS_SECRETS_TEST_VAR");
    }
}
