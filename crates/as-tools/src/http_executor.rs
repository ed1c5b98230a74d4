//! HTTP executor: a configured `{method, url, headers,
//! body_template}` request, guarded against SSRF, capped in response
//! size, with its rendered body escaped before it becomes LLM-visible.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;

use crate::registry::ToolExecutor;
use crate::ssrf;

/// Hard cap on response bytes read from any executor
/// (§8: "HTTP response ≥ 10 MiB → truncated, flag set").
pub const MAX_RESPONSE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct HttpToolConfig {
    pub method: String,
    pub url: String,
    pub headers: HashMap<String, String>,
    /// `{{field}}` placeholders rendered from the call's input object.
    pub body_template: Option<String>,
    pub timeout: Duration,
}

pub struct HttpExecutor {
    config: HttpToolConfig,
    client: reqwest::Client,
}

impl HttpExecutor {
    pub fn new(config: HttpToolConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

/// Render `{{field}}` placeholders from `input`, HTML-escaping and
/// literal-brace-escaping each substituted value so neither breaks the
/// template grammar nor injects markup into LLM-visible results.
pub fn render_template(template: &str, input: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i..].starts_with(b"{{") {
            if let Some(end) = template[i + 2..].find("}}") {
                let field = template[i + 2..i + 2 + end].trim();
                let value = input
                    .get(field)
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .unwrap_or_default();
                out.push_str(&escape_for_template(&value));
                i += 2 + end + 2;
                continue;
            }
        }
        let ch = template[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

fn escape_for_template(s: &str) -> String {
    s.replace('{', "&#123;")
        .replace('}', "&#125;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[async_trait::async_trait]
impl ToolExecutor for HttpExecutor {
    async fn execute(&self, input: Value) -> (String, Option<String>) {
        let url = match reqwest::Url::parse(&self.config.url) {
            Ok(u) => u,
            Err(e) => return (String::new(), Some(format!("invalid url: {e}"))),
        };
        let Some(host) = url.host_str() else {
            return (String::new(), Some("url has no host".to_string()));
        };
        if let Err(e) = ssrf::check_host(host) {
            return (String::new(), Some(e.to_string()));
        }

        let body = self
            .config
            .body_template
            .as_ref()
            .map(|t| render_template(t, &input));

        let method = match self.config.method.to_uppercase().as_str() {
            "GET" => reqwest::Method::GET,
            "POST" => reqwest::Method::POST,
            "PUT" => reqwest::Method::PUT,
            "PATCH" => reqwest::Method::PATCH,
            "DELETE" => reqwest::Method::DELETE,
            other => return (String::new(), Some(format!("unsupported method: {other}"))),
        };

        let mut req = self.client.request(method, url).timeout(self.config.timeout);
        for (k, v) in &self.config.headers {
            req = req.header(k, v);
        }
        if let Some(body) = body {
            req = req.body(body);
        }

        let resp = match req.send().await {
            Ok(r) => r,
            Err(e) => return (String::new(), Some(format!("request failed: {e}"))),
        };

        let status = resp.status();
        let mut stream_body = resp.bytes_stream();
        let mut buf = Vec::new();
        let mut truncated = false;
        {
            use futures_util::StreamExt;
            while let Some(chunk) = stream_body.next().await {
                match chunk {
                    Ok(bytes) => {
                        if buf.len() + bytes.len() > MAX_RESPONSE_BYTES {
                            let remaining = MAX_RESPONSE_BYTES.saturating_sub(buf.len());
                            buf.extend_from_slice(&bytes[..remaining.min(bytes.len())]);
                            truncated = true;
                            break;
                        }
                        buf.extend_from_slice(&bytes);
                    }
                    Err(e) => return (String::new(), Some(format!("error reading response body: {e}"))),
                }
            }
        }

        let text = String::from_utf8_lossy(&buf).to_string();
        let result = serde_json::json!({
            "status": status.as_u16(),
            "body": text,
            "truncated": truncated,
        });

        if status.is_success() {
            (result.to_string(), None)
        } else {
            (result.to_string(), Some(format!("HTTP {status}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_and_escapes_template_fields() {
        let input = serde_json::json!({ "city": "<London> {bad}" });
        let out = render_template("city={{city}}", &input);
        assert_eq!(out, "city=&lt;London&gt; &#123;bad&#125;");
    }

    #[test]
    fn missing_field_renders_empty() {
        let input = serde_json::json!({});
        let out = render_template("q={{missing}}", &input);
        assert_eq!(out, "q=");
    }

    #[tokio::test]
    async fn ssrf_blocked_before_connecting() {
        let executor = HttpExecutor::new(HttpToolConfig {
            method: "GET".into(),
            url: "http://127.0.0.1:59999/foo".into(),
            headers: HashMap::new(),
            body_template: None,
            timeout: Duration::from_secs(1),
        });
        let (_, err) = executor.execute(serde_json::json!({})).await;
        assert!(err.unwrap().contains("SSRF"));
    }
}
