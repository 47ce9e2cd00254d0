use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::JsonFile;
use crate::llm::ChatClient;
use crate::models::{is_dummy_api_key, ApiKeys, ProviderMap};

pub const VALIDATION_PROMPT: &str = "Say 'Hello'";

/**
 * \brief Outcome of probing one provider/model pair.
 */
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub provider: String,
    pub model: String,
    pub success: bool,
    pub error: Option<String>,
    pub response: Option<String>,
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationSummary {
    pub total: usize,
    pub success: usize,
    pub failures: usize,
}

impl ValidationSummary {
    pub fn tally(results: &[ValidationResult]) -> Self {
        let success = results.iter().filter(|r| r.success).count();
        Self {
            total: results.len(),
            success,
            failures: results.len() - success,
        }
    }
}

/**
 * \brief Load the key file, falling back to `fallback` and then to an empty store.
 *
 * The binary passes `config::FALLBACK_API_KEYS_FILE` as the fallback.
 */
pub fn load_api_keys_with_fallback(path: &Path, fallback: &Path) -> ApiKeys {
    match ApiKeys::from_file(path) {
        Ok(keys) => keys,
        Err(err) => {
            warn!("failed to load API keys from {}: {}", path.display(), err);
            match ApiKeys::from_file(fallback) {
                Ok(keys) => {
                    warn!("loaded default API keys; these are dummy keys, replace them with real ones");
                    keys
                }
                Err(err) => {
                    warn!("failed to load default API keys from {}: {}", fallback.display(), err);
                    ApiKeys::default()
                }
            }
        }
    }
}

/**
 * \brief Send the canned prompt to every model of every provider that has a usable key.
 *
 * Runs strictly in sequence; a failure is recorded and the next pair is tried.
 */
pub async fn validate_all(
    client: &ChatClient,
    providers: &ProviderMap,
    api_keys: &ApiKeys,
) -> Vec<ValidationResult> {
    let mut results = Vec::new();

    for (provider_id, provider) in providers.iter() {
        let api_key = match api_keys.get(provider_id) {
            Ok(key) if !is_dummy_api_key(key) => key,
            Ok(_) => {
                info!("skipping provider {}: placeholder API key", provider_id);
                continue;
            }
            Err(err) => {
                info!("skipping provider {}: {}", provider_id, err);
                continue;
            }
        };

        for model in &provider.models {
            info!("testing {} - {}...", provider.display_name, model.display_name);
            let started = Instant::now();
            let outcome = client
                .simple_chat(provider, model, api_key, VALIDATION_PROMPT)
                .await;
            let duration = started.elapsed();

            let result = match outcome {
                Ok(reply) => {
                    info!("success! response: {}", reply.message);
                    ValidationResult {
                        provider: provider.display_name.clone(),
                        model: model.display_name.clone(),
                        success: true,
                        error: None,
                        response: Some(reply.message),
                        duration,
                    }
                }
                Err(err) => {
                    warn!("{} - {} failed: {}", provider.display_name, model.display_name, err);
                    ValidationResult {
                        provider: provider.display_name.clone(),
                        model: model.display_name.clone(),
                        success: false,
                        error: Some(err.to_string()),
                        response: None,
                        duration,
                    }
                }
            };
            results.push(result);
        }
    }

    results
}

/**
 * \brief Human-readable report: one line per result, then the tally.
 */
pub fn render_report(results: &[ValidationResult]) -> Vec<String> {
    let mut lines = vec!["=== Validation Summary ===".to_string()];
    for r in results {
        if r.success {
            lines.push(format!(
                "✅ {} - {}: Success ({:.2}s)",
                r.provider,
                r.model,
                r.duration.as_secs_f64()
            ));
        } else {
            lines.push(format!(
                "❌ {} - {}: Failed - {}",
                r.provider,
                r.model,
                r.error.as_deref().unwrap_or("unknown error")
            ));
        }
    }
    let summary = ValidationSummary::tally(results);
    lines.push(format!(
        "Total: {}, Success: {}, Failures: {}",
        summary.total, summary.success, summary.failures
    ));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::{model, provider};
    use httpmock::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_validate_all_records_each_pair() {
        let server = MockServer::start_async().await;
        let ok = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/good")
                    .json_body_partial(r#"{"max_tokens": 100}"#)
                    .body_contains("Say 'Hello'");
                then.status(200).json_body(json!({
                    "choices": [{"message": {"content": "Hello"}, "finish_reason": "stop"}],
                    "usage": {"total_tokens": 7}
                }));
            })
            .await;
        let bad = server
            .mock_async(|when, then| {
                when.method(POST).path("/bad");
                then.status(401).body("invalid key");
            })
            .await;
        let skipped = server
            .mock_async(|when, then| {
                when.method(POST).path("/skipped");
                then.status(200);
            })
            .await;

        let providers: ProviderMap = [
            provider("alpha", &server.url("/good"), vec![model("a1", 0.5), model("a2", 0.7)]),
            provider("beta", &server.url("/bad"), vec![model("b1", 0.5)]),
            provider("gamma", &server.url("/skipped"), vec![model("c1", 0.5)]),
            provider("delta", &server.url("/skipped"), vec![model("d1", 0.5)]),
        ]
        .into_iter()
        .collect();
        let mut keys = ApiKeys::default();
        keys.set("alpha", "sk-alphakey1234");
        keys.set("beta", "sk-betakey12345");
        keys.set("gamma", "your-api-key");

        let client = ChatClient::new().expect("client");
        let results = validate_all(&client, &providers, &keys).await;

        ok.assert_hits_async(2).await;
        bad.assert_hits_async(1).await;
        skipped.assert_hits_async(0).await;

        assert_eq!(results.len(), 3);
        assert!(results[0].success && results[1].success);
        assert_eq!(results[0].response.as_deref(), Some("Hello"));
        assert!(!results[2].success);
        assert!(results[2]
            .error
            .as_deref()
            .unwrap_or_default()
            .contains("401"));
        assert_eq!(
            ValidationSummary::tally(&results),
            ValidationSummary {
                total: 3,
                success: 2,
                failures: 1
            }
        );

        let report = render_report(&results);
        assert_eq!(report.len(), 5);
        assert_eq!(report[4], "Total: 3, Success: 2, Failures: 1");
    }

    fn write_keys(path: &Path, provider_id: &str, key: &str) {
        let mut keys = ApiKeys::default();
        keys.set(provider_id, key);
        keys.store(Some(path)).expect("store keys");
    }

    #[test]
    fn test_primary_key_file_wins_over_fallback() {
        let dir = tempfile::tempdir().expect("tempdir");
        let primary = dir.path().join("apikeys.json");
        let fallback = dir.path().join("default_apikeys.json");
        write_keys(&primary, "acme", "sk-primarykey123");
        write_keys(&fallback, "acme", "your-api-key-here");

        let keys = load_api_keys_with_fallback(&primary, &fallback);
        assert_eq!(keys.get("acme").expect("key"), "sk-primarykey123");
    }

    #[test]
    fn test_missing_key_file_uses_fallback() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fallback = dir.path().join("default_apikeys.json");
        write_keys(&fallback, "globex", "your-api-key-here");

        let keys = load_api_keys_with_fallback(&dir.path().join("absent.json"), &fallback);
        assert_eq!(keys.get("globex").expect("key"), "your-api-key-here");
        assert_eq!(keys.usable("globex"), None);
    }

    #[test]
    fn test_missing_key_files_give_empty_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let keys = load_api_keys_with_fallback(
            &dir.path().join("absent.json"),
            &dir.path().join("also_absent.json"),
        );
        assert!(keys.map.is_empty());
    }

    #[test]
    fn test_malformed_key_file_uses_fallback() {
        let dir = tempfile::tempdir().expect("tempdir");
        let primary = dir.path().join("apikeys.json");
        let fallback = dir.path().join("default_apikeys.json");
        std::fs::write(&primary, "{not json").expect("write");
        write_keys(&fallback, "acme", "sk-fallbackkey12");

        let keys = load_api_keys_with_fallback(&primary, &fallback);
        assert_eq!(keys.get("acme").expect("key"), "sk-fallbackkey12");
    }
}
