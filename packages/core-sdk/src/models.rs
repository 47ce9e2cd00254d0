use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{RelayError, Result};

/**
 * \brief Provider-specific request fields merged into the outbound body as top-level keys.
 */
pub type ExtraFields = Map<String, Value>;

/**
 * \brief One addressable model under a provider.
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    /** \brief Model identifier sent upstream */
    pub id: String,
    /** \brief Display name */
    #[serde(default)]
    pub display_name: String,
    /** \brief Default sampling temperature; 0 when the file omits it */
    #[serde(default)]
    pub default_temperature: f64,
    /** \brief Passthrough fields such as safety settings */
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_fields: Option<ExtraFields>,
}

/**
 * \brief An OpenAI-compatible chat-completions endpoint and its models.
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    /** \brief Full chat-completions URL */
    pub endpoint: String,
    /** \brief 0 means the field is left out of requests */
    #[serde(default)]
    pub default_max_tokens: u32,
    /** \brief Ordered; the first entry is the fallback model */
    #[serde(default)]
    pub models: Vec<Model>,
}

impl Provider {
    /**
     * \brief Find the model whose id matches exactly.
     */
    pub fn get_model(&self, model_id: &str) -> Result<&Model> {
        self.models
            .iter()
            .find(|m| m.id == model_id)
            .ok_or_else(|| {
                RelayError::NotFound(format!(
                    "model {} not available for provider {}",
                    model_id, self.id
                ))
            })
    }
}

/**
 * \brief Providers keyed by id.
 */
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderMap(pub BTreeMap<String, Provider>);

impl ProviderMap {
    pub fn get(&self, provider_id: &str) -> Option<&Provider> {
        self.0.get(provider_id)
    }

    pub fn insert(&mut self, provider: Provider) {
        self.0.insert(provider.id.clone(), provider);
    }

    pub fn contains(&self, provider_id: &str) -> bool {
        self.0.contains_key(provider_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Provider)> {
        self.0.iter()
    }

    pub fn ids(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Provider> for ProviderMap {
    fn from_iter<I: IntoIterator<Item = Provider>>(iter: I) -> Self {
        let mut map = ProviderMap::default();
        for provider in iter {
            map.insert(provider);
        }
        map
    }
}

/**
 * \brief API keys keyed by provider id; kept in a separate file from the providers.
 */
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiKeys {
    #[serde(default)]
    pub map: BTreeMap<String, String>,
}

impl ApiKeys {
    pub fn get(&self, provider_id: &str) -> Result<&str> {
        self.map
            .get(provider_id)
            .map(String::as_str)
            .ok_or_else(|| RelayError::NotFound(format!("no API key for provider {}", provider_id)))
    }

    pub fn set(&mut self, provider_id: &str, key: &str) {
        self.map.insert(provider_id.to_string(), key.to_string());
    }

    /**
     * \brief Key exists and is not a placeholder.
     */
    pub fn usable(&self, provider_id: &str) -> Option<&str> {
        self.get(provider_id).ok().filter(|k| !is_dummy_api_key(k))
    }
}

/**
 * \brief Named system prompts.
 */
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemPrompts {
    #[serde(default)]
    pub map: BTreeMap<String, String>,
}

impl SystemPrompts {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.map.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: &str, content: &str) {
        self.map.insert(name.to_string(), content.to_string());
    }
}

const DUMMY_MARKERS: [&str; 4] = ["your", "dummy", "placeholder", "replace"];

/**
 * \brief Heuristic check for placeholder credentials.
 */
pub fn is_dummy_api_key(api_key: &str) -> bool {
    if api_key.chars().count() < 10 {
        return true;
    }
    let lowered = api_key.to_lowercase();
    DUMMY_MARKERS.iter().any(|marker| lowered.contains(marker))
}

/**
 * \brief Chat message, aligned with the OpenAI chat message format.
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /** \brief system/user/assistant */
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}
