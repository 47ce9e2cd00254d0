use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::info;

use crate::error::{RelayError, Result};
use crate::llm::ChatClient;
use crate::models::{ApiKeys, Model, Provider, ProviderMap};

/**
 * \brief Snapshot of the current provider, model and API key.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub provider: Provider,
    pub model: Model,
    pub api_key: String,
}

#[derive(Debug)]
struct Inner {
    current: Selection,
    available: ProviderMap,
    api_keys: ApiKeys,
}

/**
 * \brief Runtime provider/model selection shared by every relay handler.
 *
 * A single readers-writer lock guards the whole state: reads take it shared,
 * `set_provider`/`set_model` take it exclusively, so callers never observe a
 * provider paired with a model it does not own.
 */
#[derive(Debug)]
pub struct ServerState {
    inner: RwLock<Inner>,
    client: ChatClient,
}

impl ServerState {
    /**
     * \brief Filter providers down to those with a usable key and install the initial selection.
     * \param initial must name an available provider and one of its models
     */
    pub fn new(
        providers: ProviderMap,
        api_keys: ApiKeys,
        initial: Selection,
        client: ChatClient,
    ) -> Result<Self> {
        let available: ProviderMap = providers
            .iter()
            .filter(|(id, _)| api_keys.usable(id).is_some())
            .map(|(_, p)| p.clone())
            .collect();

        if !available.contains(&initial.provider.id) {
            return Err(RelayError::NotFound(format!(
                "provider {} not found or not available",
                initial.provider.id
            )));
        }
        initial.provider.get_model(&initial.model.id)?;

        Ok(Self {
            inner: RwLock::new(Inner {
                current: initial,
                available,
                api_keys,
            }),
            client,
        })
    }

    pub fn client(&self) -> &ChatClient {
        &self.client
    }

    /**
     * \brief Switch provider; keeps the current model when the new provider lists it, else its first model.
     */
    pub fn set_provider(&self, provider_id: &str) -> Result<Selection> {
        let mut inner = self.write();

        let provider = inner.available.get(provider_id).cloned().ok_or_else(|| {
            RelayError::NotFound(format!(
                "provider {} not found or not available",
                provider_id
            ))
        })?;
        let api_key = inner.api_keys.get(provider_id)?.to_string();

        let model = match provider.get_model(&inner.current.model.id) {
            Ok(model) => model.clone(),
            Err(_) => provider
                .models
                .first()
                .cloned()
                .ok_or_else(|| RelayError::NoModels(provider_id.to_string()))?,
        };

        inner.current = Selection {
            provider,
            model,
            api_key,
        };
        info!(
            provider = %inner.current.provider.display_name,
            model = %inner.current.model.display_name,
            "provider changed"
        );
        Ok(inner.current.clone())
    }

    /**
     * \brief Switch model within the current provider.
     */
    pub fn set_model(&self, model_id: &str) -> Result<Selection> {
        let mut inner = self.write();
        let model = inner.current.provider.get_model(model_id)?.clone();
        inner.current.model = model;
        info!(model = %inner.current.model.display_name, "model changed");
        Ok(inner.current.clone())
    }

    pub fn current(&self) -> Selection {
        self.read().current.clone()
    }

    pub fn available_providers(&self) -> ProviderMap {
        self.read().available.clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn model(id: &str, temperature: f64) -> Model {
        Model {
            id: id.to_string(),
            display_name: id.to_uppercase(),
            default_temperature: temperature,
            extra_fields: None,
        }
    }

    pub(crate) fn provider(id: &str, endpoint: &str, models: Vec<Model>) -> Provider {
        Provider {
            id: id.to_string(),
            display_name: format!("{} provider", id),
            endpoint: endpoint.to_string(),
            default_max_tokens: 1000,
            models,
        }
    }

    pub(crate) fn acme_state(endpoint: &str) -> ServerState {
        let acme = provider("acme", endpoint, vec![model("m1", 0.5)]);
        let globex = provider(
            "globex",
            endpoint,
            vec![model("g1", 0.7), model("m1", 0.2)],
        );
        let initech = provider("initech", endpoint, vec![model("i1", 0.9)]);
        let empty = provider("hollow", endpoint, Vec::new());
        let providers: ProviderMap = [acme.clone(), globex, initech, empty].into_iter().collect();

        let mut keys = ApiKeys::default();
        keys.set("acme", "sk-realkey1234");
        keys.set("globex", "sk-globexkey5678");
        keys.set("initech", "your-key-here");
        keys.set("hollow", "sk-hollowkey999");

        let initial = Selection {
            model: acme.models[0].clone(),
            provider: acme,
            api_key: "sk-realkey1234".to_string(),
        };
        ServerState::new(providers, keys, initial, ChatClient::new().expect("client"))
            .expect("server state")
    }

    #[test]
    fn test_available_providers_exclude_dummy_keys() {
        let state = acme_state("https://x/y");
        assert_eq!(
            state.available_providers().ids(),
            vec!["acme", "globex", "hollow"]
        );
    }

    #[test]
    fn test_set_model_within_current_provider() {
        let state = acme_state("https://x/y");
        let sel = state.set_model("m1").expect("m1 is listed");
        assert_eq!(sel.model.id, "m1");

        let err = state.set_model("m2").unwrap_err();
        assert!(matches!(err, RelayError::NotFound(_)));
        assert_eq!(state.current().model.id, "m1");
    }

    #[test]
    fn test_set_provider_outside_available_set_leaves_state() {
        let state = acme_state("https://x/y");
        let before = state.current();
        for id in ["initech", "nope"] {
            let err = state.set_provider(id).unwrap_err();
            assert!(matches!(err, RelayError::NotFound(_)));
            assert_eq!(state.current(), before);
        }
    }

    #[test]
    fn test_set_provider_keeps_shared_model() {
        let state = acme_state("https://x/y");
        let sel = state.set_provider("globex").expect("globex");
        assert_eq!(sel.provider.id, "globex");
        assert_eq!(sel.model.id, "m1");
        assert_eq!(sel.model.default_temperature, 0.2);
        assert_eq!(sel.api_key, "sk-globexkey5678");
    }

    #[test]
    fn test_set_provider_falls_back_to_first_model() {
        let state = acme_state("https://x/y");
        state.set_provider("globex").expect("globex");
        state.set_model("g1").expect("g1");
        let sel = state.set_provider("acme").expect("acme");
        assert_eq!(sel.model.id, "m1");
        assert_eq!(state.current().api_key, "sk-realkey1234");
    }

    #[test]
    fn test_set_provider_without_models_fails_unchanged() {
        let state = acme_state("https://x/y");
        let before = state.current();
        let err = state.set_provider("hollow").unwrap_err();
        assert!(matches!(err, RelayError::NoModels(ref id) if id == "hollow"));
        assert_eq!(state.current(), before);
    }

    #[test]
    fn test_initial_provider_must_be_available() {
        let initech = provider("initech", "https://x/y", vec![model("i1", 0.9)]);
        let providers: ProviderMap = [initech.clone()].into_iter().collect();
        let mut keys = ApiKeys::default();
        keys.set("initech", "placeholder");
        let initial = Selection {
            model: initech.models[0].clone(),
            provider: initech,
            api_key: "placeholder".to_string(),
        };
        let result = ServerState::new(providers, keys, initial, ChatClient::new().expect("client"));
        assert!(matches!(result, Err(RelayError::NotFound(_))));
    }

    #[test]
    fn test_concurrent_switches_keep_pairs_consistent() {
        let state = std::sync::Arc::new(acme_state("https://x/y"));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let state = state.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let target = if i % 2 == 0 { "acme" } else { "globex" };
                        state.set_provider(target).expect("switch");
                        let sel = state.current();
                        assert!(sel.provider.get_model(&sel.model.id).is_ok());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread");
        }
    }
}
