use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tracing::info;

use crate::error::{RelayError, Result};
use crate::models::{ApiKeys, ProviderMap, SystemPrompts};

pub const DEFAULT_PROVIDERS_FILE: &str = "providers.json";
pub const DEFAULT_API_KEYS_FILE: &str = "apikeys.json";
pub const FALLBACK_API_KEYS_FILE: &str = "default_apikeys.json";
pub const DEFAULT_SYSTEM_PROMPTS_FILE: &str = "default_systemprompts.json";

/**
 * \brief A JSON document that can be loaded from and stored to a file.
 *
 * `load` replaces the in-memory contents; `store` writes pretty-printed JSON,
 * falling back to `DEFAULT_FILE` when no path is given.
 */
pub trait JsonFile: Serialize + DeserializeOwned + Sized {
    const DEFAULT_FILE: &'static str;
    const KIND: &'static str;

    fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        *self = read_json(path, Self::KIND)?;
        info!(path = %path.display(), "{} loaded", Self::KIND);
        Ok(())
    }

    fn store(&self, path: Option<&Path>) -> Result<PathBuf> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_FILE));
        write_json(self, &path, Self::KIND)?;
        info!(path = %path.display(), "{} stored", Self::KIND);
        Ok(path)
    }

    fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        read_json(path.as_ref(), Self::KIND)
    }
}

impl JsonFile for ProviderMap {
    const DEFAULT_FILE: &'static str = DEFAULT_PROVIDERS_FILE;
    const KIND: &'static str = "providers";
}

impl JsonFile for ApiKeys {
    const DEFAULT_FILE: &'static str = DEFAULT_API_KEYS_FILE;
    const KIND: &'static str = "API keys";
}

impl JsonFile for SystemPrompts {
    const DEFAULT_FILE: &'static str = DEFAULT_SYSTEM_PROMPTS_FILE;
    const KIND: &'static str = "system prompts";
}

fn read_json<T: DeserializeOwned>(path: &Path, kind: &str) -> Result<T> {
    let raw = std::fs::read_to_string(path).map_err(|source| RelayError::File {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| RelayError::Decode {
        context: format!("{} from {}", kind, path.display()),
        source,
        body: None,
    })
}

fn write_json<T: Serialize>(value: &T, path: &Path, kind: &str) -> Result<()> {
    let data = serde_json::to_string_pretty(value).map_err(|source| RelayError::Decode {
        context: format!("{} for {}", kind, path.display()),
        source,
        body: None,
    })?;
    std::fs::write(path, data).map_err(|source| RelayError::File {
        path: path.to_path_buf(),
        source,
    })
}

/**
 * \brief Built-in system prompts written on first start.
 */
pub fn default_system_prompts() -> SystemPrompts {
    let mut prompts = SystemPrompts::default();
    prompts.set("minimal", "You are a helpful assistant.");
    prompts.set("firstPerson", FIRST_PERSON_DEFAULT);
    prompts.set("thirdPerson", THIRD_PERSON_DEFAULT);
    prompts
}

/**
 * \brief Load the system prompts file, seeding it with the defaults when it does not exist yet.
 */
pub fn load_or_init_system_prompts(path: &Path) -> Result<SystemPrompts> {
    if !path.exists() {
        default_system_prompts().store(Some(path))?;
    }
    SystemPrompts::from_file(path)
}

const FIRST_PERSON_DEFAULT: &str = "Adopt the role assigned by the user, crafting dramatic, \
immersive scenes through concise, varied prose. Speak and react as your character in first \
person, present tense, addressing the user's character as \"you\". Keep replies to at most three \
short paragraphs, favour dialogue and action over narration, and never write a closing scene; \
assume the story continues.";

const THIRD_PERSON_DEFAULT: &str = "You are a fiction story generator, crafting dramatic, \
immersive scenes through concise, varied prose. Tell the story in past tense from a neutral \
observer viewpoint, in small chunks of about one paragraph. Treat each user message as a \
directive for the next increment of the story; a bare \"?\" means \"continue the story\".";
