use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use rpchat_core_sdk::{
    config::{self, JsonFile},
    llm::ChatClient,
    models::{ApiKeys, ProviderMap},
    server,
    state::{Selection, ServerState},
    telemetry, validate,
};

mod interactive;

/**
 * \brief CLI entry point: interactive chat, HTTP relay or provider validation.
 */
#[derive(Parser, Debug)]
#[command(name = "rpchat", version, about = "Chat relay for OpenAI-compatible providers")]
struct Cli {
    /** \brief Validate all providers and models, then exit */
    #[arg(long, default_value_t = false)]
    validate: bool,

    /** \brief Serve the chat API over HTTP instead of chatting on the command line */
    #[arg(long, default_value_t = false)]
    serve: bool,

    /** \brief Providers file */
    #[arg(long, default_value = config::DEFAULT_PROVIDERS_FILE)]
    config: PathBuf,

    /** \brief API keys file */
    #[arg(long, default_value = config::DEFAULT_API_KEYS_FILE)]
    apikeys: PathBuf,

    /** \brief System prompts file, created with defaults when missing */
    #[arg(long, default_value = config::DEFAULT_SYSTEM_PROMPTS_FILE)]
    prompts: PathBuf,

    /** \brief System prompt name used for the interactive session */
    #[arg(long, default_value = "minimal")]
    system_prompt: String,

    #[arg(long, default_value = "gemini")]
    provider: String,

    #[arg(long, default_value = "gemini-2.5-flash")]
    model: String,

    /** \brief Relay listen address */
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: String,

    /** \brief Static web assets served by the relay */
    #[arg(long, env = "RPCHAT_WEB_DIR", default_value = "web")]
    web_dir: PathBuf,

    /** \brief Also append logs to <dir>/rpchat.log */
    #[arg(long, env = "RPCHAT_LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    telemetry::init(&telemetry::TelemetryOptions {
        verbose: cli.verbose,
        log_dir: cli.log_dir.clone(),
    })?;

    let client = ChatClient::new().context("build HTTP client failed")?;

    if cli.validate {
        info!("running model validation...");
        let providers = ProviderMap::from_file(&cli.config).context("load providers failed")?;
        let api_keys = validate::load_api_keys_with_fallback(
            &cli.apikeys,
            Path::new(config::FALLBACK_API_KEYS_FILE),
        );
        let results = validate::validate_all(&client, &providers, &api_keys).await;
        for line in validate::render_report(&results) {
            println!("{}", line);
        }
        return Ok(());
    }

    let prompts = config::load_or_init_system_prompts(&cli.prompts)
        .context("initialize system prompts failed")?;

    let providers = ProviderMap::from_file(&cli.config).context("load providers failed")?;
    let api_keys = ApiKeys::from_file(&cli.apikeys).context("load API keys failed")?;

    let provider = providers
        .get(&cli.provider)
        .cloned()
        .with_context(|| format!("provider {} not found", cli.provider))?;
    let model = provider
        .get_model(&cli.model)
        .context("get model failed")?
        .clone();
    let api_key = api_keys
        .get(&cli.provider)
        .context("get API key failed")?
        .to_string();

    println!("Provider: {} ({})", provider.display_name, provider.endpoint);
    println!("Model: {} ({})", model.display_name, model.id);

    if cli.serve {
        let selection = Selection {
            provider,
            model,
            api_key,
        };
        let state = ServerState::new(providers, api_keys, selection, client)
            .context("initialize server state failed")?;
        return server::run(&cli.addr, Arc::new(state), &cli.web_dir).await;
    }

    let system_prompt = prompts.get(&cli.system_prompt);
    if system_prompt.is_none() {
        warn!("system prompt {} not found, starting without one", cli.system_prompt);
    }

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    interactive::chat_loop(
        &client,
        &provider,
        &model,
        &api_key,
        system_prompt,
        stdin.lock(),
        &mut stdout,
    )
    .await?;

    Ok(())
}
