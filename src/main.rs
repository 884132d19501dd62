mod article;
mod cache;
mod citation;
mod commands;
mod fulltext;
mod llm;
mod pipeline;
mod processor;
mod prompts;
mod pubmed;
mod relevance;
mod retrieval;
mod similar;
mod state;
mod store;
mod synthesis;
mod taskgroup;
mod validity;

#[cfg(test)]
mod testing;

use std::collections::HashSet;
use std::sync::Arc;

use poise::serenity_prelude as serenity;
use poise::{Framework, FrameworkOptions};
use tokio::sync::RwLock;
use tracing::{error, info, Level};

use cache::ReliabilityCache;
use fulltext::publishers::PublisherKeys;
use fulltext::FullTextChain;
use llm::{LlmClient, RetryPolicy};
use pipeline::Pipeline;
use pubmed::PubMedClient;
use state::{AppState, PipelineConfig};
use store::{AnswerArchive, CnidariumStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .init();

    // Load env
    let _ = dotenv::dotenv();
    let token = dotenv::var("DISCORD_TOKEN").expect("DISCORD_TOKEN required");
    let guild_id: Option<serenity::GuildId> = dotenv::var("DISCORD_GUILD_ID")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(serenity::GuildId::new);

    // Init storage
    let data_dir = std::path::PathBuf::from(
        dotenv::var("DATA_DIR").unwrap_or_else(|_| "./data/dietnerd".to_string()),
    );
    let store = Arc::new(CnidariumStore::new(&data_dir).await?);
    let cache = Arc::new(ReliabilityCache::new(store.clone()));
    let archive = Arc::new(AnswerArchive::new(store));
    info!("Record store initialized at {:?}", data_dir);

    let llm_client = Arc::new(LlmClient::from_env()?);
    let pubmed = Arc::new(PubMedClient::from_env()?);
    let retry = RetryPolicy::default();

    let keys = PublisherKeys::from_env();
    let fulltext = Arc::new(FullTextChain::standard(
        fulltext::http_client()?,
        llm_client.clone(),
        retry.clone(),
        keys,
    ));
    info!(providers = ?fulltext.provider_names(), "Full-text chain ready");

    // Parse admin user IDs from env
    let admin_ids: HashSet<u64> = dotenv::var("ADMIN_USER_IDS")
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse::<u64>().ok())
        .collect();
    if !admin_ids.is_empty() {
        info!(count = admin_ids.len(), "Admin users configured");
    }

    let pipeline = Arc::new(Pipeline::new(
        llm_client,
        retry,
        pubmed,
        cache.clone(),
        archive.clone(),
        fulltext,
    ));

    let app_state = AppState {
        pipeline,
        cache,
        archive,
        admin_ids,
        config: Arc::new(RwLock::new(PipelineConfig::default())),
    };

    let intents =
        serenity::GatewayIntents::GUILDS | serenity::GatewayIntents::GUILD_MESSAGES;

    let framework = Framework::builder()
        .options(FrameworkOptions {
            commands: vec![commands::dietnerd()],
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!("Bot connected as: {} ({})", ready.user.name, ready.user.id);

                let commands = &framework.options().commands;
                for cmd in commands {
                    info!("  /{} ({} subcommands)", cmd.name, cmd.subcommands.len());
                }

                if let Some(gid) = guild_id {
                    info!("Registering to guild {} (instant)", gid);
                    poise::builtins::register_in_guild(ctx, commands, gid).await?;
                } else {
                    info!("Registering globally (up to 1 hour delay)");
                    poise::builtins::register_globally(ctx, commands).await?;
                }

                Ok(app_state)
            })
        })
        .build();

    info!("Starting DietNerd Discord bot...");

    let mut client = serenity::ClientBuilder::new(&token, intents)
        .framework(framework)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    if let Err(e) = client.start().await {
        error!("Client error: {}", e);
    }

    Ok(())
}
