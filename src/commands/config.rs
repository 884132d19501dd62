use std::time::Duration;

use crate::state::{Context, PipelineConfig};

/// Configure pipeline parameters (admin only)
#[poise::command(slash_command, guild_only)]
pub async fn config(
    ctx: Context<'_>,
    #[description = "Parameter name, e.g. processing_concurrency"] param: Option<String>,
    #[description = "New value (seconds for delays and timeouts, 0 disables a timeout)"]
    value: Option<u64>,
) -> Result<(), anyhow::Error> {
    let user_id = ctx.author().id.get();
    if !ctx.data().is_admin(user_id) {
        ctx.say("This command is admin-only.").await?;
        return Ok(());
    }

    match (param.as_deref(), value) {
        // Show current config
        (None, _) => {
            let config = ctx.data().config.read().await;
            ctx.say(describe(&config)).await?;
        }
        (Some(key), Some(val)) => {
            let mut config = ctx.data().config.write().await;
            match config.set(key, val) {
                Ok(()) => {
                    tracing::info!(user_id, param = key, value = val, "pipeline config changed");
                    ctx.say(format!("`{}` set to {}", key, val)).await?;
                }
                Err(msg) => {
                    ctx.say(msg).await?;
                }
            }
        }
        (Some(_), None) => {
            ctx.say("Provide both `param` and `value`. Example: `/dietnerd config processing_concurrency 4`")
                .await?;
        }
    }

    Ok(())
}

fn seconds(timeout: Option<Duration>) -> String {
    match timeout {
        Some(d) => format!("{}s", d.as_secs()),
        None => "off".to_string(),
    }
}

fn describe(config: &PipelineConfig) -> String {
    format!(
        "**Pipeline Configuration:**\n\
         `relevance_concurrency`: {}\n\
         `processing_concurrency`: {}\n\
         `results_per_query`: {}\n\
         `reprocess_delay`: {}s\n\
         `relevance_timeout`: {}\n\
         `processing_timeout`: {}\n\
         `min_synthesis_docs`: {}\n\
         `max_synthesis_docs`: {}",
        config.relevance_concurrency,
        config.processing_concurrency,
        config.results_per_query,
        config.reprocess_delay.as_secs(),
        seconds(config.relevance_timeout),
        seconds(config.processing_timeout),
        config.min_synthesis_docs,
        config.max_synthesis_docs,
    )
}
