use super::ask::{format_answer, similar_hint};
use super::send_chunked;
use crate::similar;
use crate::state::Context;

/// Show a stored answer for a question asked before
#[poise::command(slash_command, guild_only)]
pub async fn lookup(
    ctx: Context<'_>,
    #[description = "The question, as it was asked"] question: String,
) -> Result<(), anyhow::Error> {
    let archive = &ctx.data().archive;
    let user_mention = format!("<@{}>", ctx.author().id);

    if let Some(record) = archive.get(&question).await? {
        let asked = chrono::DateTime::from_timestamp(record.created_at, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_else(|| "an unknown date".to_string());
        ctx.say(format!("Stored answer from {}:", asked)).await?;
        return send_chunked(&ctx, &format_answer(&record.output, &user_mention)).await;
    }

    let questions = archive.questions().await?;
    let similar = similar::most_similar(&questions, &question);
    if similar.is_empty() {
        ctx.say("No stored answer for that question. Use `/dietnerd ask` to research it.")
            .await?;
    } else {
        ctx.say(format!("No exact match. {}", similar_hint(&similar)))
            .await?;
    }
    Ok(())
}
