use tracing::info;

use crate::state::Context;
use crate::validity::{self, Validity};

/// Check whether a question is in scope before asking it
#[poise::command(slash_command, guild_only)]
pub async fn check(
    ctx: Context<'_>,
    #[description = "Question to check"] question: String,
) -> Result<(), anyhow::Error> {
    ctx.defer().await?;
    let pipeline = &ctx.data().pipeline;
    let validity = validity::check_question(pipeline.llm(), pipeline.retry(), &question).await?;
    info!(user = %ctx.author().name, ?validity, "question checked");

    let reply = match validity.redirect() {
        None => format!("**{}** can be researched. Use `/dietnerd ask` to run it.", question),
        Some(redirect) => format!("**{}** is out of scope ({}).\n{}", question, label(validity), redirect),
    };
    ctx.say(reply).await?;
    Ok(())
}

fn label(validity: Validity) -> &'static str {
    match validity {
        Validity::Valid => "valid",
        Validity::Recipe => "recipe or meal plan",
        Validity::Animal => "animal",
    }
}
