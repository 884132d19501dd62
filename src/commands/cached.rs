use crate::state::Context;

/// Show what the article cache and answer archive hold
#[poise::command(slash_command, guild_only)]
pub async fn cached(
    ctx: Context<'_>,
    #[description = "How many stored questions to list (default 10)"] limit: Option<usize>,
) -> Result<(), anyhow::Error> {
    let data = ctx.data();
    let records = data.cache.list_records().await?;
    let questions = data.archive.questions().await?;
    let active = data.pipeline.sessions().active();

    let full_text = records.iter().filter(|r| r.pmcid.is_some()).count();
    let mut msg = format!(
        "**Cache:** {} analyzed articles ({} with a PMC id)\n**Archive:** {} answered questions\n**Running:** {} research session(s)\n",
        records.len(),
        full_text,
        questions.len(),
        active.len()
    );

    for session in &active {
        msg.push_str(&format!(
            "- `{}` {} (started <t:{}:R>)\n",
            &session.id[..8.min(session.id.len())],
            session.question,
            session.started_at.timestamp()
        ));
    }

    let limit = limit.unwrap_or(10);
    if !questions.is_empty() && limit > 0 {
        msg.push_str("\n**Recent questions:**\n");
        for q in questions.iter().take(limit) {
            msg.push_str(&format!("- {}\n", q));
        }
    }

    super::send_chunked(&ctx, &msg).await
}
