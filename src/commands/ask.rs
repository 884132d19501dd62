use poise::CreateReply;
use tracing::{info, warn};

use super::send_chunked;
use crate::pipeline::session::ProgressEvent;
use crate::pipeline::FinalOutput;
use crate::prompts;
use crate::similar;
use crate::state::Context;

/// Ask a nutrition question
#[poise::command(slash_command, guild_only)]
pub async fn ask(
    ctx: Context<'_>,
    #[description = "Your nutrition or health question"] question: String,
) -> Result<(), anyhow::Error> {
    // Acknowledge immediately; a run takes minutes
    let user_mention = format!("<@{}>", ctx.author().id);
    let handle = ctx
        .say(format!(
            "Got it, researching **{}** for you. I'll ping you when the answer is ready, {}",
            question, user_mention
        ))
        .await?;

    let previous = ctx.data().archive.questions().await.unwrap_or_default();
    let similar = similar::most_similar(&previous, &question);
    if !similar.is_empty() {
        ctx.say(similar_hint(&similar)).await?;
    }

    let config = ctx.data().config.read().await.clone();
    info!(user = %ctx.author().name, question, "research started");

    let mut stream = ctx.data().pipeline.start(question.clone(), config);
    let mut steps: Vec<String> = Vec::new();
    while let Some(event) = stream.next().await {
        match event {
            ProgressEvent::Update(step) => {
                steps.push(step);
                let content = progress_text(&question, &steps);
                if let Err(e) = handle.edit(ctx, CreateReply::default().content(content)).await {
                    warn!("failed to edit progress message: {}", e);
                }
            }
            ProgressEvent::Final(output) => {
                info!(
                    session_id = %stream.session_id(),
                    citations = output.citations.len(),
                    "research complete"
                );
                return send_chunked(&ctx, &format_answer(&output, &user_mention)).await;
            }
            ProgressEvent::Failed(reason) => {
                ctx.say(format!(
                    "{} sorry, the research run failed: {}",
                    user_mention, reason
                ))
                .await?;
                return Ok(());
            }
        }
    }
    Ok(())
}

fn progress_text(question: &str, steps: &[String]) -> String {
    let mut text = format!("Researching **{}**\n", question);
    for (i, step) in steps.iter().enumerate() {
        let marker = if i + 1 == steps.len() { "⏳" } else { "✓" };
        text.push_str(&format!("{} {}\n", marker, step));
    }
    text
}

pub fn similar_hint(similar: &[(f64, String)]) -> String {
    let mut text = String::from("Similar questions were answered before (see `/dietnerd lookup`):\n");
    for (score, q) in similar {
        text.push_str(&format!("- {} ({:.2})\n", q, score));
    }
    text
}

/// Render a finished run for chat: the answer body, the reference list with
/// PubMed links for matched references, then the disclaimer.
pub fn format_answer(output: &FinalOutput, user_mention: &str) -> String {
    if let Some(redirect) = &output.redirect {
        return format!("{} {}", user_mention, redirect);
    }

    let mut full = format!(
        "{} here's what I found:\n\n**Q:** {}\n\n{}",
        user_mention, output.question, output.main_answer
    );

    if !output.references.is_empty() {
        full.push_str("\n\n**References:**\n");
        for reference in &output.references {
            match output.citations.get(reference) {
                Some(target) => full.push_str(&format!("{} ([PubMed](<{}>))\n", reference, target.url)),
                None => full.push_str(&format!("{}\n", reference)),
            }
        }
    }

    full.push_str(&format!(
        "\n_{} articles analyzed in {:.0}s_\n\n{}",
        output.evidence.len(),
        output.runtime.total,
        prompts::DISCLAIMER
    ));
    full
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthesis::CitationTarget;

    #[test]
    fn test_format_links_matched_references() {
        let mut output = FinalOutput {
            question: "Is coffee healthy?".into(),
            main_answer: "* Yes, in moderation [1].".into(),
            references: vec!["[1] Smith J. Coffee. PMID: 1".into(), "[2] Unmatched.".into()],
            ..FinalOutput::default()
        };
        output.citations.insert(
            "[1] Smith J. Coffee. PMID: 1".into(),
            CitationTarget {
                pmid: "1".into(),
                url: "https://pubmed.ncbi.nlm.nih.gov/1/".into(),
                ..CitationTarget::default()
            },
        );

        let text = format_answer(&output, "<@7>");
        assert!(text.starts_with("<@7> here's what I found:"));
        assert!(text.contains("[1] Smith J. Coffee. PMID: 1 ([PubMed](<https://pubmed.ncbi.nlm.nih.gov/1/>))\n"));
        assert!(text.contains("[2] Unmatched.\n"));
        assert!(text.ends_with(prompts::DISCLAIMER));
    }

    #[test]
    fn test_format_redirect() {
        let output = FinalOutput {
            redirect: Some(prompts::ANIMAL_REDIRECT.into()),
            ..FinalOutput::default()
        };
        assert_eq!(
            format_answer(&output, "<@7>"),
            format!("<@7> {}", prompts::ANIMAL_REDIRECT)
        );
    }

    #[test]
    fn test_progress_marks_current_step() {
        let steps = vec!["one".to_string(), "two".to_string()];
        assert_eq!(progress_text("q", &steps), "Researching **q**\n✓ one\n⏳ two\n");
    }
}
