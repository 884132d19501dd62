mod ask;
mod cached;
mod check;
mod config;
mod lookup;

use crate::state::Context;

/// Discord rejects messages over 2000 characters; leave a little slack.
const CHUNK_LIMIT: usize = 1990;

/// DietNerd - research-backed nutrition answers
#[poise::command(
    slash_command,
    subcommands(
        "ask::ask",
        "check::check",
        "lookup::lookup",
        "cached::cached",
        "config::config"
    )
)]
pub async fn dietnerd(_ctx: Context<'_>) -> Result<(), anyhow::Error> {
    Ok(())
}

/// Split text into pieces of at most `limit` bytes, preferring to break after
/// a newline, then after a space.
pub fn chunk_message(text: &str, limit: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut remaining = text;
    while !remaining.is_empty() {
        if remaining.len() <= limit {
            chunks.push(remaining);
            break;
        }
        let end = (1..=limit)
            .rev()
            .find(|&i| remaining.is_char_boundary(i))
            .unwrap_or_else(|| {
                remaining
                    .char_indices()
                    .nth(1)
                    .map_or(remaining.len(), |(i, _)| i)
            });
        let window = &remaining[..end];
        let split_at = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .map(|i| i + 1)
            .unwrap_or(end);
        chunks.push(&remaining[..split_at]);
        remaining = &remaining[split_at..];
    }
    chunks
}

/// Send a message in Discord-safe chunks.
/// Uses ctx.say() for all chunks: poise routes follow-ups through the
/// interaction webhook, which doesn't require Send Messages channel permission.
pub async fn send_chunked(ctx: &Context<'_>, text: &str) -> Result<(), anyhow::Error> {
    for chunk in chunk_message(text, CHUNK_LIMIT) {
        ctx.say(chunk).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_message_is_one_chunk() {
        assert_eq!(chunk_message("hello", 10), vec!["hello"]);
        assert!(chunk_message("", 10).is_empty());
    }

    #[test]
    fn test_breaks_on_newline_then_space() {
        assert_eq!(
            chunk_message("line one\nline two\nline three", 12),
            vec!["line one\n", "line two\n", "line three"]
        );
        assert_eq!(chunk_message("aaaa bbbb cccc", 10), vec!["aaaa bbbb ", "cccc"]);
    }

    #[test]
    fn test_never_splits_inside_a_character() {
        let text = "é".repeat(10);
        let chunks = chunk_message(&text, 5);
        assert!(chunks.iter().all(|c| c.len() <= 5));
        assert_eq!(chunks.concat(), text);
    }
}
