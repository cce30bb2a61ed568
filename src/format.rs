use poise::serenity_prelude::{CreateEmbed, CreateEmbedFooter, Timestamp};

use crate::core::{safe_truncate, DEFAULT_EMBED_COLOUR};
use crate::model::{Challenge, Status};

/// Code bodies longer than this are truncated in the acknowledgment embed
/// and reposted whole in a follow-up message.
pub const CODE_EMBED_LIMIT: usize = 1900;

/// Hard cap on listed entries; an embed holds at most 25 fields.
pub const MAX_LISTED_SUBMISSIONS: usize = 25;

/// Deterministic channel name for a submission thread. Discord applies its
/// own lowercasing/sanitisation to whatever we send.
pub fn thread_channel_name(username: &str, week: i64) -> String {
    format!("{}-week{}", username, week)
}

/// Uppercase the first letter, the way the embeds display languages.
pub fn capitalise(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Split a code body into the block embedded in the acknowledgment and, for
/// oversized bodies, a follow-up message carrying the whole thing.
pub fn split_code(code: &str, language: &str) -> (String, Option<String>) {
    if code.len() <= CODE_EMBED_LIMIT {
        return (format!("```{}\n{}\n```", language, code), None);
    }

    let shown = safe_truncate(code.to_string(), CODE_EMBED_LIMIT);
    (
        format!("```{}\n{}\n```", language, shown),
        Some(format!("```{}\n{}\n```", language, code)),
    )
}

/// The acknowledgment embed posted into a freshly created submission thread.
pub fn submission_embed(
    challenge: &Challenge,
    author_mention: &str,
    language: &str,
    notes: &str,
    code_block: &str,
    truncated: bool,
) -> CreateEmbed {
    let mut embed = CreateEmbed::new()
        .colour(DEFAULT_EMBED_COLOUR)
        .title(format!("Submission for: {}", challenge.title))
        .description(format!("Week {} - {}", challenge.week, challenge.difficulty))
        .timestamp(Timestamp::now())
        .field("Submitted by", author_mention, true)
        .field("Language", capitalise(language), true)
        .field("Status", "Pending Review", true);

    if !notes.is_empty() {
        embed = embed.field("Notes", notes, false);
    }

    embed = embed.field("Code", code_block, false);

    if truncated {
        embed = embed.footer(CreateEmbedFooter::new(
            "Code truncated - full code in following message",
        ));
    }

    embed
}

/// One pre-resolved entry of the review listing. Rows whose submitter could
/// not be resolved any more are dropped before this point; an unresolvable
/// thread only loses its link.
pub struct ListingEntry {
    pub username: String,
    pub language: String,
    pub status: Status,
    pub thread_link: Option<String>,
}

/// The trainer-facing listing embed. Shows at most
/// [`MAX_LISTED_SUBMISSIONS`] entries but always reports the full count.
pub fn listing_embed(challenge: &Challenge, entries: &[ListingEntry], total: usize) -> CreateEmbed {
    let mut embed = CreateEmbed::new()
        .colour(DEFAULT_EMBED_COLOUR)
        .title(format!("Submissions for: {}", challenge.title))
        .description(format!(
            "Week {} - Total: {} submissions",
            challenge.week, total
        ))
        .timestamp(Timestamp::now());

    for (idx, entry) in entries.iter().take(MAX_LISTED_SUBMISSIONS).enumerate() {
        let link = match &entry.thread_link {
            Some(url) => format!("[View Thread]({})", url),
            None => "Thread not found".to_string(),
        };

        embed = embed.field(
            format!("{}. {}", idx + 1, entry.username),
            format!(
                "Language: {} | Status: {}\n{}",
                entry.language,
                entry.status.label(),
                link
            ),
            false,
        );
    }

    embed
}
