use std::collections::HashSet;

use chrono::Utc;
use poise::serenity_prelude as ser;
use poise::serenity_prelude::Mentionable;
use poise::CreateReply;

use crate::core::handle_command_error;
use crate::format;
use crate::model::{Challenge, NewSubmission, Status, SubmissionActivity};
use crate::store::{ChallengeDirectory, InsertOutcome, SubmissionStore};
use crate::{info, Context, Error, Res};

/// Outcome of the pre-insert checks of the submission flow.
#[derive(Debug)]
pub enum SubmitCheck {
    NoActiveChallenge,
    AlreadySubmitted,
    Proceed(Challenge),
}

/// Resolve the active challenge and run the duplicate pre-check. Performs
/// no writes; everything it rejects aborts the flow before any side effect.
pub async fn check_submission(
    directory: &dyn ChallengeDirectory,
    store: &dyn SubmissionStore,
    user_id: &str,
) -> Result<SubmitCheck, Error> {
    let Some(challenge) = directory.get_active_challenge().await? else {
        return Ok(SubmitCheck::NoActiveChallenge);
    };

    if store.find_submission(challenge.id, user_id).await?.is_some() {
        return Ok(SubmitCheck::AlreadySubmitted);
    }

    Ok(SubmitCheck::Proceed(challenge))
}

/// The review commands fall back to the newest challenge when none is
/// currently active.
pub async fn current_or_latest(
    directory: &dyn ChallengeDirectory,
) -> Result<Option<Challenge>, Error> {
    match directory.get_active_challenge().await? {
        Some(c) => Ok(Some(c)),
        None => directory.get_latest_challenge().await,
    }
}

/// Resolve the invoking member's role names and run them through the
/// trainer policy. Anyone we cannot resolve is not a trainer.
async fn invoker_is_trainer(ctx: &Context<'_>) -> Result<bool, Error> {
    let Some(guild_id) = ctx.guild_id() else { return Ok(false); };
    let Some(member) = ctx.author_member().await else { return Ok(false); };

    let roles = guild_id.roles(ctx.http()).await?;
    Ok(ctx.data().policy.is_trainer(
        member
            .roles
            .iter()
            .filter_map(|id| roles.get(id))
            .map(|role| role.name.as_str()),
    ))
}

/// Access policy shared by the submissions category and every thread in it:
/// nothing for @everyone, read/write for the submitter, the bot and all
/// trainer roles.
fn submission_overwrites(
    everyone: ser::RoleId,
    bot: ser::UserId,
    submitter: ser::UserId,
    trainer_roles: &[ser::RoleId],
) -> Vec<ser::PermissionOverwrite> {
    let rw = ser::Permissions::VIEW_CHANNEL | ser::Permissions::SEND_MESSAGES;

    let mut overwrites = vec![
        ser::PermissionOverwrite {
            allow: ser::Permissions::empty(),
            deny: ser::Permissions::VIEW_CHANNEL,
            kind: ser::PermissionOverwriteType::Role(everyone),
        },
        ser::PermissionOverwrite {
            allow: rw,
            deny: ser::Permissions::empty(),
            kind: ser::PermissionOverwriteType::Member(submitter),
        },
        ser::PermissionOverwrite {
            allow: rw,
            deny: ser::Permissions::empty(),
            kind: ser::PermissionOverwriteType::Member(bot),
        },
    ];

    for role in trainer_roles {
        overwrites.push(ser::PermissionOverwrite {
            allow: rw,
            deny: ser::Permissions::empty(),
            kind: ser::PermissionOverwriteType::Role(*role),
        });
    }

    overwrites
}

/// Find the private submissions category, creating it on first use.
async fn ensure_category(
    ctx: &Context<'_>,
    guild_id: ser::GuildId,
    overwrites: &[ser::PermissionOverwrite],
) -> Result<ser::ChannelId, Error> {
    let name = &ctx.data().config.category_name;

    let channels = guild_id.channels(ctx.http()).await?;
    if let Some(existing) = channels
        .values()
        .find(|c| c.kind == ser::ChannelType::Category && c.name == *name)
    {
        return Ok(existing.id);
    }

    let category = guild_id
        .create_channel(
            ctx.serenity_context(),
            ser::CreateChannel::new(name.as_str())
                .kind(ser::ChannelType::Category)
                .permissions(overwrites.to_vec()),
        )
        .await?;

    info!("Created submissions category '{}'", name);
    Ok(category.id)
}

/// Submit your code for the current challenge.
#[poise::command(slash_command, ephemeral, guild_only, on_error = "handle_command_error")]
pub async fn submit(
    ctx: Context<'_>,
    #[description = "Your code solution (use code blocks)"] code: String,
    #[description = "Programming language used"] language: Option<String>,
    #[description = "Optional notes about your submission"] notes: Option<String>,
) -> Res {
    ctx.defer_ephemeral().await?;

    let data = ctx.data();
    let language = language.unwrap_or_else(|| "generic".to_string());
    let notes = notes.unwrap_or_default();
    let user = ctx.author();
    let user_id = user.id.to_string();

    let challenge = match check_submission(
        data.directory.as_ref(),
        data.store.as_ref(),
        &user_id,
    )
    .await?
    {
        SubmitCheck::NoActiveChallenge => {
            ctx.say("No active challenge found!").await?;
            return Ok(());
        }
        SubmitCheck::AlreadySubmitted => {
            ctx.say(
                "You have already submitted for this challenge! \
                 You can view your submission thread in the submissions category.",
            )
            .await?;
            return Ok(());
        }
        SubmitCheck::Proceed(challenge) => challenge,
    };

    // Resolve trainer roles by name so they can read every thread.
    let guild_id = ctx.guild_id().ok_or("This command only works in a guild")?;
    let roles = guild_id.roles(ctx.http()).await?;
    let trainer_roles: Vec<ser::RoleId> = roles
        .iter()
        .filter(|(_, role)| data.policy.matches(&role.name))
        .map(|(id, _)| *id)
        .collect();

    // The @everyone role id is the guild id.
    let overwrites = submission_overwrites(
        ser::RoleId::new(guild_id.get()),
        ctx.framework().bot_id,
        user.id,
        &trainer_roles,
    );

    let category = ensure_category(&ctx, guild_id, &overwrites).await?;

    // One private thread channel per submission.
    let thread = guild_id
        .create_channel(
            ctx.serenity_context(),
            ser::CreateChannel::new(format::thread_channel_name(&user.name, challenge.week))
                .kind(ser::ChannelType::Text)
                .category(category)
                .permissions(overwrites),
        )
        .await?;

    let row = NewSubmission {
        challenge_id: challenge.id,
        user_id: user_id.clone(),
        username: user.name.clone(),
        code: code.clone(),
        language: language.clone(),
        notes: notes.clone(),
        thread_id: thread.id.to_string(),
        status: Status::Pending,
    };

    if let InsertOutcome::Duplicate = data.store.insert_submission(&row).await? {
        // A concurrent submit got past the pre-check; the store's
        // uniqueness constraint caught it. The thread we just created
        // stays, consistent with the no-rollback failure policy.
        ctx.say(
            "You have already submitted for this challenge! \
             You can view your submission thread in the submissions category.",
        )
        .await?;
        return Ok(());
    }

    let (code_block, followup) = format::split_code(&code, &language);
    let embed = format::submission_embed(
        &challenge,
        &user.mention().to_string(),
        &language,
        &notes,
        &code_block,
        followup.is_some(),
    );

    thread
        .send_message(ctx.serenity_context(), ser::CreateMessage::new().embed(embed))
        .await?;
    if let Some(full_code) = followup {
        thread.id.say(ctx.serenity_context(), full_code).await?;
    }

    ctx.say(format!(
        "Your submission has been recorded! A private thread has been created: {}\n\n\
         Trainers will review your submission there.",
        thread.id.mention()
    ))
    .await?;

    // Bookkeeping lives in a separate table; a failure here is reported but
    // does not unwind the submission that already went through.
    data.directory
        .record_submission(&SubmissionActivity {
            challenge_id: challenge.id,
            user_id,
            channel_id: thread.id.to_string(),
            submitted_at: Utc::now(),
        })
        .await?;

    info!(
        "Recorded submission from {} for week {}",
        user.name, challenge.week
    );
    Ok(())
}

/// View all submissions for the current challenge (trainers only).
#[poise::command(
    slash_command,
    ephemeral,
    guild_only,
    rename = "viewsubmissions",
    on_error = "handle_command_error"
)]
pub async fn view_submissions(ctx: Context<'_>) -> Res {
    if !invoker_is_trainer(&ctx).await? {
        ctx.say("Only trainers can view all submissions!").await?;
        return Ok(());
    }

    ctx.defer_ephemeral().await?;
    let data = ctx.data();

    let Some(challenge) = current_or_latest(data.directory.as_ref()).await? else {
        ctx.say("No challenge found!").await?;
        return Ok(());
    };

    let submissions = data.store.list_submissions(challenge.id).await?;
    if submissions.is_empty() {
        ctx.say("No submissions yet for this challenge!").await?;
        return Ok(());
    }

    let guild_id = ctx.guild_id().ok_or("This command only works in a guild")?;

    // Channel ids the cache still knows about; threads deleted since the
    // submission lose their link.
    let known_channels: HashSet<ser::ChannelId> = ctx
        .guild()
        .map(|guild| guild.channels.keys().copied().collect())
        .unwrap_or_default();

    let mut entries = Vec::new();
    for submission in submissions.iter().take(format::MAX_LISTED_SUBMISSIONS) {
        // Rows whose submitter cannot be resolved any more are skipped.
        let Ok(user_id) = submission.user_id.parse::<u64>() else { continue; };
        let Ok(user) = ser::UserId::new(user_id).to_user(ctx.serenity_context()).await else {
            continue;
        };

        let thread_link = submission
            .thread_id
            .parse::<u64>()
            .ok()
            .map(ser::ChannelId::new)
            .filter(|id| known_channels.contains(id))
            .map(|id| format!("https://discord.com/channels/{}/{}", guild_id, id));

        entries.push(format::ListingEntry {
            username: user.name,
            language: submission.language.clone(),
            status: submission.status,
            thread_link,
        });
    }

    let embed = format::listing_embed(&challenge, &entries, submissions.len());
    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Update a submission's status (trainers only).
#[poise::command(
    slash_command,
    ephemeral,
    guild_only,
    rename = "updatestatus",
    on_error = "handle_command_error"
)]
pub async fn update_status(
    ctx: Context<'_>,
    #[description = "User whose submission to update"] user: ser::User,
    #[description = "New status"] status: Status,
) -> Res {
    if !invoker_is_trainer(&ctx).await? {
        ctx.say("Only trainers can update submission status!").await?;
        return Ok(());
    }

    ctx.defer_ephemeral().await?;
    let data = ctx.data();

    let Some(challenge) = current_or_latest(data.directory.as_ref()).await? else {
        ctx.say("No challenge found!").await?;
        return Ok(());
    };

    let updated = data
        .store
        .update_status(challenge.id, &user.id.to_string(), status)
        .await?;

    match updated {
        Some(_) => {
            ctx.say(format!(
                "Updated {}'s submission status to: **{}**",
                user.mention(),
                status.label()
            ))
            .await?;
        }
        None => {
            ctx.say(format!(
                "No submission found for {} in the current challenge.",
                user.mention()
            ))
            .await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use poise::serenity_prelude::async_trait;
    use serde_json::Value;

    use super::*;
    use crate::model::Submission;
    use crate::Res;

    fn challenge(id: i64, week: i64, active: bool) -> Challenge {
        Challenge {
            id,
            week,
            title: "Two Sum".into(),
            difficulty: "Easy".into(),
            is_active: active,
        }
    }

    /// In-memory stand-in for the hosted submissions table, enforcing the
    /// same (challenge, user) uniqueness the real store does.
    #[derive(Default)]
    struct MemStore {
        rows: Mutex<Vec<Submission>>,
    }

    #[async_trait]
    impl SubmissionStore for MemStore {
        async fn find_submission(
            &self,
            challenge_id: i64,
            user_id: &str,
        ) -> Result<Option<Submission>, Error> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .find(|s| s.challenge_id == challenge_id && s.user_id == user_id)
                .cloned())
        }

        async fn insert_submission(&self, row: &NewSubmission) -> Result<InsertOutcome, Error> {
            let mut rows = self.rows.lock().unwrap();
            if rows
                .iter()
                .any(|s| s.challenge_id == row.challenge_id && s.user_id == row.user_id)
            {
                return Ok(InsertOutcome::Duplicate);
            }

            let inserted = Submission {
                id: rows.len() as i64 + 1,
                challenge_id: row.challenge_id,
                user_id: row.user_id.clone(),
                username: row.username.clone(),
                code: row.code.clone(),
                language: row.language.clone(),
                notes: row.notes.clone(),
                thread_id: row.thread_id.clone(),
                status: row.status,
                created_at: None,
                updated_at: None,
            };
            rows.push(inserted.clone());
            Ok(InsertOutcome::Inserted(inserted))
        }

        async fn list_submissions(&self, challenge_id: i64) -> Result<Vec<Submission>, Error> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|s| s.challenge_id == challenge_id)
                .cloned()
                .collect())
        }

        async fn update_status(
            &self,
            challenge_id: i64,
            user_id: &str,
            status: Status,
        ) -> Result<Option<Submission>, Error> {
            let mut rows = self.rows.lock().unwrap();
            let Some(row) = rows
                .iter_mut()
                .find(|s| s.challenge_id == challenge_id && s.user_id == user_id)
            else {
                return Ok(None);
            };
            row.status = status;
            Ok(Some(row.clone()))
        }
    }

    #[derive(Default)]
    struct MemDirectory {
        active: Option<Challenge>,
        latest: Option<Challenge>,
        recorded: Mutex<Vec<SubmissionActivity>>,
    }

    #[async_trait]
    impl ChallengeDirectory for MemDirectory {
        async fn get_active_challenge(&self) -> Result<Option<Challenge>, Error> {
            Ok(self.active.clone())
        }

        async fn get_latest_challenge(&self) -> Result<Option<Challenge>, Error> {
            Ok(self.latest.clone())
        }

        async fn record_submission(&self, activity: &SubmissionActivity) -> Res {
            self.recorded.lock().unwrap().push(activity.clone());
            Ok(())
        }

        async fn leaderboard(&self) -> Result<Option<Value>, Error> {
            Ok(None)
        }

        async fn hall_of_fame(&self) -> Result<Option<Value>, Error> {
            Ok(None)
        }
    }

    fn new_row(challenge_id: i64, user_id: &str) -> NewSubmission {
        NewSubmission {
            challenge_id,
            user_id: user_id.into(),
            username: "alice".into(),
            code: "print(1)".into(),
            language: "python".into(),
            notes: String::new(),
            thread_id: "42".into(),
            status: Status::Pending,
        }
    }

    #[tokio::test]
    async fn no_active_challenge_aborts_before_any_write() {
        let directory = MemDirectory::default();
        let store = MemStore::default();

        let check = check_submission(&directory, &store, "1").await.unwrap();
        assert!(matches!(check, SubmitCheck::NoActiveChallenge));
        assert!(store.rows.lock().unwrap().is_empty());
        assert!(directory.recorded.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn existing_row_is_rejected_by_the_precheck() {
        let directory = MemDirectory {
            active: Some(challenge(1, 3, true)),
            ..Default::default()
        };
        let store = MemStore::default();
        store.insert_submission(&new_row(1, "1")).await.unwrap();

        let check = check_submission(&directory, &store, "1").await.unwrap();
        assert!(matches!(check, SubmitCheck::AlreadySubmitted));
        assert_eq!(store.rows.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn fresh_submitter_proceeds_with_the_active_challenge() {
        let directory = MemDirectory {
            active: Some(challenge(1, 3, true)),
            ..Default::default()
        };
        let store = MemStore::default();

        let check = check_submission(&directory, &store, "1").await.unwrap();
        let SubmitCheck::Proceed(c) = check else {
            panic!("expected Proceed");
        };
        assert_eq!(c.id, 1);
        assert_eq!(c.week, 3);
    }

    #[tokio::test]
    async fn double_insert_is_a_duplicate_not_a_second_row() {
        let store = MemStore::default();

        let first = store.insert_submission(&new_row(1, "1")).await.unwrap();
        assert!(matches!(first, InsertOutcome::Inserted(_)));

        let second = store.insert_submission(&new_row(1, "1")).await.unwrap();
        assert!(matches!(second, InsertOutcome::Duplicate));
        assert_eq!(store.rows.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn same_user_may_submit_to_a_different_challenge() {
        let store = MemStore::default();
        store.insert_submission(&new_row(1, "1")).await.unwrap();

        let other = store.insert_submission(&new_row(2, "1")).await.unwrap();
        assert!(matches!(other, InsertOutcome::Inserted(_)));
    }

    #[tokio::test]
    async fn review_falls_back_to_the_latest_challenge() {
        let directory = MemDirectory {
            active: None,
            latest: Some(challenge(9, 12, false)),
            ..Default::default()
        };

        let c = current_or_latest(&directory).await.unwrap().unwrap();
        assert_eq!(c.id, 9);
    }

    #[tokio::test]
    async fn no_challenge_at_all_yields_none() {
        let directory = MemDirectory::default();
        assert!(current_or_latest(&directory).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn updating_a_missing_submission_touches_nothing() {
        let store = MemStore::default();
        store.insert_submission(&new_row(1, "1")).await.unwrap();

        let updated = store.update_status(1, "2", Status::Winner).await.unwrap();
        assert!(updated.is_none());
        assert_eq!(store.rows.lock().unwrap()[0].status, Status::Pending);
    }

    #[tokio::test]
    async fn updating_an_existing_submission_reports_the_new_status() {
        let store = MemStore::default();
        store.insert_submission(&new_row(1, "1")).await.unwrap();

        let updated = store.update_status(1, "1", Status::Winner).await.unwrap().unwrap();
        assert_eq!(updated.status, Status::Winner);
        assert_eq!(updated.status.label(), "Winner");
    }
}
