mod core;
mod access;
mod api;
mod commands;
mod config;
mod events;
mod format;
mod model;
mod store;

use std::sync::Arc;

use clap::Parser;
use dotenv::dotenv;
use poise::serenity_prelude as ser;

use crate::access::TrainerPolicy;
use crate::commands::{submit, update_status, view_submissions};
use crate::config::Config;
use crate::core::{log_command, terminate};
use crate::events::TalaitEvents;
use crate::store::{ChallengeDirectory, SubmissionStore, Supabase};

/// Global context. Ugly, but this is the best way I can think
/// of to support graceful shutdown on Ctrl+C etc.
static mut __TALAIT_FRAMEWORK: Option<Arc<ser::ShardManager>> = None;
static mut __TALAIT_RUNTIME: Option<tokio::runtime::Handle> = None;

/// Handles injected into every command. The store and directory are
/// constructed once in main and passed here; nothing else holds them.
pub struct Data {
    pub config: Arc<Config>,
    pub policy: TrainerPolicy,
    pub store: Arc<dyn SubmissionStore>,
    pub directory: Arc<dyn ChallengeDirectory>,
}

/// Basic types.
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
pub type Res = Result<(), Error>;

/// Clopts.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Whether to register the commands.
    #[clap(long, short)]
    register: bool,
}

/// Only to be called by [`terminate()`].
pub async unsafe fn __talait_terminate_bot() {
    if let Some(fw) = __TALAIT_FRAMEWORK.as_ref() { fw.shutdown_all().await; }
}

/// This is called from a thread that is not part of the runtime.
unsafe fn __talait_ctrlc_impl() {
    let handle = __TALAIT_RUNTIME.as_ref().unwrap();
    let _guard = handle.enter();
    handle.block_on(terminate());
}

/// Register bot commands, guild-scoped when a guild is configured.
async fn register_impl(
    http: impl AsRef<ser::Http>,
    framework: &poise::Framework<Data, Error>,
    guild: Option<ser::GuildId>,
) -> Res {
    info_sync!("Registering commands...");
    match guild {
        Some(guild) => {
            poise::builtins::register_in_guild(http, &framework.options().commands, guild).await?
        }
        None => poise::builtins::register_globally(http, &framework.options().commands).await?,
    }
    info_sync!("Commands registered.");
    Ok(())
}

#[tokio::main]
async fn main() {
    // Register a panic hook to tear down the bot in case of an error;
    // this is so the bot restarts on error instead of hanging.
    let old_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        old_panic(info);
        std::process::abort();
    }));

    // Save runtime.
    unsafe { __TALAIT_RUNTIME = Some(tokio::runtime::Handle::current()); }

    // Register the SIGINT handler.
    //
    // Do this *after* saving the runtime as the handler will
    // attempt to enter the runtime.
    ctrlc::set_handler(|| unsafe { __talait_ctrlc_impl() }).expect("Failed to register SIGINT handler");

    // Load configuration. Missing connection secrets are fatal.
    dotenv().ok();
    let config = match Config::from_env() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            err_sync!("{}", e);
            std::process::exit(1);
        }
    };

    // The one store handle shared by the bot and the query service.
    let supabase = match Supabase::new(&config) {
        Ok(supabase) => Arc::new(supabase),
        Err(e) => {
            err_sync!("Failed to build the store client: {}", e);
            std::process::exit(1);
        }
    };
    let store: Arc<dyn SubmissionStore> = supabase.clone();
    let directory: Arc<dyn ChallengeDirectory> = supabase;

    // Serve the read-only query endpoints next to the bot.
    let api_addr = config.api_addr.clone();
    let api_directory = directory.clone();
    tokio::spawn(async move {
        if let Err(e) = api::serve(&api_addr, api_directory).await {
            err_sync!("Query service failed: {}", e);
        }
    });

    let args = Args::parse();
    let token = config.discord_token.clone();
    let guild = config.guild_id.map(ser::GuildId::new);
    let data = Data {
        policy: TrainerPolicy::new(config.trainer_roles.clone()),
        store,
        directory,
        config,
    };

    let fw = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            pre_command: |ctx| Box::pin(async move { log_command(ctx).await; }),
            commands: vec![
                submit(),
                view_submissions(),
                update_status(),
            ],
            ..Default::default()
        })

        .setup(move |ctx, _, framework| {
            unsafe {
                __TALAIT_FRAMEWORK = Some(framework.shard_manager().clone());
            };

            Box::pin(async move {
                if args.register { register_impl(ctx, framework, guild).await?; }
                info_sync!("Setup done");
                Ok(data)
            })
        })
        .build();

    ser::ClientBuilder::new(token, ser::GatewayIntents::non_privileged())
        .framework(fw)
        .event_handler(TalaitEvents)
        .await
        .expect("Error creating client")
        .start()
        .await
        .expect("Client error");
}
