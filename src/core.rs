use std::sync::atomic::AtomicBool;
use poise::serenity_prelude::Colour;
use poise::CreateReply;
use crate::{__talait_terminate_bot, Context, Error};

/// Default colour to use for embeds.
pub const DEFAULT_EMBED_COLOUR: Colour = Colour::from_rgb(87, 242, 135);

/// Logging macros. These macros log an informational or error
/// message to the terminal; the `sync` variants are for use
/// outside of async contexts.
#[macro_export]
macro_rules! info {
    ($arg:expr) => { $crate::core::__talait_log_internal(&*($arg)).await };
    ($fmt:literal $(,$arg:expr)*) => { $crate::core::__talait_log_internal(format!($fmt $(,$arg)*).as_str()).await };
}

#[macro_export]
macro_rules! info_sync {
    ($arg:expr) => { $crate::core::__talait_log_internal_sync(&*($arg)) };
    ($fmt:literal $(,$arg:expr)*) => { $crate::core::__talait_log_internal_sync(format!($fmt $(,$arg)*).as_str()) };
}

#[macro_export]
macro_rules! err {
    ($arg:expr) => { $crate::core::__talait_log_internal_error(&*($arg)).await };
    ($fmt:literal $(,$arg:expr)*) => { $crate::core::__talait_log_internal_error(format!($fmt $(,$arg)*).as_str()).await };
}

#[macro_export]
macro_rules! err_sync {
    ($arg:expr) => { $crate::core::__talait_log_internal_error_sync(&*($arg)) };
    ($fmt:literal $(,$arg:expr)*) => { $crate::core::__talait_log_internal_error_sync(format!($fmt $(,$arg)*).as_str()) };
}

/// Logging.
pub async fn __talait_log_internal_error(e: &str) { eprintln!("[Error]: {}", e); }

pub async fn __talait_log_internal(e: &str) { eprintln!("[Info]: {}", e); }

pub fn __talait_log_internal_error_sync(e: &str) { eprintln!("[Error]: {}", e); }

pub fn __talait_log_internal_sync(e: &str) { eprintln!("[Info]: {}", e); }

pub async fn handle_command_error(e: poise::FrameworkError<'_, crate::Data, Error>) {
    // Reply with a message if possible. Otherwise, just log the error.
    let Some(ctx) = e.ctx() else {
        err!(e.to_string());
        return;
    };

    match ctx {
        Context::Application(a) => {
            // Log the entire command string so we have a record of it.
            err!("In invocation of command: {}", a.invocation_string());

            // Get the nested error, if possible.
            let command_error = match e {
                poise::FrameworkError::Command { error, .. } => error.to_string(),
                _ => "".to_string()
            };

            // Log it in case sending it fails.
            err!(command_error);

            // Send a reply to the user, informing them of the error; if that in turn
            // causes an error, there is nothing we can do, so just log and ignore it.
            if let Err(e) = poise::send_application_reply(
                a,
                CreateReply::default()
                    .ephemeral(true)
                    .content(safe_truncate(format!("Error: {}", command_error), 2000)),
            ).await {
                err!(e.to_string());
            }
        }

        // We don’t use prefix commands.
        _ => unreachable!()
    }
}

pub async fn log_command(ctx: Context<'_>) {
    info!(
        "{} invoked command {}",
        ctx.author().name,
        ctx.invocation_string()
    );
}

/// Truncate a string w/o panicking.
pub fn safe_truncate(mut s: String, mut len: usize) -> String {
    if s.len() <= len { return s; }
    if len == 0 {
        s.clear();
        return s;
    }

    while len != 0 {
        if s.is_char_boundary(len) {
            s.truncate(len);
            return s;
        }

        len -= 1;
    }

    unreachable!();
}

/// Terminate the bot gracefully.
pub async fn terminate() {
    // Don’t terminate twice.
    static TERMINATION_LOCK: AtomicBool = AtomicBool::new(false);
    if TERMINATION_LOCK.compare_exchange(
        false,
        true,
        std::sync::atomic::Ordering::SeqCst,
        std::sync::atomic::Ordering::SeqCst,
    ).is_err() { return; }

    // Shutdown asynchronously running code.
    unsafe {
        info_sync!("Shutting down bot...");
        __talait_terminate_bot().await;
    }

    // Exit the process.
    info_sync!("Exiting...");
    std::process::exit(0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        // ‘é’ is two bytes; cutting inside it must back off to the boundary.
        assert_eq!(safe_truncate("abcé".to_string(), 4), "abc");
        assert_eq!(safe_truncate("abcé".to_string(), 5), "abcé");
    }

    #[test]
    fn short_strings_pass_through() {
        assert_eq!(safe_truncate("abc".to_string(), 2000), "abc");
        assert_eq!(safe_truncate("abc".to_string(), 0), "");
    }
}
