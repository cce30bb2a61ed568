use poise::serenity_prelude::*;
use crate::info_sync;

pub struct TalaitEvents;

#[async_trait]
impl EventHandler for TalaitEvents {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info_sync!("TalAIt running with id {}", ready.user.id);
    }
}
