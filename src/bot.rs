//! Telegram glue: commands, link messages and reply delivery.

use crate::extractor::{MediaGroup, MediaItem};
use crate::router::{BusyIndicator, LinkRouter, Reply, NO_MEDIA_TEXT};
use async_trait::async_trait;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, InputFile, InputMedia, InputMediaPhoto, InputMediaVideo};
use tracing::{error, info, warn};
use url::Url;

pub const WELCOME_TEXT: &str = "Welcome to Quillgeistbot!";
pub const SETTINGS_TEXT: &str = "Quillgeistbot settings:";

/// Sends the "uploading" chat action without waiting for it.
struct ChatIndicator {
    bot: Bot,
    chat_id: ChatId,
}

#[async_trait]
impl BusyIndicator for ChatIndicator {
    async fn working(&self) {
        let bot = self.bot.clone();
        let chat_id = self.chat_id;
        tokio::spawn(async move {
            if let Err(e) = bot.send_chat_action(chat_id, ChatAction::UploadDocument).await {
                warn!(chat_id = chat_id.0, error = %e, "Failed to send chat action");
            }
        });
    }
}

/// Fixed reply for a bot command, if it is one we answer.
pub fn command_reply(text: &str) -> Option<&'static str> {
    let command = text.split_whitespace().next()?;
    // Group chats address commands as /start@botname.
    match command.split('@').next()? {
        "/start" => Some(WELCOME_TEXT),
        "/settings" => Some(SETTINGS_TEXT),
        _ => None,
    }
}

fn input_file(item: &MediaItem) -> Option<InputFile> {
    match Url::parse(item.url()) {
        Ok(url) => Some(InputFile::url(url)),
        Err(e) => {
            warn!(url = item.url(), error = %e, "Dropping media with invalid URL");
            None
        }
    }
}

pub fn to_input_media(group: MediaGroup) -> Vec<InputMedia> {
    group
        .into_iter()
        .filter_map(|item| {
            let file = input_file(&item)?;
            Some(match item {
                MediaItem::Photo { .. } => InputMedia::Photo(InputMediaPhoto::new(file)),
                MediaItem::Video { .. } => InputMedia::Video(InputMediaVideo::new(file)),
            })
        })
        .collect()
}

async fn deliver(bot: &Bot, chat_id: ChatId, reply: Reply) -> ResponseResult<()> {
    match reply {
        Reply::Ignore | Reply::Suppressed(_) => {}
        Reply::Text(text) => {
            bot.send_message(chat_id, text).await?;
        }
        Reply::Media(group) => {
            let mut media = to_input_media(group);
            match media.len() {
                0 => {
                    bot.send_message(chat_id, NO_MEDIA_TEXT).await?;
                }
                // Albums need at least two entries; send single items directly.
                1 => match media.remove(0) {
                    InputMedia::Photo(photo) => {
                        bot.send_photo(chat_id, photo.media).await?;
                    }
                    InputMedia::Video(video) => {
                        bot.send_video(chat_id, video.media).await?;
                    }
                    _ => {}
                },
                _ => {
                    bot.send_media_group(chat_id, media).await?;
                }
            }
        }
    }
    Ok(())
}

async fn handle_message(bot: Bot, msg: Message, router: Arc<LinkRouter>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };

    if text.starts_with('/') {
        if let Some(reply) = command_reply(text) {
            bot.send_message(msg.chat.id, reply).await?;
        }
        return Ok(());
    }

    let indicator = ChatIndicator {
        bot: bot.clone(),
        chat_id: msg.chat.id,
    };
    let reply = router.handle(text, &indicator).await;
    if let Err(e) = deliver(&bot, msg.chat.id, reply).await {
        error!(chat_id = msg.chat.id.0, error = %e, "Failed to send reply");
    }
    Ok(())
}

/// Poll Telegram until interrupted.
pub async fn run(bot: Bot, router: Arc<LinkRouter>) {
    info!("Starting Telegram dispatcher");

    let handler = Update::filter_message().endpoint(handle_message);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![router])
        // Every update runs as its own task, even within one chat.
        .distribution_function(|_| None::<std::convert::Infallible>)
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_are_recognized() {
        assert_eq!(command_reply("/start"), Some(WELCOME_TEXT));
        assert_eq!(command_reply("/settings now"), Some(SETTINGS_TEXT));
        assert_eq!(command_reply("/start@QuillgeistBot"), Some(WELCOME_TEXT));
        assert_eq!(command_reply("/help"), None);
    }

    #[test]
    fn media_keeps_order_and_kind() {
        let group: MediaGroup = vec![
            MediaItem::photo("https://cdn.example/1.jpg"),
            MediaItem::video("https://cdn.example/2.mp4"),
            MediaItem::photo("not a url"),
            MediaItem::photo("https://cdn.example/3.jpg"),
        ]
        .into_iter()
        .collect();

        let media = to_input_media(group);

        assert_eq!(media.len(), 3);
        assert!(matches!(media[0], InputMedia::Photo(_)));
        assert!(matches!(media[1], InputMedia::Video(_)));
        assert!(matches!(media[2], InputMedia::Photo(_)));
    }
}
