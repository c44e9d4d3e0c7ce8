//! Telegram side of the quiz: update parsing and effect rendering via teloxide.

use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, ParseMode};
use teloxide::utils::command::{BotCommands, ParseError};
use teloxide::utils::html;

use crate::quiz::machine::{Effect, Event};
use crate::quiz::session::OrderMode;
use crate::quiz::transport::Transport;

pub const TOPIC_PREFIX: &str = "topic_";
pub const ORDER_ORDERED: &str = "order_ordered";
pub const ORDER_RANDOM: &str = "order_random";

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "choose a topic and start a quiz")]
    Start,
    #[command(description = "same as /start")]
    Begin,
    #[command(description = "start a quiz with questions in random order")]
    Random,
    #[command(description = "same as /random")]
    BeginRandom,
    #[command(description = "drop the current quiz and start over")]
    Restart,
    #[command(description = "show the list of commands")]
    Help,
}

impl From<Command> for Event {
    fn from(cmd: Command) -> Self {
        match cmd {
            Command::Start | Command::Begin => Event::BeginQuiz,
            Command::Random | Command::BeginRandom => Event::BeginRandom,
            Command::Restart => Event::Restart,
            Command::Help => Event::HelpRequested,
        }
    }
}

/// Event for a text message, or `None` when it is not a command for us.
pub fn event_for_text(text: &str, bot_username: &str) -> Option<Event> {
    // Arguments are ignored; only the command word matters.
    let head = text.split_whitespace().next()?;
    let name = head.strip_prefix('/')?;
    match Command::parse(head, bot_username) {
        Ok(cmd) => Some(cmd.into()),
        Err(ParseError::WrongBotName(_)) => None,
        Err(_) => {
            let name = name.split('@').next().unwrap_or_default();
            Some(Event::UnknownCommand(name.to_string()))
        }
    }
}

/// Event for an inline button payload.
pub fn event_for_callback(data: &str) -> Event {
    if let Some(topic) = data.strip_prefix(TOPIC_PREFIX) {
        return Event::TopicChosen(topic.to_string());
    }
    match data {
        ORDER_ORDERED => Event::OrderChosen(OrderMode::Ordered),
        ORDER_RANDOM => Event::OrderChosen(OrderMode::Random),
        label => Event::AnswerSelected(label.to_string()),
    }
}

/// HTML text and optional inline keyboard for an effect.
pub fn render(effect: &Effect) -> (String, Option<InlineKeyboardMarkup>) {
    match effect {
        Effect::ShowTopicList(names) => {
            let rows = names
                .iter()
                .map(|name| vec![InlineKeyboardButton::callback(name.clone(), format!("{TOPIC_PREFIX}{name}"))])
                .collect::<Vec<_>>();
            ("Choose a quiz topic:".to_string(), Some(InlineKeyboardMarkup::new(rows)))
        }
        Effect::ShowOrderChoice => {
            let rows = vec![
                vec![InlineKeyboardButton::callback("Ordered", ORDER_ORDERED)],
                vec![InlineKeyboardButton::callback("Random", ORDER_RANDOM)],
            ];
            ("Choose the question order:".to_string(), Some(InlineKeyboardMarkup::new(rows)))
        }
        Effect::ShowQuestion { number, total, prompt, options } => {
            let mut text = format!("Question {}/{}\n<b>{}</b>\n\n", number, total, html::escape(prompt));
            for (label, option) in options {
                text.push_str(&format!("{}. {}\n", html::escape(label), html::escape(option)));
            }
            let buttons = options
                .iter()
                .map(|(label, _)| InlineKeyboardButton::callback(label.clone(), label.clone()))
                .collect::<Vec<_>>();
            (text, Some(InlineKeyboardMarkup::new(vec![buttons])))
        }
        Effect::ShowFeedback { correct, correct_label, correct_text, score, total } => {
            let text = if *correct {
                format!("Correct! 👍\nYour score: {}/{}", score, total)
            } else {
                format!(
                    "Wrong. ❌\nCorrect answer: {}. {}\nYour score: {}/{}",
                    html::escape(correct_label),
                    html::escape(correct_text),
                    score,
                    total
                )
            };
            (text, None)
        }
        Effect::ShowCompletion { score, total } => (
            format!("Congratulations! You finished the quiz.\nFinal score: {}/{}", score, total),
            None,
        ),
        Effect::ShowError(message) => (html::escape(message), None),
        Effect::ShowHelp(text) => (html::escape(text), None),
    }
}

/// Sends effects as Telegram messages.
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

impl Transport for TelegramTransport {
    async fn send(&self, chat_id: i64, effect: &Effect) -> Result<(), String> {
        let (text, keyboard) = render(effect);
        let mut request = self
            .bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html);
        if let Some(keyboard) = keyboard {
            request = request.reply_markup(keyboard);
        }

        request.await.map(|_| ()).map_err(|e| format!("Failed to send: {e}"))
    }
}
