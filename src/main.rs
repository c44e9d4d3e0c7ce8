use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{debug, error, info, warn};
use tracing_subscriber::prelude::*;

use quizbot::config::Config;
use quizbot::quiz::telegram::{event_for_callback, event_for_text, Command};
use quizbot::quiz::{Dispatcher as QuizDispatcher, QuestionBank, SeededShuffler, Shuffler, TelegramTransport};

struct BotState {
    quiz: QuizDispatcher<TelegramTransport>,
    bot_username: String,
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "quizbot.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("quizbot.log"))
    {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Failed to open log file: {e}");
            std::process::exit(1);
        }
    };
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .init();

    info!("🚀 Starting quizbot...");
    info!("Loaded config from {config_path}");

    let bank = match QuestionBank::load_dir(&config.quizzes_dir) {
        Ok(bank) => bank,
        Err(e) => {
            error!("Failed to load questions: {e}");
            std::process::exit(1);
        }
    };
    if bank.is_empty() {
        warn!("No topics loaded from {}", config.quizzes_dir.display());
    } else {
        info!("Loaded {} topic(s) from {}", bank.len(), config.quizzes_dir.display());
    }

    let bot = Bot::new(&config.telegram_bot_token);

    let bot_username = match bot.get_me().await {
        Ok(me) => {
            info!("Authorized as @{}", me.username());
            me.username().to_string()
        }
        Err(e) => {
            error!("Failed to get bot info: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!("Failed to register bot commands: {e}");
    }

    let shuffler: Arc<dyn Shuffler> = match config.shuffle_seed {
        Some(seed) => Arc::new(SeededShuffler::from_seed(seed)),
        None => Arc::new(SeededShuffler::from_entropy()),
    };
    let quiz = QuizDispatcher::new(Arc::new(bank), shuffler, TelegramTransport::new(bot.clone()));
    let state = Arc::new(BotState { quiz, bot_username });

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handle_message))
        .branch(Update::filter_callback_query().endpoint(handle_callback));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn handle_message(msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    let Some(ref user) = msg.from else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        return Ok(());
    };

    match event_for_text(text, &state.bot_username) {
        Some(event) => {
            let username = user.username.as_deref().unwrap_or(&user.first_name);
            info!("📨 {} ({}): {:?}", username, user.id, event);
            state.quiz.handle(user.id.0 as i64, msg.chat.id.0, event).await;
        }
        None => debug!("Ignoring non-command message from {}", user.id),
    }
    Ok(())
}

async fn handle_callback(bot: Bot, q: CallbackQuery, state: Arc<BotState>) -> ResponseResult<()> {
    // Acknowledge first so the button stops spinning even if handling is slow.
    if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
        warn!("Failed to answer callback query: {e}");
    }

    let Some(ref data) = q.data else {
        return Ok(());
    };
    let user_id = q.from.id.0 as i64;
    let chat_id = q
        .message
        .as_ref()
        .map(|m| m.chat().id.0)
        .unwrap_or(user_id);

    let event = event_for_callback(data);
    debug!("Callback from {}: {:?}", user_id, event);
    state.quiz.handle(user_id, chat_id, event).await;
    Ok(())
}
