//! Quiz engine - topic selection, ordering, answering and scoring per user.

pub mod bank;
pub mod dispatcher;
pub mod machine;
pub mod session;
pub mod telegram;
pub mod transport;


pub use bank::{extract_label, LoadError, Question, QuestionBank, Topic};
pub use dispatcher::Dispatcher;
pub use machine::{transition, Effect, Event, SeededShuffler, Shuffler, Transition};
pub use session::{OrderMode, Phase, Progress, Session, SessionTable};
pub use telegram::TelegramTransport;
pub use transport::Transport;
