//! Quiz session state machine.
//!
//! `transition` is pure apart from the injected shuffler: given the current
//! session and an event it returns the next session (or `None` when the
//! session ends) and the effects to deliver. Every phase/event pair is
//! handled; user mistakes become `Effect::ShowError`.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::Mutex;

use crate::quiz::bank::{Question, QuestionBank};
use crate::quiz::session::{OrderMode, Progress, Session};

pub const HELP_TEXT: &str = "Available commands:\n\
/start - choose a topic and start a quiz\n\
/random - start a quiz with questions in random order\n\
/restart - drop the current quiz and start over\n\
/help - show this list";

/// Inbound events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    BeginQuiz,
    /// Legacy variant: the order question is skipped and questions are shuffled.
    BeginRandom,
    TopicChosen(String),
    OrderChosen(OrderMode),
    AnswerSelected(String),
    Restart,
    HelpRequested,
    UnknownCommand(String),
}

/// Outbound effects, independent of any transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    ShowTopicList(Vec<String>),
    ShowOrderChoice,
    ShowQuestion {
        /// 1-based.
        number: usize,
        total: usize,
        prompt: String,
        /// `(label, text)` sorted by label; each label is also a button payload.
        options: Vec<(String, String)>,
    },
    ShowFeedback {
        correct: bool,
        correct_label: String,
        correct_text: String,
        score: usize,
        total: usize,
    },
    ShowCompletion { score: usize, total: usize },
    ShowError(String),
    ShowHelp(String),
}

/// Result of one transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub session: Option<Session>,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn new(session: Option<Session>, effects: Vec<Effect>) -> Self {
        Self { session, effects }
    }

    fn error(session: Option<Session>, message: impl Into<String>) -> Self {
        Self::new(session, vec![Effect::ShowError(message.into())])
    }
}

/// Source of random question orders.
pub trait Shuffler: Send + Sync {
    fn shuffle(&self, order: &mut [usize]);
}

/// Fisher-Yates over a process-wide RNG seeded once.
pub struct SeededShuffler {
    rng: Mutex<StdRng>,
}

impl SeededShuffler {
    pub fn from_entropy() -> Self {
        Self { rng: Mutex::new(StdRng::from_entropy()) }
    }

    pub fn from_seed(seed: u64) -> Self {
        Self { rng: Mutex::new(StdRng::seed_from_u64(seed)) }
    }
}

impl Shuffler for SeededShuffler {
    fn shuffle(&self, order: &mut [usize]) {
        let mut rng = self.rng.lock().expect("shuffler lock poisoned");
        order.shuffle(&mut *rng);
    }
}

const NO_TOPICS: &str = "No topics are available. Please try again later.";
const NO_SESSION: &str = "Please start the quiz with /start.";

/// Compute the next session and effects for `event`.
pub fn transition(
    bank: &QuestionBank,
    session: Option<Session>,
    event: Event,
    shuffler: &dyn Shuffler,
) -> Transition {
    match event {
        Event::HelpRequested => Transition::new(session, vec![Effect::ShowHelp(HELP_TEXT.to_string())]),
        Event::UnknownCommand(name) => Transition::error(
            session,
            format!("Unknown command /{}. Use /help to see the available commands.", name),
        ),
        // Starting over always discards whatever came before.
        Event::BeginQuiz | Event::Restart => begin(bank, None, shuffler),
        Event::BeginRandom => begin(bank, Some(OrderMode::Random), shuffler),
        Event::TopicChosen(name) => match session {
            Some(Session::AwaitingTopic { preset }) => choose_topic(bank, preset, name, shuffler),
            Some(Session::AwaitingOrder { .. }) => {
                Transition::error(session, "Please choose the question order first.")
            }
            Some(Session::InProgress(_)) => Transition::error(
                session,
                "A quiz is already in progress. Answer the current question or use /restart.",
            ),
            None => Transition::error(None, NO_SESSION),
        },
        Event::OrderChosen(mode) => match session {
            Some(Session::AwaitingOrder { topic }) => start(bank, topic, mode, shuffler),
            Some(Session::AwaitingTopic { .. }) => {
                Transition::error(session, "Please select a topic first.")
            }
            Some(Session::InProgress(_)) => Transition::error(
                session,
                "A quiz is already in progress. Answer the current question or use /restart.",
            ),
            None => Transition::error(None, NO_SESSION),
        },
        Event::AnswerSelected(label) => match session {
            Some(Session::InProgress(progress)) => answer(bank, progress, &label),
            Some(Session::AwaitingTopic { .. }) => {
                Transition::error(session, "Please select a topic first.")
            }
            Some(Session::AwaitingOrder { .. }) => {
                Transition::error(session, "Please choose the question order first.")
            }
            None => Transition::error(None, NO_SESSION),
        },
    }
}

fn begin(bank: &QuestionBank, preset: Option<OrderMode>, shuffler: &dyn Shuffler) -> Transition {
    let mut names = bank.topic_names();
    if names.is_empty() {
        return Transition::error(None, NO_TOPICS);
    }
    // Nothing to choose between: the random quiz starts right away.
    if preset.is_some() && names.len() == 1 {
        return choose_topic(bank, preset, names.remove(0), shuffler);
    }
    Transition::new(
        Some(Session::AwaitingTopic { preset }),
        vec![Effect::ShowTopicList(names)],
    )
}

fn choose_topic(
    bank: &QuestionBank,
    preset: Option<OrderMode>,
    name: String,
    shuffler: &dyn Shuffler,
) -> Transition {
    if bank.topic(&name).is_none() {
        return Transition::error(
            Some(Session::AwaitingTopic { preset }),
            format!("Unknown topic \"{}\". Please pick one from the list.", name),
        );
    }
    match preset {
        Some(mode) => start(bank, name, mode, shuffler),
        None => Transition::new(Some(Session::AwaitingOrder { topic: name }), vec![Effect::ShowOrderChoice]),
    }
}

fn start(bank: &QuestionBank, topic: String, mode: OrderMode, shuffler: &dyn Shuffler) -> Transition {
    let count = bank.topic(&topic).map(|t| t.len()).unwrap_or(0);
    if count == 0 {
        let mut t = begin(bank, None, shuffler);
        t.effects.insert(
            0,
            Effect::ShowError(format!("Topic \"{}\" is not available. Please choose another one.", topic)),
        );
        return t;
    }

    let mut order: Vec<usize> = (0..count).collect();
    if mode == OrderMode::Random {
        shuffler.shuffle(&mut order);
    }
    let progress = Progress::new(topic, order);
    let effects = vec![question_effect(bank, &progress)];
    Transition::new(Some(Session::InProgress(progress)), effects)
}

fn answer(bank: &QuestionBank, mut progress: Progress, label: &str) -> Transition {
    let Some(topic) = bank.topic(&progress.topic) else {
        let message = format!("Topic \"{}\" is no longer available. Use /start to pick another.", progress.topic);
        return Transition::error(Some(Session::InProgress(progress)), message);
    };
    let question: &Question = match progress.current().and_then(|i| topic.questions.get(i)) {
        Some(q) => q,
        None => {
            return Transition::error(
                Some(Session::InProgress(progress)),
                "This quiz is already completed. Use /start to begin a new one.",
            );
        }
    };

    let correct = question.is_correct(label);
    if correct {
        progress.score += 1;
    }
    progress.position += 1;

    let (correct_label, correct_text) = question.primary_answer();
    let mut effects = vec![Effect::ShowFeedback {
        correct,
        correct_label: correct_label.to_string(),
        correct_text: correct_text.to_string(),
        score: progress.score,
        total: progress.total(),
    }];

    if progress.is_finished() {
        effects.push(Effect::ShowCompletion {
            score: progress.score,
            total: progress.total(),
        });
        return Transition::new(None, effects);
    }

    effects.push(question_effect(bank, &progress));
    Transition::new(Some(Session::InProgress(progress)), effects)
}

/// Render the current question of a running quiz.
fn question_effect(bank: &QuestionBank, progress: &Progress) -> Effect {
    let question = progress
        .current()
        .and_then(|i| bank.topic(&progress.topic)?.questions.get(i));
    match question {
        Some(q) => Effect::ShowQuestion {
            number: progress.position + 1,
            total: progress.total(),
            prompt: q.prompt.clone(),
            options: q.options.clone(),
        },
        None => Effect::ShowError("Question index out of range.".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::bank::Topic;

    struct Reverse;

    impl Shuffler for Reverse {
        fn shuffle(&self, order: &mut [usize]) {
            order.reverse();
        }
    }

    fn bank() -> QuestionBank {
        let geo = Topic::from_json(
            "geo",
            r#"[
                {"question": "Capital of France?", "options": {"A": "Paris", "B": "London"}, "correct_answer": ["A"]},
                {"question": "Capital of Italy?", "options": ["A. Rome", "B. Milan"], "correct_answer": ["A"]},
                {"question": "Capital of Spain?", "options": {"A": "Porto", "B": "Madrid"}, "correct_answer": ["B"]}
            ]"#,
        )
        .unwrap();
        let math = Topic::from_json(
            "math",
            r#"[{"question": "2+2?", "options": {"A": "4", "B": "5"}, "correct_answer": ["A"]}]"#,
        )
        .unwrap();
        QuestionBank::new(vec![geo, math])
    }

    #[test]
    fn test_order_chosen_ordered_is_identity() {
        let t = transition(
            &bank(),
            Some(Session::AwaitingOrder { topic: "geo".into() }),
            Event::OrderChosen(OrderMode::Ordered),
            &Reverse,
        );
        assert_eq!(t.session.unwrap().progress().unwrap().order, vec![0, 1, 2]);
    }

    #[test]
    fn test_order_chosen_random_uses_shuffler() {
        let t = transition(
            &bank(),
            Some(Session::AwaitingOrder { topic: "geo".into() }),
            Event::OrderChosen(OrderMode::Random),
            &Reverse,
        );
        let session = t.session.unwrap();
        assert_eq!(session.progress().unwrap().order, vec![2, 1, 0]);
        assert_eq!(
            t.effects,
            vec![Effect::ShowQuestion {
                number: 1,
                total: 3,
                prompt: "Capital of Spain?".into(),
                options: vec![("A".into(), "Porto".into()), ("B".into(), "Madrid".into())],
            }]
        );
    }

    #[test]
    fn test_seeded_shuffler_yields_permutation() {
        let shuffler = SeededShuffler::from_seed(42);
        for n in [0usize, 1, 2, 10, 50] {
            let mut order: Vec<usize> = (0..n).collect();
            shuffler.shuffle(&mut order);
            let mut sorted = order.clone();
            sorted.sort_unstable();
            assert_eq!(sorted, (0..n).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_seeded_shuffler_is_not_always_identity() {
        let shuffler = SeededShuffler::from_seed(7);
        let identity: Vec<usize> = (0..10).collect();
        let moved = (0..20).any(|_| {
            let mut order = identity.clone();
            shuffler.shuffle(&mut order);
            order != identity
        });
        assert!(moved);
    }

    #[test]
    fn test_wrong_answer_reports_correct_option() {
        let progress = Progress::new("geo".into(), vec![0, 1, 2]);
        let t = transition(
            &bank(),
            Some(Session::InProgress(progress)),
            Event::AnswerSelected("b".into()),
            &Reverse,
        );
        assert_eq!(
            t.effects[0],
            Effect::ShowFeedback {
                correct: false,
                correct_label: "A".into(),
                correct_text: "Paris".into(),
                score: 0,
                total: 3,
            }
        );
        let p = t.session.unwrap();
        assert_eq!(p.progress().unwrap().position, 1);
    }

    #[test]
    fn test_empty_label_counts_as_incorrect() {
        let progress = Progress::new("math".into(), vec![0]);
        let t = transition(&bank(), Some(Session::InProgress(progress)), Event::AnswerSelected("  ".into()), &Reverse);
        assert!(t.session.is_none());
        assert!(matches!(t.effects[0], Effect::ShowFeedback { correct: false, .. }));
        assert_eq!(t.effects[1], Effect::ShowCompletion { score: 0, total: 1 });
    }

    #[test]
    fn test_finished_progress_is_an_error() {
        let mut progress = Progress::new("math".into(), vec![0]);
        progress.position = 1;
        let session = Session::InProgress(progress);
        let t = transition(&bank(), Some(session.clone()), Event::AnswerSelected("A".into()), &Reverse);
        assert_eq!(t.session, Some(session));
        assert!(matches!(t.effects[0], Effect::ShowError(_)));
    }

    #[test]
    fn test_begin_random_single_topic_starts_immediately() {
        let only = QuestionBank::new(vec![bank().topic("geo").unwrap().clone()]);
        let t = transition(&only, None, Event::BeginRandom, &Reverse);
        let progress = t.session.unwrap().progress().cloned().unwrap();
        assert_eq!(progress.order, vec![2, 1, 0]);
        assert!(matches!(t.effects[0], Effect::ShowQuestion { number: 1, .. }));
    }

    #[test]
    fn test_begin_random_skips_order_choice() {
        let b = bank();
        let t = transition(&b, None, Event::BeginRandom, &Reverse);
        assert_eq!(t.session, Some(Session::AwaitingTopic { preset: Some(OrderMode::Random) }));
        let t = transition(&b, t.session, Event::TopicChosen("geo".into()), &Reverse);
        assert_eq!(t.session.unwrap().progress().unwrap().order, vec![2, 1, 0]);
    }

    #[test]
    fn test_unknown_command_keeps_session() {
        let session = Some(Session::AwaitingOrder { topic: "geo".into() });
        let t = transition(&bank(), session.clone(), Event::UnknownCommand("foo".into()), &Reverse);
        assert_eq!(t.session, session);
        match &t.effects[0] {
            Effect::ShowError(msg) => assert!(msg.contains("/foo") && msg.contains("/help")),
            other => panic!("unexpected effect {:?}", other),
        }
    }

    #[test]
    fn test_vanished_topic_returns_to_topic_list() {
        let t = transition(
            &bank(),
            Some(Session::AwaitingOrder { topic: "history".into() }),
            Event::OrderChosen(OrderMode::Ordered),
            &Reverse,
        );
        assert_eq!(t.session, Some(Session::fresh()));
        assert!(matches!(t.effects[0], Effect::ShowError(_)));
        assert_eq!(t.effects[1], Effect::ShowTopicList(vec!["geo".into(), "math".into()]));
    }
}
