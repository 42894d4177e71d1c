//! Collaborator interfaces between the helper services and whatever front end drives them.
//!
//! The services never talk to a terminal or a window directly. They go through:
//! - [`ExecutionSink`]: progress console that also runs the helper process
//! - [`DecisionProvider`]: yes/no style confirmation prompts
//! - [`Reporter`]: fatal, warning and information notices
//!
//! [`console`] holds the headless implementations used by the binary.

pub mod console;

pub use console::{AssumeYes, CancelHandle, ConsoleRunner, LogReporter, NonInteractive, TerminalPrompt};

use camino::Utf8Path;

pub const YES: &str = "&Yes";
pub const NO: &str = "&No";
pub const DONT_ASK_AGAIN: &str = "&Don't Ask Again";

/// Console that shows progress lines and runs the helper.
pub trait ExecutionSink {
    fn message(&self, text: &str);

    /// Run `program` to completion, showing `expected_units` as the progress total.
    ///
    /// Returns the exit code, or `None` when the process could not be started,
    /// was killed by a signal or was cancelled.
    fn execute(&self, program: &Utf8Path, args: &[String], expected_units: usize) -> Option<i32>;

    fn close(&self);
}

/// Answers confirmation prompts with one of the prompt's button labels.
#[cfg_attr(test, mockall::automock)]
pub trait DecisionProvider {
    fn ask(&self, prompt: &Prompt) -> String;
}

/// Surface notifications. `details` is empty when there is nothing more to say.
#[cfg_attr(test, mockall::automock)]
pub trait Reporter {
    /// Non-recoverable failure of the current operation.
    fn fatal(&self, title: &str, message: &str, details: &str);

    /// Recoverable problem the user should know about.
    fn warning(&self, title: &str, message: &str, details: &str);

    fn information(&self, title: &str, message: &str);
}

/// A confirmation prompt. The first button is the affirmative answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub title: String,
    pub text: String,
    pub information: String,
    pub details: Option<String>,
    pub buttons: Vec<String>,
}

impl Prompt {
    pub fn yes_no(title: impl Into<String>, text: impl Into<String>, information: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            text: text.into(),
            information: information.into(),
            details: None,
            buttons: vec![YES.to_string(), NO.to_string()],
        }
    }

    /// A prompt whose affirmative button names the action it triggers.
    pub fn binary(
        title: impl Into<String>,
        text: impl Into<String>,
        information: impl Into<String>,
        positive: impl Into<String>,
    ) -> Self {
        Self {
            buttons: vec![positive.into(), "&Cancel".to_string()],
            ..Self::yes_no(title, text, information)
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_button(mut self, label: impl Into<String>) -> Self {
        self.buttons.push(label.into());
        self
    }

    pub fn affirmative(&self) -> &str {
        self.buttons.first().map(String::as_str).unwrap_or(YES)
    }

    pub fn negative(&self) -> &str {
        self.buttons.get(1).map(String::as_str).unwrap_or(NO)
    }

    pub fn is_affirmative(&self, answer: &str) -> bool {
        answer == self.affirmative()
    }
}

/// Ask `prompt` and report whether the affirmative button was chosen.
pub fn confirm(decider: &dyn DecisionProvider, prompt: &Prompt) -> bool {
    let answer = decider.ask(prompt);
    tracing::debug!("Prompt '{}' answered with '{}'", prompt.title, answer);
    prompt.is_affirmative(&answer)
}

/// The three collaborators every operation needs, borrowed for its duration.
#[derive(Clone, Copy)]
pub struct Interaction<'a> {
    pub sink: &'a dyn ExecutionSink,
    pub decider: &'a dyn DecisionProvider,
    pub reporter: &'a dyn Reporter,

    /// Whether fixable failures may be escalated to a prompt.
    pub show_dialogues: bool,
}

impl<'a> Interaction<'a> {
    pub fn new(
        sink: &'a dyn ExecutionSink,
        decider: &'a dyn DecisionProvider,
        reporter: &'a dyn Reporter,
    ) -> Self {
        Self {
            sink,
            decider,
            reporter,
            show_dialogues: true,
        }
    }

    pub fn without_dialogues(self) -> Self {
        Self {
            show_dialogues: false,
            ..self
        }
    }

    /// Print to the sink and the log.
    pub fn message(&self, text: &str) {
        tracing::info!("{}", text);
        self.sink.message(text);
    }

    pub fn confirm(&self, prompt: &Prompt) -> bool {
        confirm(self.decider, prompt)
    }
}
