//! Headless front end: a terminal runner plus fixed-answer deciders.

use super::{DecisionProvider, ExecutionSink, Prompt, Reporter};
use camino::Utf8Path;
use regex::Regex;
use std::io::{self, BufRead, Write};
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::runtime::Handle;
use tokio::sync::watch;

/// Declines every prompt. Used when nobody can answer.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonInteractive;

impl DecisionProvider for NonInteractive {
    fn ask(&self, prompt: &Prompt) -> String {
        prompt.negative().to_string()
    }
}

/// Accepts every prompt (`--yes`).
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

impl DecisionProvider for AssumeYes {
    fn ask(&self, prompt: &Prompt) -> String {
        tracing::info!("Assuming '{}' for: {}", prompt.affirmative(), prompt.text);
        prompt.affirmative().to_string()
    }
}

/// Asks on the terminal. End of input counts as the negative answer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompt;

impl DecisionProvider for TerminalPrompt {
    fn ask(&self, prompt: &Prompt) -> String {
        println!("\n== {} ==\n{}", prompt.title, prompt.text);
        if !prompt.information.is_empty() {
            println!("{}", prompt.information);
        }
        if let Some(details) = &prompt.details {
            println!("\n{details}");
        }
        for (i, label) in prompt.buttons.iter().enumerate() {
            println!("  [{}] {}", i + 1, button_text(label));
        }
        print!("Choice: ");
        let _ = io::stdout().flush();

        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => prompt.negative().to_string(),
            Ok(_) => choose(prompt, line.trim()).to_string(),
        }
    }
}

/// Button label without its accelerator marker.
fn button_text(label: &str) -> String {
    label.replace('&', "")
}

/// Match an answer by number, full label or first letter. Anything else is negative.
fn choose<'p>(prompt: &'p Prompt, answer: &str) -> &'p str {
    if let Some(label) = answer
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| prompt.buttons.get(i))
    {
        return label;
    }

    let mut chars = answer.chars();
    let initial = match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c.to_ascii_lowercase()),
        _ => None,
    };

    prompt
        .buttons
        .iter()
        .map(String::as_str)
        .find(|label| {
            let text = button_text(label);
            text.eq_ignore_ascii_case(answer)
                || initial.is_some_and(|c| {
                    text.chars().next().map(|f| f.to_ascii_lowercase()) == Some(c)
                })
        })
        .unwrap_or_else(|| prompt.negative())
}

/// Reports to the log and stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn fatal(&self, title: &str, message: &str, details: &str) {
        tracing::error!("{}: {} {}", title, message, details);
        eprintln!("[FATAL] {title}: {message}");
        if !details.is_empty() {
            eprintln!("{details}");
        }
    }

    fn warning(&self, title: &str, message: &str, details: &str) {
        tracing::warn!("{}: {} {}", title, message, details);
        eprintln!("[WARNING] {title}: {message}");
        if !details.is_empty() {
            eprintln!("{details}");
        }
    }

    fn information(&self, title: &str, message: &str) {
        tracing::info!("{}: {}", title, message);
        println!("{title}: {message}");
    }
}

/// Shared between [`ConsoleRunner`] and whoever handles interrupts.
///
/// An interrupt only means "cancel" while a helper process is running. At any
/// other time the caller decides what to do with it (the binary exits).
#[derive(Debug)]
pub struct CancelHandle {
    helper_running: AtomicBool,
    cancel_tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn new() -> Arc<Self> {
        let (cancel_tx, _) = watch::channel(false);
        Arc::new(Self {
            helper_running: AtomicBool::new(false),
            cancel_tx,
        })
    }

    pub fn is_helper_running(&self) -> bool {
        self.helper_running.load(Ordering::SeqCst)
    }

    /// Cancel the running helper. Returns false when no helper is running, in
    /// which case nothing is signalled.
    pub fn interrupt(&self) -> bool {
        if !self.is_helper_running() {
            return false;
        }
        self.cancel_tx.send_replace(true);
        true
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.cancel_tx.subscribe()
    }
}

/// Clears the running flag however `run` returns.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Terminal [`ExecutionSink`] that runs the helper on a tokio runtime.
///
/// `execute` blocks the calling thread, so call it from a blocking worker
/// (`spawn_blocking`), never from inside the runtime. [`CancelHandle::interrupt`]
/// kills the running helper; content it already wrote stays on disk.
pub struct ConsoleRunner {
    handle: Handle,
    cancel: Arc<CancelHandle>,
    cancel_rx: watch::Receiver<bool>,

    /// Matches the helper's per-item completion line
    progress_pattern: Regex,

    closed: AtomicBool,
}

impl ConsoleRunner {
    pub fn new(handle: Handle, cancel: Arc<CancelHandle>) -> Self {
        Self {
            handle,
            cancel_rx: cancel.subscribe(),
            cancel,
            progress_pattern: Regex::new(r"Success\. Downloaded item (\d+)")
                .expect("Invalid progress regex"),
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    /// Item id of a completion line, if `line` is one.
    pub fn completed_item<'l>(&self, line: &'l str) -> Option<&'l str> {
        self.progress_pattern
            .captures(line)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }

    async fn run(&self, program: &Utf8Path, args: &[String], expected_units: usize) -> Option<i32> {
        let mut cancel = self.cancel_rx.clone();
        if *cancel.borrow() {
            self.message("Cancelled before start");
            return None;
        }

        let mut child = match Command::new(program.as_std_path())
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                tracing::error!("Failed to spawn {}: {}", program, e);
                self.message(&format!("Failed to start {program}: {e}"));
                return None;
            }
        };

        tracing::info!("Started {} (pid {:?})", program, child.id());
        let _running = RunningGuard::enter(&self.cancel.helper_running);

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::warn!("helper stderr: {}", line);
                }
            });
        }

        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill().await;
            return None;
        };
        let mut lines = BufReader::new(stdout).lines();

        let mut completed = 0usize;
        let mut cancel_open = true;

        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        println!("{line}");
                        if self.completed_item(&line).is_some() {
                            completed += 1;
                            self.message(&format!("Progress: {completed}/{expected_units}"));
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!("Failed to read helper output: {}", e);
                        break;
                    }
                },
                changed = cancel.changed(), if cancel_open => match changed {
                    Ok(()) if *cancel.borrow() => {
                        tracing::warn!("Cancellation requested - killing {}", program);
                        let _ = child.kill().await;
                        self.message("Process cancelled. Partially downloaded content was left in place.");
                        return None;
                    }
                    Ok(()) => {}
                    Err(_) => cancel_open = false,
                },
            }
        }

        match child.wait().await {
            Ok(status) => {
                tracing::info!(
                    "{} exited with {:?} ({}/{} units)",
                    program,
                    status.code(),
                    completed,
                    expected_units
                );
                status.code()
            }
            Err(e) => {
                tracing::error!("Failed to wait for {}: {}", program, e);
                None
            }
        }
    }
}

impl ExecutionSink for ConsoleRunner {
    fn message(&self, text: &str) {
        println!("{text}");
    }

    fn execute(&self, program: &Utf8Path, args: &[String], expected_units: usize) -> Option<i32> {
        self.message(&format!("Executing: {} {}", program, args.join(" ")));
        self.handle.block_on(self.run(program, args, expected_units))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}
