//! Interactive pauses between steps and upload batches

use std::io::{BufRead, IsTerminal, Write};

use depoline_store::Step;

/// Where the run is paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PausePoint {
    BeforeStep(Step),
    AfterBatch { batch: usize, batches: usize },
}

impl std::fmt::Display for PausePoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BeforeStep(step) => write!(f, "before step {step}"),
            Self::AfterBatch { batch, batches } => write!(f, "after upload batch {batch}/{batches}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptAnswer {
    Continue,
    /// Persist the checkpoint and exit (code 2).
    Stop,
    /// Skip the upcoming step, or the remaining batches of the upload step.
    Skip,
}

pub trait Prompt: Send + Sync {
    fn ask(&self, point: PausePoint) -> PromptAnswer;
}

/// Always continues. Used for non-interactive runs and CI.
pub struct AutoContinue;

impl Prompt for AutoContinue {
    fn ask(&self, _: PausePoint) -> PromptAnswer {
        PromptAnswer::Continue
    }
}

pub fn parse_answer(input: &str) -> Option<PromptAnswer> {
    match input.trim().to_lowercase().as_str() {
        "" | "c" | "y" | "yes" | "continue" => Some(PromptAnswer::Continue),
        "n" | "no" | "stop" | "q" => Some(PromptAnswer::Stop),
        "s" | "skip" => Some(PromptAnswer::Skip),
        _ => None,
    }
}

/// Reads answers from stdin. Continues automatically when stdin is not a
/// terminal or is closed.
pub struct TerminalPrompt {
    suspend: Box<dyn Fn(&mut dyn FnMut()) + Send + Sync>,
}

impl TerminalPrompt {
    /// `suspend` runs the closure with progress bars hidden.
    pub fn new(suspend: impl Fn(&mut dyn FnMut()) + Send + Sync + 'static) -> Self {
        Self {
            suspend: Box::new(suspend),
        }
    }
}

impl Prompt for TerminalPrompt {
    fn ask(&self, point: PausePoint) -> PromptAnswer {
        if !std::io::stdin().is_terminal() {
            log::info!("non-interactive stdin, continuing ({point})");
            return PromptAnswer::Continue;
        }
        let mut answer = PromptAnswer::Continue;
        (self.suspend)(&mut || {
            let stdin = std::io::stdin();
            loop {
                eprint!("Paused {point}. Continue? [c]ontinue / [s]kip / [n] stop: ");
                let _ = std::io::stderr().flush();
                let mut line = String::new();
                match stdin.lock().read_line(&mut line) {
                    Ok(0) | Err(_) => return,
                    Ok(_) => {}
                }
                if let Some(a) = parse_answer(&line) {
                    answer = a;
                    return;
                }
                eprintln!("Please enter c, s, or n.");
            }
        });
        answer
    }
}
