//! Curator decisions on duplicate candidates

use std::io::{self, BufRead, IsTerminal, Write};

use depoline_core::{Decision, DuplicateCandidate, MigrationRecord};

pub trait Curator: Send + Sync {
    /// Decide one open candidate. Returning `Unresolved` leaves it open.
    fn decide(&self, record: &MigrationRecord, candidate: &DuplicateCandidate) -> Decision;
}

/// Accepts candidates scoring at or above `threshold`; defers the rest.
pub struct ThresholdCurator {
    pub threshold: f64,
}

impl Curator for ThresholdCurator {
    fn decide(&self, _: &MigrationRecord, candidate: &DuplicateCandidate) -> Decision {
        if candidate.score >= self.threshold {
            Decision::Accepted
        } else {
            Decision::Deferred
        }
    }
}

pub fn parse_decision(input: &str) -> Option<Decision> {
    match input.trim().to_lowercase().as_str() {
        "a" | "accept" => Some(Decision::Accepted),
        "r" | "reject" => Some(Decision::Rejected),
        "" | "d" | "defer" => Some(Decision::Deferred),
        _ => None,
    }
}

/// Asks on the terminal: `[a]ccept / [r]eject / [d]efer`.
pub struct TerminalCurator;

impl Curator for TerminalCurator {
    fn decide(&self, record: &MigrationRecord, candidate: &DuplicateCandidate) -> Decision {
        if !std::io::stdin().is_terminal() {
            return Decision::Unresolved;
        }
        let stdin = std::io::stdin();
        match ask(record, candidate, &mut stdin.lock(), &mut std::io::stderr()) {
            Ok(decision) => decision,
            Err(e) => {
                log::warn!("{}: curator prompt failed: {e}", record.id);
                Decision::Unresolved
            }
        }
    }
}

/// Show one candidate on `out` and read answers from `input` until one parses.
/// End of input leaves the candidate unresolved.
fn ask(
    record: &MigrationRecord,
    candidate: &DuplicateCandidate,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> io::Result<Decision> {
    writeln!(out, "{}", "-".repeat(72))?;
    writeln!(out, "Record:     {}", record.id)?;
    if let Some(d) = &record.descriptor {
        writeln!(out, "Title:      {}", d.title)?;
    }
    writeln!(
        out,
        "Candidate:  [{}] {:.3} ({:?})",
        candidate.source, candidate.score, candidate.tier
    )?;
    writeln!(out, "            {}", candidate.title)?;
    if let Some(id) = candidate.doi.as_ref().or(candidate.identifier.as_ref()) {
        writeln!(out, "Identifier: {id}")?;
    }
    let b = &candidate.breakdown;
    writeln!(
        out,
        "Breakdown:  title {:.2}, abstract {}, creators {}",
        b.title,
        b.abstract_text.map_or("-".into(), |v| format!("{v:.2}")),
        b.creators.map_or("-".into(), |v| format!("{v:.2}")),
    )?;

    loop {
        write!(out, "Decision? [a]ccept / [r]eject / [d]efer: ")?;
        out.flush()?;
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(Decision::Unresolved);
        }
        if let Some(d) = parse_decision(&line) {
            return Ok(d);
        }
    }
}

/// Apply `curator` to every open candidate. Returns the number decided.
pub fn curate(record: &mut MigrationRecord, curator: &dyn Curator) -> usize {
    let mut decided = 0;
    for i in 0..record.candidates.len() {
        if !record.candidates[i].decision.is_open() {
            continue;
        }
        let decision = curator.decide(record, &record.candidates[i]);
        if decision != Decision::Unresolved && decision != record.candidates[i].decision {
            record.candidates[i].decision = decision;
            decided += 1;
        }
    }
    decided
}
