use std::time::Duration;
use tokio::time::Instant;

/// Coalesces prompt edits into one settled value per quiet interval.
///
/// Holds the latest draft and at most one pending deadline. Every edit pushes
/// the deadline out again, so only the last value of a burst is emitted. The
/// debouncer knows nothing about requests; the controller decides whether a
/// settled value is actually issued.
#[derive(Debug)]
pub struct Debouncer {
    quiet: Duration,
    draft: String,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            draft: String::new(),
            deadline: None,
        }
    }

    pub fn quiet_interval(&self) -> Duration {
        self.quiet
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Records the new draft and restarts the timer.
    pub fn on_input_change(&mut self, text: impl Into<String>, now: Instant) {
        self.draft = text.into();
        self.deadline = Some(now + self.quiet);
    }

    /// Starts a fresh quiet interval for the current draft.
    pub fn rearm(&mut self, now: Instant) {
        self.deadline = Some(now + self.quiet);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// Emits the draft if the deadline has passed. Consumes the timer.
    pub fn poll_settled(&mut self, now: Instant) -> Option<String> {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                Some(self.draft.clone())
            }
            _ => None,
        }
    }

    /// Emits the draft immediately, dropping any pending timer.
    pub fn force_now(&mut self) -> String {
        self.deadline = None;
        self.draft.clone()
    }
}

/// Trimmed prompt if `draft` may be issued: non-blank, different from the last
/// issued prompt, and nothing currently in flight.
pub fn admissible_prompt(draft: &str, last_issued: Option<&str>, in_flight: bool) -> Option<String> {
    if in_flight {
        return None;
    }
    let trimmed = draft.trim();
    if trimmed.is_empty() || Some(trimmed) == last_issued {
        return None;
    }
    Some(trimmed.to_string())
}
