//! Terminal progress output for `agentium run`.

use console::{style, Emoji};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
static GAVEL: Emoji<'_, '_> = Emoji("⚖️  ", "[EVAL]");

pub struct SessionUi {
    multi: MultiProgress,
    phase_bar: ProgressBar,
    turn_bar: ProgressBar,
    verbose: bool,
}

impl SessionUi {
    pub fn new(total_phases: u64, verbose: bool) -> Self {
        let multi = MultiProgress::new();

        let phase_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("█▓▒░");
        let phase_bar = multi.add(ProgressBar::new(total_phases));
        phase_bar.set_style(phase_style);
        phase_bar.set_prefix("Phases");

        let turn_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .unwrap();
        let turn_bar = multi.add(ProgressBar::new_spinner());
        turn_bar.set_style(turn_style);
        turn_bar.set_prefix("  Turn");
        turn_bar.enable_steady_tick(Duration::from_millis(120));

        Self {
            multi,
            phase_bar,
            turn_bar,
            verbose,
        }
    }

    pub fn phase_started(&self, phase: &str, max_iter: u32) {
        self.phase_bar
            .set_message(format!("{} (budget {})", phase, max_iter));
    }

    pub fn phase_done(&self, phase: &str) {
        self.phase_bar.inc(1);
        self.println(&format!("{}{}", CHECK, style(phase).green()));
    }

    pub fn turn(&self, role: &str, iteration: u32) {
        self.turn_bar
            .set_message(format!("{} (iteration {})", role, iteration));
    }

    pub fn verdict(&self, verdict: &str) {
        self.println(&format!("{}{}", GAVEL, style(verdict).bold()));
    }

    pub fn error(&self, message: &str) {
        self.println(&format!("{}{}", CROSS, style(message).red()));
    }

    pub fn log_step(&self, message: &str) {
        if self.verbose {
            self.println(&format!("  {}", style(message).dim()));
        }
    }

    pub fn finish(&self, message: &str) {
        self.turn_bar.finish_and_clear();
        self.phase_bar.finish_with_message(message.to_string());
    }

    fn println(&self, line: &str) {
        let _ = self.multi.println(line);
    }
}
