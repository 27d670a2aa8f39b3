//! Terminal progress and confirmation for engine operations

use colored::Colorize;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use mirror::MirrorReport;
use syncengine::{ConfirmCallback, Direction, MirrorOperation, ProgressCallback};

use crate::ui;

/// Progress bar over the operations of a sync plan.
pub struct SyncProgress {
    bar: Option<ProgressBar>,
    hidden: bool,
}

impl SyncProgress {
    pub fn new(hidden: bool) -> Self {
        Self { bar: None, hidden }
    }
}

impl ProgressCallback for SyncProgress {
    fn on_plan_start(&mut self, direction: Direction, count: usize) {
        if self.hidden || count == 0 {
            return;
        }
        let pb = ProgressBar::new(count as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {prefix} {msg}")
                .unwrap()
                .progress_chars("=>-"),
        );
        pb.set_prefix(direction.arrow().to_string());
        self.bar = Some(pb);
    }

    fn on_operation_start(&mut self, operation: &MirrorOperation) {
        if let Some(pb) = &self.bar {
            pb.set_message(ui::truncate_path(&operation.label(), 40));
        }
    }

    fn on_operation_complete(&mut self, operation: &MirrorOperation, report: &MirrorReport) {
        if let Some(pb) = &self.bar {
            let changed = report.changed_files();
            if changed > 0 {
                pb.suspend(|| {
                    println!("  {} {} ({changed} file(s))", "✓".green(), operation.label());
                });
            }
            pb.inc(1);
        }
    }

    fn on_operation_failed(&mut self, operation: &MirrorOperation, error: &mirror::Error) {
        if let Some(pb) = &self.bar {
            pb.suspend(|| {
                println!("  {} {} ({error})", "✗".red(), operation.label());
            });
        }
        if let Some(pb) = self.bar.take() {
            pb.abandon();
        }
    }

    fn on_plan_complete(&mut self) {
        if let Some(pb) = self.bar.take() {
            pb.finish_and_clear();
        }
    }
}

/// Answers guarded-action prompts.
pub enum Confirmer {
    /// Ask on the terminal
    Prompt,
    /// Confirm without asking (`--noninteractive`)
    Auto,
}

impl Confirmer {
    pub const fn new(interactive: bool) -> Self {
        if interactive { Self::Prompt } else { Self::Auto }
    }
}

impl ConfirmCallback for Confirmer {
    fn confirm(&mut self, prompt: &str) -> syncengine::Result<bool> {
        match self {
            Self::Prompt => Confirm::new()
                .with_prompt(prompt)
                .default(false)
                .interact()
                .map_err(|e| syncengine::Error::Io(std::io::Error::other(e.to_string()))),
            Self::Auto => syncengine::AutoConfirm.confirm(prompt),
        }
    }
}
