// Copyright (c) The xjet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A minimal terminal [`Reporter`] built on the same stack as a fuller
//! `displayer` would use (`owo-colors` for styling, `indicatif` for a
//! progress bar) -- kept deliberately small since the full TUI renderer
//! is an external collaborator.

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use std::sync::Mutex;
use xjet_core::reporter::Reporter;
use xjet_core::wire::{ActionKind, ActionPayload, EventScope, LogPayload, StatusKind, StatusPayload, SuiteErrorPayload};
use xjet_metadata::RunSummary;

pub struct TerminalReporter {
    silent: bool,
    bar: Mutex<Option<ProgressBar>>,
}

impl TerminalReporter {
    pub fn new(silent: bool) -> Self {
        Self {
            silent,
            bar: Mutex::new(None),
        }
    }

    fn println(&self, line: impl AsRef<str>) {
        if !self.silent {
            if let Some(bar) = self.bar.lock().expect("progress bar poisoned").as_ref() {
                bar.println(line.as_ref());
            } else {
                println!("{}", line.as_ref());
            }
        }
    }
}

impl Reporter for TerminalReporter {
    fn init(&self, suite_names: &[String], runner_count: i64) {
        if self.silent {
            return;
        }
        let label = if runner_count < 0 {
            "local".to_string()
        } else {
            format!("{runner_count} runners")
        };
        println!("{} {} suite(s) on {}", "xjet".bold().cyan(), suite_names.len(), label);

        let bar = ProgressBar::new(suite_names.len() as u64);
        if let Ok(style) = ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} suites") {
            bar.set_style(style);
        }
        *self.bar.lock().expect("progress bar poisoned") = Some(bar);
    }

    fn log(&self, suite: &str, payload: &LogPayload) {
        self.println(format!("[{suite}] {}", payload.description.dimmed()));
    }

    fn status(&self, suite: &str, payload: &StatusPayload) {
        let label = match payload.status {
            StatusKind::Start => return,
            StatusKind::Skip => "SKIP".yellow().to_string(),
            StatusKind::Todo => "TODO".blue().to_string(),
            StatusKind::End => "END".dimmed().to_string(),
        };
        self.println(format!("{label} {suite}::{}", payload.description));
    }

    fn action(&self, suite: &str, payload: &ActionPayload) {
        let label = match payload.action {
            ActionKind::Success => "PASS".green().to_string(),
            ActionKind::Failure => "FAIL".red().bold().to_string(),
        };
        self.println(format!("{label} {suite}::{} ({}ms)", payload.description, payload.duration_ms));
        if payload.action == ActionKind::Failure {
            for error in &payload.errors {
                self.println(format!("  {}", error.message.red()));
            }
        }
        if payload.scope == EventScope::Describe {
            if let Some(bar) = self.bar.lock().expect("progress bar poisoned").as_ref() {
                bar.inc(1);
            }
        }
    }

    fn suite_error(&self, suite: &str, payload: &SuiteErrorPayload) {
        self.println(format!("{} {suite}: {}", "ERROR".red().bold(), payload.message));
    }

    fn finish(&self) -> RunSummary {
        if let Some(bar) = self.bar.lock().expect("progress bar poisoned").take() {
            bar.finish_and_clear();
        }
        RunSummary::default()
    }
}
