//! Event handling and progress display

use crate::logging::log_event_with_tracing;
use console::{Style, Term};
use pkgd_events::{AppEvent, GeneralEvent, SupervisorEvent, TransactionEvent};
use pkgd_types::{OutputFormat, PackageInfo, Percentage, TransactionOutcome, TransactionStatus};

/// Renders engine events as they arrive
pub struct EventHandler {
    format: OutputFormat,
    debug: bool,
    term: Term,
    status: Option<TransactionStatus>,
    percent: Option<u8>,
}

impl EventHandler {
    pub fn new(format: OutputFormat, debug: bool) -> Self {
        Self {
            format,
            debug,
            term: Term::stderr(),
            status: None,
            percent: None,
        }
    }

    pub fn handle_event(&mut self, event: AppEvent) {
        if self.debug || self.format == OutputFormat::Json {
            log_event_with_tracing(&event);
        }
        match self.format {
            OutputFormat::Json => Self::print_json(&event),
            OutputFormat::Tty | OutputFormat::Plain => self.render(&event),
        }
    }

    fn print_json(event: &AppEvent) {
        if let AppEvent::Transaction(event) = event {
            if let Ok(line) = serde_json::to_string(event) {
                println!("{line}");
            }
        }
    }

    fn render(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Transaction(event) => self.render_transaction(event),
            AppEvent::Supervisor(SupervisorEvent::RecoveryStarted { command }) => {
                self.line(&format!(
                    "{} {command}",
                    Style::new().yellow().apply_to("repairing package database:")
                ));
            }
            AppEvent::Supervisor(SupervisorEvent::InactivityTimeout { timeout_secs }) => {
                self.line(&format!(
                    "{} no activity for {timeout_secs}s, interrupted",
                    Style::new().red().apply_to("native operation stalled:")
                ));
            }
            AppEvent::General(GeneralEvent::Warning { message, context }) => {
                let context = context
                    .as_ref()
                    .map_or_else(String::new, |c| format!(" ({c})"));
                self.line(&format!(
                    "{} {message}{context}",
                    Style::new().yellow().apply_to("warning:")
                ));
            }
            _ => {}
        }
    }

    fn render_transaction(&mut self, event: &TransactionEvent) {
        match event {
            TransactionEvent::StatusChanged { status } => {
                self.status = Some(*status);
                self.redraw_progress();
            }
            TransactionEvent::PercentageChanged { percentage } => {
                if let Percentage::Value(value) = percentage {
                    self.percent = Some(*value);
                }
                self.redraw_progress();
            }
            TransactionEvent::Package {
                info,
                package,
                summary,
            } => {
                let label = package_style(*info).apply_to(format!("{:<12}", info.to_string()));
                match summary {
                    Some(summary) if !summary.is_empty() => {
                        self.line(&format!("{label} {package}  {summary}"));
                    }
                    _ => self.line(&format!("{label} {package}")),
                }
            }
            TransactionEvent::ErrorCode { kind, details } => {
                self.line(&format!(
                    "{} {details}",
                    Style::new().red().bold().apply_to(format!("error [{kind}]:"))
                ));
            }
            TransactionEvent::Message { kind, details } => {
                self.line(&format!(
                    "{} {details}",
                    Style::new().yellow().apply_to(format!("{kind}:"))
                ));
            }
            TransactionEvent::RequireRestart { kind, package } => {
                let subject = package
                    .as_ref()
                    .map_or_else(String::new, |p| format!(" ({p})"));
                self.line(&format!(
                    "{} {kind}{subject}",
                    Style::new().yellow().bold().apply_to("restart required:")
                ));
            }
            TransactionEvent::Finished {
                outcome,
                runtime_ms,
            } => {
                self.clear_progress();
                let style = match outcome {
                    TransactionOutcome::Success => Style::new().green().bold(),
                    TransactionOutcome::Cancelled => Style::new().yellow().bold(),
                    TransactionOutcome::Failed { .. } | TransactionOutcome::Killed { .. } => {
                        Style::new().red().bold()
                    }
                };
                let seconds = f64::from(u32::try_from(*runtime_ms).unwrap_or(u32::MAX)) / 1000.0;
                self.line(&format!("{} in {seconds:.1}s", style.apply_to(outcome)));
                self.status = None;
                self.percent = None;
            }
            TransactionEvent::Started { .. }
            | TransactionEvent::SubPercentageChanged { .. }
            | TransactionEvent::AllowCancel { .. } => {}
        }
    }

    /// Print a line above the progress line
    fn line(&self, text: &str) {
        self.clear_progress();
        let _ = self.term.write_line(text);
        self.redraw_progress();
    }

    fn interactive(&self) -> bool {
        self.format == OutputFormat::Tty && self.term.is_term()
    }

    fn clear_progress(&self) {
        if self.interactive() {
            let _ = self.term.clear_line();
        }
    }

    fn redraw_progress(&self) {
        if !self.interactive() {
            return;
        }
        let Some(status) = self.status else {
            return;
        };
        let percent = self
            .percent
            .map_or_else(|| " -- ".to_string(), |p| format!("{p:>3}%"));
        let _ = self.term.clear_line();
        let _ = self.term.write_str(&format!(
            "{} {}",
            Style::new().dim().apply_to(format!("[{percent}]")),
            status
        ));
    }
}

fn package_style(info: PackageInfo) -> Style {
    match info {
        PackageInfo::Installed => Style::new().green(),
        PackageInfo::Available => Style::new().dim(),
        PackageInfo::Installing | PackageInfo::Updating => Style::new().cyan(),
        PackageInfo::Removing | PackageInfo::Obsoleting => Style::new().magenta(),
        PackageInfo::Downloading => Style::new().blue(),
    }
}
