use crate::models::ReconciliationDecision;
use crossterm::{
    cursor::MoveToPreviousLine,
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{Clear, ClearType},
};
use std::io::{self, Write};

/// Terminal report of a run: one coloured line per listing plus counters.
pub struct RunTUI {
    out: Box<dyn Write>,
    gathering_line_printed: bool,
    new_count: usize,
    unchanged_count: usize,
    price_changed_count: usize,
    failed_count: usize,
}

impl RunTUI {
    pub fn new() -> Self {
        Self::with_writer(Box::new(io::stdout()))
    }

    pub fn with_writer(out: Box<dyn Write>) -> Self {
        Self {
            out,
            gathering_line_printed: false,
            new_count: 0,
            unchanged_count: 0,
            price_changed_count: 0,
            failed_count: 0,
        }
    }

    /// Show grey summary line with the size of the loaded dataset
    pub fn show_summary(&mut self, total_records: usize) -> io::Result<()> {
        execute!(
            self.out,
            SetForegroundColor(Color::DarkGrey),
            Print(format!("📁 Loaded {} existing records\n", total_records)),
            ResetColor
        )
    }

    /// Update the gathering line after a search page has been read
    pub fn update_gathering_progress(&mut self, page: usize, urls_found: usize) -> io::Result<()> {
        if self.gathering_line_printed {
            execute!(self.out, MoveToPreviousLine(1), Clear(ClearType::CurrentLine))?;
        }

        let spinner = match page % 4 {
            0 => "⠋",
            1 => "⠙",
            2 => "⠹",
            _ => "⠸",
        };

        execute!(
            self.out,
            SetForegroundColor(Color::White),
            Print(format!(
                "{} Reading search results: page {} - {} listings so far\n",
                spinner, page, urls_found
            )),
            ResetColor
        )?;
        self.gathering_line_printed = true;
        Ok(())
    }

    /// Print one line with the outcome for a listing
    pub fn listing_result(&mut self, url: &str, decision: ReconciliationDecision) -> io::Result<()> {
        self.gathering_line_printed = false;
        let (color, icon) = match decision {
            ReconciliationDecision::New => {
                self.new_count += 1;
                (Color::Green, "✅")
            }
            ReconciliationDecision::PriceChanged => {
                self.price_changed_count += 1;
                (Color::Yellow, "💶")
            }
            ReconciliationDecision::Unchanged => {
                self.unchanged_count += 1;
                (Color::DarkGrey, "·")
            }
        };

        execute!(
            self.out,
            SetForegroundColor(color),
            Print(format!("  {} {:<13} {}\n", icon, decision.to_string(), Self::truncate_url(url))),
            ResetColor
        )
    }

    /// Mark a listing as failed (red)
    pub fn listing_failed(&mut self, url: &str, reason: &str) -> io::Result<()> {
        self.gathering_line_printed = false;
        self.failed_count += 1;
        execute!(
            self.out,
            SetForegroundColor(Color::Red),
            Print(format!("  ❌ {} ({})\n", Self::truncate_url(url), reason)),
            ResetColor
        )
    }

    pub fn show_final_summary(&mut self, appended: usize, total_records: usize) -> io::Result<()> {
        execute!(
            self.out,
            Print("─".repeat(80)),
            Print("\n"),
            SetForegroundColor(Color::Green),
            Print(format!("✅ {} new", self.new_count)),
            ResetColor,
            SetForegroundColor(Color::Yellow),
            Print(format!(", {} price updates", self.price_changed_count)),
            ResetColor,
            SetForegroundColor(Color::DarkGrey),
            Print(format!(", {} unchanged", self.unchanged_count)),
            ResetColor
        )?;

        if self.failed_count > 0 {
            execute!(
                self.out,
                SetForegroundColor(Color::Red),
                Print(format!(", {} failed", self.failed_count)),
                ResetColor
            )?;
        }

        execute!(
            self.out,
            SetForegroundColor(Color::DarkGrey),
            Print(format!(" | appended {} | DB: {} total\n", appended, total_records)),
            ResetColor
        )
    }

    fn truncate_url(url: &str) -> String {
        if url.chars().count() > 80 {
            format!("{}...", url.chars().take(77).collect::<String>())
        } else {
            url.to_string()
        }
    }
}

impl Default for RunTUI {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_url() {
        let long = format!("https://www.funda.nl/{}", "a".repeat(100));
        let truncated = RunTUI::truncate_url(&long);
        assert_eq!(truncated.chars().count(), 80);
        assert!(truncated.ends_with("..."));
        assert_eq!(RunTUI::truncate_url("https://x"), "https://x");
    }
}
