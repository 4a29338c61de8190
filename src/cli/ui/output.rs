use std::io::Write;

use console::style;

use crate::ai::provider::ProviderDescriptor;
use crate::types::{PerformanceMetrics, ProviderError};

pub struct Output {
    quiet: bool,
}

impl Output {
    pub fn new() -> Self {
        Self { quiet: false }
    }

    /// Suppress informational lines; results and errors still print
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", style("✓").green(), message);
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {}", style("✗").red(), message);
    }

    pub fn warning(&self, message: &str) {
        println!("{} {}", style("⚠").yellow(), message);
    }

    pub fn info(&self, message: &str) {
        if !self.quiet {
            println!("{} {}", style("ℹ").blue(), message);
        }
    }

    pub fn header(&self, message: &str) {
        if !self.quiet {
            println!("\n{}", style(message).bold().underlined());
        }
    }

    pub fn section(&self, message: &str) {
        println!("\n{}", style(message).bold());
        println!("{}", "─".repeat(40));
    }

    /// Write streamed text as it arrives
    pub fn stream(&self, text: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }

    /// Print one provider failure per line
    pub fn failures(&self, failures: &[ProviderError]) {
        for failure in failures {
            eprintln!(
                "  {} {} [{}] {}",
                style("•").red(),
                style(failure.provider.as_deref().unwrap_or("unknown")).bold(),
                style(failure.kind).yellow(),
                failure.message
            );
        }
    }

    pub fn metrics(&self, provider: &str, model: &str, metrics: &PerformanceMetrics) {
        self.section("Performance Metrics");
        row("Model Provider", provider);
        row("Model", model);
        row(
            "Cache Hit",
            if metrics.cache_hit { "Yes ✓" } else { "No" },
        );
        if metrics.total_time_ms > 0 {
            row("Total Time", &format_secs(metrics.total_time_ms));
        }
        if metrics.time_to_first_token_ms > 0 {
            row(
                "Time to First Token",
                &format_secs(metrics.time_to_first_token_ms),
            );
        }
        if metrics.input_tokens > 0 {
            row("Input Tokens", &metrics.input_tokens.to_string());
        }
        if metrics.tokens_decoded > 0 {
            row("Tokens Decoded", &metrics.tokens_decoded.to_string());
        }
        if let Some(rate) = metrics.tokens_per_second {
            row("Tokens/Second", &format!("{:.2}", rate));
        }
    }

    pub fn providers(&self, providers: &[ProviderDescriptor]) {
        self.section("Providers");
        for descriptor in providers {
            let status = if descriptor.available {
                style("✓ available").green()
            } else {
                style("✗ unavailable").red()
            };
            println!(
                "  {}. {} {:<6} {:<24} {}",
                descriptor.rank + 1,
                style(format!("{:<8}", descriptor.name)).cyan(),
                descriptor.kind.to_string(),
                descriptor.model,
                status
            );
        }
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

fn row(label: &str, value: &str) {
    println!("  {} {}", style(format!("{:<22}", label)).cyan(), style(value).green());
}

fn format_secs(ms: u64) -> String {
    format!("{:.3}s", ms as f64 / 1000.0)
}
