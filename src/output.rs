//! Output and color utilities for consistent terminal formatting
//!
//! Provides shared color functions respecting NO_COLOR environment variable.

use colored::Colorize;
use serde::Serialize;

use crate::retrieval::Candidate;

/// Check if colors should be used (respects NO_COLOR env var)
pub fn use_colors() -> bool {
    std::env::var("NO_COLOR").is_err()
}

/// Colorize section heading (bold)
pub fn colorize_heading(text: &str, use_color: bool) -> String {
    if use_color {
        text.bold().to_string()
    } else {
        text.to_string()
    }
}

/// Colorize source identifier (cyan)
pub fn colorize_source(text: &str, use_color: bool) -> String {
    if use_color {
        text.cyan().to_string()
    } else {
        text.to_string()
    }
}

/// Colorize distance (yellow)
pub fn colorize_distance(distance: f32, use_color: bool) -> String {
    let text = format!("{:.4}", distance);
    if use_color {
        text.yellow().to_string()
    } else {
        text
    }
}

/// Colorize passage text (dimmed)
pub fn colorize_passage(text: &str, use_color: bool) -> String {
    if use_color {
        text.dimmed().to_string()
    } else {
        text.to_string()
    }
}

/// Render one selected passage as `[rank] source (distance)` plus its text
pub fn format_candidate(rank: usize, candidate: &Candidate, use_color: bool) -> String {
    format!(
        "[{}] {} (distance {})\n    {}",
        rank,
        colorize_source(&candidate.source_id, use_color),
        colorize_distance(candidate.distance, use_color),
        colorize_passage(candidate.text.trim(), use_color)
    )
}

/// Print a value as JSON on stdout
pub fn print_json<T: Serialize>(value: &T, compact: bool) -> anyhow::Result<()> {
    let rendered = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{}", rendered);
    Ok(())
}
