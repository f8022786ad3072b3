use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::time::Duration;

use crate::config::Endpoint;

/// Parse an endpoint given as `label=path` or `label=METHOD path`
pub fn parse_endpoint(input: &str) -> Result<Endpoint> {
    let (label, target) = input
        .split_once('=')
        .context(format!("Invalid endpoint format, expected label=path: {}", input))?;

    let label = label.trim();
    if label.is_empty() {
        anyhow::bail!("Endpoint label must not be empty: {}", input);
    }

    let target = target.trim();
    let endpoint = match target.split_once(' ') {
        Some((method, path)) => Endpoint {
            label: label.to_string(),
            method: method.trim().to_uppercase(),
            path: path.trim().to_string(),
        },
        None => Endpoint::get(label, target),
    };

    if !endpoint.path.starts_with('/') {
        anyhow::bail!("Endpoint path must start with '/': {}", input);
    }

    Ok(endpoint)
}

/// Get a reader for a file or stdin
pub fn get_reader(path: &str) -> Result<Box<dyn BufRead>> {
    if path == "stdin" || path == "-" {
        Ok(Box::new(BufReader::new(io::stdin())))
    } else {
        let file = File::open(path).context(format!("Failed to open file: {}", path))?;
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Get a writer for a file or stdout
pub fn get_writer(path: &str) -> Result<Box<dyn Write>> {
    if path == "stdout" || path == "-" {
        Ok(Box::new(io::stdout()))
    } else {
        let file = File::create(path).context(format!("Failed to create file: {}", path))?;
        Ok(Box::new(file))
    }
}

/// Timestamped file name such as `load_test_result_20240101_120000.json`
pub fn timestamped_path(prefix: &str, now: DateTime<Utc>) -> String {
    format!("{}_{}.json", prefix, now.format("%Y%m%d_%H%M%S"))
}

/// Format a duration in a human-readable format
pub fn format_duration(duration: Duration) -> String {
    let total_micros = duration.as_micros();

    if total_micros < 1_000 {
        return format!("{}µs", total_micros);
    }

    let total_millis = duration.as_millis();
    if total_millis < 1_000 {
        return format!("{:.2}ms", duration.as_secs_f64() * 1000.0);
    }

    let total_secs = duration.as_secs_f64();
    if total_secs < 60.0 {
        return format!("{:.2}s", total_secs);
    }

    let minutes = (total_secs / 60.0).floor();
    let seconds = total_secs - (minutes * 60.0);
    format!("{}m{:.2}s", minutes as u64, seconds)
}

/// Describe a report window in hours, e.g. "24 hours" or "1.5 hours"
pub fn format_window(window: Duration) -> String {
    let secs = window.as_secs();
    if secs % 3600 == 0 && window.subsec_nanos() == 0 {
        let hours = secs / 3600;
        if hours == 1 {
            "1 hour".to_string()
        } else {
            format!("{} hours", hours)
        }
    } else {
        format!("{:.2} hours", window.as_secs_f64() / 3600.0)
    }
}

/// Format a size in a human-readable format
pub fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size < KB {
        format!("{}B", size)
    } else if size < MB {
        format!("{:.2}KB", size as f64 / KB as f64)
    } else if size < GB {
        format!("{:.2}MB", size as f64 / MB as f64)
    } else {
        format!("{:.2}GB", size as f64 / GB as f64)
    }
}
