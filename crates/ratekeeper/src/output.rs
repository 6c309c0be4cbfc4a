//! Terminal output utilities

use console::style;

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", style("✓").green().bold(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", style("✗").red().bold(), msg);
}

/// Print a warning message
pub fn warning(msg: &str) {
    eprintln!("{} {}", style("⚠").yellow().bold(), msg);
}

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", style("ℹ").blue().bold(), msg);
}

/// Print a header
pub fn header(msg: &str) {
    println!("\n{}", style(msg).bold().underlined());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", style(key).dim(), value);
}

/// Render a remaining-quota ratio, colored by how close it is to empty
pub fn ratio(value: f64, threshold: f64) -> String {
    let text = format!("{:.1}%", value * 100.0);
    if value <= threshold {
        style(text).red().bold().to_string()
    } else if value <= threshold * 2.0 {
        style(text).yellow().to_string()
    } else {
        style(text).green().to_string()
    }
}
