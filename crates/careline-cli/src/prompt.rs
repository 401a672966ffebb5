//! Terminal prompts.

use std::io::{self, Write};

use anyhow::Result;

/// Read one trimmed line. An empty answer takes `default` when there is one.
pub fn line(label: &str, default: Option<&str>) -> Result<String> {
    match default {
        Some(d) => print!("{} [{}]: ", label, d),
        None => print!("{}: ", label),
    }
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim();

    match (input.is_empty(), default) {
        (true, Some(d)) => Ok(d.to_string()),
        _ => Ok(input.to_string()),
    }
}

/// Read without echo.
pub fn secret(label: &str) -> Result<String> {
    Ok(rpassword::prompt_password(label)?)
}
