//! /settings - show and change backend settings

use deepr_api::{Settings, SettingsUpdate};

/// Format settings as text
pub fn settings_text(settings: &Settings) -> String {
    format!(
        "Backend settings:\n  \
         model_name          {}\n  \
         temperature         {}\n  \
         top_p               {}\n  \
         max_iterations      {}\n  \
         max_context_tokens  {}\n  \
         openrouter_api_key  {}\n  \
         serper_api_key      {}",
        settings.model_name,
        settings.temperature,
        settings.top_p,
        settings.max_iterations,
        settings.max_context_tokens,
        display_masked(&settings.openrouter_api_key_masked),
        display_masked(&settings.serper_api_key_masked),
    )
}

fn display_masked(masked: &str) -> &str {
    if masked.is_empty() { "(not set)" } else { masked }
}

/// Parse whitespace-separated `key=value` pairs into an update
pub fn parse_settings_update(args: &str) -> Result<SettingsUpdate, String> {
    let mut update = SettingsUpdate::default();

    for pair in args.split_whitespace() {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("Expected key=value, got '{}'", pair))?;
        let value = value.trim();

        match key.trim().to_lowercase().as_str() {
            "model" | "model_name" => update.model_name = Some(value.to_string()),
            "temperature" | "temp" => update.temperature = Some(parse_number(key, value)?),
            "top_p" => update.top_p = Some(parse_number(key, value)?),
            "max_iterations" => update.max_iterations = Some(parse_number(key, value)?),
            "max_context_tokens" => update.max_context_tokens = Some(parse_number(key, value)?),
            "openrouter_api_key" => update.openrouter_api_key = Some(value.to_string()),
            "serper_api_key" => update.serper_api_key = Some(value.to_string()),
            other => return Err(format!("Unknown setting '{}'", other)),
        }
    }

    if update.is_empty() {
        return Err("No settings given".to_string());
    }
    Ok(update)
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("Invalid value for {}: '{}'", key, value))
}
