//! /models - list models offered by the backend

use deepr_api::ModelInfo;

/// List models as text, marking the one currently configured
pub fn list_models_text(models: &[ModelInfo], current: Option<&str>) -> String {
    if models.is_empty() {
        return "No models available".to_string();
    }

    let mut output = String::from("Available models:\n");
    for model in models {
        let marker = if Some(model.id.as_str()) == current { " *" } else { "" };
        let context = model
            .context_length
            .map(|n| format!(" ({}k context)", n / 1000))
            .unwrap_or_default();
        output.push_str(&format!("  {}  {}{}{}\n", model.id, model.name, context, marker));
    }

    output.push_str("\nSwitch with: /settings model=<id>");
    output
}
