//! Providers Command
//!
//! List configured LLM providers in failover order with their availability.

use crate::cli::ui::Output;
use crate::config::ConfigLoader;
use crate::explainer::CodeExplainer;
use crate::types::Result;

pub async fn run() -> Result<()> {
    let config = ConfigLoader::load()?;
    let explainer = CodeExplainer::from_config(&config)?;
    let output = Output::new();

    let providers = explainer.list_providers().await;
    output.providers(&providers);

    if providers.iter().all(|p| !p.available) {
        println!();
        output.warning(
            "No providers available. Set GEMINI_API_KEY for Gemini and/or make sure Ollama is running.",
        );
    }

    Ok(())
}
