//! `chronicle config`: Configuration management commands.

use super::GlobalOpts;
use chronicle_config::{AppConfig, SummarizerKind, TokenizerKind};

pub async fn validate(opts: &GlobalOpts) -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating {}...", opts.config_path().display());

    match opts.load_config() {
        Ok(config) => {
            println!("   Config parsed successfully");

            let mut warnings = Vec::new();

            let needs_key = config.providers.summarizer == SummarizerKind::OpenaiCompat;
            if needs_key && config.providers.api_key.is_none() {
                warnings.push("No API key set for the chat summarizer (set CHRONICLE_API_KEY)");
            }

            if config.memory.chunk_target_size * 2 > config.memory.recent_history_threshold {
                warnings.push("chunk_target_size is more than half the threshold; promotions will be frequent");
            }

            if config.providers.tokenizer == TokenizerKind::Heuristic
                && config.providers.summarizer == SummarizerKind::AiServer
            {
                warnings.push("Heuristic token counts may drift from the AI server's model");
            }

            if warnings.is_empty() {
                println!("   All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   warning: {w}");
                }
            }

            println!();
            println!("   Tokenizer:   {:?}", config.providers.tokenizer);
            println!("   Summarizer:  {:?}", config.providers.summarizer);
            println!(
                "   Threshold:   {} tokens (chunks of ~{})",
                config.memory.recent_history_threshold, config.memory.chunk_target_size
            );
            println!("   Live chunks: {}", config.memory.max_live_chunks);
        }
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e);
        }
    }

    Ok(())
}

pub async fn show(opts: &GlobalOpts) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = opts.load_config()?;
    // Never echo the secret.
    if config.providers.api_key.is_some() {
        config.providers.api_key = Some("[REDACTED]".into());
    }
    let toml_str = toml_string(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn default() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", AppConfig::default_toml());
    Ok(())
}

pub async fn path(opts: &GlobalOpts) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", opts.config_path().display());
    Ok(())
}

fn toml_string(config: &AppConfig) -> Result<String, Box<dyn std::error::Error>> {
    Ok(toml::to_string_pretty(config)?)
}
