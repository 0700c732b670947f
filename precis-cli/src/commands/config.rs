//! `precis config` commands - View and manage configuration

use anyhow::Result;
use precis_core::Config;

/// Show current configuration
pub fn show(config: Config) -> Result<()> {
    let credential = config.credential();

    println!("╭─────────────────────────────────────────╮");
    println!("│         Precis Configuration            │");
    println!("├─────────────────────────────────────────┤");
    println!("│ Completion                              │");
    println!("│   API base:     {:<23} │", truncate(&config.completion.api_base, 23));
    println!("│   Model:        {:<23} │", truncate(&config.completion.model, 23));
    println!("│   API token:    {:<23} │", credential.masked());
    println!("│   Timeout:      {:<23} │", format!("{}s", config.completion.timeout_secs));
    println!("│   Poll every:   {:<23} │", format!("{}ms", config.completion.poll_interval_ms));
    println!("├─────────────────────────────────────────┤");
    println!("│ Pipeline                                │");
    println!("│   Chunk tokens: {:<23} │", config.pipeline.max_chunk_tokens);
    println!("│   Concurrency:  {:<23} │", config.pipeline.map_concurrency);
    println!("│   Level:        {:<23} │", config.pipeline.default_level.to_string());
    println!("├─────────────────────────────────────────┤");
    println!("│ Validation                              │");
    println!("│   Min words:    {:<23} │", config.validation.min_words);
    println!("│   Min pages:    {:<23} │", config.validation.min_pages);
    println!(
        "│   Empty pages:  {:<23} │",
        format!("≤ {:.0}%", config.validation.max_empty_page_ratio * 100.0)
    );
    println!(
        "│   File size:    {:<23} │",
        format!(
            "{} B – {} MB",
            config.validation.min_file_bytes,
            config.validation.max_file_bytes / (1024 * 1024)
        )
    );
    println!("├─────────────────────────────────────────┤");
    println!("│ Logging                                 │");
    println!("│   Level:        {:<23} │", config.logging.level);
    println!("╰─────────────────────────────────────────╯");

    if !credential.is_configured() {
        println!("\n⚠️  No API token configured. Set PRECIS_API_TOKEN to summarize documents.");
    }

    println!("\n📁 Paths:");
    if let Some(path) = Config::default_config_path() {
        let exists = path.exists();
        println!(
            "   Config:   {} {}",
            path.display(),
            if exists { "✓" } else { "(not created)" }
        );
    }

    Ok(())
}

/// Initialize default configuration
pub fn init(force: bool) -> Result<()> {
    let path = Config::default_config_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config path"))?;

    if path.exists() && !force {
        println!(
            "⚠️  Configuration file already exists at: {}",
            path.display()
        );
        println!("   Use --force to overwrite.");
        return Ok(());
    }

    Config::ensure_dirs()?;

    let config = Config::default();
    config.save_to_file(&path)?;

    println!("✅ Created configuration file at: {}", path.display());
    println!("\n📝 Default configuration:");
    println!("{}", toml::to_string_pretty(&config)?);
    println!("🔑 Add your API token under [completion] or export PRECIS_API_TOKEN.");

    Ok(())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 1).collect();
        format!("{}…", head)
    }
}
