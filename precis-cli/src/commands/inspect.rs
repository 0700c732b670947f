//! `precis inspect` command - show extraction checks and the chunk plan

use super::input::load_document;
use anyhow::Result;
use precis_core::budget::per_chunk_output_budget;
use precis_core::tokens::{estimate_tokens, estimate_words};
use precis_core::{ChunkPlanner, Config, DocumentSource, SummaryLevel};

pub fn run(config: Config, input: String, level: Option<SummaryLevel>) -> Result<()> {
    let level = level.unwrap_or(config.pipeline.default_level);
    let source = load_document(&input, &config.validation)?;

    print_document(&source);

    match source.failure_reason() {
        Some(reason) => {
            println!("\n❌ Not suitable for summarization:");
            println!("   {}", reason);
        }
        None => println!("\n✅ Ready for summarization"),
    }

    if source.text.trim().is_empty() {
        return Ok(());
    }

    print_plan(&config, &source, level)
}

fn print_document(source: &DocumentSource) {
    println!("╭─────────────────────────────────────────╮");
    println!("│         Document                        │");
    println!("├─────────────────────────────────────────┤");
    println!("│   Title:        {:<23} │", truncate(&source.title, 23));
    if let Some(author) = &source.author {
        println!("│   Author:       {:<23} │", truncate(author, 23));
    }
    if source.page_count > 0 {
        println!("│   Pages:        {:<23} │", source.page_count);
    }
    println!("│   Words:        {:<23} │", source.word_count);
    println!("│   Est. tokens:  {:<23} │", estimate_tokens(&source.text));

    if let Some(stats) = &source.stats {
        println!("├─────────────────────────────────────────┤");
        println!("│ Extraction                              │");
        println!("│   With text:    {:<23} │", stats.pages_with_text);
        println!("│   Substantial:  {:<23} │", stats.pages_with_substantial_text);
        println!("│   Empty:        {:<23} │", stats.empty_pages);
        println!(
            "│   Chars/page:   {:<23} │",
            format!("{:.0}", stats.average_chars_per_page)
        );
    }
    println!("╰─────────────────────────────────────────╯");
}

fn print_plan(config: &Config, source: &DocumentSource, level: SummaryLevel) -> Result<()> {
    let planner = ChunkPlanner::new(config.pipeline.max_chunk_tokens);
    let plan = planner.plan(&source.text)?;
    let targets = level.targets();

    println!(
        "\n🧩 {} chunks from {} {} (ceiling {} tokens)",
        plan.len(),
        plan.unit_count,
        plan.split_mode,
        planner.max_chunk_tokens()
    );
    println!("   {:>5}  {:>6}  {:>8}  {:>10}", "#", "units", "tokens", "map budget");
    for chunk in &plan.chunks {
        let oversized = chunk.unit_count == 1 && chunk.estimated_tokens > planner.max_chunk_tokens();
        let oversized = if oversized {
            " ⚠️ oversized"
        } else {
            ""
        };
        println!(
            "   {:>5}  {:>6}  {:>8}  {:>10}{}",
            chunk.index + 1,
            chunk.unit_count,
            chunk.estimated_tokens,
            per_chunk_output_budget(chunk.estimated_tokens),
            oversized
        );
    }

    println!("\n🎯 {} level", level);
    println!("   Target:        ~{} words", targets.target_words);
    println!(
        "   Reduce budget: {} tokens (~{} words)",
        targets.reduce_output_budget(),
        estimate_words(targets.reduce_output_budget())
    );
    println!("   Model calls:   {}", plan.len() + 1);

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_counts_characters() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a long document title", 8), "a long …");
        assert_eq!(truncate("Überblick über alles", 5), "Über…");
    }
}
