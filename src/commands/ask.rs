//! `hrag ask` - answer a question from the indexed documents

use anyhow::Result;
use colored::*;
use std::io::Write;

use hrag::config::AppConfig;
use hrag::{Answer, AnswerOutcome};

pub struct AskOptions {
    /// Print fragments as they arrive
    pub stream: bool,
    pub no_rerank: bool,
    pub json: bool,
}

pub fn execute(config: &AppConfig, question: &str, options: AskOptions) -> Result<()> {
    let pipeline = super::build_pipeline(config, options.no_rerank)?;

    let answer = if options.stream {
        let mut stdout = std::io::stdout();
        let mut started = false;
        let answer = pipeline.answer_streaming(question, &mut |fragment| {
            if !started {
                println!("{}", "✅ Cevap:".bold());
                started = true;
            }
            // Broken pipe on stdout should not abort generation
            let _ = write!(stdout, "{}", fragment);
            let _ = stdout.flush();
        })?;
        if started {
            println!();
        }
        answer
    } else {
        pipeline.answer(question)?
    };

    if options.json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
        return Ok(());
    }

    // A streamed answer is already on screen
    if !options.stream || answer.outcome != AnswerOutcome::Answered {
        print_answer(&answer);
    }
    print_footer(&answer);
    Ok(())
}

fn print_answer(answer: &Answer) {
    match &answer.outcome {
        AnswerOutcome::Answered => {
            println!("{}", "✅ Cevap:".bold());
            println!("{}", answer.text.trim());
        }
        AnswerOutcome::NoPassages => {
            println!("{}", "No relevant passages found; nothing to answer from.".yellow());
        }
        AnswerOutcome::GenerationFailed(error) => {
            println!("{} {}", "✗ Generation failed:".red().bold(), error);
        }
    }
}

fn print_footer(answer: &Answer) {
    if !answer.citations.is_empty() {
        println!();
        println!("{}", "📚 Kaynaklar:".bold());
        for source in &answer.citations {
            println!("  - {}", source.cyan());
        }
    }

    println!();
    println!(
        "{}",
        format!(
            "⏱️  retrieval {:.0} ms, generation {:.2} s",
            answer.retrieval_latency.as_secs_f64() * 1000.0,
            answer.generation_latency.as_secs_f64()
        )
        .dimmed()
    );
}
