use std::io::Write;

use anyhow::{Context, Result};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::mpsc;

use crate::chat::{Chat, ChatError, StreamError};
use crate::core::AppConfig;
use crate::corpus::Corpus;
use crate::retrieval::TfIdfIndex;

/// Runs the interactive chat loop. One cycle is fully processed
/// before the next line of input is read, so the prompt itself blocks
/// input while a response is streaming.
pub async fn run(config: &AppConfig) -> Result<()> {
    let corpus = Corpus::load(&config.corpus_path).context("Loading the corpus failed")?;
    let index = TfIdfIndex::build(corpus);

    // Fragments are drained and printed inside the cycle loop below
    // rather than by a detached task, so the closing newline and the
    // next prompt cannot overtake the streamed tail.
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let mut chat = Chat::builder(&config.api_hostname, &config.api_key, &config.model, index)
        .persona(&config.policy_text, &config.initial_framing)
        .greeting(&config.initial_greeting)
        .temperature(config.temperature)
        .context_style(config.context_style)
        .streaming(tx)
        .build();

    println!("{}\n", config.initial_greeting);

    let mut rl = DefaultEditor::new().context("Editor failed")?;
    loop {
        let readline = rl.readline(">>> ");
        match readline {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let cycle = chat.next_turn(&line);
                tokio::pin!(cycle);
                let result = loop {
                    tokio::select! {
                        result = &mut cycle => break result,
                        Some(fragment) = rx.recv() => {
                            print!("{}", fragment);
                            let _ = std::io::stdout().flush();
                        }
                    }
                };
                // Fragments sent just before the cycle resolved may
                // still be queued; flush them before closing the line.
                while let Ok(fragment) = rx.try_recv() {
                    print!("{}", fragment);
                    let _ = std::io::stdout().flush();
                }
                match result {
                    Ok(_) => {
                        println!("\n");
                    }
                    Err(ChatError::Stream(StreamError::Interrupted { .. })) => {
                        // The partial answer is discarded and the
                        // question stays in the transcript for retry.
                        println!("\n[response interrupted, try again]\n");
                    }
                    Err(e) => {
                        println!("Error: {}", e);
                    }
                }
            }
            Err(ReadlineError::Interrupted) => break,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }

    Ok(())
}
