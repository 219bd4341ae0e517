//! Interactive Terms of Service confirmation

use async_trait::async_trait;
use colored::Colorize;
use keyflow_core::AcceptancePrompt;
use std::io::Write;

/// Asks the operator on the terminal to accept the terms, then waits for Enter
pub struct ConsolePrompt;

#[async_trait]
impl AcceptancePrompt for ConsolePrompt {
    async fn confirm(&self, message: &str, url: &str) {
        println!();
        println!("{}", "Terms of Service acceptance required".yellow().bold());
        println!("  {}", message);
        println!("  Accept them at: {}", url.cyan());
        print!("Press Enter after accepting the terms to continue... ");

        // blocking stdin read must not stall the runtime
        let answered = tokio::task::spawn_blocking(|| {
            std::io::stdout().flush()?;
            let mut input = String::new();
            std::io::stdin().read_line(&mut input).map(|_| ())
        })
        .await;

        match answered {
            Ok(Ok(())) => println!("{}", "Continuing...".green()),
            Ok(Err(e)) => tracing::warn!("Could not read confirmation from stdin: {}", e),
            Err(e) => tracing::warn!("Confirmation prompt was interrupted: {}", e),
        }
    }
}
