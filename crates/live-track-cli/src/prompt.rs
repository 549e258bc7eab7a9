use async_trait::async_trait;
use live_track_lib::{Capability, PermissionPrompt, PermissionStatus};
use std::io::{BufRead, Write};

/// Asks on the terminal before granting location access
pub struct ConsolePrompt;

#[async_trait]
impl PermissionPrompt for ConsolePrompt {
    async fn request(&self, capability: Capability) -> PermissionStatus {
        let question =
            format!("live-track would like to access your location ({capability}). Allow? [y/N] ");
        let answer = tokio::task::spawn_blocking(move || {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(question.as_bytes())?;
            stdout.flush()?;
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
            Ok::<_, std::io::Error>(line)
        })
        .await;

        match answer {
            Ok(Ok(line)) => parse_answer(&line),
            Ok(Err(err)) => {
                tracing::warn!("Could not read permission answer: {err}");
                PermissionStatus::Denied
            }
            Err(err) => {
                tracing::warn!("Permission prompt task failed: {err}");
                PermissionStatus::Denied
            }
        }
    }
}

fn parse_answer(line: &str) -> PermissionStatus {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => PermissionStatus::Granted,
        _ => PermissionStatus::Denied,
    }
}
