use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use seedwright_generate::recover::preview;
use seedwright_generate::{GenerationError, ModelClient};

use crate::config::MODEL_PLACEHOLDER;

/// Model client that runs a local command per prompt.
///
/// The prompt is written to the command's stdin and its stdout is the
/// reply, which fits `ollama run <model>` and similar wrappers.
#[derive(Debug, Clone)]
pub struct CommandClient {
    model: String,
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandClient {
    /// `command` is the program followed by its arguments; `{model}` in any
    /// of them is replaced by the model name.
    pub fn new(model: &str, command: &[String], timeout: Duration) -> Result<Self, GenerationError> {
        let mut parts = command
            .iter()
            .map(|part| part.replace(MODEL_PLACEHOLDER, model));
        let program = parts
            .next()
            .ok_or_else(|| GenerationError::Model("model command is empty".to_string()))?;
        Ok(Self {
            model: model.to_string(),
            program,
            args: parts.collect(),
            timeout,
        })
    }

    async fn exchange(&self, prompt: &str) -> Result<String, GenerationError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| GenerationError::Model(format!("cannot start {}: {err}", self.program)))?;

        // Stdin is fed while stdout is drained.
        let writer = child.stdin.take().map(|mut stdin| {
            let prompt = prompt.to_owned();
            tokio::spawn(async move {
                stdin.write_all(prompt.as_bytes()).await?;
                stdin.shutdown().await?;
                Ok::<(), std::io::Error>(())
            })
        });

        let output = child.wait_with_output().await?;
        let written = match writer {
            Some(handle) => handle.await.map_err(|err| {
                GenerationError::Model(format!("prompt writer for {} failed: {err}", self.program))
            })?,
            None => Ok(()),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GenerationError::Model(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                preview(stderr.trim())
            )));
        }
        // A command that exits without reading its input is judged by its status.
        if let Err(err) = written {
            if err.kind() != std::io::ErrorKind::BrokenPipe {
                return Err(err.into());
            }
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl ModelClient for CommandClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        debug!(
            event = "model.call",
            program = %self.program,
            prompt_bytes = prompt.len(),
            "calling model"
        );
        let reply = tokio::time::timeout(self.timeout, self.exchange(prompt))
            .await
            .map_err(|_| {
                GenerationError::Model(format!(
                    "no reply from {} within {}s",
                    self.model,
                    self.timeout.as_secs_f64()
                ))
            })??;
        debug!(event = "model.reply", reply_bytes = reply.len(), "model replied");
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|part| part.to_string()).collect()
    }

    #[test]
    fn substitutes_model_name() {
        let client = CommandClient::new(
            "llama3",
            &command(&["ollama", "run", "{model}"]),
            Duration::from_secs(1),
        )
        .expect("client");
        assert_eq!(client.program, "ollama");
        assert_eq!(client.args, vec!["run", "llama3"]);
        assert_eq!(client.name(), "llama3");
        assert!(CommandClient::new("m", &[], Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn pipes_prompt_through_the_command() {
        let client = CommandClient::new("echo", &command(&["cat"]), Duration::from_secs(5))
            .expect("client");
        let reply = client.complete("[{\"a\": 1}]").await.expect("reply");
        assert_eq!(reply, "[{\"a\": 1}]");
    }

    #[tokio::test]
    async fn large_reply_before_reading_input_does_not_stall() {
        let client = CommandClient::new(
            "chatty",
            &command(&["sh", "-c", "head -c 200000 /dev/zero; cat > /dev/null"]),
            Duration::from_secs(10),
        )
        .expect("client");
        let prompt = "x".repeat(200_000);
        let reply = client.complete(&prompt).await.expect("reply");
        assert_eq!(reply.len(), 200_000);
    }

    #[tokio::test]
    async fn failing_command_is_a_model_error() {
        let client = CommandClient::new(
            "broken",
            &command(&["sh", "-c", "echo boom >&2; exit 3"]),
            Duration::from_secs(5),
        )
        .expect("client");
        match client.complete("hi").await {
            Err(GenerationError::Model(message)) => assert!(message.contains("boom"), "{message}"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let client = CommandClient::new(
            "slow",
            &command(&["sleep", "5"]),
            Duration::from_millis(100),
        )
        .expect("client");
        match client.complete("hi").await {
            Err(GenerationError::Model(message)) => assert!(message.contains("no reply")),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
