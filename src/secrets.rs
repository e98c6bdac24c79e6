use std::path::Path;
use std::process::Command;

use anyhow::{bail, Context, Result};
use tracing::debug;

/// Populate the process environment from `env.secrets.enc` (decrypted
/// in-memory via sops) or plain `env.secrets`. Variables already present
/// in the environment are never overwritten. The secrets are consumed by
/// the login helper, not by the service itself.
pub fn load() -> Result<()> {
    load_from(Path::new("env.secrets.enc"), Path::new("env.secrets"))
}

pub fn load_from(encrypted: &Path, plain: &Path) -> Result<()> {
    if encrypted.exists() {
        let output = Command::new("sops")
            .args(["-d", "--input-type", "dotenv", "--output-type", "dotenv"])
            .arg(encrypted)
            .output()
            .with_context(|| format!("running sops for {}", encrypted.display()))?;
        if !output.status.success() {
            bail!(
                "sops decryption of {} failed: {}",
                encrypted.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        apply(&String::from_utf8_lossy(&output.stdout));
        return Ok(());
    }

    if plain.exists() {
        let text = std::fs::read_to_string(plain)
            .with_context(|| format!("reading {}", plain.display()))?;
        apply(&text);
        return Ok(());
    }

    // Neither file present: callers surface missing variables themselves.
    debug!("no secrets file found");
    Ok(())
}

fn apply(text: &str) {
    for (key, value) in parse_dotenv(text) {
        if std::env::var_os(&key).is_none() {
            std::env::set_var(&key, &value);
        }
    }
}

/// KEY=VALUE lines; blanks and comments are skipped.
fn parse_dotenv(text: &str) -> Vec<(String, String)> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            line.split_once('=')
                .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotenv_parsing_skips_noise() {
        let parsed = parse_dotenv("# comment\n\nEMAIL=a@b.c\n PASSWORD = hunter2 \nnot-a-pair\n");
        assert_eq!(
            parsed,
            vec![
                ("EMAIL".to_string(), "a@b.c".to_string()),
                ("PASSWORD".to_string(), "hunter2".to_string()),
            ]
        );
    }

    #[test]
    fn existing_variables_win() {
        std::env::set_var("TEST_SECRETS_EXISTING", "original");
        apply("TEST_SECRETS_EXISTING=overwritten\nTEST_SECRETS_FRESH=value");
        assert_eq!(std::env::var("TEST_SECRETS_EXISTING").unwrap(), "original");
        assert_eq!(std::env::var("TEST_SECRETS_FRESH").unwrap(), "value");
    }
}
