//! Command implementations for the groundwork CLI

pub mod bootstrap;
pub mod completions;
pub mod teardown;
pub mod version;

use std::io::IsTerminal;

use inquire::Password;

use crate::error::Result;
use crate::provider::ProviderKind;

/// Token from the flag, else the provider's environment variable, else a
/// prompt when stdin is a terminal.
pub(crate) fn resolve_token(kind: ProviderKind, explicit: Option<String>) -> Result<Option<String>> {
    if let Some(token) = explicit.filter(|t| !t.is_empty()) {
        return Ok(Some(token));
    }
    if let Some(token) = std::env::var(kind.token_env_var()).ok().filter(|t| !t.is_empty()) {
        tracing::debug!(variable = kind.token_env_var(), "using token from environment");
        return Ok(Some(token));
    }
    if !std::io::stdin().is_terminal() {
        return Ok(None);
    }
    let token = Password::new(&format!("{kind} token:"))
        .without_confirmation()
        .with_help_message(&format!("Set {} to skip this prompt", kind.token_env_var()))
        .prompt()?;
    Ok(Some(token).filter(|t| !t.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_resolve_token_prefers_flag_over_env() {
        let old = std::env::var("GITLAB_TOKEN").ok();
        unsafe {
            std::env::set_var("GITLAB_TOKEN", "from-env");
        }

        let flag = resolve_token(ProviderKind::GitLab, Some("from-flag".into())).unwrap();
        let env = resolve_token(ProviderKind::GitLab, None).unwrap();

        unsafe {
            match old {
                Some(value) => std::env::set_var("GITLAB_TOKEN", value),
                None => std::env::remove_var("GITLAB_TOKEN"),
            }
        }
        assert_eq!(flag.as_deref(), Some("from-flag"));
        assert_eq!(env.as_deref(), Some("from-env"));
    }
}
