//! Teardown command implementation

use std::io::IsTerminal;
use std::path::Path;

use inquire::Confirm;

use crate::bootstrap::{delete_management_repository, repository_spec};
use crate::cli::TeardownArgs;
use crate::commands::resolve_token;
use crate::config::{BootstrapOptions, ConfigFile};
use crate::deadline::Deadline;
use crate::error::{Result, config};
use crate::provider::{self, ProviderKind, ProviderOptions};

pub fn run(config: Option<&Path>, args: TeardownArgs) -> Result<()> {
    let kind: ProviderKind = args.provider.parse()?;
    let options = options(kind, config, &args)?;
    let spec = repository_spec(&options);

    if !args.yes && !std::io::stdin().is_terminal() {
        return Err(config::invalid(
            "refusing to delete the repository without --yes outside a terminal",
        ));
    }
    if !args.yes && !confirm(&format!("{}/{}", spec.owner, spec.name))? {
        println!("Teardown cancelled");
        return Ok(());
    }

    let provider = provider::build(ProviderOptions {
        kind,
        hostname: options.hostname.clone(),
        token: options.token.clone(),
        plain_http: options.transport == "http",
        destructive_actions: true,
    })?;
    delete_management_repository(provider.as_ref(), &spec, &Deadline::after(options.timeout))?;
    println!("Deleted management repository {}/{}", spec.owner, spec.name);
    Ok(())
}

fn options(kind: ProviderKind, config: Option<&Path>, args: &TeardownArgs) -> Result<BootstrapOptions> {
    let mut builder = BootstrapOptions::builder(kind);
    if let Some(file) = ConfigFile::discover(config)? {
        builder = file.apply(builder)?;
    }
    if let Some(hostname) = args.repository.hostname.clone() {
        builder = builder.hostname(hostname);
    }
    if let Some(owner) = args.repository.owner.clone() {
        builder = builder.owner(owner);
    }
    if let Some(repository) = args.repository.repository.clone() {
        builder = builder.repository_name(repository);
    }
    if args.repository.personal {
        builder = builder.personal(true);
    }
    if let Some(timeout) = args.timeout {
        builder = builder.timeout(timeout);
    }
    if let Some(token) = resolve_token(kind, args.repository.token.clone())? {
        builder = builder.token(token);
    }
    builder.build()
}

fn confirm(repository: &str) -> Result<bool> {
    Ok(Confirm::new(&format!("Delete management repository {repository}?"))
        .with_default(false)
        .with_help_message("The repository and its history cannot be recovered")
        .prompt()?)
}
