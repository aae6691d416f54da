//! Argument parsing and command execution for `token-admin`.

use std::io::Write;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::json;
use token_store_config::Config;
use token_store_core::{token_prefix, RefreshToken, ScopeSet, TokenStoreError};
use token_store_factory::{create_repository_with, RepositoryOptions};
use token_store_mail::{Dispatcher, MailError, MailTemplates, PrintDispatcher};
use token_store_ports::OperationContext;

use crate::services::{RevocationNotifier, ServiceError, TokenService};

#[derive(Debug, Parser)]
#[command(
    name = "token-admin",
    about = "Inspect and revoke OAuth refresh tokens",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// List refresh tokens, oldest first
    List {
        #[arg(long, value_name = "UUID", conflicts_with = "account")]
        client: Option<String>,
        #[arg(long, value_name = "UUID")]
        account: Option<String>,
    },
    /// Print one refresh token
    Show { token: String },
    /// Issue a new refresh token
    Issue {
        client_uuid: String,
        account_uuid: String,
        /// Scope names; each argument may hold several, space separated
        #[arg(value_parser = ScopeSet::parse)]
        scopes: Vec<ScopeSet>,
    },
    /// Revoke a token, optionally mailing a notice
    Revoke {
        token: String,
        #[arg(long, value_name = "EMAIL")]
        notify: Option<String>,
    },
    /// Revoke every token of an account
    RevokeAccount { account_uuid: String },
    /// Verify the database is reachable
    Check,
}

/// Failures after arguments were parsed. Usage errors are reported by clap.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("refresh token {0} not found")]
    NotFound(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

impl From<TokenStoreError> for CliError {
    fn from(e: TokenStoreError) -> Self {
        CliError::Service(e.into())
    }
}

impl From<MailError> for CliError {
    fn from(e: MailError) -> Self {
        CliError::Service(e.into())
    }
}

/// Open the repository and assemble the service `command` needs.
///
/// Notices in print mode go to `mail_out`; stdout is reserved for results.
pub async fn connect(
    config: &Config,
    command: &Command,
    mail_out: Box<dyn Write + Send>,
) -> Result<TokenService, CliError> {
    let options = RepositoryOptions {
        max_connections: config.database.max_connections,
        generation_attempts: config.tokens.generation_attempts,
    };
    let repo = create_repository_with(&config.database.url, &options).await?;
    repo.init().await?;

    let Command::Revoke {
        notify: Some(_), ..
    } = command
    else {
        return Ok(TokenService::new(repo));
    };

    let dispatcher = match Dispatcher::from_config(&config.smtp)? {
        Dispatcher::Print(_) => Dispatcher::Print(PrintDispatcher::new(mail_out)),
        other => other,
    };
    let templates = MailTemplates::load(&config.mail.templates_dir)?;
    let notifier = RevocationNotifier::new(
        Arc::new(dispatcher),
        Arc::new(templates),
        config.smtp.from.clone(),
    );
    Ok(TokenService::with_notifier(repo, notifier))
}

fn write_token<W: Write>(out: &mut W, token: &RefreshToken) -> Result<(), CliError> {
    let line = serde_json::to_string(token).map_err(std::io::Error::other)?;
    writeln!(out, "{line}")?;
    Ok(())
}

/// Execute `command`, writing one JSON document per line to `out`.
pub async fn run<W: Write>(
    service: &TokenService,
    ctx: &OperationContext,
    command: Command,
    out: &mut W,
) -> Result<(), CliError> {
    match command {
        Command::List { client, account } => {
            let tokens = match (client, account) {
                (Some(client), _) => service.list_by_client(ctx, &client).await?,
                (None, Some(account)) => service.list_by_account(ctx, &account).await?,
                (None, None) => service.list(ctx).await?,
            };
            for token in &tokens {
                write_token(out, token)?;
            }
        }
        Command::Show { token } => match service.lookup(ctx, &token).await? {
            Some(found) => write_token(out, &found)?,
            None => return Err(CliError::NotFound(token_prefix(&token))),
        },
        Command::Issue {
            client_uuid,
            account_uuid,
            scopes,
        } => {
            let scope = scopes
                .iter()
                .fold(ScopeSet::new(), |acc, parsed| acc.union(parsed));
            let issued = service.issue(ctx, &client_uuid, &account_uuid, scope).await?;
            write_token(out, &issued)?;
        }
        Command::Revoke { token, notify } => {
            let revoked = service.revoke(ctx, &token, notify.as_deref()).await?;
            writeln!(out, "{}", json!({ "revoked": revoked.is_some() }))?;
        }
        Command::RevokeAccount { account_uuid } => {
            let removed = service.revoke_account(ctx, &account_uuid).await?;
            writeln!(out, "{}", json!({ "revoked": removed }))?;
        }
        Command::Check => {
            service.repository().healthcheck().await?;
            writeln!(out, "{}", json!({ "status": "ok" }))?;
        }
    }
    Ok(())
}
