// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use buzz::{
    api::{ApiClient, ApiError},
    archive,
    auth::{self, LoginOutcome},
    config::{mask_token, ConfigKey, Settings, StoredConfig},
    path, site,
};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::Confirm;
use std::{path::PathBuf, process::exit, time::Duration};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "buzz [options] <command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Server URL, overrides $BUZZ_SERVER and the stored configuration.
    #[arg(long, global = true, value_name = "url")]
    pub server: Option<String>,

    /// Bearer token, overrides $BUZZ_TOKEN and the stored configuration.
    #[arg(long, global = true, value_name = "token")]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let credential_file = path::default_credential_file()?;
        let stored = StoredConfig::load(&credential_file);
        let settings = Settings::resolve(self.server, self.token, &stored);

        match self.command {
            Command::Deploy(opts) => run_deploy(&settings, opts),
            Command::List => run_list(&settings),
            Command::Delete(opts) => run_delete(&settings, opts),
            Command::Url => run_url(&settings),
            Command::Config(opts) => run_config(&credential_file, opts),
            Command::Login => run_login(&settings, &credential_file),
            Command::Logout => run_logout(&settings, &credential_file),
            Command::Whoami => run_whoami(&settings),
            Command::Tokens(opts) => run_tokens(&settings, opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Deploy a directory as a static site.
    #[command(override_usage = "buzz deploy [options] [<dir>]")]
    Deploy(DeployOptions),

    /// List your deployed sites.
    #[command(override_usage = "buzz list")]
    List,

    /// Delete a deployed site.
    #[command(override_usage = "buzz delete [options] <subdomain>")]
    Delete(DeleteOptions),

    /// Show the URL of the site deployed from this directory.
    #[command(override_usage = "buzz url")]
    Url,

    /// Show or change stored configuration.
    #[command(override_usage = "buzz config [<key>] [<value>]")]
    Config(ConfigOptions),

    /// Authenticate through the device-code flow.
    #[command(override_usage = "buzz login")]
    Login,

    /// Drop the current session.
    #[command(override_usage = "buzz logout")]
    Logout,

    /// Show who you are logged in as.
    #[command(override_usage = "buzz whoami")]
    Whoami,

    /// Manage deployment tokens.
    #[command(override_usage = "buzz tokens <list|create|delete>")]
    Tokens(TokensOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct DeployOptions {
    /// Directory to deploy, defaults to the current directory.
    #[arg(value_name = "dir", default_value = ".")]
    pub dir: PathBuf,

    /// Deploy under this subdomain instead of the recorded one.
    #[arg(short, long, value_name = "name")]
    pub subdomain: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct DeleteOptions {
    /// Subdomain of the site to delete.
    #[arg(required = true, value_name = "subdomain")]
    pub subdomain: String,

    /// Skip the confirmation prompt.
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ConfigOptions {
    /// Configuration key, one of "server" or "token".
    #[arg(value_name = "key")]
    pub key: Option<String>,

    /// New value to store for the key.
    #[arg(value_name = "value")]
    pub value: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct TokensOptions {
    #[command(subcommand)]
    pub command: TokensCommand,
}

#[derive(Debug, Clone, Subcommand)]
enum TokensCommand {
    /// List your deployment tokens.
    #[command(override_usage = "buzz tokens list")]
    List,

    /// Create a deployment token scoped to one site.
    #[command(override_usage = "buzz tokens create [options] <site>")]
    Create(TokensCreateOptions),

    /// Delete a deployment token.
    #[command(override_usage = "buzz tokens delete <id>")]
    Delete(TokensDeleteOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct TokensCreateOptions {
    /// Site the token may deploy to.
    #[arg(required = true, value_name = "site")]
    pub site: String,

    /// Human-readable label for the token.
    #[arg(short, long, value_name = "label", default_value = "Deployment token")]
    pub name: String,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct TokensDeleteOptions {
    /// Identifier of the token to delete.
    #[arg(required = true, value_name = "id")]
    pub id: String,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        error!("{error:#}");
        if let Some(tip) = remediation_tip(&error) {
            info!("tip: {tip}");
        }
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

/// Pull the remediation tip out of the error chain, when one exists.
fn remediation_tip(error: &anyhow::Error) -> Option<&'static str> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<ApiError>())
        .and_then(ApiError::tip)
}

fn run_deploy(settings: &Settings, opts: DeployOptions) -> Result<()> {
    let cwd_marker = path::marker_file(".");
    let subdomain = site::resolve(
        opts.subdomain.as_deref(),
        &cwd_marker,
        path::marker_file(&opts.dir),
    );

    let bar = ProgressBar::new(0).with_style(
        ProgressStyle::with_template("packing {bar:30} {pos}/{len} files").unwrap(),
    );
    let bytes = archive::pack_dir(&opts.dir, |processed, total| {
        bar.set_length(total as u64);
        bar.set_position(processed as u64);
    })?;
    bar.finish_and_clear();

    let spinner = spinner("uploading site archive");
    let client = ApiClient::new(settings)?;
    let response = client.deploy(bytes, subdomain.as_deref());
    spinner.finish_and_clear();
    let response = response?;

    // INVARIANT: The marker always reflects the subdomain the server
    // confirmed, whatever supplied the input one.
    let confirmed = site::subdomain_from_url(&response.url)?;
    site::write_marker(&cwd_marker, &confirmed)?;

    println!("deployed to {}", response.url);

    Ok(())
}

fn run_list(settings: &Settings) -> Result<()> {
    let client = ApiClient::new(settings)?;
    let sites = client.list_sites()?;
    if sites.is_empty() {
        println!("no sites deployed yet");
        return Ok(());
    }

    println!("{:<24} {:<12} {:>10}", "NAME", "CREATED", "SIZE");
    for entry in sites {
        println!(
            "{:<24} {:<12} {:>10}",
            entry.name,
            date_part(&entry.created),
            human_size(entry.size_bytes)
        );
    }

    Ok(())
}

fn run_delete(settings: &Settings, opts: DeleteOptions) -> Result<()> {
    if !opts.yes {
        let confirmed = Confirm::new(&format!("delete site {:?}?", opts.subdomain))
            .with_default(false)
            .prompt()?;
        if !confirmed {
            println!("aborted");
            return Ok(());
        }
    }

    let client = ApiClient::new(settings)?;
    client.delete_site(&opts.subdomain)?;
    println!("deleted site {:?}", opts.subdomain);

    Ok(())
}

fn run_url(settings: &Settings) -> Result<()> {
    let Some(subdomain) = site::read_marker(path::marker_file(".")) else {
        bail!("no site deployed from this directory yet, run `buzz deploy` first");
    };

    println!("{}", site::site_url(&settings.server, &subdomain)?);

    Ok(())
}

fn run_config(credential_file: &std::path::Path, opts: ConfigOptions) -> Result<()> {
    let mut stored = StoredConfig::load(credential_file);

    let Some(key) = opts.key else {
        for key in ConfigKey::ALL {
            println!("{key} = {}", display_value(&stored, key));
        }
        return Ok(());
    };
    let key: ConfigKey = key.parse()?;

    let Some(value) = opts.value else {
        println!("{}", display_value(&stored, key));
        return Ok(());
    };

    stored.set(key, value);
    stored.save(credential_file)?;
    println!("saved {key}");

    Ok(())
}

fn display_value(stored: &StoredConfig, key: ConfigKey) -> String {
    match (key, stored.get(key)) {
        (_, None) => "(unset)".to_string(),
        (ConfigKey::Token, Some(token)) => mask_token(token),
        (_, Some(value)) => value.to_string(),
    }
}

fn run_login(settings: &Settings, credential_file: &std::path::Path) -> Result<()> {
    let client = ApiClient::new(settings)?;

    let spinner = spinner("waiting for authorization");
    let outcome = auth::run_login(
        &client,
        |session| {
            spinner.suspend(|| {
                println!("visit {}", session.verification_uri);
                println!("and enter code {}", session.user_code);
            });
        },
        |delay| std::thread::sleep(delay),
    );
    spinner.finish_and_clear();

    match outcome {
        LoginOutcome::Authorized { token, user } => {
            // INVARIANT: Load, mutate, save the whole document. The token
            // lands on disk only on this path.
            let mut stored = StoredConfig::load(credential_file);
            stored.token = Some(token);
            stored.save(credential_file)?;

            println!("logged in as {}", user.name.unwrap_or(user.login));

            Ok(())
        }
        LoginOutcome::Denied(message) => bail!("authorization denied: {message}"),
        LoginOutcome::Expired => {
            bail!("device code expired before approval, run `buzz login` again")
        }
        LoginOutcome::TransportError(message) => bail!("login failed: {message}"),
    }
}

fn run_logout(settings: &Settings, credential_file: &std::path::Path) -> Result<()> {
    if settings.token.is_some() {
        let client = ApiClient::new(settings)?;
        client.logout();
    }

    let mut stored = StoredConfig::load(credential_file);
    stored.token = None;
    stored.save(credential_file)?;
    println!("logged out");

    Ok(())
}

fn run_whoami(settings: &Settings) -> Result<()> {
    let client = ApiClient::new(settings)?;
    let user = client.whoami()?;

    match user.name {
        Some(name) => println!("{} ({name})", user.login),
        None => println!("{}", user.login),
    }

    Ok(())
}

fn run_tokens(settings: &Settings, opts: TokensOptions) -> Result<()> {
    let client = ApiClient::new(settings)?;

    match opts.command {
        TokensCommand::List => {
            let tokens = client.list_tokens()?;
            if tokens.is_empty() {
                println!("no deployment tokens");
                return Ok(());
            }

            println!(
                "{:<18} {:<24} {:<24} {:<12} {:<12} {:<12}",
                "ID", "NAME", "SITE", "CREATED", "EXPIRES", "LAST USED"
            );
            for entry in tokens {
                println!(
                    "{:<18} {:<24} {:<24} {:<12} {:<12} {:<12}",
                    entry.id,
                    entry.name,
                    entry.site_name,
                    date_part(&entry.created_at),
                    entry.expires_at.as_deref().map_or("-", date_part),
                    entry.last_used_at.as_deref().map_or("-", date_part),
                );
            }
        }
        TokensCommand::Create(opts) => {
            let created = client.create_token(&opts.site, &opts.name)?;
            println!("created token {:?} for site {:?}", created.id, created.site_name);
            println!("{}", created.token);
            println!("store it now, it will not be shown again");
        }
        TokensCommand::Delete(opts) => {
            client.delete_token(&opts.id)?;
            println!("deleted token {:?}", opts.id);
        }
    }

    Ok(())
}

fn spinner(message: &'static str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner().with_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Date half of an ISO-8601 timestamp.
fn date_part(timestamp: &str) -> &str {
    timestamp.split('T').next().unwrap_or(timestamp)
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{bytes} {}", UNITS[unit])
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}
