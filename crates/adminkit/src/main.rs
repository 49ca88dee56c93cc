//! adminkit operator CLI
//!
//! Key management and direct access to the options file, going through the
//! same option hooks a host installs.

use std::sync::Arc;

use adminkit::form::{CsrfIssuer, CsrfTokens, TOKEN_FIELD};
use adminkit::host::{MenuRegistry, NoticeQueue, Notices, SubmitRequest};
use adminkit::mail::{
    Mailer, OutgoingMail, SiteIdentity, SmtpTransport, install_option_hooks, smtp_settings_page,
};
use adminkit::options::JsonFileBackend;
use adminkit::permissions::Capabilities;
use adminkit::settings::SubmitOutcome;
use adminkit::{Config, OptionStore, SecretCipher};
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Site name used in test mail headers.
    #[arg(long, global = true, default_value = "adminkit")]
    site_name: String,

    /// Sender address used in test mail headers.
    #[arg(long, global = true, default_value = "admin@localhost")]
    admin_email: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a new random encryption key.
    GenerateKey,

    /// Encrypt a value with the configured key.
    Encrypt { value: String },

    /// Decrypt a stored value with the configured key.
    Decrypt { value: String },

    /// Read an option.
    Get {
        key: String,

        /// Print the stored form instead of the read value.
        #[arg(long)]
        raw: bool,
    },

    /// Write an option.
    Set { key: String, value: String },

    /// Render the SMTP settings page.
    RenderSmtp,

    /// Submit the SMTP settings page as an administrator.
    SubmitSmtp {
        /// Form fields as `name=value`, e.g. `smtp_host=mail.example.com`.
        #[arg(value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },

    /// Print the SMTP transport resolved from the options file.
    Transport,
}

/// Hands test mail to the log; delivery belongs to the host.
struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, mail: &OutgoingMail) -> Result<()> {
        info!(to = %mail.to, subject = %mail.subject, "test mail");
        Ok(())
    }
}

fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing();

    let args = Args::parse();
    let config = Config::from_env().context("failed to load configuration")?;
    let site = SiteIdentity::new(args.site_name.clone(), args.admin_email.clone());

    match args.command {
        Command::GenerateKey => println!("{}", SecretCipher::generate_key()),
        Command::Encrypt { value } => println!("{}", require_cipher(&config)?.encrypt(&value)?),
        Command::Decrypt { value } => {
            println!("{}", require_cipher(&config)?.try_decrypt(&value)?);
        }
        Command::Get { key, raw } => {
            let (store, _) = open_store(&config, site)?;
            let value = if raw {
                store.get_raw(&key)?
            } else {
                store.get(&key)?
            };
            match value {
                Some(value) => println!("{value}"),
                None => bail!("option '{key}' is not set"),
            }
        }
        Command::Set { key, value } => {
            let (store, notices) = open_store(&config, site)?;
            store.set(&key, &value)?;
            print_notices(notices.as_ref());
        }
        Command::RenderSmtp => {
            let (store, notices) = open_store(&config, site)?;
            let page = smtp_settings_page(config.builder_config()).create(&mut MenuRegistry::new())?;
            let tokens = CsrfTokens::new(config.csrf_ttl_secs);
            println!("{}", page.render(&store, &tokens, notices.as_ref())?);
        }
        Command::SubmitSmtp { fields } => {
            let (store, notices) = open_store(&config, site)?;
            let page = smtp_settings_page(config.builder_config()).create(&mut MenuRegistry::new())?;
            let tokens = CsrfTokens::new(config.csrf_ttl_secs);

            let mut payload: std::collections::HashMap<String, String> =
                fields.into_iter().collect();
            payload.insert(TOKEN_FIELD.to_string(), tokens.issue(page.menu_slug()));

            let caps = Capabilities::all();
            let request = SubmitRequest::new(&payload, &caps, &tokens);
            match page.handle_submit(&request, &store, notices.as_ref()) {
                Ok(SubmitOutcome::Saved { written, unchanged }) => {
                    info!(written = ?written, unchanged = ?unchanged, "submitted SMTP settings");
                }
                Ok(SubmitOutcome::NothingSubmitted) => info!("nothing submitted"),
                Err(e) => bail!("{}", e.user_message()),
            }
            print_notices(notices.as_ref());
        }
        Command::Transport => {
            let (store, _) = open_store(&config, site)?;
            match SmtpTransport::from_options(&store)? {
                Some(transport) => println!("{transport:#?}"),
                None => println!("SMTP is disabled"),
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn require_cipher(config: &Config) -> Result<SecretCipher> {
    config
        .cipher()?
        .context("ADMINKIT_ENCRYPTION_KEY must be set")
}

/// Open the options file with the SMTP option hooks installed.
fn open_store(config: &Config, site: SiteIdentity) -> Result<(OptionStore, Arc<Notices>)> {
    let backend = JsonFileBackend::open(&config.options_file)?;
    let mut store = OptionStore::new(backend);
    let notices = Arc::new(Notices::new());
    install_option_hooks(
        &mut store,
        require_cipher(config)?,
        Arc::new(LogMailer),
        notices.clone(),
        site,
    );
    info!(path = %config.options_file.display(), "opened options file");
    Ok((store, notices))
}

fn print_notices(notices: &dyn NoticeQueue) {
    for notice in notices.drain() {
        eprintln!("[{}] {}", notice.level.as_str(), notice.message);
    }
}

fn parse_field(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected name=value, got '{s}'"))
}
