use std::{
    error::Error,
    io::{self, BufRead, Write},
    path::PathBuf,
    process,
};

use aws_saml_flow::{
    AccountChoice, ConfigFile, Interaction, PasswordVault, SamlFlowBuilder, SharedCredentialsFile,
};
use clap::{Parser, Subcommand};
use futures::future::{self, BoxFuture};
use tracing_subscriber::EnvFilter;
use url::Url;

/// Obtain temporary AWS credentials by logging in to ADFS.
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file (default: $AWS_SAML_CONFIG_FILE or ~/.aws-saml/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and write the credentials of the chosen account to the configured profile
    Login {
        /// Use this account (alias or account ID) and the stored password instead of asking
        #[arg(short, long)]
        alias: Option<String>,
    },

    /// Store the directory password in the system keyring, or delete it
    Password {
        /// Delete the stored password
        #[arg(short, long)]
        delete: bool,
    },

    /// Name an account ID, or delete its name
    Alias {
        /// 12-digit account ID
        account: String,

        /// Name for the account
        #[arg(required_unless_present = "delete")]
        alias: Option<String>,

        /// Remove the account's alias
        #[arg(short, long)]
        delete: bool,
    },

    /// Set the profile, username and ADFS server
    Configure,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => println!("Done!"),
        Err(error) => {
            eprintln!("Failed with error: {}", error.to_string().trim());
            process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let file = match cli.config {
        Some(path) => ConfigFile::default().with_path(path),
        None => ConfigFile::default(),
    };

    match cli.command {
        Command::Login { alias } => login(file, alias).await,
        Command::Alias {
            account,
            alias,
            delete,
        } => set_alias(&file, account, alias.filter(|_| !delete)).await,
        Command::Password { delete } => password(&file, delete).await,
        Command::Configure => configure(&file).await,
    }
}

async fn login(file: ConfigFile, alias: Option<String>) -> Result<(), Box<dyn Error>> {
    let sink = SharedCredentialsFile::from_env()?;
    let mut config = file.load().await?;

    let (terminal, account) = match alias {
        Some(alias) => {
            let password = PasswordVault::new(&config.username)?
                .load()?
                .ok_or("Please configure your password first (run: `aws-saml password`)")?;
            let terminal = Terminal {
                password: Some(password),
            };
            (terminal, Some(alias))
        }
        None => {
            config.username = ask("Username", &config.username)?;
            (Terminal { password: None }, None)
        }
    };

    let builder = SamlFlowBuilder::new().config(config).interaction(terminal);
    let builder = match account {
        Some(account) => builder.account(account),
        None => builder,
    };
    let flow = builder.build().await?;

    let credential = flow.login(&sink).await?;
    println!(
        "Credentials for {} written to profile '{}' in {} (expires {})",
        credential.role_arn,
        flow.config().profile,
        sink.path().display(),
        credential.expires_at.to_rfc3339(),
    );
    Ok(())
}

async fn set_alias(
    file: &ConfigFile,
    account: String,
    alias: Option<String>,
) -> Result<(), Box<dyn Error>> {
    if account.len() != 12 || !account.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("'{account}' is not a valid account ID").into());
    }

    let mut config = file.load_or_default().await?;
    match alias {
        Some(alias) => config.aliases.set(account, alias),
        None => {
            if config.aliases.remove(&account).is_none() {
                return Err(format!("account {account} has no alias").into());
            }
        }
    }
    file.save(&config).await?;
    Ok(())
}

async fn password(file: &ConfigFile, delete: bool) -> Result<(), Box<dyn Error>> {
    let config = file.load().await?;
    let vault = PasswordVault::new(&config.username)?;

    if delete {
        if !vault.remove()? {
            return Err(format!("no password stored for {}", config.username).into());
        }
    } else {
        let password =
            rpassword::prompt_password("Password (will be stored in the system keyring): ")?;
        vault.store(&password)?;
    }
    Ok(())
}

async fn configure(file: &ConfigFile) -> Result<(), Box<dyn Error>> {
    let mut config = file.load_or_default().await?;

    config.profile = ask("Profile", &config.profile)?;
    config.username = ask("Username", &config.username)?;
    let domain = ask("ADFS server", config.directory_domain.as_str())?;
    config.directory_domain =
        Url::parse(&domain).map_err(|error| format!("invalid ADFS server '{domain}': {error}"))?;

    file.save(&config).await?;
    Ok(())
}

/// Read a line from stdin, keeping `current` if it's empty.
fn ask(label: &str, current: &str) -> io::Result<String> {
    print!("{label} [{current}]: ");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let line = line.trim();

    Ok(if line.is_empty() { current } else { line }.to_string())
}

/// Interaction on the controlling terminal.
struct Terminal {
    /// Answers the password prompt when set.
    password: Option<String>,
}

impl Interaction for Terminal {
    type Error = io::Error;

    fn password<'a>(&'a self, username: &'a str) -> BoxFuture<'a, Result<String, io::Error>> {
        if let Some(password) = &self.password {
            return Box::pin(future::ready(Ok(password.clone())));
        }
        let prompt = format!("Password for {username}: ");
        Box::pin(blocking(move || rpassword::prompt_password(prompt)))
    }

    fn choose_account<'a>(
        &'a self,
        choices: &'a [AccountChoice],
    ) -> BoxFuture<'a, Result<String, io::Error>> {
        let menu: String = choices.iter().map(|choice| format!("{choice}\n")).collect();
        Box::pin(blocking(move || {
            print!("{menu}Account: ");
            io::stdout().flush()?;

            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;
            Ok(line.trim().to_string())
        }))
    }
}

async fn blocking<T, F>(f: F) -> io::Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> io::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(io::Error::other)?
}
