//! Command-line front end for the thumbnail deployer.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use thumbnail_deployer::config::{DEFAULT_CONFIG_PATH, DEFAULT_FUNCTION_NAME, DEFAULT_SOURCE_BUCKET};
use thumbnail_deployer::{
    load_sdk_config, CredentialsSource, DeployerService, DeploymentNames, FunctionSettings,
    Packager, PackagingSettings,
};

/// Exit code when the user has to act before anything can be changed.
const EXIT_NEEDS_CONFIRMATION: u8 = 2;

#[derive(Parser, Debug)]
#[command(
    name = "thumbnail-deployer",
    version,
    about = "Provision and smoke-test the S3-triggered thumbnail Lambda function"
)]
struct Cli {
    /// JSON file with accessKeyId, secretAccessKey, optional sessionToken and region
    #[arg(long, global = true, env = "THUMBNAIL_DEPLOYER_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Ignore the config file and use the standard AWS credential provider chain
    #[arg(long, global = true)]
    use_default_credentials: bool,

    /// Base name every other resource name is derived from
    #[arg(long, global = true, env = "THUMBNAIL_FUNCTION_NAME", default_value = DEFAULT_FUNCTION_NAME)]
    function_name: String,

    /// Bucket whose object-created events trigger the function
    #[arg(long, global = true, env = "THUMBNAIL_SOURCE_BUCKET", default_value = DEFAULT_SOURCE_BUCKET)]
    source_bucket: String,

    /// Bucket thumbnails are written to [default: <source-bucket>resized]
    #[arg(long, global = true, env = "THUMBNAIL_TARGET_BUCKET")]
    target_bucket: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create or reuse the role, policy, function, permission and notification, then invoke once
    Provision {
        /// Directory holding the function source and its dependencies
        #[arg(long, default_value = "deployed")]
        project_dir: PathBuf,

        /// Do not run `npm install` before building the archive
        #[arg(long)]
        skip_install: bool,

        /// Seconds to wait for a newly created role to propagate
        #[arg(long, default_value_t = 8)]
        role_wait_secs: u64,
    },
    /// Delete the function, the inline policy and the execution role
    Teardown {
        /// Fail when a resource does not exist instead of skipping it
        #[arg(long)]
        strict: bool,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

impl Cli {
    fn names(&self) -> Result<DeploymentNames> {
        let names = DeploymentNames::new(
            &self.function_name,
            &self.source_bucket,
            self.target_bucket.as_deref(),
        );
        names.validate()?;
        log::debug!("Resolved resource names: {names:?}");
        Ok(names)
    }

    fn credentials(&self) -> CredentialsSource {
        let source = if self.use_default_credentials {
            CredentialsSource::DefaultChain
        } else {
            CredentialsSource::File(self.config.clone())
        };
        log::debug!("Using credentials from {source:?}");
        source
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .format_target(false)
        .init();
}

/// Ask on the terminal; anything but `y`/`yes` declines.
fn confirm(prompt: &str) -> Result<bool> {
    eprint!("{prompt} [y/N] ");
    std::io::stderr().flush()?;
    let mut answer = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("Failed to read confirmation")?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

async fn provision(
    cli: &Cli,
    project_dir: PathBuf,
    skip_install: bool,
    role_wait_secs: u64,
) -> Result<ExitCode> {
    let names = cli.names()?;
    let mut settings = PackagingSettings::new(project_dir);
    if skip_install {
        settings = settings.without_install();
    }
    let function = FunctionSettings {
        handler: settings.handler(),
        ..FunctionSettings::default()
    };

    let sdk_config = load_sdk_config(&cli.credentials())
        .await
        .context("Failed to load AWS configuration")?;
    log::debug!(
        "Role wait is {role_wait_secs}s, handler is '{}'",
        function.handler
    );
    let service = DeployerService::from_sdk_config(&sdk_config, names)
        .with_role_wait(Duration::from_secs(role_wait_secs))
        .with_function_settings(function);

    let report = service
        .provision(&Packager::new(settings))
        .await
        .context("Provisioning failed")?;
    println!("{report}");
    Ok(ExitCode::SUCCESS)
}

async fn teardown(cli: &Cli, strict: bool, yes: bool) -> Result<ExitCode> {
    let names = cli.names()?;

    if !yes {
        if !atty::is(atty::Stream::Stdin) {
            eprintln!(
                "Refusing to delete '{}', '{}' and '{}' without --yes when not run interactively in a TTY",
                names.function_name, names.policy_name, names.role_name
            );
            return Ok(ExitCode::from(EXIT_NEEDS_CONFIRMATION));
        }
        let prompt = format!(
            "Delete function '{}', policy '{}' and role '{}'?",
            names.function_name, names.policy_name, names.role_name
        );
        if !confirm(&prompt)? {
            eprintln!("Aborted");
            return Ok(ExitCode::from(EXIT_NEEDS_CONFIRMATION));
        }
    }

    let sdk_config = load_sdk_config(&cli.credentials())
        .await
        .context("Failed to load AWS configuration")?;
    let service = DeployerService::from_sdk_config(&sdk_config, names);

    let report = service
        .teardown(!strict)
        .await
        .context("Teardown failed")?;
    println!("{report}");
    Ok(ExitCode::SUCCESS)
}

async fn run(cli: Cli) -> Result<ExitCode> {
    match &cli.command {
        Commands::Provision {
            project_dir,
            skip_install,
            role_wait_secs,
        } => provision(&cli, project_dir.clone(), *skip_install, *role_wait_secs).await,
        Commands::Teardown { strict, yes } => teardown(&cli, *strict, *yes).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        }
    }
}
