use clap::Parser;
use std::io::IsTerminal;
use taskcal::cli::{Cli, Commands, UserCommands};
use taskcal::config::AppConfig;
use taskcal::db::{create_pool, run_migrations};
use taskcal::error::{CalendarError, ErrorResponse};
use taskcal::logging::{cleanup_old_logs, log_dir, LoggingConfig};
use taskcal::users::UserManager;
use taskcal::web::server::WebServer;

const DEFAULT_LOG_RETENTION_DAYS: u32 = 7;

#[tokio::main]
async fn main() {
    // Parse CLI arguments first to get logging configuration
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => exit_with_error(&e.to_error_response()),
    };

    let serving = matches!(cli.command, Commands::Serve { .. });
    let mut log_config = LoggingConfig::from_args(cli.quiet, cli.verbose > 0, cli.json);

    // A server with redirected output logs to a rotating file.
    // TASKCAL_LOG_FILE forces this for testing.
    if serving {
        let force_file_log = std::env::var("TASKCAL_LOG_FILE").is_ok();
        if force_file_log || !std::io::stdout().is_terminal() {
            log_config = LoggingConfig::server_file(&config.data_dir, cli.json);
        }
    }

    if let Err(e) = taskcal::logging::init_logging(log_config) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if serving {
        let retention_days = std::env::var("TASKCAL_LOG_RETENTION_DAYS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_LOG_RETENTION_DAYS);
        cleanup_old_logs(&log_dir(&config.data_dir), retention_days).ok();
    }

    if let Err(e) = run(cli.command, config).await {
        let response = match e.downcast_ref::<CalendarError>() {
            Some(err) => err.to_error_response(),
            None => ErrorResponse {
                error: format!("{:#}", e),
                code: "INTERNAL_ERROR".to_string(),
            },
        };
        exit_with_error(&response);
    }
}

/// Environment configuration with command line overrides applied
fn load_config(cli: &Cli) -> taskcal::error::Result<AppConfig> {
    let mut config = AppConfig::from_env()?;

    if let Commands::Serve {
        host,
        port,
        data_dir,
    } = &cli.command
    {
        if let Some(host) = host {
            config.host = host.clone();
        }
        if let Some(port) = port {
            config.port = *port;
        }
        if let Some(data_dir) = data_dir {
            config.data_dir = data_dir.clone();
        }
    }

    Ok(config)
}

fn exit_with_error(response: &ErrorResponse) -> ! {
    match serde_json::to_string_pretty(response) {
        Ok(json) => eprintln!("{}", json),
        Err(_) => eprintln!("{}: {}", response.code, response.error),
    }
    std::process::exit(1);
}

async fn run(command: Commands, config: AppConfig) -> anyhow::Result<()> {
    match command {
        Commands::Serve { .. } => WebServer::new(config).run().await?,

        Commands::User(user_cmd) => {
            let pool = create_pool(&config.db_path()).await?;
            run_migrations(&pool).await?;
            let users = UserManager::new(&pool, config.password_iterations);

            match user_cmd {
                UserCommands::Create {
                    username,
                    password,
                    calendar,
                    admin,
                } => {
                    let user = users.create_user(&username, &password, &calendar, admin).await?;
                    println!("{}", serde_json::to_string_pretty(&user)?);
                },
                UserCommands::List { format } => {
                    let all = users.list_users().await?;
                    if format == "json" {
                        println!("{}", serde_json::to_string_pretty(&all)?);
                    } else if all.is_empty() {
                        println!("No users.");
                    } else {
                        for user in all {
                            println!(
                                "{}\t{}{}",
                                user.username,
                                user.default_calendar,
                                if user.is_admin { "\tadmin" } else { "" }
                            );
                        }
                    }
                },
            }
        },
    }

    Ok(())
}
