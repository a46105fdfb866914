use farmcert::{
    config::{LogFormat, LoggingConfig},
    server, AppContext, ServerConfig,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = ServerConfig::from_env()?;

    // Initialize logging
    init_tracing(&config.logging);

    // Print banner
    print_banner();

    // Create application context
    let ctx = AppContext::new(config).await?;

    // Start server
    server::serve(ctx).await?;

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("farmcert={},tower_http=debug", logging.level).into());

    let registry = tracing_subscriber::registry().with(filter);
    match logging.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

fn print_banner() {
    println!(
        r#"
    ______                    ______          __
   / ____/___ __________ ___ / ____/__  _____/ /_
  / /_  / __ `/ ___/ __ `__ \/ /   / _ \/ ___/ __/
 / __/ / /_/ / /  / / / / / / /___/  __/ /  / /_
/_/    \__,_/_/  /_/ /_/ /_/\____/\___/_/   \__/

        Farm Certification Service v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
