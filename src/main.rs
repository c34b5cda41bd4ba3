use clap::Parser;
use opentelemetry_otlp::WithExportConfig as _;
use tracing::error;
use tracing_subscriber::filter::LevelFilter;

use atelier::client::Client;
use atelier::client::Color;
use atelier::client::Commands;
use atelier::client::TelemetryConfig;
use atelier::client::TelemetryKind;
use atelier::client::healthcheck::healthcheck;
use atelier::client::print_openapi;
use atelier::client::runserver::runserver;
use atelier::client::user::user_command;
use common::tracing::SpanUploading;
use common::tracing::Stream;
use common::tracing::TracingConfig;
use common::tracing::create_tracing_subscriber;

fn init_tracing(telemetry_config: &TelemetryConfig) {
    let telemetry = match telemetry_config.telemetry_kind {
        TelemetryKind::None => None,
        TelemetryKind::Opentelemetry => Some(telemetry_config.clone().into()),
    };
    let tracing_config = TracingConfig {
        stream: Stream::Stderr,
        telemetry,
        directives: vec![],
        span_uploading: SpanUploading::BackgroundBatched,
    };
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(telemetry_config.telemetry_endpoint.to_string())
        .build()
        .expect("failed to build the OTLP span exporter");
    let subscriber = create_tracing_subscriber(tracing_config, LevelFilter::INFO, exporter);
    tracing::subscriber::set_global_default(subscriber)
        .expect("the tracing subscriber should only be set once");
}

#[tokio::main]
async fn main() {
    let client = Client::parse();

    match client.color {
        Color::Never => colored::control::set_override(false),
        Color::Always => colored::control::set_override(true),
        Color::Auto => {}
    }
    init_tracing(&client.telemetry_config);

    let result = match client.command {
        Commands::Runserver(args) => {
            runserver(*args, client.postgres_config, client.app_version).await
        }
        Commands::Openapi => {
            print_openapi();
            Ok(())
        }
        Commands::User(command) => user_command(command, client.postgres_config).await,
        Commands::Healthcheck(args) => healthcheck(args, client.postgres_config).await,
    };

    if let Err(e) = result {
        error!(error = %e, "command failed");
        std::process::exit(1);
    }
}
