use clap::Parser;
use pixrelay::config::setup_logging;
use pixrelay::session::SessionManager;
use pixrelay::upstream::{OssBucket, PlatformApi, PlatformClient, RequestExecutor, UploadPipeline};
use sea_orm_migration::MigratorTrait;
use tracing::{error, info};

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = pixrelay::cli::CliOptions::parse();

    if let Err(err) = setup_logging(cli.debug) {
        eprintln!("Failed to set up logging: {}", err);
        return;
    }

    let (login, platform) = match (cli.login_config(), cli.platform_config()) {
        (Ok(login), Ok(platform)) => (login, platform),
        (Err(err), _) | (_, Err(err)) => {
            error!("Invalid configuration: {}", err);
            return;
        }
    };

    let db = match pixrelay::db::connect_db(&cli.database_path).await {
        Ok(db) => db,
        Err(err) => {
            error!("Database connection error: {}", err);
            return;
        }
    };

    if let Err(err) = pixrelay::db::migrations::Migrator::up(&db, None).await {
        error!("Database migration error: {}", err);
        return;
    }

    let session = SessionManager::new(login);
    if let Err(err) = session.start().await {
        error!("Browser session failed to start: {}", err);
        session.stop().await;
        return;
    }

    let executor = match RequestExecutor::new(platform.retry) {
        Ok(executor) => executor,
        Err(err) => {
            error!("Failed to build HTTP client: {}", err);
            session.stop().await;
            return;
        }
    };
    let bucket = match OssBucket::new(executor.client().clone(), &platform.object_store) {
        Ok(bucket) => bucket,
        Err(err) => {
            error!("Invalid object store settings: {}", err);
            session.stop().await;
            return;
        }
    };
    let api = PlatformApi::new(
        executor,
        platform.base_url,
        platform.web_origin,
        session.token_slot(),
    );
    let uploads = UploadPipeline::new(api.clone(), bucket);
    let client = PlatformClient::new(api, uploads, platform.generation);

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", err);
        }
        info!("Shutdown requested");
    };

    if let Err(err) = pixrelay::web::setup_server(
        &cli.listen_address,
        cli.port,
        db,
        client,
        cli.max_upload_bytes,
        shutdown,
    )
    .await
    {
        error!("Application error: {}", err);
    }

    session.stop().await;
}
