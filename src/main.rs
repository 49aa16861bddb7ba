use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use log::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

mod api;
mod blockchain;
mod config;

use api::AppState;
use blockchain::{Ledger, Miner, MiningJobs};
use config::AppConfig;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::mine_block,
        api::handlers::start_mining_job,
        api::handlers::get_mining_job,
        api::handlers::cancel_mining_job,
        api::handlers::add_data,
        api::handlers::get_pending,
        api::handlers::get_chain,
        api::handlers::validate_chain,
        api::handlers::get_block,
        api::handlers::get_node
    ),
    components(
        schemas(
            blockchain::ChainEntry,
            blockchain::FailureReason,
            blockchain::JobStatus,
            api::handlers::MineResponse,
            api::handlers::AddDataRequest,
            api::handlers::AddDataResponse,
            api::handlers::ValidateResponse,
            api::handlers::GetBlockRequest,
            api::handlers::BlockResponse,
            api::handlers::NodeResponse,
            api::handlers::JobStartedResponse
        )
    ),
    tags(
        (name = "datachain", description = "Proof-of-work data ledger endpoints")
    ),
    info(
        title = "Datachain API",
        version = "0.1.0",
        description = "A single-node proof-of-work data ledger",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

/// Builds the ledger and mining registry owned by this process
fn initialize_state(config: &AppConfig) -> anyhow::Result<AppState> {
    let ledger = Ledger::new(config.difficulty).context("failed to create ledger")?;
    let jobs = MiningJobs::new(Miner::new(ledger.clone(), config.mining));
    let node_id = Uuid::new_v4().simple().to_string();

    info!(
        "Node {} started with difficulty {} (in-memory, nothing is persisted)",
        node_id,
        ledger.difficulty()
    );

    Ok(AppState {
        ledger,
        jobs,
        node_id,
    })
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = AppConfig::from_env().context("invalid configuration")?;
    let state = initialize_state(&config)?;
    let jobs = state.jobs.clone();
    let state = web::Data::new(state);

    info!("Starting HTTP server at http://{}:{}", config.host, config.port);

    HttpServer::new(move || {
        // Configure CORS
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(state.clone())
            // API routes
            .configure(api::configure_routes)
            // Swagger UI
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", ApiDoc::openapi()),
            )
    })
    .bind((config.host.as_str(), config.port))
    .with_context(|| format!("failed to bind {}:{}", config.host, config.port))?
    .run()
    .await?;

    // Blocking searches would otherwise keep the process alive after shutdown.
    jobs.cancel_all();
    info!("Server stopped");

    Ok(())
}
