use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use log::{error, info};
use std::io;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use pow_ledger::config::NodeConfig;
use pow_ledger::node::Node;
use pow_ledger::{api, blockchain, node};

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::get_chain,
        api::handlers::get_pending_transactions,
        api::handlers::new_transaction,
        api::handlers::mine_block,
        api::handlers::validate_chain,
        api::handlers::register_nodes,
        api::handlers::resolve_conflicts
    ),
    components(
        schemas(
            blockchain::Block,
            blockchain::Transaction,
            blockchain::consensus::ChainResponse,
            node::TransactionSubmission,
            api::handlers::TransactionResponse,
            api::handlers::MineResponse,
            api::handlers::RegisterNodesRequest,
            api::handlers::RegisterNodesResponse,
            api::handlers::ResolveResponse
        )
    ),
    tags(
        (name = "ledger", description = "Ledger node API endpoints")
    ),
    info(
        title = "Proof-of-work ledger API",
        version = "0.1.0",
        description = "Mining, transactions and longest-chain consensus",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = NodeConfig::from_env().map_err(|e| {
        error!("Invalid configuration: {}", e);
        io::Error::new(io::ErrorKind::InvalidInput, e)
    })?;

    let node = Node::from_config(&config).map_err(|e| {
        error!("Failed to start node: {}", e);
        io::Error::new(io::ErrorKind::InvalidInput, e)
    })?;

    info!(
        "Node {} mining at difficulty {} with {} peers",
        node.id(),
        node.ledger().pow().difficulty(),
        node.peer_count()
    );
    info!("Starting HTTP server at http://{}:{}", config.host, config.port);

    let data = web::Data::new(node.clone());

    let server = HttpServer::new(move || {
        // Configure CORS
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        // Configure OpenAPI documentation
        let openapi = ApiDoc::openapi();

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(data.clone())
            // API routes
            .configure(api::configure_routes)
            // Swagger UI
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone())
            )
    })
    .disable_signals()
    .bind((config.host.as_str(), config.port))?
    .run();

    // Abort running proof searches before stopping the workers, otherwise
    // a mining request would keep the process alive.
    let handle = server.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            node.shutdown();
            handle.stop(true).await;
        }
    });

    server.await
}
