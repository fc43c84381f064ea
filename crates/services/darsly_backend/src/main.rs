// File: services/darsly_backend/src/main.rs
use axum::{routing::get, Router};
use darsly_booking::routes as booking_routes;
use darsly_booking::BookingLifecycle;
use darsly_common::services::ServiceFactory;
use darsly_config::load_config;
use darsly_db::DbClient;
use darsly_payments::routes as payment_routes;
use darsly_payments::PaymentFlow;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

mod service_factory;

use service_factory::DarslyServiceFactory;

#[tokio::main]
async fn main() {
    darsly_common::logging::init();

    let config = Arc::new(load_config().expect("Failed to load config"));

    let db = match config.database.as_ref() {
        Some(_) => DbClient::new(&config).await.expect("Failed to connect to database"),
        // Local development fallback; deployments set APP_DATABASE__URL.
        None => DbClient::from_url("sqlite://data/darsly.db")
            .await
            .expect("Failed to open fallback database"),
    };

    let factory = DarslyServiceFactory::new(config.clone());

    let rates = factory.rate_provider().expect("rate provider is always wired");
    let bookings = Arc::new(BookingLifecycle::new(db.clone(), rates));
    bookings
        .init_schema()
        .await
        .expect("Failed to initialize booking schema");

    let gateway = factory
        .gateway()
        .expect("Tamara gateway is not configured; set [tamara] config and TAMARA_* env vars");
    let flow = Arc::new(PaymentFlow::new(
        db.clone(),
        config.clone(),
        gateway,
        bookings.clone(),
        factory.chat_room_service(),
        factory.notification_service(),
        factory.rewards_service(),
    ));
    flow.init_schema()
        .await
        .expect("Failed to initialize payment schema");

    let api_router = Router::new()
        .route("/", get(|| async { "Welcome to the Darsly API!" }))
        .merge(booking_routes::routes(config.clone(), bookings.clone()))
        .merge(payment_routes::routes(config.clone(), flow.clone()));

    #[allow(unused_mut)]
    let mut app = Router::new()
        .nest("/api", api_router)
        .layer(TraceLayer::new_for_http());

    // Conditionally add Swagger UI and JSON endpoint if openapi feature enabled
    #[cfg(feature = "openapi")]
    {
        use darsly_booking::doc::BookingApiDoc;
        use darsly_payments::doc::PaymentsApiDoc;
        use utoipa::OpenApi;
        use utoipa_swagger_ui::SwaggerUi;

        // Define the Merged OpenAPI Documentation struct
        #[derive(OpenApi)]
        #[openapi(
            info(title = "Darsly API", version = "0.1.0"),
            tags(
                (name = "Bookings", description = "Slot reservation and booking lifecycle"),
                (name = "Payments", description = "Payment reconciliation and settlement")
            )
        )]
        struct ApiDoc;

        let mut openapi = ApiDoc::openapi();
        openapi.merge(BookingApiDoc::openapi());
        openapi.merge(PaymentsApiDoc::openapi());

        app = app.merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi));
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind {}: {}", addr, e));

    info!("Darsly backend listening on {}", addr);
    axum::serve(listener, app)
        .await
        .expect("Server error");
}
