mod catalog;
mod config;
mod order_log;
mod purchase;
mod services;

mod logger;

use {
    crate::{catalog::Catalog, config::Config, logger::TracingLogger},
    actix_web::{web, App, HttpServer},
    clap::Parser as _,
    color_eyre::eyre::WrapErr as _,
    tracing_log::LogTracer,
    tracing_subscriber::{fmt::Layer, layer::SubscriberExt as _, Registry},
};

#[actix_web::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    LogTracer::init()?;

    tracing::subscriber::set_global_default(Registry::default().with(Layer::default()))?;

    let config = Config::parse();

    let catalog = Catalog::from_path(&config.catalog)
        .wrap_err_with(|| format!("unable to load catalog from {}", config.catalog.display()))?;

    tracing::info!(
        path = %config.catalog.display(),
        entries = catalog.len(),
        "catalog loaded"
    );

    if catalog.is_empty() {
        tracing::warn!("catalog is empty, every order will fail");
    }

    let catalog = web::Data::new(catalog);
    let order_log = web::Data::from(config.order_log());

    HttpServer::new(move || {
        App::new()
            .app_data(catalog.clone())
            .app_data(order_log.clone())
            .service(services::api())
            .wrap(TracingLogger)
    })
    .bind(&config.bind)?
    .run()
    .await?;

    Ok(())
}
