use driftpro::{AppContext, AppError, Config, build_rocket, init_tracing};
use tracing::{error, info};

#[rocket::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();

    let config = Config::load()?;
    init_tracing(&config.logging.level, config.logging.json_format);

    let ctx = AppContext::initialize(config.clone()).await.inspect_err(|e| error!(error = ?e, "failed to initialize application context"))?;
    let rocket = build_rocket(config, ctx).inspect_err(|e| error!(error = ?e, "failed to build server"))?;

    match rocket.launch().await {
        Ok(_) => {
            info!("server stopped");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "server failed");
            Err(AppError::from(e))
        }
    }
}
