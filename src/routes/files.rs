use crate::context::AppContext;
use crate::error::app_error::AppError;
use crate::models::document::Document;
use crate::service::blob::normalize_blob_path;
use rocket::fs::NamedFile;
use rocket::{State, get};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// Serves a stored file to a session user who may see the record it belongs to.
#[get("/<path..>")]
pub async fn serve_file(ctx: &State<Arc<AppContext>>, path: PathBuf) -> Result<NamedFile, AppError> {
    let requested = normalize_blob_path(&path.to_string_lossy())?;
    authorize(ctx, &requested).await?;

    let target = Path::new(&ctx.config.storage.root_dir).join(&requested);
    NamedFile::open(&target).await.map_err(|e| {
        warn!(path = %requested, error = %e, "stored file is missing");
        AppError::NotFound(format!("File {}", requested))
    })
}

/// Resolves the owning record through the services, so company scoping and
/// document visibility apply to the bytes as well.
async fn authorize(ctx: &AppContext, requested: &str) -> Result<(), AppError> {
    let not_found = || AppError::NotFound(format!("File {}", requested));
    let segments: Vec<&str> = requested.split('/').collect();

    match segments.as_slice() {
        ["companies", company_id, "documents", file] => {
            let document_id = Path::new(file).file_stem().and_then(|s| s.to_str()).ok_or_else(not_found)?;
            let document = ctx.documents().get(document_id).await?;
            if Document::blob_path(&document.company_id, &document.id, &document.file_type) != requested || document.company_id != *company_id {
                return Err(not_found());
            }
            Ok(())
        }
        ["companies", company_id, "deviations", deviation_id, file] => {
            let deviation = ctx.deviations().get(deviation_id).await?;
            let linked = deviation.media_urls.iter().any(|url| url.ends_with(&format!("/{}/{}", deviation_id, file)));
            if deviation.company_id != *company_id || !linked {
                return Err(not_found());
            }
            Ok(())
        }
        _ => Err(not_found()),
    }
}

pub fn routes() -> Vec<rocket::Route> {
    rocket::routes![serve_file]
}
