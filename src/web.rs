use actix_web::{
    error::QueryPayloadError, get, http::header, http::StatusCode, middleware, post, web, App,
    HttpRequest, HttpResponse, HttpServer, Responder,
};
use chrono::Utc;
use serde_json::json;
use tokio_util::io::ReaderStream;
use tracing::info;

use crate::error::Error;
use crate::service::{supported_formats, ConversionRequest, ConversionService};

pub struct AppState {
    pub service: ConversionService,
}

#[post("/api/convert")]
async fn convert(
    data: web::Data<AppState>,
    params: web::Query<ConversionRequest>,
    payload: web::Payload,
) -> Result<impl Responder, Error> {
    let view = data
        .service
        .start_conversion(params.into_inner(), payload)
        .await?;

    info!(job_id = %view.job_id, "conversion queued");

    Ok(web::Json(view))
}

#[get("/api/status/{job_id}")]
async fn status(
    data: web::Data<AppState>,
    job_id: web::Path<String>,
) -> Result<impl Responder, Error> {
    Ok(web::Json(data.service.status(&job_id)?))
}

#[get("/api/jobs")]
async fn jobs(data: web::Data<AppState>) -> impl Responder {
    web::Json(data.service.jobs())
}

/// `attachment; filename="..."` with quotes, backslashes and control
/// characters replaced.
fn attachment(file_name: &str) -> String {
    let safe: String = file_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    format!("attachment; filename=\"{safe}\"")
}

#[get("/api/files/download/{job_id}")]
async fn download(
    data: web::Data<AppState>,
    job_id: web::Path<String>,
) -> Result<HttpResponse, Error> {
    let converted = data.service.converted_file(&job_id).await?;

    let file = tokio::fs::File::open(&converted.path)
        .await
        .map_err(|_| Error::NotFound(job_id.into_inner()))?;

    Ok(HttpResponse::Ok()
        .content_type("application/octet-stream")
        .insert_header((header::CONTENT_DISPOSITION, attachment(&converted.file_name)))
        .no_chunking(converted.size)
        .streaming(ReaderStream::new(file)))
}

#[get("/api/health")]
async fn health(data: web::Data<AppState>) -> HttpResponse {
    let report = data.service.health().await;
    let timestamp = Utc::now().timestamp_millis();

    if !report.ffmpeg_available {
        return HttpResponse::build(StatusCode::SERVICE_UNAVAILABLE).json(json!({
            "status": "DOWN",
            "timestamp": timestamp,
            "ffmpeg": "NOT_AVAILABLE",
            "error": "FFmpeg not available",
        }));
    }

    HttpResponse::Ok().json(json!({
        "status": "UP",
        "timestamp": timestamp,
        "ffmpeg": "AVAILABLE",
        "gpu": report.gpu,
    }))
}

#[get("/api/formats")]
async fn formats() -> impl Responder {
    web::Json(supported_formats())
}

fn query_error(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    Error::InvalidParameter {
        name: "query",
        reason: err.to_string(),
    }
    .into()
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::QueryConfig::default().error_handler(query_error))
        .service(convert)
        .service(status)
        .service(jobs)
        .service(download)
        .service(health)
        .service(formats);
}

pub async fn start_web_server(service: ConversionService) -> std::io::Result<()> {
    let host = service.config().host.clone();
    let port = service.config().port;
    let app_state = web::Data::new(AppState { service });

    info!("Starting web server at {host}:{port}...");

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(app_state.clone())
            .configure(routes)
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}
