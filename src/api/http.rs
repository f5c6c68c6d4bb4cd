//! warp routes for the estimator.
//!
//! `POST /estimate`, `POST /estimate/batch`, `GET /health` and
//! `GET /model-info`. Failures are JSON bodies `{"error", "code"}` with the
//! status taken from [`ErrorCode::http_status`].

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

use crate::common::error::{ErrorCode, PricingError, PricingResult};
use crate::inference::domain::{BatchRequest, EstimateRequest};
use crate::inference::service::ServiceContext;

/// Request bodies larger than this are refused.
const MAX_BODY_BYTES: u64 = 256 * 1024;

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: u32,
}

fn error_reply(status: StatusCode, code: ErrorCode, message: String) -> Response {
    warp::reply::with_status(
        warp::reply::json(&ErrorBody {
            error: message,
            code: code as u32,
        }),
        status,
    )
    .into_response()
}

fn failure(err: &PricingError) -> Response {
    let code = err.code();
    let status =
        StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        warn!(error = %err, "request failed");
    }
    error_reply(status, code, err.to_string())
}

fn respond<T: Serialize>(result: PricingResult<T>) -> Response {
    match result {
        Ok(body) => warp::reply::json(&body).into_response(),
        Err(err) => failure(&err),
    }
}

fn with_ctx(
    ctx: Arc<ServiceContext>,
) -> impl Filter<Extract = (Arc<ServiceContext>,), Error = Infallible> + Clone {
    warp::any().map(move || ctx.clone())
}

async fn estimate(req: EstimateRequest, ctx: Arc<ServiceContext>) -> Result<Response, Infallible> {
    Ok(respond(ctx.estimate(&req)))
}

async fn estimate_batch(
    batch: BatchRequest,
    ctx: Arc<ServiceContext>,
) -> Result<Response, Infallible> {
    Ok(respond(ctx.estimate_batch(&batch.requests)))
}

async fn health(ctx: Arc<ServiceContext>) -> Result<Response, Infallible> {
    Ok(warp::reply::json(&ctx.health()).into_response())
}

async fn model_info(ctx: Arc<ServiceContext>) -> Result<Response, Infallible> {
    Ok(warp::reply::json(&ctx.model_info()).into_response())
}

/// Turn warp rejections into the same JSON error shape as handler failures.
async fn recover(err: Rejection) -> Result<Response, Infallible> {
    let reply = if err.is_not_found() {
        error_reply(StatusCode::NOT_FOUND, ErrorCode::InvalidInput, "no such route".into())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        error_reply(
            StatusCode::BAD_REQUEST,
            ErrorCode::InvalidInput,
            format!("validation error: {e}"),
        )
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        error_reply(
            StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCode::InvalidInput,
            format!("request body exceeds {MAX_BODY_BYTES} bytes"),
        )
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        error_reply(
            StatusCode::METHOD_NOT_ALLOWED,
            ErrorCode::InvalidInput,
            "method not allowed".into(),
        )
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        error_reply(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ErrorCode::InvalidInput,
            "expected a JSON body".into(),
        )
    } else {
        warn!(rejection = ?err, "unhandled rejection");
        error_reply(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::Internal,
            "internal error".into(),
        )
    };
    Ok(reply)
}

fn json_body<T: DeserializeOwned + Send>(
) -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

/// All routes bound to one shared context.
pub fn routes(
    ctx: Arc<ServiceContext>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let single = warp::path!("estimate")
        .and(warp::post())
        .and(json_body())
        .and(with_ctx(ctx.clone()))
        .and_then(estimate);
    let batch = warp::path!("estimate" / "batch")
        .and(warp::post())
        .and(json_body())
        .and(with_ctx(ctx.clone()))
        .and_then(estimate_batch);
    let status = warp::path!("health")
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and_then(health);
    let info = warp::path!("model-info")
        .and(warp::get())
        .and(with_ctx(ctx))
        .and_then(model_info);

    single
        .or(batch)
        .unify()
        .or(status)
        .unify()
        .or(info)
        .unify()
        .recover(recover)
        .unify()
        .with(warp::trace::request())
}

/// Serve until Ctrl-C.
pub async fn serve(ctx: Arc<ServiceContext>, addr: SocketAddr) -> PricingResult<()> {
    let version = ctx.version().to_string();
    let (bound, server) = warp::serve(routes(ctx))
        .try_bind_with_graceful_shutdown(addr, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .map_err(|e| PricingError::Config(format!("cannot bind {addr}: {e}")))?;
    info!(addr = %bound, version = %version, "pricing api listening");
    server.await;
    info!("pricing api stopped");
    Ok(())
}
