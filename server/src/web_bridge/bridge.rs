use crate::web_bridge::model::{HealthView, SourceRef, StateView, ZoneRef, ZoneRequest};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::{Filter, Reply};
use zonecore::engine::{CommandOutcome, ControlCommand, CountingEngine};
use zonecore::ingest::DetectionFrame;
use zonecore::prelude::EngineError;

fn with_engine(
    engine: Arc<CountingEngine>,
) -> impl Filter<Extract = (Arc<CountingEngine>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || engine.clone())
}

fn error_status(err: &EngineError) -> StatusCode {
    match err {
        EngineError::UnknownSource(_) | EngineError::UnknownZone { .. } => StatusCode::NOT_FOUND,
        EngineError::InvalidBoundary(_) => StatusCode::BAD_REQUEST,
        EngineError::Busy(_) | EngineError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_reply(err: EngineError) -> warp::reply::WithStatus<warp::reply::Json> {
    warp::reply::with_status(
        warp::reply::json(&json!({ "error": err.to_string() })),
        error_status(&err),
    )
}

fn ok_json<T: serde::Serialize>(value: &T) -> warp::reply::WithStatus<warp::reply::Json> {
    warp::reply::with_status(warp::reply::json(value), StatusCode::OK)
}

/// All bridge routes. The bridge adds no counting semantics: every
/// handler forwards to the engine and maps its result onto HTTP.
pub fn routes(
    engine: Arc<CountingEngine>,
) -> impl Filter<Extract = (impl Reply,), Error = warp::Rejection> + Clone {
    let state_route = warp::path("state")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_engine(engine.clone()))
        .and_then(|engine: Arc<CountingEngine>| async move {
            let view = StateView {
                active_source: engine.active_source(),
                zones: engine.query_all().await,
            };
            Ok::<_, warp::Rejection>(ok_json(&view))
        });

    let health_route = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_engine(engine.clone()))
        .and_then(|engine: Arc<CountingEngine>| async move {
            let view = HealthView {
                metrics: engine.metrics(),
                sources: engine.source_phases().await,
            };
            Ok::<_, warp::Rejection>(ok_json(&view))
        });

    let detections_route = warp::path("detections")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_engine(engine.clone()))
        .and_then(
            |frame: DetectionFrame, engine: Arc<CountingEngine>| async move {
                let reply = match engine.submit_detections(frame).await {
                    Ok(()) => warp::reply::with_status(
                        warp::reply::json(&json!({ "status": "ok" })),
                        StatusCode::ACCEPTED,
                    ),
                    Err(err) => error_reply(err),
                };
                Ok::<_, warp::Rejection>(reply)
            },
        );

    let zone_set_route = warp::path("zones")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_engine(engine.clone()))
        .and_then(
            |request: ZoneRequest, engine: Arc<CountingEngine>| async move {
                let op = ControlCommand::CreateOrUpdateZone {
                    zone_id: request.zone_id,
                    boundary: request.boundary,
                };
                let reply = match engine.apply_command(&request.source_id, op).await {
                    Ok(CommandOutcome::Zone(view)) => ok_json(&view),
                    Ok(_) => error_reply(EngineError::Internal(
                        "unexpected command outcome".to_string(),
                    )),
                    Err(err) => error_reply(err),
                };
                Ok::<_, warp::Rejection>(reply)
            },
        );

    let zone_reset_route = warp::path("zones")
        .and(warp::path("reset"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_engine(engine.clone()))
        .and_then(|request: ZoneRef, engine: Arc<CountingEngine>| async move {
            let op = ControlCommand::ResetZone {
                zone_id: request.zone_id,
            };
            let reply = match engine.apply_command(&request.source_id, op).await {
                Ok(CommandOutcome::Zone(view)) => ok_json(&view),
                Ok(_) => error_reply(EngineError::Internal(
                    "unexpected command outcome".to_string(),
                )),
                Err(err) => error_reply(err),
            };
            Ok::<_, warp::Rejection>(reply)
        });

    let zone_delete_route = warp::path("zones")
        .and(warp::path("delete"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_engine(engine.clone()))
        .and_then(|request: ZoneRef, engine: Arc<CountingEngine>| async move {
            let op = ControlCommand::DeleteZone {
                zone_id: request.zone_id,
            };
            let reply = match engine.apply_command(&request.source_id, op).await {
                Ok(CommandOutcome::Removed { zone_id }) => {
                    ok_json(&json!({ "removed": zone_id }))
                }
                Ok(_) => error_reply(EngineError::Internal(
                    "unexpected command outcome".to_string(),
                )),
                Err(err) => error_reply(err),
            };
            Ok::<_, warp::Rejection>(reply)
        });

    let register_route = warp::path("sources")
        .and(warp::path("register"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_engine(engine.clone()))
        .and_then(|request: SourceRef, engine: Arc<CountingEngine>| async move {
            let reply = match engine.register_source(&request.source_id).await {
                Ok(()) => ok_json(&json!({ "status": "running" })),
                Err(err) => error_reply(err),
            };
            Ok::<_, warp::Rejection>(reply)
        });

    let unregister_route = warp::path("sources")
        .and(warp::path("unregister"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_engine(engine.clone()))
        .and_then(|request: SourceRef, engine: Arc<CountingEngine>| async move {
            let reply = match engine.unregister_source(&request.source_id).await {
                Ok(()) => ok_json(&json!({ "status": "stopped" })),
                Err(err) => error_reply(err),
            };
            Ok::<_, warp::Rejection>(reply)
        });

    let active_source_route = warp::path("active-source")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_engine(engine))
        .and_then(|request: SourceRef, engine: Arc<CountingEngine>| async move {
            let reply = match engine.set_active_source(&request.source_id).await {
                Ok(()) => ok_json(&json!({ "active_source": request.source_id })),
                Err(err) => error_reply(err),
            };
            Ok::<_, warp::Rejection>(reply)
        });

    state_route
        .or(health_route)
        .or(detections_route)
        .or(zone_reset_route)
        .or(zone_delete_route)
        .or(zone_set_route)
        .or(register_route)
        .or(unregister_route)
        .or(active_source_route)
}

/// Serves the bridge on the given address for the process lifetime.
pub fn serve(engine: Arc<CountingEngine>, addr: SocketAddr) -> tokio::task::JoinHandle<()> {
    let api = routes(engine);
    tokio::spawn(async move {
        warp::serve(api).run(addr).await;
    })
}
