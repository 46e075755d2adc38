//! HTTP request handlers
//!
//! Implements the machine REST API. Every write goes through the repository,
//! which recomputes OEE and health status before the record is stored.

use actix_web::{error::JsonPayloadError, web, HttpRequest, HttpResponse, Result};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{DowntimeEvent, HealthCheck, MachineInput, MachineUpdate, ProductionInput};
use crate::repository::{MachineFilter, Recalculation};
use crate::state::SharedState;
use crate::validation::{
    validate_downtime_event, validate_machine_input, validate_machine_update,
    validate_production_input,
};

/// Configure all application routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .app_data(web::QueryConfig::default().error_handler(|err, _req| {
            AppError::BadRequest(err.to_string()).into()
        }))
        .service(
            web::scope("/api")
                // Health check
                .route("/health", web::get().to(health_check))
                // Machine endpoints
                .route("/machines", web::get().to(list_machines))
                .route("/machines", web::post().to(create_machine))
                .route("/machines/recalculate", web::post().to(recalculate_machines))
                .route("/machines/{id}", web::get().to(get_machine))
                .route("/machines/{id}", web::put().to(update_machine))
                .route("/machines/{id}", web::delete().to(delete_machine))
                .route("/machines/{id}/production", web::post().to(append_production))
                .route("/machines/{id}/downtime", web::post().to(record_downtime)),
        );
}

fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    warn!(error = %err, "Rejected malformed JSON body");
    AppError::BadRequest(err.to_string()).into()
}

/// Health check endpoint
///
/// GET /api/health
pub async fn health_check(state: web::Data<SharedState>) -> Result<HttpResponse, AppError> {
    let state = state.read().await;

    let health = HealthCheck {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
        uptime_seconds: state.uptime_seconds(),
        machine_count: state.machines().len(),
    };

    Ok(HttpResponse::Ok().json(health))
}

/// List machines
///
/// GET /api/machines?status=running&healthStatus=healthy
pub async fn list_machines(
    state: web::Data<SharedState>,
    query: web::Query<MachineFilter>,
) -> Result<HttpResponse, AppError> {
    let state = state.read().await;
    let machines = state.machines().list(&query);

    Ok(HttpResponse::Ok().json(machines))
}

/// Get one machine
///
/// GET /api/machines/{id}
pub async fn get_machine(
    state: web::Data<SharedState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let id = parse_machine_id(&path)?;
    let state = state.read().await;

    match state.machines().get(id) {
        Some(machine) => Ok(HttpResponse::Ok().json(machine)),
        None => Err(AppError::NotFound("Machine not found".to_string())),
    }
}

/// Create a machine
///
/// POST /api/machines
pub async fn create_machine(
    state: web::Data<SharedState>,
    body: web::Json<MachineInput>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let correlation_id = extract_correlation_id(&req);
    info!(correlation_id = %correlation_id, "Received machine creation request");

    validate_machine_input(&body)?;

    let machine = {
        let mut state = state.write().await;
        state.machines_mut().insert(body.into_inner())
    };

    Ok(HttpResponse::Created().json(machine))
}

/// Update the allow-listed fields of a machine
///
/// PUT /api/machines/{id}
pub async fn update_machine(
    state: web::Data<SharedState>,
    path: web::Path<String>,
    body: web::Json<MachineUpdate>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let id = parse_machine_id(&path)?;
    let correlation_id = extract_correlation_id(&req);

    validate_machine_update(&body)?;

    let update = body.into_inner();
    let recomputes = update.touches_oee_inputs();
    let machine = {
        let mut state = state.write().await;
        state.machines_mut().update(id, update)?
    };

    info!(
        correlation_id = %correlation_id,
        machine_id = %id,
        oee_inputs_changed = recomputes,
        oee = machine.oee(),
        health_status = %machine.health_status(),
        "Machine updated"
    );

    Ok(HttpResponse::Ok().json(machine))
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

/// Delete a machine
///
/// DELETE /api/machines/{id}
pub async fn delete_machine(
    state: web::Data<SharedState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let id = parse_machine_id(&path)?;
    {
        let mut state = state.write().await;
        state.machines_mut().delete(id)?;
    }

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Machine deleted",
    }))
}

/// Append a production sample
///
/// POST /api/machines/{id}/production
pub async fn append_production(
    state: web::Data<SharedState>,
    path: web::Path<String>,
    body: web::Json<ProductionInput>,
) -> Result<HttpResponse, AppError> {
    let id = parse_machine_id(&path)?;
    validate_production_input(&body)?;

    let machine = {
        let mut state = state.write().await;
        state.machines_mut().append_production(id, body.into_inner().into())?
    };

    Ok(HttpResponse::Created().json(machine))
}

/// Record a downtime event
///
/// POST /api/machines/{id}/downtime
pub async fn record_downtime(
    state: web::Data<SharedState>,
    path: web::Path<String>,
    body: web::Json<DowntimeEvent>,
) -> Result<HttpResponse, AppError> {
    let id = parse_machine_id(&path)?;
    validate_downtime_event(&body)?;

    let machine = {
        let mut state = state.write().await;
        state.machines_mut().record_downtime(id, body.into_inner())?
    };

    Ok(HttpResponse::Created().json(machine))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RecalculationResponse {
    total: usize,
    changed: usize,
    machines: Vec<Recalculation>,
}

/// Recompute OEE and health for every stored machine
///
/// POST /api/machines/recalculate
pub async fn recalculate_machines(
    state: web::Data<SharedState>,
) -> Result<HttpResponse, AppError> {
    let machines = {
        let mut state = state.write().await;
        state.machines_mut().recalculate_all()
    };

    Ok(HttpResponse::Ok().json(RecalculationResponse {
        total: machines.len(),
        changed: machines.iter().filter(|m| m.changed()).count(),
        machines,
    }))
}

fn parse_machine_id(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::BadRequest(format!("Invalid machine id: {}", raw)))
}

/// Extract or generate correlation ID from request headers
fn extract_correlation_id(req: &HttpRequest) -> String {
    req.headers()
        .get("X-Correlation-ID")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;
    use actix_web::{test, App};
    use serde_json::{json, Value};

    fn scenario_body() -> Value {
        json!({
            "name": "Press 1",
            "operatingTime": 400,
            "productionData": [{ "totalPieces": 380, "goodPieces": 370 }]
        })
    }

    macro_rules! init_app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($state.clone()))
                    .configure(configure_routes),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_health_check() {
        let state = AppState::default().shared();
        let app = init_app!(state);

        let req = test::TestRequest::get().uri("/api/health").to_request();
        let resp = test::call_service(&app, req).await;

        assert!(resp.status().is_success());
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["machineCount"], 0);
    }

    #[actix_web::test]
    async fn test_create_computes_oee() {
        let state = AppState::default().shared();
        let app = init_app!(state);

        let req = test::TestRequest::post()
            .uri("/api/machines")
            .set_json(scenario_body())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 201);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["availability"], 83);
        assert_eq!(body["performance"], 95);
        assert_eq!(body["quality"], 97);
        assert_eq!(body["oee"], 76);
        assert_eq!(body["healthStatus"], "healthy");
        assert_eq!(state.read().await.machines().len(), 1);
    }

    #[actix_web::test]
    async fn test_create_invalid_data() {
        let state = AppState::default().shared();
        let app = init_app!(state);

        let req = test::TestRequest::post()
            .uri("/api/machines")
            .set_json(json!({ "name": "Press", "operatingTime": -10 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);

        let req = test::TestRequest::post()
            .uri("/api/machines")
            .set_json(json!({ "description": "no name" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
    }

    #[actix_web::test]
    async fn test_update_recomputes_and_ignores_derived_fields() {
        let state = AppState::default().shared();
        let id = state.write().await.machines_mut().insert(
            serde_json::from_value::<MachineInput>(scenario_body()).unwrap(),
        ).id;
        let app = init_app!(state);

        let req = test::TestRequest::put()
            .uri(&format!("/api/machines/{}", id))
            .set_json(json!({ "operatingTime": 0, "oee": 99, "healthStatus": "healthy" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["oee"], 0);
        assert_eq!(body["healthStatus"], "critically unhealthy");
        assert_eq!(body["__v"], 1);
    }

    #[actix_web::test]
    async fn test_update_version_conflict() {
        let state = AppState::default().shared();
        let id = state
            .write()
            .await
            .machines_mut()
            .insert(MachineInput::named("Mill"))
            .id;
        let app = init_app!(state);

        let req = test::TestRequest::put()
            .uri(&format!("/api/machines/{}", id))
            .set_json(json!({ "name": "Mill 2", "__v": 5 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 409);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error_type"], "CONFLICT");
    }

    #[actix_web::test]
    async fn test_get_missing_and_malformed_ids() {
        let state = AppState::default().shared();
        let app = init_app!(state);

        let req = test::TestRequest::get()
            .uri(&format!("/api/machines/{}", Uuid::new_v4()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 404);

        let req = test::TestRequest::get()
            .uri("/api/machines/not-a-uuid")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
    }

    #[actix_web::test]
    async fn test_append_production() {
        let state = AppState::default().shared();
        let id = state.write().await.machines_mut().insert(
            serde_json::from_value::<MachineInput>(scenario_body()).unwrap(),
        ).id;
        let app = init_app!(state);

        let req = test::TestRequest::post()
            .uri(&format!("/api/machines/{}/production", id))
            .set_json(json!({ "totalPieces": 380, "goodPieces": 190 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 201);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["quality"], 50);
        assert_eq!(body["healthStatus"], "severely unhealthy");

        let req = test::TestRequest::post()
            .uri(&format!("/api/machines/{}/production", id))
            .set_json(json!({ "totalPieces": 10, "goodPieces": 11 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
    }

    #[actix_web::test]
    async fn test_record_downtime() {
        let state = AppState::default().shared();
        let id = state
            .write()
            .await
            .machines_mut()
            .insert(MachineInput::named("Robot"))
            .id;
        let app = init_app!(state);

        let req = test::TestRequest::post()
            .uri(&format!("/api/machines/{}/downtime", id))
            .set_json(json!({ "startTime": "2024-03-01T08:00:00Z", "reason": "Tool change" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 201);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["downtimeEvents"][0]["reason"], "Tool change");
    }

    #[actix_web::test]
    async fn test_list_with_filter_and_delete() {
        let state = AppState::default().shared();
        let healthy_id = state.write().await.machines_mut().insert(
            serde_json::from_value::<MachineInput>(scenario_body()).unwrap(),
        ).id;
        state
            .write()
            .await
            .machines_mut()
            .insert(MachineInput::named("Idle"));
        let app = init_app!(state);

        let req = test::TestRequest::get()
            .uri("/api/machines?healthStatus=healthy")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.as_array().unwrap().len(), 1);

        let req = test::TestRequest::delete()
            .uri(&format!("/api/machines/{}", healthy_id))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["message"], "Machine deleted");

        let req = test::TestRequest::get().uri("/api/machines").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.as_array().unwrap().len(), 1);

        let req = test::TestRequest::delete()
            .uri(&format!("/api/machines/{}", healthy_id))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 404);
    }

    #[actix_web::test]
    async fn test_recalculate() {
        let state = AppState::default().shared();
        state
            .write()
            .await
            .machines_mut()
            .insert(MachineInput::named("Idle"));
        let app = init_app!(state);

        let req = test::TestRequest::post()
            .uri("/api/machines/recalculate")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["total"], 1);
        assert_eq!(body["changed"], 0);
        assert_eq!(body["machines"][0]["healthStatus"], "critically unhealthy");
    }
}
