use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use super::{created, ok, optional_json, run_blocking};
use crate::core::shared::state::AppState;
use crate::crm::error::CrmError;
use crate::crm::response::ApiResponse;
use crate::crm::types::{
    CreateInvoiceRequest, CreateMilestoneRequest, Invoice, InvoicingCandidate,
    ListProjectsQuery, Milestone, Project, UpdateProjectRequest,
};
use crate::security::AuthenticatedUser;

pub async fn list_projects(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    params: Result<Query<ListProjectsQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<Vec<Project>>>, CrmError> {
    let Query(query) = params?;
    let projects =
        run_blocking(move || state.entities.list_projects(user.user_id, query.status)).await?;
    Ok(ok(projects))
}

pub async fn ready_for_invoicing(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<Json<ApiResponse<Vec<InvoicingCandidate>>>, CrmError> {
    let ready =
        run_blocking(move || state.workflow.get_projects_ready_for_invoicing(user.user_id))
            .await?;
    Ok(ok(ready))
}

pub async fn get_project(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ApiResponse<Project>>, CrmError> {
    let Path(project_id) = path?;
    let project =
        run_blocking(move || state.entities.get_project(user.user_id, project_id)).await?;
    Ok(ok(project))
}

pub async fn update_project(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateProjectRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<Project>>, CrmError> {
    let Path(project_id) = path?;
    let Json(req) = payload?;
    let project = run_blocking(move || {
        state
            .entities
            .update_project(user.user_id, project_id, req)
    })
    .await?;
    Ok(ok(project))
}

pub async fn delete_project(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ApiResponse<serde_json::Value>>, CrmError> {
    let Path(project_id) = path?;
    run_blocking(move || state.entities.delete_project(user.user_id, project_id)).await?;
    Ok(ok(serde_json::json!({ "id": project_id, "deleted": true })))
}

pub async fn list_milestones(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ApiResponse<Vec<Milestone>>>, CrmError> {
    let Path(project_id) = path?;
    let milestones =
        run_blocking(move || state.entities.list_milestones(user.user_id, project_id)).await?;
    Ok(ok(milestones))
}

pub async fn add_milestone(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<CreateMilestoneRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<Milestone>>), CrmError> {
    let Path(project_id) = path?;
    let Json(req) = payload?;
    let milestone = run_blocking(move || {
        state
            .entities
            .add_milestone(user.user_id, project_id, req)
    })
    .await?;
    Ok(created(milestone))
}

pub async fn complete_milestone(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ApiResponse<Milestone>>, CrmError> {
    let Path(milestone_id) = path?;
    let milestone =
        run_blocking(move || state.entities.complete_milestone(user.user_id, milestone_id))
            .await?;
    Ok(ok(milestone))
}

pub async fn create_invoice_from_project(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    path: Result<Path<Uuid>, PathRejection>,
    body: Bytes,
) -> Result<(StatusCode, Json<ApiResponse<Invoice>>), CrmError> {
    let Path(project_id) = path?;
    let req: CreateInvoiceRequest = optional_json(&body)?;
    let invoice = run_blocking(move || {
        state
            .workflow
            .create_invoice_from_project(user.user_id, project_id, req)
    })
    .await?;
    Ok(created(invoice))
}
