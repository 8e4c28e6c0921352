use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use uuid::Uuid;

use crate::{
    entities::ticket::Model as TicketModel,
    errors::ServiceError,
    handlers::common::CurrentUser,
    services::commerce::{CreateTicketInput, TicketPage, TicketSearchQuery, UpdateTicketInput},
    ApiResponse, ApiResult, AppState,
};

#[utoipa::path(
    get,
    path = "/api/v1/tickets",
    summary = "List tickets",
    description = "Active tickets, newest first, optionally filtered by destination",
    params(TicketSearchQuery),
    responses(
        (status = 200, description = "Tickets retrieved", body = ApiResponse<TicketPage>),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "Tickets"
)]
pub async fn list_tickets(
    State(state): State<AppState>,
    Query(query): Query<TicketSearchQuery>,
) -> ApiResult<TicketPage> {
    let page = state.services.tickets.list_tickets(query).await?;
    Ok(Json(ApiResponse::success(page)))
}

#[utoipa::path(
    post,
    path = "/api/v1/tickets",
    summary = "Create ticket",
    request_body = CreateTicketInput,
    params(("x-user-id" = Uuid, Header, description = "Seller id")),
    responses(
        (status = 201, description = "Ticket created", body = ApiResponse<TicketModel>),
        (status = 400, description = "Invalid ticket", body = crate::errors::ErrorResponse),
        (status = 401, description = "Missing caller identity", body = crate::errors::ErrorResponse),
    ),
    tag = "Tickets"
)]
pub async fn create_ticket(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(input): Json<CreateTicketInput>,
) -> Result<(StatusCode, Json<ApiResponse<TicketModel>>), ServiceError> {
    let ticket = state
        .services
        .tickets
        .create_ticket(user.id(), input)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(ticket))))
}

#[utoipa::path(
    get,
    path = "/api/v1/tickets/{id}",
    summary = "Get ticket",
    params(("id" = Uuid, Path, description = "Ticket id")),
    responses(
        (status = 200, description = "Ticket found", body = ApiResponse<TicketModel>),
        (status = 404, description = "Ticket not found", body = crate::errors::ErrorResponse),
    ),
    tag = "Tickets"
)]
pub async fn get_ticket(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<TicketModel> {
    let ticket = state.services.tickets.get_ticket(id).await?;
    Ok(Json(ApiResponse::success(ticket)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/tickets/{id}",
    summary = "Update ticket",
    description = "Change price, stock, description or availability. Owner only.",
    request_body = UpdateTicketInput,
    params(
        ("id" = Uuid, Path, description = "Ticket id"),
        ("x-user-id" = Uuid, Header, description = "Seller id"),
    ),
    responses(
        (status = 200, description = "Ticket updated", body = ApiResponse<TicketModel>),
        (status = 400, description = "Invalid update", body = crate::errors::ErrorResponse),
        (status = 403, description = "Ticket belongs to another seller", body = crate::errors::ErrorResponse),
        (status = 404, description = "Ticket not found", body = crate::errors::ErrorResponse),
    ),
    tag = "Tickets"
)]
pub async fn update_ticket(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateTicketInput>,
) -> ApiResult<TicketModel> {
    let ticket = state
        .services
        .tickets
        .update_ticket(user.id(), id, input)
        .await?;
    Ok(Json(ApiResponse::success(ticket)))
}
