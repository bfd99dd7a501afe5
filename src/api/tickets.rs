use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::get,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use super::error::{ApiError, ApiJson, ResultExt, validate_uuid};
use super::success;
use crate::auth::guard::{CreateTickets, DeleteTickets, ReadTickets, UpdateTickets};
use crate::auth::{Action, Authorize, Identity, require_identity};
use crate::db::{Database, NewTicket, Ticket, TicketUpdate};
use crate::impl_has_auth_backend;
use crate::jwt::{JwtConfig, now_secs};

const MAX_TITLE_LENGTH: usize = 200;
const MAX_DESCRIPTION_LENGTH: usize = 10_000;

#[derive(Clone)]
pub struct TicketsState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
}

impl_has_auth_backend!(TicketsState);

pub fn router(state: TicketsState) -> Router {
    Router::new()
        .route("/", get(list_tickets).post(create_ticket))
        .route(
            "/{uuid}",
            get(get_ticket).put(update_ticket).delete(delete_ticket),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_identity::<TicketsState>,
        ))
        .with_state(state)
}

/// A ticket together with what the caller may do with it.
#[derive(Serialize)]
struct TicketView {
    #[serde(flatten)]
    ticket: Ticket,
    can_update: bool,
    can_delete: bool,
}

impl TicketView {
    fn new(ticket: Ticket, identity: &Identity) -> Self {
        Self {
            ticket,
            can_update: identity.can("tickets", Action::Update),
            can_delete: identity.can("tickets", Action::Delete),
        }
    }
}

fn validate_title(title: &str, details: &mut Vec<String>) {
    if title.trim().is_empty() {
        details.push("Title is required".into());
    } else if title.chars().count() > MAX_TITLE_LENGTH {
        details.push(format!(
            "Title cannot be longer than {} characters",
            MAX_TITLE_LENGTH
        ));
    }
}

fn validate_description(description: &str, details: &mut Vec<String>) {
    if description.chars().count() > MAX_DESCRIPTION_LENGTH {
        details.push(format!(
            "Description cannot be longer than {} characters",
            MAX_DESCRIPTION_LENGTH
        ));
    }
}

fn into_result(details: Vec<String>) -> Result<(), ApiError> {
    if details.is_empty() {
        Ok(())
    } else {
        Err(ApiError::validation("Invalid ticket", details))
    }
}

fn current_time() -> Result<u64, ApiError> {
    now_secs().map_err(|_| ApiError::internal("System clock error"))
}

async fn list_tickets(
    State(state): State<TicketsState>,
    auth: Authorize<ReadTickets>,
) -> Result<impl IntoResponse, ApiError> {
    let tickets = state
        .db
        .tickets()
        .list()
        .await
        .db_err("Failed to list tickets")?;

    let views: Vec<TicketView> = tickets
        .into_iter()
        .map(|t| TicketView::new(t, auth.identity()))
        .collect();
    Ok(success(views))
}

async fn create_ticket(
    State(state): State<TicketsState>,
    auth: Authorize<CreateTickets>,
    ApiJson(mut payload): ApiJson<NewTicket>,
) -> Result<impl IntoResponse, ApiError> {
    payload.title = payload.title.trim().to_string();

    let mut details = Vec::new();
    validate_title(&payload.title, &mut details);
    validate_description(&payload.description, &mut details);
    into_result(details)?;

    let uuid = uuid::Uuid::new_v4().to_string();
    let identity = auth.into_identity();

    state
        .db
        .tickets()
        .create(&uuid, identity.id, &payload, current_time()?)
        .await
        .db_err("Failed to create ticket")?;

    let ticket = state
        .db
        .tickets()
        .get_by_uuid(&uuid)
        .await
        .db_err("Failed to load ticket")?
        .ok_or_else(|| ApiError::internal("Ticket vanished after creation"))?;

    info!(user = %identity.uuid, ticket = %uuid, "Ticket created");
    Ok((StatusCode::CREATED, success(TicketView::new(ticket, &identity))))
}

async fn get_ticket(
    State(state): State<TicketsState>,
    auth: Authorize<ReadTickets>,
    Path(uuid): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    validate_uuid(&uuid)?;

    let ticket = state
        .db
        .tickets()
        .get_by_uuid(&uuid)
        .await
        .db_err("Failed to get ticket")?
        .ok_or_else(|| ApiError::not_found("Ticket not found"))?;

    Ok(success(TicketView::new(ticket, auth.identity())))
}

async fn update_ticket(
    State(state): State<TicketsState>,
    auth: Authorize<UpdateTickets>,
    Path(uuid): Path<String>,
    ApiJson(mut payload): ApiJson<TicketUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    validate_uuid(&uuid)?;

    let mut details = Vec::new();
    if let Some(title) = payload.title.as_mut() {
        *title = title.trim().to_string();
        validate_title(title, &mut details);
    }
    if let Some(description) = &payload.description {
        validate_description(description, &mut details);
    }
    into_result(details)?;

    let updated = state
        .db
        .tickets()
        .update(&uuid, &payload, current_time()?)
        .await
        .db_err("Failed to update ticket")?;
    if !updated {
        return Err(ApiError::not_found("Ticket not found"));
    }

    let ticket = state
        .db
        .tickets()
        .get_by_uuid(&uuid)
        .await
        .db_err("Failed to load ticket")?
        .ok_or_else(|| ApiError::not_found("Ticket not found"))?;

    Ok(success(TicketView::new(ticket, auth.identity())))
}

async fn delete_ticket(
    State(state): State<TicketsState>,
    auth: Authorize<DeleteTickets>,
    Path(uuid): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    validate_uuid(&uuid)?;

    let deleted = state
        .db
        .tickets()
        .delete(&uuid)
        .await
        .db_err("Failed to delete ticket")?;
    if !deleted {
        return Err(ApiError::not_found("Ticket not found"));
    }

    info!(user = %auth.identity().uuid, ticket = %uuid, "Ticket deleted");
    Ok(StatusCode::NO_CONTENT)
}
