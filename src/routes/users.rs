use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::AppState;

/// In-memory user collection shared by the handlers.
pub type UserStore = Arc<RwLock<Vec<User>>>;

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub created_at: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListUsersQuery {
    pub name: Option<String>,
}

pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListUsersQuery>,
) -> Json<Value> {
    let users = state.users.read().await;

    let matching: Vec<&User> = users
        .iter()
        .filter(|user| match &query.name {
            Some(name) => user.name.to_lowercase().contains(&name.to_lowercase()),
            None => true,
        })
        .collect();

    Json(json!({
        "users": matching,
        "total": matching.len(),
    }))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<User>, StatusCode> {
    let users = state.users.read().await;

    users
        .iter()
        .find(|user| user.id == id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), StatusCode> {
    if payload.name.trim().is_empty() || payload.email.trim().is_empty() {
        warn!("Invalid user creation request: missing name or email");
        return Err(StatusCode::BAD_REQUEST);
    }

    let new_user = User {
        id: uuid::Uuid::new_v4().to_string(),
        name: payload.name,
        email: payload.email,
        created_at: chrono::Utc::now().to_rfc3339(),
    };

    state.users.write().await.push(new_user.clone());
    info!(user_id = %new_user.id, "User created");

    Ok((StatusCode::CREATED, Json(new_user)))
}
