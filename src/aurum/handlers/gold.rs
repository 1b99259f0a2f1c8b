//! Gold inventory endpoints. Mounted behind the bearer gate.

use crate::aurum::auth::AuthenticatedUser;
use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::{Instrument, error, info_span, instrument};
use utoipa::ToSchema;

use super::INVALID_PAYLOAD;

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone)]
pub struct GoldInput {
    pub name: String,
    pub karat: i32,
    pub weight: f64,
    pub price: f64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GoldItem {
    pub id: i64,
    pub name: String,
    pub karat: i32,
    pub weight: f64,
    pub price: f64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct GoldList {
    pub status: String,
    pub data: Vec<GoldItem>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct GoldUpdated {
    pub message: String,
    pub id: i64,
}

impl GoldInput {
    /// Returns the first rule the item breaks, if any.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.name.trim().is_empty() {
            return Err("Name is required");
        }
        if !(1..=24).contains(&self.karat) {
            return Err("Karat must be between 1 and 24");
        }
        if self.weight.is_nan() || self.weight <= 0.0 {
            return Err("Weight must be greater than zero");
        }
        if self.price.is_nan() || self.price < 0.0 {
            return Err("Price must not be negative");
        }
        Ok(())
    }
}

fn checked(payload: Option<Json<GoldInput>>) -> Result<GoldInput, Response> {
    let Some(Json(input)) = payload else {
        return Err((StatusCode::BAD_REQUEST, INVALID_PAYLOAD.to_string()).into_response());
    };
    input
        .validate()
        .map_err(|reason| (StatusCode::BAD_REQUEST, reason.to_string()).into_response())?;
    Ok(input)
}

fn gold_from_row(row: &PgRow) -> GoldItem {
    GoldItem {
        id: row.get("id"),
        name: row.get("name"),
        karat: row.get("karat"),
        weight: row.get("weight"),
        price: row.get("price"),
    }
}

#[utoipa::path(
    post,
    path= "/protected/gold",
    request_body = GoldInput,
    responses (
        (status = 201, description = "Item created", body = super::MessageResponse),
        (status = 400, description = "Invalid item", body = String),
        (status = 401, description = "Missing or invalid bearer token", body = String),
    ),
    security(("bearer" = [])),
    tag= "gold"
)]
#[instrument(skip_all, fields(user = %user.email))]
pub async fn create(
    pool: Extension<PgPool>,
    Extension(user): Extension<AuthenticatedUser>,
    payload: Option<Json<GoldInput>>,
) -> Response {
    let input = match checked(payload) {
        Ok(input) => input,
        Err(response) => return response,
    };

    let span = info_span!("db.query", db.system = "postgresql", db.operation = "INSERT");
    match sqlx::query("INSERT INTO gold (name, karat, weight, price) VALUES ($1, $2, $3, $4)")
        .bind(input.name.trim())
        .bind(input.karat)
        .bind(input.weight)
        .bind(input.price)
        .execute(&pool.0)
        .instrument(span)
        .await
    {
        Ok(_) => (
            StatusCode::CREATED,
            Json(super::MessageResponse::new("Gold item created successfully")),
        )
            .into_response(),
        Err(err) => {
            error!("Error inserting gold item: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error creating gold item".to_string(),
            )
                .into_response()
        }
    }
}

#[utoipa::path(
    get,
    path= "/protected/gold",
    responses (
        (status = 200, description = "All inventory items", body = GoldList),
        (status = 401, description = "Missing or invalid bearer token", body = String),
    ),
    security(("bearer" = [])),
    tag= "gold"
)]
#[instrument(skip_all, fields(user = %user.email))]
pub async fn list(
    pool: Extension<PgPool>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Response {
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "SELECT");
    match sqlx::query("SELECT id, name, karat, weight, price FROM gold ORDER BY id")
        .fetch_all(&pool.0)
        .instrument(span)
        .await
    {
        Ok(rows) => Json(GoldList {
            status: "success".to_string(),
            data: rows.iter().map(gold_from_row).collect(),
        })
        .into_response(),
        Err(err) => {
            error!("Error listing gold items: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error fetching gold items".to_string(),
            )
                .into_response()
        }
    }
}

#[utoipa::path(
    put,
    path= "/protected/gold/{id}",
    params(("id" = i64, Path, description = "Inventory item id")),
    request_body = GoldInput,
    responses (
        (status = 200, description = "Item updated", body = GoldUpdated),
        (status = 400, description = "Invalid item", body = String),
        (status = 401, description = "Missing or invalid bearer token", body = String),
        (status = 404, description = "No item with that id", body = String),
    ),
    security(("bearer" = [])),
    tag= "gold"
)]
#[instrument(skip_all, fields(user = %user.email, id = id))]
pub async fn update(
    pool: Extension<PgPool>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
    payload: Option<Json<GoldInput>>,
) -> Response {
    let input = match checked(payload) {
        Ok(input) => input,
        Err(response) => return response,
    };

    let query = "UPDATE gold SET name = $1, karat = $2, weight = $3, price = $4 WHERE id = $5";
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "UPDATE");
    match sqlx::query(query)
        .bind(input.name.trim())
        .bind(input.karat)
        .bind(input.weight)
        .bind(input.price)
        .bind(id)
        .execute(&pool.0)
        .instrument(span)
        .await
    {
        Ok(result) if result.rows_affected() == 0 => {
            (StatusCode::NOT_FOUND, "Gold item not found".to_string()).into_response()
        }
        Ok(_) => Json(GoldUpdated {
            message: "Gold item updated successfully".to_string(),
            id,
        })
        .into_response(),
        Err(err) => {
            error!("Error updating gold item {id}: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error updating gold item".to_string(),
            )
                .into_response()
        }
    }
}
