use super::json_error::JsonError;
use crate::{app::AppState, args::parse_address, error::Result};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use vcc_json::{Api, Config, GainsConfig, PutRegister, Register, Status, Stop};

#[derive(Deserialize, Debug, Copy, Clone, Default)]
#[serde(default)]
pub struct StatusQuery {
    clear: bool,
}

fn vcc_json(state: &AppState) -> Result<Api> {
    let vcc = state.vcc().lock().unwrap();
    Ok(Api {
        name: vcc.name().to_string(),
        base_address: vcc.base_address() as u64,
        status: vcc.status(false)?,
    })
}

fn status_json(state: &AppState, clear: bool) -> Result<Json<Status>, JsonError> {
    state
        .vcc()
        .lock()
        .unwrap()
        .status(clear)
        .map_err(JsonError::vcc_error)
        .map(Json)
}

pub async fn get_vcc(State(state): State<AppState>) -> Result<Json<Api>, JsonError> {
    vcc_json(&state).map_err(JsonError::vcc_error).map(Json)
}

pub async fn get_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<Status>, JsonError> {
    status_json(&state, query.clear)
}

pub async fn put_config(
    State(state): State<AppState>,
    Json(config): Json<Config>,
) -> Result<Json<Status>, JsonError> {
    state
        .vcc()
        .lock()
        .unwrap()
        .configure(&config)
        .map_err(JsonError::vcc_error)?;
    status_json(&state, false)
}

pub async fn put_deconfigure(
    State(state): State<AppState>,
    Json(config): Json<Config>,
) -> Result<Json<Status>, JsonError> {
    state
        .vcc()
        .lock()
        .unwrap()
        .deconfigure(&config)
        .map_err(JsonError::vcc_error)?;
    status_json(&state, false)
}

pub async fn put_gains(
    State(state): State<AppState>,
    Json(gains): Json<GainsConfig>,
) -> Result<Json<Status>, JsonError> {
    state
        .vcc()
        .lock()
        .unwrap()
        .configure_gains(&gains)
        .map_err(JsonError::vcc_error)?;
    status_json(&state, false)
}

pub async fn post_recover(State(state): State<AppState>) -> Result<Json<Status>, JsonError> {
    state
        .vcc()
        .lock()
        .unwrap()
        .recover()
        .map_err(JsonError::vcc_error)?;
    status_json(&state, false)
}

pub async fn post_start(State(state): State<AppState>) -> Result<(), JsonError> {
    state
        .vcc()
        .lock()
        .unwrap()
        .start()
        .map_err(JsonError::vcc_error)
}

pub async fn post_stop(
    State(state): State<AppState>,
    stop: Option<Json<Stop>>,
) -> Result<(), JsonError> {
    let Stop { force } = stop.map(|Json(stop)| stop).unwrap_or_default();
    state
        .vcc()
        .lock()
        .unwrap()
        .stop(force)
        .map_err(JsonError::vcc_error)
}

fn register_address(address: &str) -> Result<usize, JsonError> {
    parse_address(address).map_err(|err| {
        JsonError::client_error(anyhow::anyhow!("invalid register address {address}: {err}"))
    })
}

pub async fn get_register(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<Register>, JsonError> {
    let address = register_address(&address)?;
    let value = state
        .vcc()
        .lock()
        .unwrap()
        .register_read(address)
        .map_err(JsonError::vcc_error)?;
    Ok(Json(Register {
        address: address as u64,
        value,
    }))
}

pub async fn put_register(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Json(put): Json<PutRegister>,
) -> Result<Json<Register>, JsonError> {
    let address = register_address(&address)?;
    state
        .vcc()
        .lock()
        .unwrap()
        .register_write(address, put.value)
        .map_err(JsonError::vcc_error)?;
    Ok(Json(Register {
        address: address as u64,
        value: put.value,
    }))
}
