//! Group lifecycle and membership-control handlers (spec §6): create,
//! delete, join, leave, producer, announce, deniedlist, schema, startsync.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use grove_core::error::GroveError;
use grove_core::membership::{AnnounceItem, AnnounceResult, DenyUserItem, ProducerItem, SchemaItem};
use grove_core::types::{GroupId, SignPublicKey};
use grove_group::{CreateGroupParams, JoinPayload};

use crate::dto::*;
use crate::error::ApiError;
use crate::state::SharedState;

fn parse_pub_key(hex_str: &str) -> Result<SignPublicKey, ApiError> {
    hex::decode(hex_str)
        .map(SignPublicKey)
        .map_err(|e| ApiError(GroveError::Validation(format!("invalid hex pubkey: {e}"))))
}

// ── Create ───────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateGroupRequest {
    pub group_name: String,
    pub consensus_type: String,
    pub encrypt_type: String,
    pub app_key: String,
}

#[derive(Serialize)]
pub struct CreateGroupResponse {
    pub group_id: String,
    pub group_name: String,
    pub genesis_block: BlockDto,
    pub owner_pub_key: String,
    pub owner_encrypt_pub_key: String,
    pub consensus_type: &'static str,
    pub encrypt_type: &'static str,
    pub cipher_key: String,
    pub app_key: String,
    pub signature: String,
}

pub async fn create_group(
    State(state): State<SharedState>,
    Json(body): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<CreateGroupResponse>), ApiError> {
    let params = CreateGroupParams {
        group_name: body.group_name,
        consensus_type: parse_consensus_type(&body.consensus_type)?,
        encrypt_type: parse_encrypt_type(&body.encrypt_type)?,
        app_key: body.app_key,
    };
    let result = state.group_mgr.create_group(params, &state.passphrase).await?;
    Ok((
        StatusCode::OK,
        Json(CreateGroupResponse {
            group_id: result.group_id.to_string(),
            group_name: result.group_name,
            genesis_block: BlockDto::from(&result.genesis_block),
            owner_pub_key: result.owner_pub_key.to_hex(),
            owner_encrypt_pub_key: result.owner_encrypt_pub_key.to_hex(),
            consensus_type: consensus_type_name(result.consensus_type),
            encrypt_type: encrypt_type_name(result.encrypt_type),
            cipher_key: result.cipher_key.to_hex(),
            app_key: result.app_key,
            signature: hex::encode(&result.signature.0),
        }),
    ))
}

// ── Delete ───────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct DeleteGroupRequest {
    pub group_id: String,
}

#[derive(Serialize)]
pub struct RmGroupResponse {
    pub group_id: String,
    pub owner_pub_key: String,
    pub signature: String,
}

pub async fn delete_group(
    State(state): State<SharedState>,
    Json(body): Json<DeleteGroupRequest>,
) -> Result<Json<RmGroupResponse>, ApiError> {
    let group_id = GroupId(body.group_id);
    let result = state.group_mgr.delete_group(&group_id).await?;
    Ok(Json(RmGroupResponse {
        group_id: result.group_id.to_string(),
        owner_pub_key: result.owner_pub_key.to_hex(),
        signature: hex::encode(&result.signature.0),
    }))
}

// ── Join ─────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct JoinGroupResponse {
    pub group_id: String,
    pub group_name: String,
    pub owner_pub_key: String,
    pub user_pub_key: String,
    pub user_encrypt_pub_key: String,
    pub consensus_type: &'static str,
    pub encrypt_type: &'static str,
    pub cipher_key: String,
    pub app_key: String,
    pub signature: String,
}

/// The request body is the `JoinPayload` a prospective member received out
/// of band — it already carries the owner's covering signature, so it
/// doubles as the wire type here instead of a bespoke DTO.
pub async fn join_group(
    State(state): State<SharedState>,
    Json(payload): Json<JoinPayload>,
) -> Result<Json<JoinGroupResponse>, ApiError> {
    let result = state.group_mgr.join_group(payload, &state.passphrase).await?;
    Ok(Json(JoinGroupResponse {
        group_id: result.group_id.to_string(),
        group_name: result.group_name,
        owner_pub_key: result.owner_pub_key.to_hex(),
        user_pub_key: result.user_pub_key.to_hex(),
        user_encrypt_pub_key: result.user_encrypt_pub_key.to_hex(),
        consensus_type: consensus_type_name(result.consensus_type),
        encrypt_type: encrypt_type_name(result.encrypt_type),
        cipher_key: result.cipher_key.to_hex(),
        app_key: result.app_key,
        signature: hex::encode(&result.signature.0),
    }))
}

// ── Leave ────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct LeaveGroupRequest {
    pub group_id: String,
}

#[derive(Serialize)]
pub struct LeaveGroupResponse {
    pub group_id: String,
    pub signature: String,
}

pub async fn leave_group(
    State(state): State<SharedState>,
    Json(body): Json<LeaveGroupRequest>,
) -> Result<Json<LeaveGroupResponse>, ApiError> {
    let group_id = GroupId(body.group_id);
    let result = state.group_mgr.leave_group(&group_id).await?;
    Ok(Json(LeaveGroupResponse {
        group_id: result.group_id.to_string(),
        signature: hex::encode(&result.signature.0),
    }))
}

// ── Producer (owner-only) ───────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ProducerChangeRequest {
    pub group_id: String,
    pub producer_pub_key: String,
    pub action: String,
}

#[derive(Serialize)]
pub struct TrxAcceptedResponse {
    pub trx_id: String,
}

pub async fn change_producer(
    State(state): State<SharedState>,
    Json(body): Json<ProducerChangeRequest>,
) -> Result<Json<TrxAcceptedResponse>, ApiError> {
    let group_id = GroupId(body.group_id);
    let group = state
        .group_mgr
        .get(&group_id)
        .await
        .ok_or_else(|| ApiError(GroveError::GroupNotFound(group_id.to_string())))?;
    let item = group.item();
    if !group.is_owner(&item.user_sign_pub_key) {
        return Err(ApiError(GroveError::NotOwner));
    }
    let producer_pub_key = parse_pub_key(&body.producer_pub_key)?;
    let producer_item = ProducerItem {
        group_id,
        producer_pub_key,
        action: parse_producer_action(&body.action)?,
        blocks_produced: 0,
    };
    let trx = group.chain().send_producer_change(&producer_item).await?;
    Ok(Json(TrxAcceptedResponse { trx_id: trx.trx_id.to_hex() }))
}

// ── Announce (self) ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct AnnounceRequest {
    pub group_id: String,
    pub announce_type: String,
}

pub async fn announce(
    State(state): State<SharedState>,
    Json(body): Json<AnnounceRequest>,
) -> Result<Json<TrxAcceptedResponse>, ApiError> {
    let group_id = GroupId(body.group_id);
    let group = state
        .group_mgr
        .get(&group_id)
        .await
        .ok_or_else(|| ApiError(GroveError::GroupNotFound(group_id.to_string())))?;
    let item = group.item();
    let announce_item = AnnounceItem {
        group_id,
        announce_type: parse_announce_type(&body.announce_type)?,
        sign_pub_key: item.user_sign_pub_key,
        encrypt_pub_key: item.user_encrypt_pub_key,
        result: AnnounceResult::Announced,
    };
    let trx = group.chain().send_announce(&announce_item).await?;
    Ok(Json(TrxAcceptedResponse { trx_id: trx.trx_id.to_hex() }))
}

// ── Denied list (owner-only) ─────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct DeniedListRequest {
    pub group_id: String,
    pub user_sign_pub_key: String,
    pub action: String,
}

pub async fn update_denied_list(
    State(state): State<SharedState>,
    Json(body): Json<DeniedListRequest>,
) -> Result<Json<TrxAcceptedResponse>, ApiError> {
    let group_id = GroupId(body.group_id);
    let group = state
        .group_mgr
        .get(&group_id)
        .await
        .ok_or_else(|| ApiError(GroveError::GroupNotFound(group_id.to_string())))?;
    let item = group.item();
    if !group.is_owner(&item.user_sign_pub_key) {
        return Err(ApiError(GroveError::NotOwner));
    }
    let user_sign_pub_key = parse_pub_key(&body.user_sign_pub_key)?;
    let deny_item = DenyUserItem {
        group_id,
        user_sign_pub_key,
        action: parse_upsert_action(&body.action)?,
    };
    let trx = group.chain().send_deny_user(&deny_item).await?;
    Ok(Json(TrxAcceptedResponse { trx_id: trx.trx_id.to_hex() }))
}

// ── Schema ───────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct SchemaRequest {
    pub group_id: String,
    pub type_name: String,
    pub schema_json: String,
    pub action: String,
}

pub async fn upsert_schema(
    State(state): State<SharedState>,
    Json(body): Json<SchemaRequest>,
) -> Result<Json<TrxAcceptedResponse>, ApiError> {
    let group_id = GroupId(body.group_id);
    let group = state
        .group_mgr
        .get(&group_id)
        .await
        .ok_or_else(|| ApiError(GroveError::GroupNotFound(group_id.to_string())))?;
    let schema_item = SchemaItem {
        group_id,
        type_name: body.type_name,
        schema_json: body.schema_json,
        action: parse_upsert_action(&body.action)?,
    };
    let trx = group.chain().send_schema(&schema_item).await?;
    Ok(Json(TrxAcceptedResponse { trx_id: trx.trx_id.to_hex() }))
}

// ── Start sync ───────────────────────────────────────────────────────────────

pub async fn start_sync(
    State(state): State<SharedState>,
    Path(group_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let group_id = GroupId(group_id);
    let group = state
        .group_mgr
        .get(&group_id)
        .await
        .ok_or_else(|| ApiError(GroveError::GroupNotFound(group_id.to_string())))?;
    group.start_sync().await?;
    Ok(StatusCode::OK)
}
