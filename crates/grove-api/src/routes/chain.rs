//! `GET /api/v1/block/:group_id/:block_id` and `GET /api/v1/trx/:group_id/:trx_id`
//! (spec §6).

use axum::extract::{Path, State};
use axum::Json;

use grove_core::error::GroveError;
use grove_core::types::{BlockId, GroupId, TrxId};

use crate::dto::{BlockDto, TrxDto};
use crate::error::ApiError;
use crate::state::SharedState;

pub async fn get_block(
    State(state): State<SharedState>,
    Path((group_id, block_id)): Path<(String, String)>,
) -> Result<Json<BlockDto>, ApiError> {
    let group_id = GroupId(group_id);
    let block_id = BlockId::from_hex(&block_id)
        .map_err(|e| ApiError(GroveError::Validation(format!("invalid block_id: {e}"))))?;
    let group = state
        .group_mgr
        .get(&group_id)
        .await
        .ok_or_else(|| ApiError(GroveError::GroupNotFound(group_id.to_string())))?;
    let block = group.get_block(&block_id)?;
    Ok(Json(BlockDto::from(&block)))
}

pub async fn get_trx(
    State(state): State<SharedState>,
    Path((group_id, trx_id)): Path<(String, String)>,
) -> Result<Json<TrxDto>, ApiError> {
    let group_id = GroupId(group_id);
    let trx_id = TrxId::from_hex(&trx_id)
        .map_err(|e| ApiError(GroveError::Validation(format!("invalid trx_id: {e}"))))?;
    let group = state
        .group_mgr
        .get(&group_id)
        .await
        .ok_or_else(|| ApiError(GroveError::GroupNotFound(group_id.to_string())))?;
    let (trx, plain) = group.get_trx(&trx_id)?;
    Ok(Json(TrxDto::from_decrypted(&trx, &plain)))
}
