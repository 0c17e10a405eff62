use super::*;

pub async fn block_credential_handler(
    State(state): State<AppState>,
    payload: Result<Json<BlockRequest>, JsonRejection>,
) -> AdminResponse<BlockRecordResponse> {
    let result = match payload {
        Ok(Json(payload)) => state
            .abuse_block_service
            .block(
                payload.credential.as_str(),
                payload.reason.as_str(),
                payload.ip_address,
                payload.user_agent,
            )
            .await
            .map(Into::into),
        Err(rejection) => rejected(rejection),
    };
    respond("block_credential", result)
}

pub async fn block_status_handler(
    State(state): State<AppState>,
    credential: Result<Path<String>, PathRejection>,
) -> AdminResponse<BlockStatusResponse> {
    let result = match credential {
        Ok(Path(credential)) => state
            .abuse_block_service
            .is_blocked(credential.as_str())
            .await
            .map(Into::into),
        Err(rejection) => rejected(rejection),
    };
    respond("block_status", result)
}

pub async fn unblock_credential_handler(
    State(state): State<AppState>,
    credential: Result<Path<String>, PathRejection>,
) -> AdminResponse<DeletedResponse> {
    let result = match credential {
        Ok(Path(credential)) => state
            .abuse_block_service
            .unblock(credential.as_str())
            .await
            .map(|deleted| DeletedResponse { deleted }),
        Err(rejection) => rejected(rejection),
    };
    respond("unblock_credential", result)
}

pub async fn reactivate_all_handler(
    State(state): State<AppState>,
) -> AdminResponse<RemovedCountResponse> {
    let result = state
        .abuse_block_service
        .reactivate_all()
        .await
        .map(|removed| RemovedCountResponse { removed });
    respond("blocks_reactivate_all", result)
}
