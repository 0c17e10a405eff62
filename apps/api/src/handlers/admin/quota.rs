use moodcap_domain::IdentityKey;

use super::*;

pub async fn quota_status_handler(
    State(state): State<AppState>,
    identity: Result<Path<String>, PathRejection>,
) -> AdminResponse<QuotaStatusResponse> {
    let result = match identity {
        Ok(Path(identity)) => match identity.parse::<IdentityKey>() {
            Ok(identity) => state
                .quota_service
                .check_status(&identity)
                .await
                .map(Into::into),
            Err(error) => Err(error),
        },
        Err(rejection) => rejected(rejection),
    };
    respond("quota_status", result)
}

pub async fn reset_quota_windows_handler(
    State(state): State<AppState>,
) -> AdminResponse<RemovedCountResponse> {
    let result = state
        .quota_service
        .reset_all_windows()
        .await
        .map(|removed| RemovedCountResponse { removed });
    respond("quota_reset_all", result)
}
