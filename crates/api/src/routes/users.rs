//! User directory routes

use std::collections::HashSet;

use axum::{extract::State, Extension, Json};
use serde::Serialize;
use tandem_shared::{UserId, UserProfile};

use crate::{auth::AuthUser, error::ApiResult, state::AppState};

/// Another user as seen by the caller
#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub id: UserId,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_friend: bool,
    pub request_sent: bool,
}

#[derive(Debug, Serialize)]
pub struct UsersResponse {
    pub payload: Vec<UserSummary>,
}

#[derive(Debug, Serialize)]
pub struct FriendsResponse {
    pub payload: Vec<UserProfile>,
}

/// Everyone except the caller, with relationship flags
pub async fn list_users(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<UsersResponse>> {
    let users = state.store.list_users_except(auth_user.user_id).await?;
    let friends: HashSet<UserId> = state
        .store
        .friends_of(auth_user.user_id)
        .await?
        .into_iter()
        .map(|f| f.id)
        .collect();

    let mut payload = Vec::with_capacity(users.len());
    for user in users {
        let request_sent = state
            .store
            .request_exists(auth_user.user_id, user.id)
            .await?;
        payload.push(UserSummary {
            is_friend: friends.contains(&user.id),
            request_sent,
            id: user.id,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
        });
    }

    Ok(Json(UsersResponse { payload }))
}

/// The caller's friends
pub async fn list_friends(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<FriendsResponse>> {
    let payload = state.store.friends_of(auth_user.user_id).await?;
    Ok(Json(FriendsResponse { payload }))
}
