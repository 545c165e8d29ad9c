use axum::{
    Extension, Json,
    extract::{Query, State},
    response::IntoResponse,
};

use chatline_db::last_page;
use chatline_db::models::CustomerRow;
use chatline_types::api::{
    ContactView, ContactsResponse, CustomerView, FavoriteResponse, FavoriteView, FavoritesResponse,
    IdInfoResponse, IdRequest, PageQuery, SearchQuery, SearchResponse, SharedPhotosResponse,
    UserIdRequest,
};
use chatline_types::models::{AttachmentCategory, AttachmentRecord, Principal};

use crate::attachment::{avatar_url, public_locator};
use crate::error::ApiResult;
use crate::state::{AppState, AppStateInner};
use crate::storage::ObjectStore;

pub fn customer_view(store: &dyn ObjectStore, row: CustomerRow) -> CustomerView {
    CustomerView {
        avatar: avatar_url(store, row.avatar.as_deref()),
        id: row.id,
        name: row.name,
        email: row.email,
        active_status: row.active_status,
        dark_mode: row.dark_mode,
        messenger_color: row.messenger_color,
    }
}

fn paging(state: &AppStateInner, page: Option<u32>, per_page: Option<u32>) -> (u32, u32) {
    (
        page.unwrap_or(1).max(1),
        per_page.unwrap_or(state.per_page).clamp(1, 100),
    )
}

/// GET /contacts
pub async fn get_contacts(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<PageQuery>,
) -> ApiResult<impl IntoResponse> {
    let (page, per_page) = paging(&state, query.page, query.per_page);
    let db = state.db.clone();
    let viewer = principal.id;
    let result = tokio::task::spawn_blocking(move || db.list_contacts(viewer, page, per_page)).await??;

    let contacts = result
        .items
        .into_iter()
        .map(|row| ContactView {
            customer: customer_view(state.store.as_ref(), row.customer),
            max_created_at: row.max_created_at,
        })
        .collect();

    Ok(Json(ContactsResponse {
        contacts,
        total: result.total,
        last_page: last_page(result.total, per_page),
    }))
}

/// POST /favorite
pub async fn toggle_favorite(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<UserIdRequest>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let viewer = principal.id;
    let now_favorite =
        tokio::task::spawn_blocking(move || db.toggle_favorite(viewer, req.user_id)).await??;

    Ok(Json(FavoriteResponse {
        status: u8::from(now_favorite),
    }))
}

/// GET /favorites
pub async fn get_favorites(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let viewer = principal.id;
    let rows = tokio::task::spawn_blocking(move || {
        db.list_favorites(viewer)?
            .into_iter()
            .map(|fav| -> anyhow::Result<_> {
                let user = db.get_customer(fav.favorite_id)?;
                Ok((fav, user))
            })
            .collect::<anyhow::Result<Vec<_>>>()
    })
    .await??;

    let favorites: Vec<FavoriteView> = rows
        .into_iter()
        .map(|(fav, user)| FavoriteView {
            id: fav.id,
            user_id: fav.user_id,
            favorite_id: fav.favorite_id,
            created_at: fav.created_at,
            user: user.map(|u| customer_view(state.store.as_ref(), u)),
        })
        .collect();

    Ok(Json(FavoritesResponse {
        total: favorites.len(),
        favorites,
    }))
}

/// GET /search
pub async fn search(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<impl IntoResponse> {
    let (page, per_page) = paging(&state, query.page, query.per_page);
    let input = query.input.unwrap_or_default().trim().to_string();
    let db = state.db.clone();
    let viewer = principal.id;
    let result =
        tokio::task::spawn_blocking(move || db.search_customers(viewer, &input, page, per_page)).await??;

    let records = result
        .items
        .into_iter()
        .map(|row| customer_view(state.store.as_ref(), row))
        .collect();

    Ok(Json(SearchResponse {
        records,
        total: result.total,
        last_page: last_page(result.total, per_page),
    }))
}

/// GET /shared-photos
pub async fn shared_photos(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<UserIdRequest>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let viewer = principal.id;
    let columns =
        tokio::task::spawn_blocking(move || db.conversation_attachments(viewer, query.user_id)).await??;

    let shared = columns
        .iter()
        .filter_map(|column| AttachmentRecord::from_column(Some(column)))
        .filter(|record| record.category == AttachmentCategory::Image)
        .map(|record| public_locator(state.store.as_ref(), &record.new_name))
        .collect();

    Ok(Json(SharedPhotosResponse { shared }))
}

/// POST /idInfo
pub async fn id_info(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<IdRequest>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let viewer = principal.id;
    let (favorite, customer) = tokio::task::spawn_blocking(move || {
        Ok::<_, anyhow::Error>((db.is_favorite(viewer, req.id)?, db.get_customer(req.id)?))
    })
    .await??;

    let fetch = customer.map(|row| customer_view(state.store.as_ref(), row));
    let user_avatar = fetch.as_ref().map(|c| c.avatar.clone());

    Ok(Json(IdInfoResponse {
        favorite,
        fetch,
        user_avatar,
    }))
}
