use serde::{Deserialize, Serialize};
use storefront::{SearchMode, Session};

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub id: String,
    pub created_at: String,
    pub search_mode: SearchMode,
    pub selected_category: Option<String>,
    pub selected_gender: Option<String>,
    pub search_query: String,
    pub uploaded_image: Option<String>,
}

impl From<&Session> for SessionResponse {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            created_at: session.created_at.to_rfc3339(),
            search_mode: session.search_mode,
            selected_category: session.selected_category.clone(),
            selected_gender: session.selected_gender.clone(),
            search_query: session.search_query.clone(),
            uploaded_image: session.uploaded_image.as_ref().map(|i| i.name.clone()),
        }
    }
}

/// Any field left out keeps its current value
#[derive(Debug, Default, Deserialize)]
pub struct SelectionRequest {
    pub category: Option<String>,
    /// "None" clears the filter
    pub gender: Option<String>,
    pub query: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ReviewParams {
    pub review_item_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InvalidateResponse {
    pub removed: usize,
}
