//! Per-session interaction state
//!
//! A [`Session`] is created when a user arrives and dropped when they leave.
//! It only holds selections; the shared database pool and caches live in
//! [`crate::Storefront`] and are passed alongside it to every handler.

use crate::error::{Result, StorefrontError};
use crate::types::SessionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// Upload formats accepted for image search
pub const ACCEPTED_IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Label of the "no filter" gender choice
pub const NO_GENDER: &str = "None";

/// Which search the session last ran
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    None,
    Text,
    Image,
}

/// An image uploaded for similarity search
#[derive(Clone, PartialEq, Eq)]
pub struct UploadedImage {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for UploadedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadedImage")
            .field("name", &self.name)
            .field("size", &self.bytes.len())
            .finish()
    }
}

impl UploadedImage {
    /// Accept a `.jpg`, `.jpeg` or `.png` upload with content
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Result<Self> {
        let name = name.into();
        let extension = Path::new(&name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        if !ACCEPTED_IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            return Err(StorefrontError::Validation(format!(
                "{name}: only jpg, jpeg and png images can be searched"
            )));
        }
        if bytes.is_empty() {
            return Err(StorefrontError::Validation(format!("{name} is empty")));
        }
        Ok(Self { name, bytes })
    }

    /// Read an upload from disk
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let bytes = std::fs::read(path)?;
        Self::new(name, bytes)
    }
}

/// Turn a gender choice from a front end into an optional filter
pub fn parse_gender_choice(choice: Option<&str>) -> Option<String> {
    choice
        .map(str::trim)
        .filter(|g| !g.is_empty() && !g.eq_ignore_ascii_case(NO_GENDER))
        .map(str::to_string)
}

/// Selections and search state of one user session
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    pub selected_category: Option<String>,
    pub search_query: String,
    pub selected_gender: Option<String>,
    pub uploaded_image: Option<UploadedImage>,
    pub search_mode: SearchMode,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            selected_category: None,
            search_query: String::new(),
            selected_gender: None,
            uploaded_image: None,
            search_mode: SearchMode::None,
        }
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.search_query = query.into();
    }

    pub fn upload_image(&mut self, image: UploadedImage) {
        self.uploaded_image = Some(image);
    }

    /// Switch to text search; the query must not be blank
    pub fn begin_text_search(&mut self) -> Result<&str> {
        if self.search_query.trim().is_empty() {
            return Err(StorefrontError::Validation(
                "enter a search term before searching with text".into(),
            ));
        }
        self.search_mode = SearchMode::Text;
        Ok(self.search_query.trim())
    }

    /// Switch to image search; an image must have been uploaded
    pub fn begin_image_search(&mut self) -> Result<&UploadedImage> {
        match self.uploaded_image {
            Some(ref image) => {
                self.search_mode = SearchMode::Image;
                Ok(image)
            }
            None => Err(StorefrontError::Validation(
                "upload an image before searching with an image".into(),
            )),
        }
    }

    /// Back to the initial search state. Category and gender selections stay.
    pub fn reset(&mut self) {
        self.search_query.clear();
        self.uploaded_image = None;
        self.search_mode = SearchMode::None;
    }
}
