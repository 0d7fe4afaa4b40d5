//! Media field updates.
//!
//! A media field stores a list of paths. On save the editor submits a JSON
//! array of [`FileItem`] descriptors; how files are handled depends on the
//! field's editor:
//!
//! - [`FieldEditor::Full`] picks existing media from the library, so no
//!   files move.
//! - [`FieldEditor::Limited`] uploads into the temp folder and relies on
//!   [`LimitedEditorFileService`] to commit, trash, or discard files.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

use crate::file::{
    ContentItemId, FileHandlingError, FileItem, LimitedEditorFileService, final_paths,
};

/// Editor used for a media field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldEditor {
    /// Media library picker.
    #[default]
    Full,
    /// Inline upload without the library browser.
    Limited,
}

impl FieldEditor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "Full",
            Self::Limited => "Limited",
        }
    }
}

impl FromStr for FieldEditor {
    type Err = std::convert::Infallible;

    /// Case-insensitive; anything unrecognized is the full editor.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("limited") {
            Ok(Self::Limited)
        } else {
            Ok(Self::Full)
        }
    }
}

impl From<String> for FieldEditor {
    fn from(value: String) -> Self {
        match value.parse() {
            Ok(editor) => editor,
            Err(never) => match never {},
        }
    }
}

impl From<FieldEditor> for String {
    fn from(value: FieldEditor) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for FieldEditor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-field settings from the content type definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MediaFieldSettings {
    /// Field label shown in validation messages.
    pub display_name: String,
    pub editor: FieldEditor,
    /// At least one media item is required.
    pub required: bool,
    /// More than one media item is allowed.
    pub multiple: bool,
}

/// Stored value of a media field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaField {
    #[serde(default)]
    pub paths: Vec<String>,
}

impl MediaField {
    pub fn new(paths: Vec<String>) -> Self {
        Self { paths }
    }

    /// Descriptors handed to the editor when editing starts.
    pub fn edit_items(&self) -> Vec<FileItem> {
        self.paths.iter().cloned().map(FileItem::existing).collect()
    }
}

/// User-visible validation messages from a field update.
///
/// Messages never include storage paths.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldUpdateError {
    #[error("{0}: There was an error handling the files.")]
    FileHandling(String),

    #[error("{0}: A media is required.")]
    Required(String),

    #[error("{0}: Selecting multiple media is forbidden.")]
    MultipleForbidden(String),
}

/// Result of applying a submission to a field.
///
/// When `errors` is non-empty the update must not be persisted; files that
/// were already moved stay where they are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldUpdateOutcome {
    pub field: MediaField,
    /// The submitted items, with committed paths rewritten.
    pub items: Vec<FileItem>,
    pub errors: Vec<FieldUpdateError>,
}

impl FieldUpdateOutcome {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// File handling applied on save, selected by [`FieldEditor`].
#[async_trait]
pub trait FieldFileStrategy: Send + Sync {
    async fn apply(
        &self,
        items: &mut [FileItem],
        content_item_id: &str,
    ) -> Result<(), FileHandlingError>;
}

/// No file handling; paths are used as submitted.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

#[async_trait]
impl FieldFileStrategy for PassThrough {
    async fn apply(
        &self,
        _items: &mut [FileItem],
        _content_item_id: &str,
    ) -> Result<(), FileHandlingError> {
        Ok(())
    }
}

#[async_trait]
impl FieldFileStrategy for LimitedEditorFileService {
    async fn apply(
        &self,
        items: &mut [FileItem],
        content_item_id: &str,
    ) -> Result<(), FileHandlingError> {
        let content_item_id = ContentItemId::parse(content_item_id)?;
        self.handle_files_on_field_update(items, &content_item_id)
            .await?;
        Ok(())
    }
}

/// Applies editor submissions to media fields.
#[derive(Debug)]
pub struct MediaFieldService {
    limited: Arc<LimitedEditorFileService>,
    full: PassThrough,
}

impl MediaFieldService {
    pub fn new(limited: Arc<LimitedEditorFileService>) -> Self {
        Self {
            limited,
            full: PassThrough,
        }
    }

    /// Strategy for an editor.
    pub fn strategy(&self, editor: FieldEditor) -> &dyn FieldFileStrategy {
        match editor {
            FieldEditor::Full => &self.full,
            FieldEditor::Limited => self.limited.as_ref(),
        }
    }

    /// Apply a submitted JSON array of descriptors to a field.
    ///
    /// Fails only if the submission is not valid JSON; file handling and
    /// validation problems are reported in the outcome.
    pub async fn update(
        &self,
        settings: &MediaFieldSettings,
        submitted: &str,
        content_item_id: &str,
    ) -> Result<FieldUpdateOutcome, serde_json::Error> {
        let mut items: Vec<FileItem> = serde_json::from_str(submitted)?;
        let mut errors = Vec::new();

        if let Err(e) = self
            .strategy(settings.editor)
            .apply(&mut items, content_item_id)
            .await
        {
            error!(
                error = ?e,
                content_item_id = %content_item_id,
                field = %settings.display_name,
                "failed to handle media field files"
            );
            errors.push(FieldUpdateError::FileHandling(settings.display_name.clone()));
        }

        let field = MediaField::new(final_paths(&items));

        if settings.required && field.paths.is_empty() {
            errors.push(FieldUpdateError::Required(settings.display_name.clone()));
        }
        if field.paths.len() > 1 && !settings.multiple {
            errors.push(FieldUpdateError::MultipleForbidden(
                settings.display_name.clone(),
            ));
        }

        debug!(
            field = %settings.display_name,
            editor = %settings.editor,
            paths = field.paths.len(),
            errors = errors.len(),
            "media field updated"
        );

        Ok(FieldUpdateOutcome {
            field,
            items,
            errors,
        })
    }
}
