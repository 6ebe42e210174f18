use reqwest::blocking::multipart::{Form as MultipartForm, Part as MultipartPart};
use roseglass_contracts::analysis::QualityTier;
use roseglass_contracts::receipts::{FileManifest, RequestManifest};

use crate::config::DEFAULT_MAX_IMAGES;
use crate::error::{AnalysisError, PROFILE_IMAGES_REQUIRED};
use crate::staging::ImageFile;

pub const PROFILE_IMAGES_FIELD: &str = "profile_images";
pub const CONVERSATION_IMAGES_FIELD: &str = "conversation_images";
pub const USER_CONTEXT_FIELD: &str = "user_context";
pub const USE_PREMIUM_FIELD: &str = "use_premium";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub profile_images: Vec<ImageFile>,
    pub conversation_images: Vec<ImageFile>,
    pub user_context: Option<String>,
    pub use_premium: bool,
}

impl AnalysisRequest {
    pub fn tier(&self) -> QualityTier {
        QualityTier::from_premium_flag(self.use_premium)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    File(ImageFile),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadField {
    pub name: &'static str,
    pub value: FieldValue,
}

/// Ordered multipart fields, ready to turn into a form body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisPayload {
    fields: Vec<PayloadField>,
}

impl AnalysisPayload {
    pub fn fields(&self) -> &[PayloadField] {
        &self.fields
    }

    pub fn files(&self, name: &str) -> Vec<&ImageFile> {
        self.fields
            .iter()
            .filter(|field| field.name == name)
            .filter_map(|field| match &field.value {
                FieldValue::File(file) => Some(file),
                FieldValue::Text(_) => None,
            })
            .collect()
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .filter(|field| field.name == name)
            .find_map(|field| match &field.value {
                FieldValue::Text(text) => Some(text.as_str()),
                FieldValue::File(_) => None,
            })
    }

    pub fn profile_count(&self) -> usize {
        self.files(PROFILE_IMAGES_FIELD).len()
    }

    pub fn conversation_count(&self) -> usize {
        self.files(CONVERSATION_IMAGES_FIELD).len()
    }

    pub fn use_premium(&self) -> bool {
        self.text(USE_PREMIUM_FIELD) == Some("true")
    }

    /// Byte-free description for logs and receipts.
    pub fn manifest(&self) -> RequestManifest {
        let files = self
            .fields
            .iter()
            .filter_map(|field| match &field.value {
                FieldValue::File(file) => Some(FileManifest::describe(
                    field.name,
                    file.name(),
                    file.mime_type(),
                    file.bytes(),
                )),
                FieldValue::Text(_) => None,
            })
            .collect();
        RequestManifest {
            files,
            user_context: self.text(USER_CONTEXT_FIELD).map(str::to_string),
            use_premium: self.use_premium(),
        }
    }

    pub fn to_form(&self) -> Result<MultipartForm, AnalysisError> {
        let mut form = MultipartForm::new();
        for field in &self.fields {
            form = match &field.value {
                FieldValue::File(file) => {
                    let part = MultipartPart::bytes(file.bytes().to_vec())
                        .file_name(file.name().to_string())
                        .mime_str(file.mime_type())
                        .map_err(|_| {
                            AnalysisError::validation(format!(
                                "invalid MIME type '{}' for {}",
                                file.mime_type(),
                                file.name()
                            ))
                        })?;
                    form.part(field.name, part)
                }
                FieldValue::Text(text) => form.text(field.name, text.clone()),
            };
        }
        Ok(form)
    }
}

/// Validates an [`AnalysisRequest`] and lays it out as multipart fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisRequestBuilder {
    max_images: usize,
}

impl Default for AnalysisRequestBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IMAGES)
    }
}

impl AnalysisRequestBuilder {
    pub fn new(max_images: usize) -> Self {
        Self {
            max_images: max_images.max(1),
        }
    }

    pub fn build(&self, request: &AnalysisRequest) -> Result<AnalysisPayload, AnalysisError> {
        if request.profile_images.is_empty() {
            return Err(AnalysisError::validation(PROFILE_IMAGES_REQUIRED));
        }
        self.check_slot("profile", &request.profile_images)?;
        self.check_slot("conversation", &request.conversation_images)?;

        let mut fields = Vec::with_capacity(
            request.profile_images.len() + request.conversation_images.len() + 2,
        );
        for file in &request.profile_images {
            fields.push(PayloadField {
                name: PROFILE_IMAGES_FIELD,
                value: FieldValue::File(file.clone()),
            });
        }
        for file in &request.conversation_images {
            fields.push(PayloadField {
                name: CONVERSATION_IMAGES_FIELD,
                value: FieldValue::File(file.clone()),
            });
        }
        if let Some(context) = request
            .user_context
            .as_deref()
            .filter(|value| !value.trim().is_empty())
        {
            fields.push(PayloadField {
                name: USER_CONTEXT_FIELD,
                value: FieldValue::Text(context.to_string()),
            });
        }
        fields.push(PayloadField {
            name: USE_PREMIUM_FIELD,
            value: FieldValue::Text(request.tier().form_value().to_string()),
        });
        Ok(AnalysisPayload { fields })
    }

    fn check_slot(&self, slot: &str, files: &[ImageFile]) -> Result<(), AnalysisError> {
        if files.len() > self.max_images {
            return Err(AnalysisError::validation(format!(
                "maximum {} {slot} images allowed",
                self.max_images
            )));
        }
        if let Some(file) = files.iter().find(|file| !file.is_supported_image()) {
            return Err(AnalysisError::validation(format!(
                "unsupported image type '{}' for {}",
                file.mime_type(),
                file.name()
            )));
        }
        Ok(())
    }
}
