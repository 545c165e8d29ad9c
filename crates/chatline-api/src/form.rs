use std::collections::HashMap;

use axum::extract::Multipart;
use bytes::BytesMut;
use tracing::debug;

use crate::attachment::Upload;
use crate::error::{ApiError, ApiResult};

/// A parsed multipart body: text fields and file fields by name.
#[derive(Debug, Default)]
pub struct Form {
    texts: HashMap<String, String>,
    files: HashMap<String, Upload>,
}

impl Form {
    /// Reads every field. File data is buffered only up to `max_file_bytes`;
    /// past that the rest of the part is drained and the upload is kept as
    /// an oversized marker so later fields are still read.
    pub async fn read(mut multipart: Multipart, max_file_bytes: u64) -> ApiResult<Self> {
        let mut form = Form::default();

        while let Some(mut field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {}", e)))?
        {
            let name = field.name().unwrap_or("").to_string();
            if name.is_empty() {
                continue;
            }

            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let mut buf = BytesMut::new();
                    let mut size: u64 = 0;
                    while let Some(chunk) = field
                        .chunk()
                        .await
                        .map_err(|e| ApiError::BadRequest(format!("Failed to read file data: {}", e)))?
                    {
                        size += chunk.len() as u64;
                        if size < max_file_bytes {
                            buf.extend_from_slice(&chunk);
                        } else if !buf.is_empty() {
                            buf = BytesMut::new();
                        }
                    }
                    // Browsers submit an empty part for an unused file input.
                    if file_name.is_empty() || size == 0 {
                        continue;
                    }
                    let upload = if size < max_file_bytes {
                        Upload::new(file_name, buf.freeze())
                    } else {
                        debug!(field = %name, size, "Upload exceeds the size limit, data dropped");
                        Upload::oversized(file_name, size)
                    };
                    form.files.insert(name, upload);
                }
                None => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| ApiError::BadRequest(format!("Failed to read field {}: {}", name, e)))?;
                    form.texts.insert(name, text);
                }
            }
        }

        Ok(form)
    }

    /// Non-blank text field.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.texts
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Text field as given, blank included.
    pub fn raw_text(&self, name: &str) -> Option<&str> {
        self.texts.get(name).map(String::as_str)
    }

    pub fn take_file(&mut self, name: &str) -> Option<Upload> {
        self.files.remove(name)
    }

    #[cfg(test)]
    pub fn from_parts(texts: &[(&str, &str)], files: Vec<(&str, Upload)>) -> Self {
        Self {
            texts: texts
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            files: files.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        }
    }
}
