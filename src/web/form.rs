//! Multipart form handling for the generate routes

use axum::extract::Multipart;
use tracing::debug;

use crate::error::PetstyleError;
use crate::pipeline::Upload;
use crate::prompts::PromptSelection;

/// Fields the generate routes understand. Anything else is ignored.
#[derive(Debug, Default)]
pub(crate) struct GenerateForm {
    pub(crate) file: Option<Upload>,
    pub(crate) scenario: Option<String>,
    pub(crate) clothing: Option<String>,
}

impl GenerateForm {
    /// Reads the whole form.
    pub(crate) async fn read(mut multipart: Multipart) -> Result<Self, PetstyleError> {
        let mut form = GenerateForm::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "file" => {
                    let filename = field.file_name().unwrap_or_default().to_string();
                    let bytes = field.bytes().await?;
                    // browsers send an empty part when nothing was picked
                    if bytes.is_empty() {
                        debug!("Ignoring empty file part {:?}", filename);
                        continue;
                    }
                    form.file = Some(Upload {
                        filename,
                        bytes: bytes.to_vec(),
                    });
                }
                "scenario" => form.scenario = Some(field.text().await?),
                "clothing" => form.clothing = Some(field.text().await?),
                other => debug!("Ignoring form field {:?}", other),
            }
        }
        Ok(form)
    }

    /// The uploaded photo, which every photo route needs.
    pub(crate) fn take_file(&mut self) -> Result<Upload, PetstyleError> {
        self.file.take().ok_or(PetstyleError::MissingField("file"))
    }

    pub(crate) fn selection(&self) -> PromptSelection {
        PromptSelection::from_form(self.scenario.as_deref(), self.clothing.as_deref())
    }
}
