use std::collections::HashMap;

use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header::CONTENT_TYPE;
use axum::Form;

use super::prelude::*;

const IMAGE_FIELD: &str = "image";

/// Fields of a job submission, sent either url-encoded or as multipart.
#[derive(Debug, Default)]
pub(crate) struct JobFields {
    fields: HashMap<String, String>,
    image: Option<Vec<u8>>,
}

impl JobFields {
    pub(crate) fn require(&self, name: &str) -> Result<&str, RelayError> {
        self.fields
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| RelayError::BadRequest(format!("Missing field: {name}")))
    }

    pub(crate) fn caller(&self) -> Result<Caller, RelayError> {
        Ok(Caller {
            app_bundle_id: self.require("app_bundle_id")?.to_string(),
            apphud_user_id: self.require("apphud_user_id")?.to_string(),
        })
    }

    pub(crate) fn take_image(&mut self) -> Result<Vec<u8>, RelayError> {
        self.image
            .take()
            .ok_or_else(|| RelayError::BadRequest(format!("Missing file: {IMAGE_FIELD}")))
    }
}

impl<S> FromRequest<S> for JobFields
where
    S: Send + Sync,
{
    type Rejection = RelayError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("multipart/form-data"));

        if !is_multipart {
            let Form(fields) = Form::<HashMap<String, String>>::from_request(req, state)
                .await
                .map_err(|err| RelayError::rejected(err.status(), err.body_text()))?;
            return Ok(Self {
                fields,
                image: None,
            });
        }

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|err| RelayError::rejected(err.status(), err.body_text()))?;
        let mut parsed = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            if name == IMAGE_FIELD {
                let bytes = field.bytes().await?;
                debug!(len = bytes.len(), "Received image field");
                parsed.image = Some(bytes.to_vec());
            } else if !name.is_empty() {
                let value = field.text().await?;
                parsed.fields.insert(name, value);
            }
        }
        Ok(parsed)
    }
}
