//! Dify dataset API over reqwest.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{
   Body, Client, Response, StatusCode,
   multipart::{Form, Part},
};
use serde::Deserialize;
use serde_json::json;

use super::{
   DatasetInfo, DocumentPage, Endpoint, ListQuery, RemoteDocumentRef, RemoteStore, UploadRequest,
};
use crate::{
   Error, Result,
   error::HttpError,
};

/// Longest response body quoted in an error.
const MAX_ERROR_BODY: usize = 512;

pub struct DifyApi {
   client: Client,
}

#[derive(Deserialize)]
struct UploadResponse {
   document: Option<RemoteDocumentRef>,
}

impl DifyApi {
   pub fn new(timeout: Duration) -> Result<Self> {
      let client = Client::builder()
         .timeout(timeout)
         .user_agent(concat!("difysync/", env!("CARGO_PKG_VERSION")))
         .build()
         .map_err(HttpError::Request)?;
      Ok(Self { client })
   }
}

#[async_trait]
impl RemoteStore for DifyApi {
   async fn upload(
      &self,
      endpoint: &Endpoint,
      dataset: &str,
      request: &UploadRequest,
   ) -> Result<Option<RemoteDocumentRef>> {
      const OP: &str = "upload";

      let mime = mime_guess::from_path(&request.name).first_or_octet_stream();
      let length = request.content.len() as u64;
      let file = Part::stream_with_length(file_body(&request.content), length)
         .file_name(request.name.clone())
         .mime_str(mime.essence_str())
         .map_err(HttpError::Request)?;
      let data = json!({
         "indexing_technique": request.indexing_technique,
         "process_rule": { "mode": request.process_mode },
      });
      let form = Form::new()
         .part("file", file)
         .text("data", data.to_string());

      let url = endpoint.url(&format!("datasets/{dataset}/document/create-by-file"));
      let response = self
         .client
         .post(url)
         .bearer_auth(endpoint.api_key())
         .multipart(form)
         .send()
         .await
         .map_err(|e| transport_error(OP, e))?;

      let body = check_status(OP, &request.name, response).await?;
      match serde_json::from_str::<UploadResponse>(&body) {
         Ok(parsed) => Ok(parsed.document),
         Err(e) => {
            tracing::debug!("upload response without document: {e}");
            Ok(None)
         },
      }
   }

   async fn delete(&self, endpoint: &Endpoint, dataset: &str, document_id: &str) -> Result<()> {
      let url = endpoint.url(&format!("datasets/{dataset}/documents/{document_id}"));
      let response = self
         .client
         .delete(url)
         .bearer_auth(endpoint.api_key())
         .send()
         .await
         .map_err(|e| transport_error("delete", e))?;
      check_status("delete", document_id, response).await?;
      Ok(())
   }

   async fn list(
      &self,
      endpoint: &Endpoint,
      dataset: &str,
      query: &ListQuery,
   ) -> Result<DocumentPage> {
      const OP: &str = "list";

      let mut params: Vec<(&str, String)> =
         vec![("page", query.page.to_string()), ("limit", query.limit.to_string())];
      if let Some(keyword) = query.keyword.as_deref().filter(|k| !k.is_empty()) {
         params.push(("keyword", keyword.to_string()));
      }

      let url = endpoint.url(&format!("datasets/{dataset}/documents"));
      let response = self
         .client
         .get(url)
         .bearer_auth(endpoint.api_key())
         .query(&params)
         .send()
         .await
         .map_err(|e| transport_error(OP, e))?;

      let body = check_status(OP, dataset, response).await?;
      serde_json::from_str(&body)
         .map_err(|e| HttpError::Decode { op: OP, reason: e.to_string() }.into())
   }

   async fn dataset(&self, endpoint: &Endpoint, dataset: &str) -> Result<DatasetInfo> {
      const OP: &str = "dataset";

      let response = self
         .client
         .get(endpoint.url(&format!("datasets/{dataset}")))
         .bearer_auth(endpoint.api_key())
         .send()
         .await
         .map_err(|e| transport_error(OP, e))?;

      let body = check_status(OP, dataset, response).await?;
      serde_json::from_str(&body)
         .map_err(|e| HttpError::Decode { op: OP, reason: e.to_string() }.into())
   }
}

/// Maps a response status onto the error taxonomy and returns the body.
async fn check_status(op: &'static str, subject: &str, response: Response) -> Result<String> {
   let status = response.status();
   let body = response
      .text()
      .await
      .map_err(|e| transport_error(op, e))?;

   if status.is_success() {
      return Ok(body);
   }
   Err(classify_status(op, subject, status, body))
}

fn classify_status(op: &'static str, subject: &str, status: StatusCode, mut body: String) -> Error {
   if body.len() > MAX_ERROR_BODY {
      let mut cut = MAX_ERROR_BODY;
      while !body.is_char_boundary(cut) {
         cut -= 1;
      }
      body.truncate(cut);
   }

   match status {
      StatusCode::NOT_FOUND => Error::RemoteNotFound { op, what: subject.to_string() },
      StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
         Error::RemoteTransient { op, reason: format!("HTTP {}: {body}", status.as_u16()) }
      },
      s if s.is_server_error() => {
         Error::RemoteTransient { op, reason: format!("HTTP {}: {body}", s.as_u16()) }
      },
      s => Error::RemoteRejected { op, status: s.as_u16(), body },
   }
}

fn transport_error(op: &'static str, e: reqwest::Error) -> Error {
   if e.is_builder() {
      return HttpError::Request(e).into();
   }
   Error::RemoteTransient { op, reason: e.to_string() }
}

/// Request body sharing the upload's buffer; retries resend it without copying.
fn file_body(content: &Bytes) -> Body {
   Body::from(content.clone())
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn file_body_shares_the_upload_buffer() {
      let content = Bytes::from_static(b"# Q1 report");
      let body = file_body(&content);
      assert_eq!(body.as_bytes().map(<[u8]>::as_ptr), Some(content.as_ptr()));
   }

   #[test]
   fn status_classification() {
      assert!(classify_status("x", "d", StatusCode::NOT_FOUND, String::new()).is_not_found());
      assert!(classify_status("x", "d", StatusCode::BAD_GATEWAY, String::new()).is_retryable());
      assert!(
         classify_status("x", "d", StatusCode::TOO_MANY_REQUESTS, String::new()).is_retryable()
      );
      let rejected = classify_status("x", "d", StatusCode::BAD_REQUEST, "bad".into());
      assert!(matches!(rejected, Error::RemoteRejected { status: 400, .. }));
      assert!(!rejected.is_retryable());
   }

   #[test]
   fn long_bodies_are_cut() {
      let err = classify_status("x", "d", StatusCode::FORBIDDEN, "é".repeat(600));
      let Error::RemoteRejected { body, .. } = err else {
         panic!("expected rejection");
      };
      assert!(body.len() <= MAX_ERROR_BODY);
   }

   #[test]
   fn upload_response_document() {
      let parsed: UploadResponse = serde_json::from_str(
         r#"{"document":{"id":"d1","name":"📄a.md","position":1},"batch":"b"}"#,
      )
      .unwrap();
      assert_eq!(parsed.document.unwrap().id, "d1");
   }
}
