//! Dispatch of decoded requests onto a [`QueryControlService`].

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use super::messages::{
    decode_request, encode_response, ControlRequest, ControlResponse, ProtocolError, QueryView,
    ResponseData,
};
use crate::checkpoint::{self, ExecutionContext};
use crate::error::ControlError;
use crate::models::Model;
use crate::permissions::PermissionMode;
use crate::service::QueryControlService;

/// Translates requests into service calls and results into responses.
pub struct ControlHandler {
    service: Arc<QueryControlService>,
}

impl ControlHandler {
    pub fn new(service: Arc<QueryControlService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &Arc<QueryControlService> {
        &self.service
    }

    /// Decode one line, execute it, and return the encoded response.
    pub async fn process_line(&self, line: &str) -> String {
        let response = match decode_request(line) {
            Ok(request) => self.handle(request).await,
            Err(e) => {
                debug!(error = %e, "rejected request line");
                ControlResponse::bad_request(&e)
            }
        };
        encode_response(&response)
    }

    pub async fn handle(&self, request: ControlRequest) -> ControlResponse {
        let query_id = request.query_id().map(str::to_owned);
        match self.dispatch(request).await {
            Ok(data) => ControlResponse::success(data),
            Err(Rejection::Control(e)) => {
                let state = query_id
                    .as_deref()
                    .and_then(|id| self.service.get_query(id).ok())
                    .map(|q| q.state);
                ControlResponse::failure(&e, state)
            }
            Err(Rejection::Protocol(e)) => ControlResponse::bad_request(&e),
        }
    }

    async fn dispatch(&self, request: ControlRequest) -> Result<ResponseData, Rejection> {
        let service = &self.service;
        let data: ResponseData = match request {
            ControlRequest::Register {
                query_id,
                model,
                permission_mode,
            } => {
                let model: Model = model.parse()?;
                let mode: PermissionMode = match permission_mode {
                    Some(mode) => mode.parse()?,
                    None => PermissionMode::default(),
                };
                let summary = service.register_query(query_id, model, mode)?;
                ResponseData::Query {
                    query: summary.into(),
                }
            }
            ControlRequest::Pause {
                query_id,
                execution_context,
            } => {
                let context = match execution_context {
                    Some(value) => ExecutionContext::from_json(&value)
                        .map_err(|e| ProtocolError::InvalidContext(e.to_string()))?,
                    None => ExecutionContext::empty(),
                };
                service
                    .pause_query_with_context(&query_id, context)
                    .await?
                    .into()
            }
            ControlRequest::Resume {
                query_id,
                checkpoint_id,
            } => service
                .resume_query(&query_id, checkpoint_id.as_deref())
                .await?
                .into(),
            ControlRequest::SwitchModel { query_id, model } => {
                service.switch_model(&query_id, &model).await?.into()
            }
            ControlRequest::SwitchPermissionMode { query_id, mode } => {
                service.switch_permission_mode(&query_id, &mode).await?.into()
            }
            ControlRequest::Terminate { query_id } => {
                service.terminate_query(&query_id).await?.into()
            }
            ControlRequest::List => ResponseData::Queries {
                queries: service
                    .list_queries()
                    .into_iter()
                    .map(QueryView::from)
                    .collect(),
            },
            ControlRequest::Get { query_id } => ResponseData::Query {
                query: service.get_query(&query_id)?.into(),
            },
            ControlRequest::Checkpoints {
                query_id,
                limit,
                offset,
            } => {
                let all = service.get_checkpoints(&query_id).await?;
                checkpoint::paginate(all, limit, offset).into()
            }
            ControlRequest::Prune {
                query_id,
                keep_latest,
            } => service.prune_checkpoints(&query_id, keep_latest).await?.into(),
            ControlRequest::Metrics => ResponseData::Metrics {
                metrics: service.metrics(),
            },
        };
        Ok(data)
    }
}

enum Rejection {
    Control(ControlError),
    Protocol(ProtocolError),
}

impl From<ControlError> for Rejection {
    fn from(e: ControlError) -> Self {
        Self::Control(e)
    }
}

impl From<ProtocolError> for Rejection {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

/// Serve newline-delimited requests from `reader` until EOF, writing one
/// response line per request. Blank lines are skipped. Returns the number of
/// requests handled.
pub async fn run_session<R, W>(
    handler: &ControlHandler,
    reader: R,
    mut writer: W,
) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut handled = 0;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let response = handler.process_line(line).await;
        writer.write_all(response.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        handled += 1;
    }

    if handled == 0 {
        warn!("session ended without any requests");
    }
    Ok(handled)
}
