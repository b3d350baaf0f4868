//! Table-driven method dispatch (§4.B, §9).
//!
//! [`dispatch`] is the only place that turns a decoded [`Request`] into a
//! handler call. It never discovers handlers dynamically — the `match` over
//! [`Method`] is the complete, closed table the specification requires.

use std::collections::HashSet;
use std::io::{Read, Write};

use lob_core::config::ResolvedConfig;
use lob_delta::{DeltaCache, DeltaCodec};
use lob_protocol::envelope::{self, Method, Request};
use lob_protocol::frame::{FrameReader, FrameWriter};
use lob_store::Store;
use serde_json::Value;

use crate::error::SessionError;
use crate::handlers;

/// What the dispatch loop must do after a handler returns.
///
/// Named per §9's instruction against conflating this with a bare `nil`:
/// `Json` is a value the loop still has to frame and write, `Handled` means
/// the handler already wrote everything the client needs (a prelude it
/// rejected on, or a raw byte run).
#[derive(Debug)]
pub enum HandlerOutcome {
    /// The dispatch loop must serialize and write this value as the
    /// session's next JSON record.
    Json(Value),
    /// The handler already emitted every byte the client is owed; the loop
    /// writes nothing further for this request.
    Handled,
}

/// Looks `request.method` up in the closed method table and invokes the
/// matching handler. An unrecognized method produces a JSON error response
/// and does not terminate the session — only framing failures do that.
#[allow(clippy::too_many_arguments)]
pub fn dispatch<R: Read, W: Write>(
    request: Request,
    store: &Store,
    cache: &DeltaCache,
    codec: &dyn DeltaCodec,
    config: &ResolvedConfig,
    enabled_caps: &mut HashSet<String>,
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
) -> Result<HandlerOutcome, SessionError> {
    let id = request.id;

    let Some(method) = Method::parse(&request.method) else {
        return Ok(HandlerOutcome::Json(envelope::error_response(
            id,
            format!("unknown method: {}", request.method),
        )));
    };

    match method {
        Method::QueryCaps => Ok(HandlerOutcome::Json(handlers::query_caps(id))),
        Method::SetEnabledCaps => Ok(HandlerOutcome::Json(handlers::set_enabled_caps(
            id,
            request.params,
            enabled_caps,
        ))),
        Method::FileExists => handlers::file_exists(id, request.params, store, false),
        Method::FileExistsOfSize => handlers::file_exists(id, request.params, store, true),
        Method::LobExists => handlers::lob_exists(id, request.params, store),
        Method::UploadFile => handlers::upload_file(id, request.params, store, reader, writer),
        Method::DownloadFilePrepare => {
            handlers::download_file_prepare(id, request.params, store)
        }
        Method::DownloadFileStart => {
            handlers::download_file_start(id, request.params, store, writer)
        }
        Method::GetFirstCompleteLobFromList => {
            handlers::first_complete_lob(id, request.params, store)
        }
        Method::UploadDelta => handlers::upload_delta(
            id,
            request.params,
            store,
            cache,
            codec,
            config,
            reader,
            writer,
        ),
        Method::DownloadDeltaPrepare => {
            handlers::download_delta_prepare(id, request.params, store, cache, codec, config)
        }
        Method::DownloadDeltaStart => {
            handlers::download_delta_start(id, request.params, cache, writer)
        }
    }
}
