//! The per-connection dispatch loop (§2, §4.B, §5).
//!
//! [`run_session`] is the whole of Component B wired to Components C, D, and
//! E: it owns the [`FrameReader`]/[`FrameWriter`] pair for one duplex
//! stream, resolves the session's store root from the configured
//! `repoPath`, and loops decode-dispatch-respond until clean EOF — strictly
//! serially, per §5, since nothing here ever starts a second request before
//! the first one's response has been fully written.

use std::collections::HashSet;
use std::io::{Read, Write};
use std::sync::Arc;

use lob_core::config::ResolvedConfig;
use lob_delta::{DeltaCache, DeltaCodec, RollingSignatureCodec};
use lob_protocol::envelope::Request;
use lob_protocol::frame::{FrameReader, FrameWriter};
use lob_store::Store;

use crate::dispatch::{dispatch, HandlerOutcome};
use crate::error::SessionError;

/// Capabilities this server advertises via `QueryCaps` (§4.B). The only
/// capability defined by the wire protocol today.
pub const ADVERTISED_CAPS: &[&str] = &["binary_delta"];

/// Runs one client session to completion.
///
/// Resolves `repo_path` against `config` (§6's `allow-absolute-paths`
/// rule), ensures the store root exists, then reads `{Id, Method, Params}`
/// records from `input` in a loop, dispatching each to completion before
/// reading the next. Returns once `input` reaches a clean EOF with zero
/// bytes pending; any other failure is a [`SessionError`] the caller maps
/// to an exit code via [`SessionError::exit_code`].
pub fn run_session<R: Read, W: Write>(
    input: R,
    output: W,
    config: Arc<ResolvedConfig>,
    repo_path: &str,
) -> Result<(), SessionError> {
    let store_root = config
        .resolve_store_root(repo_path)
        .map_err(|e| SessionError::Internal(e.to_string()))?;
    Store::ensure_dir_exists(&store_root).map_err(|e| SessionError::FatalStorage(e.to_string()))?;

    let store = Store::new(store_root, config.chunk_size);
    let cache = DeltaCache::new(config.delta_cache_path.clone());
    let codec: Box<dyn DeltaCodec> = Box::new(RollingSignatureCodec::default());

    let mut reader = FrameReader::new(input);
    let mut writer = FrameWriter::new(output);
    let mut enabled_caps: HashSet<String> = HashSet::new();

    #[cfg(feature = "tracing")]
    tracing::info!(repo_path = %repo_path, "session connected");

    let result = (|| -> Result<(), SessionError> {
        loop {
            let request: Request = match reader.read_json()? {
                Some(request) => request,
                None => break,
            };

            #[cfg(feature = "tracing")]
            let (id, method) = (request.id, request.method.clone());

            #[cfg(feature = "tracing")]
            tracing::debug!(id, method = %method, "method dispatched");

            let outcome = dispatch(
                request,
                &store,
                &cache,
                codec.as_ref(),
                &config,
                &mut enabled_caps,
                &mut reader,
                &mut writer,
            )?;

            #[cfg(feature = "tracing")]
            log_outcome(id, &method, &outcome);

            if let HandlerOutcome::Json(value) = outcome {
                writer.write_json(&value).map_err(SessionError::marshal)?;
            }
            writer.flush().map_err(SessionError::marshal)?;
        }

        Ok(())
    })();

    #[cfg(feature = "tracing")]
    match &result {
        Ok(()) => tracing::info!("session end"),
        Err(err) => tracing::error!(error = %err, "session end"),
    }

    result
}

/// Logs whether a dispatched method's outcome was a per-request JSON error
/// (`{"Error": ...}`, non-fatal per §7) or a plain success/streamed result.
#[cfg(feature = "tracing")]
fn log_outcome(id: i64, method: &str, outcome: &HandlerOutcome) {
    match outcome {
        HandlerOutcome::Json(value) if value.get("Error").is_some() => {
            tracing::warn!(id, method, error = %value["Error"], "method completed with error");
        }
        _ => tracing::debug!(id, method, "method completed"),
    }
}
