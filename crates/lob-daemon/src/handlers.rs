//! Handler bodies for the closed method table (§4.D, §4.E).
//!
//! Every function here decodes its own `Params`, so a malformed body for
//! one method never touches another's types. A bad `Params` value produces
//! a JSON error response — it is a per-request failure, not a framing
//! failure, so it never reaches [`SessionError`].

use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;

use lob_core::config::ResolvedConfig;
use lob_core::error::StorageError;
use lob_delta::{DeltaCache, DeltaCodec, DeltaError};
use lob_protocol::envelope::{
    self, CapsResult, DeltaParams, FileExistsParams, FileExistsResult, FileTransferParams,
    FileType, FirstShaResult, LobExistsResult, LobListParams, LobShaParams, OkToSendResult,
    ReceivedOkResult, SetEnabledCapsParams, SizeResult,
};
use lob_protocol::frame::{copy_exact, FrameReader, FrameWriter};
use lob_store::Store;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::dispatch::HandlerOutcome;
use crate::error::SessionError;
use crate::session::ADVERTISED_CAPS;

/// Decodes `params` into `T`, or returns a ready-to-write JSON error
/// outcome that echoes `id`.
fn decode<T: DeserializeOwned>(id: i64, params: Value) -> Result<T, HandlerOutcome> {
    serde_json::from_value(params).map_err(|e| HandlerOutcome::Json(envelope::error_response(id, e)))
}

/// Maps a [`StorageError`] per §7's Storage row: fatal errors (disk full,
/// read-only filesystem) propagate and terminate the session; everything
/// else becomes a JSON error response that lets the session continue.
fn storage_outcome<T>(
    id: i64,
    result: Result<T, StorageError>,
) -> Result<Result<T, HandlerOutcome>, SessionError> {
    match result {
        Ok(value) => Ok(Ok(value)),
        Err(err) if err.is_fatal() => Err(SessionError::FatalStorage(err.to_string())),
        Err(err) => Ok(Err(HandlerOutcome::Json(envelope::error_response(id, err)))),
    }
}

fn file_path(store: &Store, sha: &str, file_type: FileType, chunk_idx: u64) -> PathBuf {
    match file_type {
        FileType::Meta => store.meta_path(sha),
        FileType::Chunk => store.chunk_path(sha, chunk_idx),
    }
}

/// `QueryCaps`: this server always advertises [`ADVERTISED_CAPS`].
pub fn query_caps(id: i64) -> Value {
    envelope::success_response(
        id,
        CapsResult {
            caps: ADVERTISED_CAPS.iter().map(|s| (*s).to_string()).collect(),
        },
    )
}

/// `SetEnabledCaps`: rejects any capability outside [`ADVERTISED_CAPS`].
pub fn set_enabled_caps(id: i64, params: Value, enabled: &mut HashSet<String>) -> Value {
    let params: SetEnabledCapsParams = match serde_json::from_value(params) {
        Ok(p) => p,
        Err(e) => return envelope::error_response(id, e),
    };

    for cap in &params.enable_caps {
        if !ADVERTISED_CAPS.contains(&cap.as_str()) {
            return envelope::error_response(id, format!("unknown capability: {cap}"));
        }
    }

    enabled.clear();
    enabled.extend(params.enable_caps);
    envelope::success_response(id, serde_json::json!({}))
}

/// `FileExists` (`check_size = false`) and `FileExistsOfSize`
/// (`check_size = true`): both answer the fixed `{Exists, Size}` shape
/// (§9's open question, resolved for symmetry with `FileExists`).
pub fn file_exists(
    id: i64,
    params: Value,
    store: &Store,
    check_size: bool,
) -> Result<HandlerOutcome, SessionError> {
    let params: FileExistsParams = match decode(id, params) {
        Ok(p) => p,
        Err(outcome) => return Ok(outcome),
    };
    let path = file_path(store, &params.lob_sha, params.file_type, params.chunk_idx);

    let result = match std::fs::metadata(&path) {
        Ok(meta) if check_size && meta.len() != params.size => {
            FileExistsResult { exists: false, size: 0 }
        }
        Ok(meta) => FileExistsResult {
            exists: true,
            size: meta.len(),
        },
        Err(_) => FileExistsResult { exists: false, size: 0 },
    };
    Ok(HandlerOutcome::Json(envelope::success_response(id, result)))
}

/// `LOBExists`: whole-LOB completeness check via [`Store::check_lob_complete`].
pub fn lob_exists(id: i64, params: Value, store: &Store) -> Result<HandlerOutcome, SessionError> {
    let params: LobShaParams = match decode(id, params) {
        Ok(p) => p,
        Err(outcome) => return Ok(outcome),
    };

    let (exists, size) = match storage_outcome(id, store.check_lob_complete(&params.lob_sha))? {
        Ok(v) => v,
        Err(outcome) => return Ok(outcome),
    };
    Ok(HandlerOutcome::Json(envelope::success_response(
        id,
        LobExistsResult { exists, size },
    )))
}

/// `UploadFile`: writes the prelude itself, then streams exactly `Size`
/// bytes from `reader` into a fresh temp file and renames it onto the
/// canonical path.
pub fn upload_file<R: Read, W: Write>(
    id: i64,
    params: Value,
    store: &Store,
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
) -> Result<HandlerOutcome, SessionError> {
    let params: FileTransferParams = match decode(id, params) {
        Ok(p) => p,
        Err(outcome) => return Ok(outcome),
    };

    if !matches!(params.file_type, FileType::Meta | FileType::Chunk) {
        return Ok(HandlerOutcome::Json(envelope::error_response(
            id,
            "Type must be \"meta\" or \"chunk\"",
        )));
    }

    writer
        .write_json(&envelope::success_response(id, OkToSendResult { ok_to_send: true }))
        .map_err(SessionError::marshal)?;
    writer.flush().map_err(SessionError::marshal)?;

    let path = file_path(store, &params.lob_sha, params.file_type, params.chunk_idx);
    let mut raw = reader.raw_reader(params.size);
    let response = match store.write_atomically(&path, params.size, &mut raw) {
        Ok(()) => envelope::success_response(id, ReceivedOkResult { received_ok: true }),
        Err(err) if err.is_fatal() => return Err(SessionError::FatalStorage(err.to_string())),
        Err(err) => envelope::received_not_ok(id, format!("Received wrong number of bytes: {err}")),
    };
    Ok(HandlerOutcome::Json(response))
}

/// `DownloadFilePrepare`: reports the canonical file's size, or a JSON
/// error if it doesn't exist.
pub fn download_file_prepare(
    id: i64,
    params: Value,
    store: &Store,
) -> Result<HandlerOutcome, SessionError> {
    let params: FileTransferParams = match decode(id, params) {
        Ok(p) => p,
        Err(outcome) => return Ok(outcome),
    };
    let path = file_path(store, &params.lob_sha, params.file_type, params.chunk_idx);

    match std::fs::metadata(&path) {
        Ok(meta) => Ok(HandlerOutcome::Json(envelope::success_response(
            id,
            SizeResult { size: meta.len() },
        ))),
        Err(_) => Ok(HandlerOutcome::Json(envelope::error_response(
            id,
            "File doesn't exist",
        ))),
    }
}

/// `DownloadFileStart`: re-verifies the declared size before streaming a
/// single byte, since a JSON error can no longer be sent once the raw run
/// starts (§9's open question — one error, then close, never recover).
pub fn download_file_start<W: Write>(
    id: i64,
    params: Value,
    store: &Store,
    writer: &mut FrameWriter<W>,
) -> Result<HandlerOutcome, SessionError> {
    let params: FileTransferParams = match decode(id, params) {
        Ok(p) => p,
        Err(outcome) => return Ok(outcome),
    };
    let path = file_path(store, &params.lob_sha, params.file_type, params.chunk_idx);

    let actual = match std::fs::metadata(&path) {
        Ok(meta) => meta.len(),
        Err(_) => {
            return Ok(HandlerOutcome::Json(envelope::error_response(
                id,
                "File doesn't exist",
            )))
        }
    };
    if actual != params.size {
        return Ok(HandlerOutcome::Json(envelope::error_response(
            id,
            "declared size does not match the stored file's size",
        )));
    }

    let mut file = File::open(&path).map_err(|e| SessionError::Internal(e.to_string()))?;
    writer.write_exact_raw(&mut file, params.size)?;
    writer.flush().map_err(SessionError::marshal)?;
    Ok(HandlerOutcome::Handled)
}

/// `GetFirstCompleteLOBFromList` (alias `PickCompleteLOB`): first candidate
/// in client-supplied order that is complete on the server, or `""`.
pub fn first_complete_lob(
    id: i64,
    params: Value,
    store: &Store,
) -> Result<HandlerOutcome, SessionError> {
    let params: LobListParams = match decode(id, params) {
        Ok(p) => p,
        Err(outcome) => return Ok(outcome),
    };

    for sha in &params.lob_shas {
        let (complete, _) = match storage_outcome(id, store.check_lob_complete(sha))? {
            Ok(v) => v,
            Err(outcome) => return Ok(outcome),
        };
        if complete {
            return Ok(HandlerOutcome::Json(envelope::success_response(
                id,
                FirstShaResult {
                    first_sha: sha.clone(),
                },
            )));
        }
    }

    Ok(HandlerOutcome::Json(envelope::success_response(
        id,
        FirstShaResult {
            first_sha: String::new(),
        },
    )))
}

/// `UploadDelta`: the largest handler (§4.E). Rejects oversized deltas with
/// a bare `{OKToSend:false}` prelude and no further response; otherwise
/// reads the delta into a temp file, applies it against the base LOB,
/// verifies the reconstructed SHA, and installs the target.
#[allow(clippy::too_many_arguments)]
pub fn upload_delta<R: Read, W: Write>(
    id: i64,
    params: Value,
    store: &Store,
    cache: &DeltaCache,
    codec: &dyn DeltaCodec,
    config: &ResolvedConfig,
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
) -> Result<HandlerOutcome, SessionError> {
    let params: DeltaParams = match decode(id, params) {
        Ok(p) => p,
        Err(outcome) => return Ok(outcome),
    };

    if !config.enable_delta_receive {
        return Ok(HandlerOutcome::Json(envelope::error_response(
            id,
            "delta receive is disabled",
        )));
    }

    if params.size > config.delta_size_limit {
        writer
            .write_json(&envelope::success_response(id, OkToSendResult { ok_to_send: false }))
            .map_err(SessionError::marshal)?;
        writer.flush().map_err(SessionError::marshal)?;
        return Ok(HandlerOutcome::Handled);
    }

    writer
        .write_json(&envelope::success_response(id, OkToSendResult { ok_to_send: true }))
        .map_err(SessionError::marshal)?;
    writer.flush().map_err(SessionError::marshal)?;

    let mut temp = tempfile::NamedTempFile::new().map_err(|e| SessionError::FatalStorage(e.to_string()))?;
    let mut raw = reader.raw_reader(params.size);
    if let Err(err) = copy_exact(&mut raw, temp.as_file_mut(), params.size) {
        return Ok(HandlerOutcome::Json(envelope::received_not_ok(
            id,
            format!("Received wrong number of bytes: {err}"),
        )));
    }
    let delta_bytes =
        std::fs::read(temp.path()).map_err(|e| SessionError::FatalStorage(e.to_string()))?;

    let response = match lob_delta::apply_delta(
        store,
        codec,
        cache,
        &params.base_lob_sha,
        &params.target_lob_sha,
        &delta_bytes,
    ) {
        Ok(_size) => envelope::success_response(id, ReceivedOkResult { received_ok: true }),
        Err(DeltaError::Storage(err)) if err.is_fatal() => {
            return Err(SessionError::FatalStorage(err.to_string()));
        }
        Err(err) => envelope::error_response(id, err),
    };
    Ok(HandlerOutcome::Json(response))
}

/// `DownloadDeltaPrepare`: serves the cache on a hit, regenerates on a
/// miss, and rejects with an error if the result exceeds `delta_size_limit`
/// (B4).
pub fn download_delta_prepare(
    id: i64,
    params: Value,
    store: &Store,
    cache: &DeltaCache,
    codec: &dyn DeltaCodec,
    config: &ResolvedConfig,
) -> Result<HandlerOutcome, SessionError> {
    let params: DeltaParams = match decode(id, params) {
        Ok(p) => p,
        Err(outcome) => return Ok(outcome),
    };

    if !config.enable_delta_send {
        return Ok(HandlerOutcome::Json(envelope::error_response(
            id,
            "delta send is disabled",
        )));
    }

    let delta = match lob_delta::generate_delta(
        store,
        codec,
        cache,
        &params.base_lob_sha,
        &params.target_lob_sha,
    ) {
        Ok(bytes) => bytes,
        Err(DeltaError::Storage(err)) if err.is_fatal() => {
            return Err(SessionError::FatalStorage(err.to_string()));
        }
        Err(err) => return Ok(HandlerOutcome::Json(envelope::error_response(id, err))),
    };

    if delta.len() as u64 > config.delta_size_limit {
        return Ok(HandlerOutcome::Json(envelope::error_response(
            id,
            "delta exceeds the configured size limit",
        )));
    }

    Ok(HandlerOutcome::Json(envelope::success_response(
        id,
        SizeResult {
            size: delta.len() as u64,
        },
    )))
}

/// `DownloadDeltaStart`: re-verifies the cached entry still exists and
/// matches the declared size before streaming (protects against
/// out-of-band cache eviction between `Prepare` and `Start`).
pub fn download_delta_start<W: Write>(
    id: i64,
    params: Value,
    cache: &DeltaCache,
    writer: &mut FrameWriter<W>,
) -> Result<HandlerOutcome, SessionError> {
    let params: DeltaParams = match decode(id, params) {
        Ok(p) => p,
        Err(outcome) => return Ok(outcome),
    };

    let bytes = match cache.load(&params.base_lob_sha, &params.target_lob_sha) {
        Ok(Some(bytes)) if bytes.len() as u64 == params.size => bytes,
        Ok(_) => {
            return Ok(HandlerOutcome::Json(envelope::error_response(
                id,
                "cached delta missing or changed size; re-issue DownloadDeltaPrepare",
            )))
        }
        Err(err) => return Err(SessionError::FatalStorage(err.to_string())),
    };

    writer.write_raw(&bytes)?;
    writer.flush().map_err(SessionError::marshal)?;
    Ok(HandlerOutcome::Handled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lob_delta::RollingSignatureCodec;
    use lob_protocol::frame::{FrameReader, FrameWriter};
    use std::io::Cursor;

    fn config(base: PathBuf) -> ResolvedConfig {
        let mut cfg = ResolvedConfig::new(base, None);
        cfg.chunk_size = 512;
        cfg
    }

    fn sha_of(bytes: &[u8]) -> String {
        use sha1::{Digest, Sha1};
        let mut hasher = Sha1::new();
        hasher.update(bytes);
        hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
    }

    #[test]
    fn query_caps_advertises_binary_delta() {
        let value = query_caps(1);
        assert_eq!(value, serde_json::json!({"Id": 1, "Result": {"Caps": ["binary_delta"]}}));
    }

    #[test]
    fn set_enabled_caps_rejects_unknown_capability() {
        let mut enabled = HashSet::new();
        let value = set_enabled_caps(2, serde_json::json!({"EnableCaps": ["teleport"]}), &mut enabled);
        assert!(value["Error"].is_string());
        assert!(enabled.is_empty());
    }

    #[test]
    fn set_enabled_caps_accepts_advertised_subset() {
        let mut enabled = HashSet::new();
        let value = set_enabled_caps(
            3,
            serde_json::json!({"EnableCaps": ["binary_delta"]}),
            &mut enabled,
        );
        assert_eq!(value["Id"], 3);
        assert!(enabled.contains("binary_delta"));
    }

    #[test]
    fn file_exists_reports_absent_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().to_path_buf(), 512);
        let outcome = file_exists(
            4,
            serde_json::json!({"LobSHA": "a".repeat(40), "Type": "meta"}),
            &store,
            false,
        )
        .unwrap();
        let HandlerOutcome::Json(value) = outcome else {
            panic!("expected Json outcome");
        };
        assert_eq!(value["Result"]["Exists"], false);
    }

    #[test]
    fn upload_file_then_file_exists_of_size_matches() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().to_path_buf(), 512);
        let sha = sha_of(b"hello");

        let mut reader = FrameReader::new(Cursor::new(b"hello".to_vec()));
        let mut out = Vec::new();
        let mut writer = FrameWriter::new(&mut out);

        let outcome = upload_file(
            5,
            serde_json::json!({"LobSHA": sha, "Type": "meta", "Size": 5}),
            &store,
            &mut reader,
            &mut writer,
        )
        .unwrap();
        let HandlerOutcome::Json(value) = outcome else {
            panic!("expected Json outcome");
        };
        assert_eq!(value["Result"]["ReceivedOK"], true);

        let exists = file_exists(
            6,
            serde_json::json!({"LobSHA": sha, "Type": "meta", "Size": 5}),
            &store,
            true,
        )
        .unwrap();
        let HandlerOutcome::Json(value) = exists else {
            panic!("expected Json outcome");
        };
        assert_eq!(value["Result"]["Exists"], true);
        assert_eq!(value["Result"]["Size"], 5);
    }

    #[test]
    fn download_file_start_rejects_size_mismatch_before_streaming() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().to_path_buf(), 512);
        let sha = sha_of(b"hello");
        store
            .write_atomically(&store.meta_path(&sha), 5, &mut Cursor::new(b"hello".to_vec()))
            .unwrap();

        let mut out = Vec::new();
        let mut writer = FrameWriter::new(&mut out);
        let outcome = download_file_start(
            7,
            serde_json::json!({"LobSHA": sha, "Type": "meta", "Size": 999}),
            &store,
            &mut writer,
        )
        .unwrap();
        let HandlerOutcome::Json(value) = outcome else {
            panic!("expected Json outcome");
        };
        assert!(value["Error"].is_string());
        assert!(out.is_empty());
    }

    #[test]
    fn first_complete_lob_honours_candidate_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().to_path_buf(), 512);
        let complete = sha_of(b"present");
        store.install_lob_bytes(&complete, b"present").unwrap();

        let outcome = first_complete_lob(
            8,
            serde_json::json!({"LobSHAs": ["0".repeat(40), complete, "f".repeat(40)]}),
            &store,
        )
        .unwrap();
        let HandlerOutcome::Json(value) = outcome else {
            panic!("expected Json outcome");
        };
        assert_eq!(value["Result"]["FirstSHA"], complete);
    }

    #[test]
    fn upload_delta_rejects_oversized_delta_with_bare_prelude() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().to_path_buf(), 512);
        let cache = DeltaCache::new(dir.path().join("cache"));
        let codec = RollingSignatureCodec::default();
        let mut config = config(dir.path().join("base"));
        config.delta_size_limit = 10;

        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        let mut out = Vec::new();
        let mut writer = FrameWriter::new(&mut out);

        let outcome = upload_delta(
            9,
            serde_json::json!({"BaseLobSHA": "a".repeat(40), "TargetLobSHA": "b".repeat(40), "Size": 100}),
            &store,
            &cache,
            &codec,
            &config,
            &mut reader,
            &mut writer,
        )
        .unwrap();
        assert!(matches!(outcome, HandlerOutcome::Handled));
        let mut reader = FrameReader::new(Cursor::new(out));
        let value: Value = reader.read_json().unwrap().unwrap();
        assert_eq!(value, serde_json::json!({"Id": 9, "Result": {"OKToSend": false}}));
    }

    #[test]
    fn upload_delta_end_to_end_applies_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().to_path_buf(), 512);
        let cache = DeltaCache::new(dir.path().join("cache"));
        let codec = RollingSignatureCodec::new(16);
        let config = config(dir.path().join("base"));

        let base_bytes = b"the quick brown fox jumps over the lazy dog".repeat(4);
        let base_sha = sha_of(&base_bytes);
        store.install_lob_bytes(&base_sha, &base_bytes).unwrap();

        let mut target_bytes = base_bytes.clone();
        target_bytes.extend_from_slice(b" plus a new tail");
        let target_sha = sha_of(&target_bytes);

        let mut delta = Vec::new();
        codec
            .compress(
                &mut Cursor::new(&base_bytes),
                &mut Cursor::new(&target_bytes),
                &mut delta,
            )
            .unwrap();

        let mut reader = FrameReader::new(Cursor::new(delta.clone()));
        let mut out = Vec::new();
        let mut writer = FrameWriter::new(&mut out);

        let outcome = upload_delta(
            10,
            serde_json::json!({"BaseLobSHA": base_sha, "TargetLobSHA": target_sha, "Size": delta.len()}),
            &store,
            &cache,
            &codec,
            &config,
            &mut reader,
            &mut writer,
        )
        .unwrap();
        let HandlerOutcome::Json(value) = outcome else {
            panic!("expected Json outcome");
        };
        assert_eq!(value["Result"]["ReceivedOK"], true);

        let (complete, size) = store.check_lob_complete(&target_sha).unwrap();
        assert!(complete);
        assert_eq!(size, target_bytes.len() as u64);
    }

    #[test]
    fn download_delta_start_rejects_stale_size() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DeltaCache::new(dir.path().to_path_buf());
        cache.install("base", "target", b"cached delta").unwrap();

        let mut out = Vec::new();
        let mut writer = FrameWriter::new(&mut out);
        let outcome = download_delta_start(
            11,
            serde_json::json!({"BaseLobSHA": "base", "TargetLobSHA": "target", "Size": 999}),
            &cache,
            &mut writer,
        )
        .unwrap();
        let HandlerOutcome::Json(value) = outcome else {
            panic!("expected Json outcome");
        };
        assert!(value["Error"].is_string());
    }
}
