//! Request/response envelope and per-method body types (§4.B).
//!
//! The wire format uses `PascalCase` field names (`Id`, `Method`, `LobSHA`,
//! ...); every type here mirrors that exactly via `#[serde(rename = ...)]` so
//! the JSON on the wire matches §4.B and §8's literal scenarios byte for
//! byte.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A decoded `{Id, Method, Params}` JSON record (§4.B).
#[derive(Debug, Deserialize)]
pub struct Request {
    /// Client-assigned, monotonically increasing correlation id.
    #[serde(rename = "Id")]
    pub id: i64,
    /// Method name, looked up in the closed dispatch table.
    #[serde(rename = "Method")]
    pub method: String,
    /// Opaque per-method parameters, reinterpreted by the handler.
    #[serde(rename = "Params", default)]
    pub params: Value,
}

/// The closed set of recognized methods (§4.B's method table).
///
/// Deliberately not `#[derive(Deserialize)]`'d directly onto [`Request`]'s
/// `method` field: an unrecognized method name must produce a JSON error
/// response and keep the session alive, not abort the whole record decode.
/// [`Method::parse`] is the one place that string is interpreted, keeping
/// dispatch table-driven per §9.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `QueryCaps`
    QueryCaps,
    /// `SetEnabledCaps`
    SetEnabledCaps,
    /// `FileExists`
    FileExists,
    /// `FileExistsOfSize`
    FileExistsOfSize,
    /// `LOBExists`
    LobExists,
    /// `UploadFile`
    UploadFile,
    /// `DownloadFilePrepare`
    DownloadFilePrepare,
    /// `DownloadFileStart`
    DownloadFileStart,
    /// `GetFirstCompleteLOBFromList`, aliased on the wire as `PickCompleteLOB`.
    GetFirstCompleteLobFromList,
    /// `UploadDelta`
    UploadDelta,
    /// `DownloadDeltaPrepare`
    DownloadDeltaPrepare,
    /// `DownloadDeltaStart`
    DownloadDeltaStart,
}

impl Method {
    /// Looks `name` up in the closed method table. Returns `None` for any
    /// name outside it, including case variants — the wire format is
    /// case-sensitive.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "QueryCaps" => Self::QueryCaps,
            "SetEnabledCaps" => Self::SetEnabledCaps,
            "FileExists" => Self::FileExists,
            "FileExistsOfSize" => Self::FileExistsOfSize,
            "LOBExists" => Self::LobExists,
            "UploadFile" => Self::UploadFile,
            "DownloadFilePrepare" => Self::DownloadFilePrepare,
            "DownloadFileStart" => Self::DownloadFileStart,
            "GetFirstCompleteLOBFromList" | "PickCompleteLOB" => {
                Self::GetFirstCompleteLobFromList
            }
            "UploadDelta" => Self::UploadDelta,
            "DownloadDeltaPrepare" => Self::DownloadDeltaPrepare,
            "DownloadDeltaStart" => Self::DownloadDeltaStart,
            _ => return None,
        })
    }
}

/// Builds the JSON value for a successful response: `{"Id": id, "Result": result}`.
pub fn success_response<T: Serialize>(id: i64, result: T) -> Value {
    serde_json::json!({ "Id": id, "Result": result })
}

/// Builds the JSON value for an error response: `{"Id": id, "Error": message}`.
pub fn error_response(id: i64, message: impl std::fmt::Display) -> Value {
    serde_json::json!({ "Id": id, "Error": message.to_string() })
}

/// Builds the `{"Id": id, "ReceivedOK": false, "Error": message}` shape an
/// upload handler returns when fewer than the declared number of bytes
/// arrived (§4.D, §4.E).
pub fn received_not_ok(id: i64, message: impl std::fmt::Display) -> Value {
    serde_json::json!({ "Id": id, "ReceivedOK": false, "Error": message.to_string() })
}

/// `"meta"` or `"chunk"` — the two kinds of file addressed by `LobSHA`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// The metadata record file.
    Meta,
    /// One chunk of LOB content.
    Chunk,
}

/// `QueryCaps` has no parameters; `{Caps: [string]}` on success.
#[derive(Debug, Serialize)]
pub struct CapsResult {
    /// Advertised capability names. This server always returns `["binary_delta"]`.
    #[serde(rename = "Caps")]
    pub caps: Vec<String>,
}

/// `SetEnabledCaps` parameters.
#[derive(Debug, Deserialize)]
pub struct SetEnabledCapsParams {
    /// Subset of advertised capabilities the client wants enabled.
    #[serde(rename = "EnableCaps")]
    pub enable_caps: Vec<String>,
}

/// `FileExists` / `FileExistsOfSize` parameters.
#[derive(Debug, Deserialize)]
pub struct FileExistsParams {
    /// SHA-1 of the LOB the file belongs to.
    #[serde(rename = "LobSHA")]
    pub lob_sha: String,
    /// Whether `LobSHA` addresses the metadata record or a chunk.
    #[serde(rename = "Type")]
    pub file_type: FileType,
    /// Chunk index; ignored for `Type: "meta"`.
    #[serde(rename = "ChunkIdx", default)]
    pub chunk_idx: u64,
    /// Size to additionally match against, only present on `FileExistsOfSize`.
    #[serde(rename = "Size", default)]
    pub size: u64,
}

/// `FileExists` / `FileExistsOfSize` result — fixed to `{Exists, Size}` for
/// symmetry (§9's open question, resolved in DESIGN.md).
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct FileExistsResult {
    /// Whether the file exists (and, for `FileExistsOfSize`, matches `Size`).
    #[serde(rename = "Exists")]
    pub exists: bool,
    /// The file's actual size when `exists` is `true`, `0` otherwise.
    #[serde(rename = "Size")]
    pub size: u64,
}

/// `LOBExists` parameters.
#[derive(Debug, Deserialize)]
pub struct LobShaParams {
    /// SHA-1 of the LOB.
    #[serde(rename = "LobSHA")]
    pub lob_sha: String,
}

/// `LOBExists` result.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct LobExistsResult {
    /// Whether every chunk plus metadata is present and well-formed.
    #[serde(rename = "Exists")]
    pub exists: bool,
    /// Total LOB size when `exists` is `true`, `0` otherwise.
    #[serde(rename = "Size")]
    pub size: u64,
}

/// `UploadFile` / `DownloadFilePrepare` / `DownloadFileStart` parameters.
#[derive(Debug, Deserialize)]
pub struct FileTransferParams {
    /// SHA-1 of the LOB the file belongs to.
    #[serde(rename = "LobSHA")]
    pub lob_sha: String,
    /// Whether `LobSHA` addresses the metadata record or a chunk.
    #[serde(rename = "Type")]
    pub file_type: FileType,
    /// Chunk index; ignored for `Type: "meta"`.
    #[serde(rename = "ChunkIdx", default)]
    pub chunk_idx: u64,
    /// Declared byte count of the raw run that follows (or preceded, for
    /// `DownloadFileStart`'s re-verification).
    #[serde(rename = "Size", default)]
    pub size: u64,
}

/// The `{OKToSend: bool}` prelude sent before an inbound raw byte run.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct OkToSendResult {
    /// Whether the server will accept the declared byte run.
    #[serde(rename = "OKToSend")]
    pub ok_to_send: bool,
}

/// The terminal response to an upload (`UploadFile` or `UploadDelta`).
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReceivedOkResult {
    /// Whether the upload was installed successfully.
    #[serde(rename = "ReceivedOK")]
    pub received_ok: bool,
}

/// `{Size: int64}` — the common shape of `DownloadFilePrepare` and
/// `DownloadDeltaPrepare` results.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SizeResult {
    /// Byte length of the forthcoming raw run.
    #[serde(rename = "Size")]
    pub size: u64,
}

/// `GetFirstCompleteLOBFromList` parameters.
#[derive(Debug, Deserialize)]
pub struct LobListParams {
    /// Candidate SHAs, in client-preferred order.
    #[serde(rename = "LobSHAs")]
    pub lob_shas: Vec<String>,
}

/// `GetFirstCompleteLOBFromList` result.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct FirstShaResult {
    /// First candidate that is complete on the server, or `""` if none are.
    #[serde(rename = "FirstSHA")]
    pub first_sha: String,
}

/// `UploadDelta` / `DownloadDeltaPrepare` / `DownloadDeltaStart` parameters.
#[derive(Debug, Deserialize)]
pub struct DeltaParams {
    /// SHA-1 of the LOB the delta is based on.
    #[serde(rename = "BaseLobSHA")]
    pub base_lob_sha: String,
    /// SHA-1 of the LOB the delta reconstructs.
    #[serde(rename = "TargetLobSHA")]
    pub target_lob_sha: String,
    /// Declared byte count of the delta's raw run, when present on the wire.
    #[serde(rename = "Size", default)]
    pub size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_deserializes_pascal_case_fields() {
        let req: Request =
            serde_json::from_str(r#"{"Id":1,"Method":"QueryCaps","Params":{}}"#).unwrap();
        assert_eq!(req.id, 1);
        assert_eq!(req.method, "QueryCaps");
    }

    #[test]
    fn success_response_matches_query_caps_scenario() {
        let value = success_response(
            1,
            CapsResult {
                caps: vec!["binary_delta".to_string()],
            },
        );
        assert_eq!(
            value,
            serde_json::json!({"Id": 1, "Result": {"Caps": ["binary_delta"]}})
        );
    }

    #[test]
    fn error_response_carries_request_id() {
        let value = error_response(9, "File doesn't exist");
        assert_eq!(value["Id"], 9);
        assert_eq!(value["Error"], "File doesn't exist");
    }

    #[test]
    fn file_type_round_trips_lowercase() {
        let meta: FileType = serde_json::from_str("\"meta\"").unwrap();
        assert_eq!(meta, FileType::Meta);
        let chunk: FileType = serde_json::from_str("\"chunk\"").unwrap();
        assert_eq!(chunk, FileType::Chunk);
    }

    #[test]
    fn file_transfer_params_default_chunk_idx() {
        let params: FileTransferParams =
            serde_json::from_str(r#"{"LobSHA":"a","Type":"meta","Size":71}"#).unwrap();
        assert_eq!(params.chunk_idx, 0);
        assert_eq!(params.size, 71);
    }

    #[test]
    fn method_parses_every_table_entry() {
        assert_eq!(Method::parse("QueryCaps"), Some(Method::QueryCaps));
        assert_eq!(Method::parse("LOBExists"), Some(Method::LobExists));
        assert_eq!(
            Method::parse("GetFirstCompleteLOBFromList"),
            Some(Method::GetFirstCompleteLobFromList)
        );
    }

    #[test]
    fn method_accepts_pick_complete_lob_alias() {
        assert_eq!(
            Method::parse("PickCompleteLOB"),
            Some(Method::GetFirstCompleteLobFromList)
        );
    }

    #[test]
    fn method_rejects_unknown_name() {
        assert_eq!(Method::parse("DeleteEverything"), None);
    }
}
