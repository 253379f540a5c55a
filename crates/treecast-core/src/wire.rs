//! Treecast wire format: the control-plane messages exchanged over multicast.
//!
//! Every datagram is one ASCII line framed by `:` separators:
//!
//! ```text
//! :{identity}:{serial}:{yyyyMMdd-HHmmss.SSS}:{kind}:{payload...}:
//! ```
//!
//! Field order is fixed per kind. Fields are not escaped: a value containing
//! `:` produces a line that decodes into different fields (or not at all).
//! Callers that put operator input on the wire must live with that.

use std::fmt;
use std::str::FromStr;

use chrono::{Local, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::identity::Identity;

// ── Constants ─────────────────────────────────────────────────────────────────

/// Default IPv4 multicast group for control-plane traffic.
pub const MULTICAST_ADDR: &str = "239.255.41.5";

/// Default multicast port.
pub const MULTICAST_PORT: u16 = 4105;

/// Largest datagram the receiver reads. Longer frames are cut off on receipt.
pub const MAX_DATAGRAM: usize = 1024;

/// Header timestamp layout, `yyyyMMdd-HHmmss.SSS`.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S%.3f";

const TIMESTAMP_PARSE_FORMAT: &str = "%Y%m%d-%H%M%S%.f";

// ── Kinds ─────────────────────────────────────────────────────────────────────

/// Message family. Decides which component a decoded message is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    Beacon,
    Search,
    Download,
    Upload,
    Delete,
}

impl Family {
    pub fn as_str(&self) -> &'static str {
        match self {
            Family::Beacon => "beacon",
            Family::Search => "search",
            Family::Download => "download",
            Family::Upload => "upload",
            Family::Delete => "delete",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a message sits in a request/response exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Announce,
    Request,
    Result,
    Error,
}

/// How a search query is matched against the remote file tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    /// Query is a single root-relative path.
    Path,
    /// Query must equal a file or directory name.
    Filename,
    /// Query must appear inside a file or directory name.
    Substring,
}

impl SearchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchType::Path => "path",
            SearchType::Filename => "filename",
            SearchType::Substring => "substring",
        }
    }
}

impl FromStr for SearchType {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "path" => Ok(SearchType::Path),
            "filename" => Ok(SearchType::Filename),
            "substring" => Ok(SearchType::Substring),
            _ => Err(WireError::UnknownSearchType(s.to_string())),
        }
    }
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which search types a peer answers, as advertised in its beacon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SearchMatch {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "path")]
    Path,
    #[serde(rename = "path-filename")]
    PathFilename,
    #[serde(rename = "path-filename-substring")]
    PathFilenameSubstring,
}

impl SearchMatch {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMatch::None => "none",
            SearchMatch::Path => "path",
            SearchMatch::PathFilename => "path-filename",
            SearchMatch::PathFilenameSubstring => "path-filename-substring",
        }
    }

    /// Whether a peer advertising this mode answers `search_type` queries.
    pub fn allows(&self, search_type: SearchType) -> bool {
        match (self, search_type) {
            (SearchMatch::None, _) => false,
            (SearchMatch::Path, SearchType::Path) => true,
            (SearchMatch::Path, _) => false,
            (SearchMatch::PathFilename, SearchType::Substring) => false,
            (SearchMatch::PathFilename, _) => true,
            (SearchMatch::PathFilenameSubstring, _) => true,
        }
    }
}

impl FromStr for SearchMatch {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(SearchMatch::None),
            "path" => Ok(SearchMatch::Path),
            "path-filename" => Ok(SearchMatch::PathFilename),
            "path-filename-substring" => Ok(SearchMatch::PathFilenameSubstring),
            _ => Err(WireError::UnknownSearchMatch(s.to_string())),
        }
    }
}

impl fmt::Display for SearchMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Capabilities ──────────────────────────────────────────────────────────────

/// Service summary carried in a beacon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capabilities {
    pub remote_browse: bool,
    pub search: bool,
    pub search_match: SearchMatch,
    pub download: bool,
    pub upload: bool,
    pub delete: bool,
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "remoteBrowse={},search={},searchMatch={},download={},upload={},delete={}",
            self.remote_browse,
            self.search,
            self.search_match,
            self.download,
            self.upload,
            self.delete
        )
    }
}

impl FromStr for Capabilities {
    type Err = WireError;

    /// Flags are `true` only for the literal `true`. Unknown names are
    /// skipped; anything not mentioned stays at its default.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut caps = Capabilities::default();
        for pair in s.split(',').filter(|p| !p.is_empty()) {
            let (name, value) = pair
                .split_once('=')
                .ok_or_else(|| WireError::BadCapability(pair.to_string()))?;
            let flag = value == "true";
            match name {
                "remoteBrowse" => caps.remote_browse = flag,
                "search" => caps.search = flag,
                "searchMatch" => caps.search_match = value.parse()?,
                "download" => caps.download = flag,
                "upload" => caps.upload = flag,
                "delete" => caps.delete = flag,
                _ => {}
            }
        }
        Ok(caps)
    }
}

// ── Header & payloads ─────────────────────────────────────────────────────────

/// Fields common to every message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub identity: Identity,
    pub serial: u64,
    /// Local wall-clock time of construction, millisecond precision.
    pub timestamp: NaiveDateTime,
}

impl Header {
    /// Header stamped with the current local time, truncated to milliseconds
    /// so it survives an encode/decode cycle unchanged.
    pub fn now(identity: Identity, serial: u64) -> Self {
        let now = Local::now().naive_local();
        let millis = now.nanosecond() / 1_000_000 * 1_000_000;
        let timestamp = now.with_nanosecond(millis).unwrap_or(now);
        Self {
            identity,
            serial,
            timestamp,
        }
    }

    /// Correlation key `identity:serial`.
    pub fn key(&self) -> String {
        self.identity.key(self.serial)
    }
}

/// Reference from a response back to the request it answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseTo {
    pub identity: Identity,
    pub serial: u64,
}

impl ResponseTo {
    pub fn of(request: &Header) -> Self {
        Self {
            identity: request.identity.clone(),
            serial: request.serial,
        }
    }

    /// Key of the original request, as stored in the requester's pending table.
    pub fn key(&self) -> String {
        self.identity.key(self.serial)
    }
}

/// Peer and file a download/upload/delete request is aimed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub peer: Identity,
    pub path: String,
}

/// Kind-specific payload. One variant per wire kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Beacon {
        server_port: u16,
        capabilities: Capabilities,
    },
    SearchRequest {
        search_type: SearchType,
        query: String,
    },
    SearchResult {
        response_to: ResponseTo,
        matched_path: String,
    },
    SearchError {
        response_to: ResponseTo,
    },
    DownloadRequest(Target),
    DownloadResult {
        response_to: ResponseTo,
        port: u16,
    },
    DownloadError {
        response_to: ResponseTo,
    },
    UploadRequest(Target),
    UploadResult {
        response_to: ResponseTo,
        port: u16,
    },
    UploadError {
        response_to: ResponseTo,
    },
    DeleteRequest(Target),
    DeleteResult {
        response_to: ResponseTo,
    },
    DeleteError {
        response_to: ResponseTo,
    },
}

impl Body {
    pub fn family(&self) -> Family {
        match self {
            Body::Beacon { .. } => Family::Beacon,
            Body::SearchRequest { .. } | Body::SearchResult { .. } | Body::SearchError { .. } => {
                Family::Search
            }
            Body::DownloadRequest(_) | Body::DownloadResult { .. } | Body::DownloadError { .. } => {
                Family::Download
            }
            Body::UploadRequest(_) | Body::UploadResult { .. } | Body::UploadError { .. } => {
                Family::Upload
            }
            Body::DeleteRequest(_) | Body::DeleteResult { .. } | Body::DeleteError { .. } => {
                Family::Delete
            }
        }
    }

    pub fn phase(&self) -> Phase {
        match self {
            Body::Beacon { .. } => Phase::Announce,
            Body::SearchRequest { .. }
            | Body::DownloadRequest(_)
            | Body::UploadRequest(_)
            | Body::DeleteRequest(_) => Phase::Request,
            Body::SearchResult { .. }
            | Body::DownloadResult { .. }
            | Body::UploadResult { .. }
            | Body::DeleteResult { .. } => Phase::Result,
            Body::SearchError { .. }
            | Body::DownloadError { .. }
            | Body::UploadError { .. }
            | Body::DeleteError { .. } => Phase::Error,
        }
    }

    /// Wire name of this kind, e.g. `download-result`.
    pub fn kind(&self) -> String {
        match self.phase() {
            Phase::Announce => self.family().as_str().to_string(),
            Phase::Request => format!("{}-request", self.family()),
            Phase::Result => format!("{}-result", self.family()),
            Phase::Error => format!("{}-error", self.family()),
        }
    }

    /// The request this body answers, for results and errors.
    pub fn response_to(&self) -> Option<&ResponseTo> {
        match self {
            Body::SearchResult { response_to, .. }
            | Body::SearchError { response_to }
            | Body::DownloadResult { response_to, .. }
            | Body::DownloadError { response_to }
            | Body::UploadResult { response_to, .. }
            | Body::UploadError { response_to }
            | Body::DeleteResult { response_to }
            | Body::DeleteError { response_to } => Some(response_to),
            _ => None,
        }
    }

    /// The addressed peer and path, for download/upload/delete requests.
    pub fn target(&self) -> Option<&Target> {
        match self {
            Body::DownloadRequest(t) | Body::UploadRequest(t) | Body::DeleteRequest(t) => Some(t),
            _ => None,
        }
    }
}

// ── Message ───────────────────────────────────────────────────────────────────

/// A complete control-plane message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: Header,
    pub body: Body,
}

impl Message {
    pub fn new(header: Header, body: Body) -> Self {
        Self { header, body }
    }

    pub fn family(&self) -> Family {
        self.body.family()
    }

    /// Key of this message's own header, `identity:serial`.
    pub fn key(&self) -> String {
        self.header.key()
    }

    /// Render the wire line. Characters outside ASCII become `?`, so every
    /// encoded line is a valid datagram.
    pub fn encode(&self) -> String {
        let mut fields = vec![
            self.header.identity.to_string(),
            self.header.serial.to_string(),
            self.header.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            self.body.kind(),
        ];

        match &self.body {
            Body::Beacon {
                server_port,
                capabilities,
            } => {
                fields.push(server_port.to_string());
                fields.push(capabilities.to_string());
            }
            Body::SearchRequest { search_type, query } => {
                fields.push(search_type.to_string());
                fields.push(query.clone());
            }
            Body::SearchResult {
                response_to,
                matched_path,
            } => {
                push_response(&mut fields, response_to);
                fields.push(matched_path.clone());
            }
            Body::DownloadRequest(target)
            | Body::UploadRequest(target)
            | Body::DeleteRequest(target) => {
                fields.push(target.peer.to_string());
                fields.push(target.path.clone());
            }
            Body::DownloadResult { response_to, port } | Body::UploadResult { response_to, port } => {
                push_response(&mut fields, response_to);
                fields.push(port.to_string());
            }
            Body::SearchError { response_to }
            | Body::DownloadError { response_to }
            | Body::UploadError { response_to }
            | Body::DeleteResult { response_to }
            | Body::DeleteError { response_to } => {
                push_response(&mut fields, response_to);
            }
        }

        format!(":{}:", fields.join(":"))
            .chars()
            .map(|c| if c.is_ascii() { c } else { '?' })
            .collect()
    }

    /// Parse a wire line. Surrounding whitespace and NUL padding are ignored.
    pub fn decode(line: &str) -> Result<Self, WireError> {
        let line = line.trim_matches(|c: char| c.is_whitespace() || c == '\0');
        let parts: Vec<&str> = line.split(':').collect();
        if parts.len() < 5 {
            return Err(WireError::TooFewFields(parts.len()));
        }

        let identity: Identity = parts[1].parse()?;
        let serial = parse_number::<u64>("serialNumber", parts[2])?;
        let timestamp = NaiveDateTime::parse_from_str(parts[3], TIMESTAMP_PARSE_FORMAT)
            .map_err(|_| WireError::BadTimestamp(parts[3].to_string()))?;
        let header = Header {
            identity,
            serial,
            timestamp,
        };

        let kind = parts[4].to_ascii_lowercase();
        let payload = Payload {
            kind: &kind,
            fields: &parts[5..],
        };

        let body = match kind.as_str() {
            "beacon" => Body::Beacon {
                server_port: payload.number("serverPort", 0)?,
                capabilities: payload.field("services", 1)?.parse()?,
            },
            "search-request" => Body::SearchRequest {
                search_type: payload.field("searchType", 0)?.parse()?,
                query: payload.field("searchString", 1)?.to_string(),
            },
            "search-result" => Body::SearchResult {
                response_to: payload.response_to()?,
                matched_path: payload.field("matchedPath", 2)?.to_string(),
            },
            "search-error" => Body::SearchError {
                response_to: payload.response_to()?,
            },
            "download-request" => Body::DownloadRequest(payload.target()?),
            "download-result" => Body::DownloadResult {
                response_to: payload.response_to()?,
                port: payload.number("fileTransferPort", 2)?,
            },
            "download-error" => Body::DownloadError {
                response_to: payload.response_to()?,
            },
            "upload-request" => Body::UploadRequest(payload.target()?),
            "upload-result" => Body::UploadResult {
                response_to: payload.response_to()?,
                port: payload.number("fileTransferPort", 2)?,
            },
            "upload-error" => Body::UploadError {
                response_to: payload.response_to()?,
            },
            "delete-request" => Body::DeleteRequest(payload.target()?),
            "delete-result" => Body::DeleteResult {
                response_to: payload.response_to()?,
            },
            "delete-error" => Body::DeleteError {
                response_to: payload.response_to()?,
            },
            _ => return Err(WireError::UnknownKind(parts[4].to_string())),
        };

        Ok(Message { header, body })
    }

    /// Decode a received datagram. Non-ASCII content is rejected.
    pub fn from_datagram(bytes: &[u8]) -> Result<Self, WireError> {
        if !bytes.is_ascii() {
            return Err(WireError::NotAscii);
        }
        let text = std::str::from_utf8(bytes).map_err(|_| WireError::NotAscii)?;
        Self::decode(text)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

fn push_response(fields: &mut Vec<String>, response_to: &ResponseTo) {
    fields.push(response_to.identity.to_string());
    fields.push(response_to.serial.to_string());
}

fn parse_number<T: FromStr>(field: &'static str, value: &str) -> Result<T, WireError> {
    value.parse().map_err(|_| WireError::BadNumber {
        field,
        value: value.to_string(),
    })
}

/// Positional view of the payload fields of one message.
struct Payload<'a> {
    kind: &'a str,
    fields: &'a [&'a str],
}

impl<'a> Payload<'a> {
    fn field(&self, name: &'static str, index: usize) -> Result<&'a str, WireError> {
        self.fields
            .get(index)
            .copied()
            .ok_or_else(|| WireError::MissingField {
                kind: self.kind.to_string(),
                field: name,
            })
    }

    fn number<T: FromStr>(&self, name: &'static str, index: usize) -> Result<T, WireError> {
        parse_number(name, self.field(name, index)?)
    }

    fn response_to(&self) -> Result<ResponseTo, WireError> {
        Ok(ResponseTo {
            identity: self.field("responseIdentity", 0)?.parse()?,
            serial: self.number("responseSerialNumber", 1)?,
        })
    }

    fn target(&self) -> Result<Target, WireError> {
        Ok(Target {
            peer: self.field("targetPeerIdentity", 0)?.parse()?,
            path: self.field("targetFilePath", 1)?.to_string(),
        })
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Reasons a line is not a recognized message. The receiver drops these.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("expected at least 5 fields, found {0}")]
    TooFewFields(usize),

    #[error("unknown message kind: {0}")]
    UnknownKind(String),

    #[error("{kind} is missing field {field}")]
    MissingField { kind: String, field: &'static str },

    #[error("field {field} is not a valid number: {value}")]
    BadNumber { field: &'static str, value: String },

    #[error("bad timestamp: {0}")]
    BadTimestamp(String),

    #[error("bad identity (expected username@hostname): {0}")]
    BadIdentity(String),

    #[error("bad capability entry: {0}")]
    BadCapability(String),

    #[error("unknown search type: {0}")]
    UnknownSearchType(String),

    #[error("unknown search match mode: {0}")]
    UnknownSearchMatch(String),

    #[error("datagram is not ASCII text")]
    NotAscii,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
