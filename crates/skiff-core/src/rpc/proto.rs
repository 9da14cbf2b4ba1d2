//! Protobuf messages of the `rpc.Skiff` service.
//!
//! Declared by hand with the `prost` derives so the crate builds without
//! `protoc`. The equivalent schema:
//!
//! ```text
//! service Skiff {
//!   rpc GetVersion(Empty) returns (Version);
//!   rpc UpBuild(UpMessage) returns (stream UpMessage);
//!   rpc UpStream(stream UpMessage) returns (stream UpMessage);
//! }
//! ```

/// Fully qualified gRPC method paths.
pub mod methods {
    pub const GET_VERSION: &str = "/rpc.Skiff/GetVersion";
    pub const UP_BUILD: &str = "/rpc.Skiff/UpBuild";
    pub const UP_STREAM: &str = "/rpc.Skiff/UpStream";
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Empty {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Version {
    #[prost(string, tag = "1")]
    pub sem_ver: String,
    #[prost(string, tag = "2")]
    pub git_commit: String,
    #[prost(string, tag = "3")]
    pub git_tree_state: String,
}

/// Zipped application directory uploaded with a build request.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AppArchive {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(bytes = "vec", tag = "2")]
    pub content: Vec<u8>,
}

/// What to build and where to deploy it. Immutable once submitted.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BuildRequest {
    #[prost(string, tag = "1")]
    pub app_name: String,
    #[prost(string, tag = "2")]
    pub namespace: String,
    #[prost(string, tag = "3")]
    pub source_ref: String,
    #[prost(message, optional, tag = "4")]
    pub app_archive: Option<AppArchive>,
    /// Raw chart values override, YAML.
    #[prost(string, tag = "5")]
    pub values: String,
}

/// Progress of one pipeline stage.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpSummary {
    #[prost(string, tag = "1")]
    pub stage_desc: String,
    #[prost(enumeration = "StatusCode", tag = "2")]
    pub status_code: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum StatusCode {
    Pending = 0,
    Success = 1,
    Failure = 2,
}

/// Envelope exchanged on both streaming methods.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpMessage {
    #[prost(oneof = "up_message::Payload", tags = "1, 2")]
    pub payload: Option<up_message::Payload>,
}

pub mod up_message {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Payload {
        #[prost(message, tag = "1")]
        Request(super::BuildRequest),
        #[prost(message, tag = "2")]
        Summary(super::UpSummary),
    }
}

impl StatusCode {
    /// SUCCESS and FAILURE end a stage; PENDING does not.
    pub fn is_terminal(self) -> bool {
        matches!(self, StatusCode::Success | StatusCode::Failure)
    }
}

impl UpSummary {
    pub fn new(stage_desc: impl Into<String>, status: StatusCode) -> Self {
        Self {
            stage_desc: stage_desc.into(),
            status_code: status as i32,
        }
    }

    /// Decoded status, `None` for codes this client does not know.
    pub fn status(&self) -> Option<StatusCode> {
        StatusCode::try_from(self.status_code).ok()
    }
}

impl UpMessage {
    pub fn request(request: BuildRequest) -> Self {
        Self {
            payload: Some(up_message::Payload::Request(request)),
        }
    }

    pub fn summary(summary: UpSummary) -> Self {
        Self {
            payload: Some(up_message::Payload::Summary(summary)),
        }
    }

    /// The stage summary carried by this envelope, if that is its payload.
    pub fn into_summary(self) -> Option<UpSummary> {
        match self.payload {
            Some(up_message::Payload::Summary(summary)) => Some(summary),
            _ => None,
        }
    }
}
