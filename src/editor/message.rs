//! Messages posted by the embedded editor surface.

use serde::{Deserialize, Serialize};

use crate::record::{FileMap, TabId};

/// One structured message from the editor, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum EditorMessage {
    /// Intent to start before files are ready.
    EarlyInit {
        host: TabId,
        #[serde(default)]
        last_modified: Option<u64>,
    },
    Started {
        host: TabId,
        #[serde(default)]
        last_modified: Option<u64>,
    },
    Stopped {
        host: TabId,
    },
    FilesUpdated {
        host: TabId,
        last_modified: u64,
        #[serde(default)]
        files: FileMap,
        compiled_content: String,
    },
    /// The editor has nothing to run.
    NoFiles {
        host: TabId,
    },
}

impl EditorMessage {
    pub fn host(&self) -> &TabId {
        match self {
            Self::EarlyInit { host, .. }
            | Self::Started { host, .. }
            | Self::Stopped { host }
            | Self::FilesUpdated { host, .. }
            | Self::NoFiles { host } => host,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::EarlyInit { .. } => "early-init",
            Self::Started { .. } => "started",
            Self::Stopped { .. } => "stopped",
            Self::FilesUpdated { .. } => "files-updated",
            Self::NoFiles { .. } => "no-files",
        }
    }
}

/// A message together with the origin it was posted from.
///
/// Line-oriented transports (stdin) carry the origin inline; a missing
/// origin means "same origin as the surface".
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(flatten)]
    pub message: EditorMessage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_files_updated() {
        let msg: EditorMessage = serde_json::from_value(json!({
            "type": "files-updated",
            "host": "ed-1",
            "lastModified": 42,
            "files": {"main.ts": "x"},
            "compiledContent": "C"
        }))
        .unwrap();

        match &msg {
            EditorMessage::FilesUpdated {
                last_modified,
                compiled_content,
                files,
                ..
            } => {
                assert_eq!(*last_modified, 42);
                assert_eq!(compiled_content, "C");
                assert_eq!(files.len(), 1);
            }
            other => panic!("unexpected message: {other:?}"),
        }
        assert_eq!(msg.host().as_str(), "ed-1");
        assert_eq!(msg.tag(), "files-updated");
    }

    #[test]
    fn test_parse_started() {
        let msg: EditorMessage = serde_json::from_str(
            r#"{"type":"started","host":"tab-1","lastModified":1700000000000}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            EditorMessage::Started {
                host: TabId::new("tab-1"),
                last_modified: Some(1_700_000_000_000)
            }
        );
    }

    #[test]
    fn test_optional_last_modified() {
        let msg: EditorMessage =
            serde_json::from_value(json!({"type": "early-init", "host": "h"})).unwrap();
        assert_eq!(
            msg,
            EditorMessage::EarlyInit {
                host: TabId::new("h"),
                last_modified: None
            }
        );
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let result: Result<EditorMessage, _> =
            serde_json::from_value(json!({"type": "restart", "host": "h"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_envelope_origin() {
        let env: Envelope = serde_json::from_str(
            r#"{"origin":"https://evil.example","type":"stopped","host":"h"}"#,
        )
        .unwrap();
        assert_eq!(env.origin.as_deref(), Some("https://evil.example"));
        assert_eq!(env.message.tag(), "stopped");

        let env: Envelope = serde_json::from_str(r#"{"type":"no-files","host":"h"}"#).unwrap();
        assert!(env.origin.is_none());
    }
}
