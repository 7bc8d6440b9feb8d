//! RPC message envelope and path parsing.

use heapless::String;

pub const MAX_PATH_LEN: usize = 64;
pub const MAX_METHOD_NAME_LEN: usize = 10;

pub type Path = String<MAX_PATH_LEN>;
pub type MethodName = String<MAX_METHOD_NAME_LEN>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcMessageType {
    Request,
    Response,
    Notification,
}

impl RpcMessageType {
    pub fn to_wire(self) -> u8 {
        match self {
            Self::Request => 1,
            Self::Response => 2,
            Self::Notification => 3,
        }
    }

    pub fn from_wire(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Request),
            2 => Some(Self::Response),
            3 => Some(Self::Notification),
            _ => None,
        }
    }
}

/// A single path component after tokenizing a destination/source path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathToken<'a> {
    /// Leading `/` — route to the global root.
    GlobalRoot,
    /// `~` — route to the local root.
    LocalRoot,
    /// `..` — route to the parent.
    Parent,
    /// A named child/subnode.
    Name(&'a str),
}

/// Split a `/`-delimited path into tokens, in order, ignoring empty
/// components produced by consecutive slashes (except a single leading `/`,
/// which yields a [`PathToken::GlobalRoot`] token ahead of the rest).
pub fn tokenize(path: &str) -> heapless::Vec<PathToken<'_>, 16> {
    let mut out = heapless::Vec::new();
    if path.starts_with('/') {
        let _ = out.push(PathToken::GlobalRoot);
    }
    for s in path.split('/').filter(|s| !s.is_empty()) {
        let tok = match s {
            "~" => PathToken::LocalRoot,
            ".." => PathToken::Parent,
            name => PathToken::Name(name),
        };
        if out.push(tok).is_err() {
            break;
        }
    }
    out
}

/// Prepend `name` to `path`, as every upstream routing hop does to build a
/// reply route back the way a request came.
pub fn prepend_path_segment(path: &mut Path, name: &str) -> bool {
    let mut joined: Path = Path::new();
    if joined.push_str(name).is_err() {
        return false;
    }
    if !path.is_empty() {
        if joined.push('/').is_err() {
            return false;
        }
        if joined.push_str(path).is_err() {
            return false;
        }
    }
    *path = joined;
    true
}

/// An RPC message: a request awaiting a response, a response correlated by
/// id, or a fire-and-forget notification.
pub struct RpcMessage<const PARAMS_CAP: usize> {
    pub msg_type: RpcMessageType,
    /// Present for Request/Response; ignored for Notification.
    pub id: u16,
    pub source_path: Path,
    pub destination_path: Path,
    /// Present for Request/Notification.
    pub method_name: MethodName,
    pub params: heapless::Vec<u8, PARAMS_CAP>,
}

impl<const PARAMS_CAP: usize> RpcMessage<PARAMS_CAP> {
    pub fn request(id: u16, destination_path: &str, method_name: &str, params: &[u8]) -> Option<Self> {
        Some(Self {
            msg_type: RpcMessageType::Request,
            id,
            source_path: Path::new(),
            destination_path: Path::try_from(destination_path).ok()?,
            method_name: MethodName::try_from(method_name).ok()?,
            params: heapless::Vec::from_slice(params).ok()?,
        })
    }

    pub fn response_to(&self, params: &[u8]) -> Option<Self> {
        Some(Self {
            msg_type: RpcMessageType::Response,
            id: self.id,
            source_path: Path::new(),
            destination_path: self.source_path.clone(),
            method_name: MethodName::new(),
            params: heapless::Vec::from_slice(params).ok()?,
        })
    }

    /// Prepend `name` to this message's source path, as every upstream hop
    /// does, so the eventual reply can retrace the route.
    pub fn prepend_source(&mut self, name: &str) -> bool {
        prepend_path_segment(&mut self.source_path, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_global_root_then_names() {
        let toks = tokenize("/sensors/temp");
        assert_eq!(
            toks.as_slice(),
            &[PathToken::GlobalRoot, PathToken::Name("sensors"), PathToken::Name("temp")]
        );
    }

    #[test]
    fn tokenize_parent_and_local_root() {
        let toks = tokenize("../~/leaf");
        assert_eq!(
            toks.as_slice(),
            &[PathToken::Parent, PathToken::LocalRoot, PathToken::Name("leaf")]
        );
    }

    #[test]
    fn prepend_source_builds_reverse_route() {
        let mut msg: RpcMessage<16> = RpcMessage::request(1, "a/b", "get", &[]).unwrap();
        msg.prepend_source("leaf");
        msg.prepend_source("root");
        assert_eq!(msg.source_path.as_str(), "root/leaf");
    }
}

#[cfg(all(test, not(target_os = "espidf")))]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn name() -> impl Strategy<Value = std::string::String> {
        "[a-z]{1,8}"
    }

    proptest! {
        /// Tokenizing a plain `/`-joined path (no `..`, `~`, leading `/`)
        /// yields one `Name` token per segment, in order.
        #[test]
        fn tokenize_preserves_plain_name_segments(names in proptest::collection::vec(name(), 1..5)) {
            let path = names.join("/");
            let toks = tokenize(&path);
            prop_assert_eq!(toks.len(), names.len());
            for (tok, expected) in toks.iter().zip(names.iter()) {
                match tok {
                    PathToken::Name(n) => prop_assert_eq!(n, &expected.as_str()),
                    other => prop_assert!(false, "expected Name token, got {:?}", other),
                }
            }
        }

        /// A request's params survive construction unchanged.
        #[test]
        fn request_preserves_params(params in proptest::collection::vec(any::<u8>(), 0..16)) {
            let msg: RpcMessage<16> = RpcMessage::request(1, "leaf", "echo", &params).unwrap();
            prop_assert_eq!(msg.params.as_slice(), params.as_slice());
        }
    }
}
