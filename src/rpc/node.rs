//! RPC node tree: hierarchical routing, method dispatch, and synchronous
//! request/response correlation.
//!
//! Nodes live in a single flat arena (`RpcTree`) addressed by [`NodeId`]
//! rather than linked by raw pointers or `Rc<RefCell<_>>` — the same
//! index-arithmetic-tree idiom this crate already uses for linked buffer
//! fields, applied to a routing tree instead of a byte arena.

use super::message::{prepend_path_segment, tokenize, MethodName, Path, PathToken, RpcMessage};
use crate::error::RoutingError;
use crate::provider::MonotonicClock;
use heapless::Vec;

/// Default capacities, matching the original framework's compile-time
/// limits (see [`crate::config::CoreConfig`] for the runtime-documented
/// defaults these mirror).
pub const MAX_SUBNODES: usize = 5;
pub const MAX_METHODS: usize = 5;
pub const MAX_INFLIGHT_REQUESTS: usize = 2;
const MAX_NODE_NAME_LEN: usize = 16;

type NodeName = heapless::String<MAX_NODE_NAME_LEN>;

/// Identifies a node within one [`RpcTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeId(pub usize);

/// A method handler: receives request params, writes response params, and
/// returns whether a response should be sent at all (some methods are
/// fire-and-forget even when invoked as a Request).
pub type MethodCallback<const PARAMS_CAP: usize> =
    fn(params: &[u8], response: &mut Vec<u8, PARAMS_CAP>) -> bool;

struct MethodEntry<const PARAMS_CAP: usize> {
    name: MethodName,
    callback: MethodCallback<PARAMS_CAP>,
}

#[derive(Debug)]
struct InflightEntry<const PARAMS_CAP: usize> {
    id: u16,
    response: Option<Vec<u8, PARAMS_CAP>>,
}

struct Node<const PARAMS_CAP: usize> {
    name: NodeName,
    parent: Option<usize>,
    subnodes: Vec<usize, MAX_SUBNODES>,
    methods: Vec<MethodEntry<PARAMS_CAP>, MAX_METHODS>,
    inflight: Vec<InflightEntry<PARAMS_CAP>, MAX_INFLIGHT_REQUESTS>,
    is_global_root: bool,
    is_local_root: bool,
    current_id: u16,
}

/// Outcome of routing and dispatching a request to wherever it lands.
pub enum RouteOutcome<const PARAMS_CAP: usize> {
    /// The request reached a node with a matching method; `response` is
    /// `Some` only if the callback indicated a reply was warranted.
    /// `source_path` is the reverse route accumulated during upstream
    /// hops, ready to address a reply back to `origin`.
    Delivered { responder: NodeId, source_path: Path, response: Option<Vec<u8, PARAMS_CAP>> },
    NoRoute,
}

/// A flat arena of RPC nodes, addressed by [`NodeId`].
pub struct RpcTree<const MAX_NODES: usize, const PARAMS_CAP: usize> {
    nodes: Vec<Node<PARAMS_CAP>, MAX_NODES>,
}

impl<const MAX_NODES: usize, const PARAMS_CAP: usize> Default for RpcTree<MAX_NODES, PARAMS_CAP> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const MAX_NODES: usize, const PARAMS_CAP: usize> RpcTree<MAX_NODES, PARAMS_CAP> {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    fn new_node(name: &str, is_global_root: bool, is_local_root: bool) -> Option<Node<PARAMS_CAP>> {
        Some(Node {
            name: NodeName::try_from(name).ok()?,
            parent: None,
            subnodes: Vec::new(),
            methods: Vec::new(),
            inflight: Vec::new(),
            is_global_root,
            is_local_root,
            current_id: 0,
        })
    }

    /// Add an unattached root node (global root, local root, or plain).
    pub fn add_root(&mut self, name: &str, is_global_root: bool, is_local_root: bool) -> Result<NodeId, RoutingError> {
        let node = Self::new_node(name, is_global_root, is_local_root).ok_or(RoutingError::TableFull)?;
        self.nodes.push(node).map_err(|_| RoutingError::TableFull)?;
        Ok(NodeId(self.nodes.len() - 1))
    }

    /// Attach a new subnode under `parent`.
    pub fn add_subnode(&mut self, parent: NodeId, name: &str) -> Result<NodeId, RoutingError> {
        if self.nodes[parent.0].subnodes.len() >= MAX_SUBNODES {
            return Err(RoutingError::TableFull);
        }
        let mut node = Self::new_node(name, false, false).ok_or(RoutingError::TableFull)?;
        node.parent = Some(parent.0);
        self.nodes.push(node).map_err(|_| RoutingError::TableFull)?;
        let child_idx = self.nodes.len() - 1;
        self.nodes[parent.0].subnodes.push(child_idx).map_err(|_| RoutingError::TableFull)?;
        Ok(NodeId(child_idx))
    }

    /// Register a method callback on `node`.
    pub fn add_method(&mut self, node: NodeId, name: &str, callback: MethodCallback<PARAMS_CAP>) -> Result<(), RoutingError> {
        let entry = MethodEntry { name: MethodName::try_from(name).ok().ok_or(RoutingError::TableFull)?, callback };
        self.nodes[node.0].methods.push(entry).map_err(|_| RoutingError::TableFull)
    }

    fn find_subnode_by_name(&self, node: usize, name: &str) -> Option<usize> {
        self.nodes[node].subnodes.iter().copied().find(|&idx| self.nodes[idx].name.as_str() == name)
    }

    fn find_method(&self, node: usize, name: &str) -> Option<MethodCallback<PARAMS_CAP>> {
        self.nodes[node].methods.iter().find(|m| m.name.as_str() == name).map(|m| m.callback)
    }

    /// Route `destination_path` starting from `origin`, alternating
    /// upstream (toward root, resolving `..`/`~`/leading `/`) and
    /// downstream (toward leaves, resolving named children) traversal,
    /// per the node-tree routing algorithm. Every upstream hop this walk
    /// climbs prepends that node's name onto `source_path`, so the caller
    /// can address a reply straight back down the way the request came.
    fn route(&self, origin: usize, destination_path: &str, source_path: &mut Path) -> Result<usize, RoutingError> {
        let tokens = tokenize(destination_path);
        let mut cursor = 0usize;
        let mut current = origin;
        let mut upstream = true;

        loop {
            if upstream {
                match tokens.get(cursor) {
                    None => return Ok(current),
                    Some(PathToken::Parent) => {
                        cursor += 1;
                        prepend_path_segment(source_path, self.nodes[current].name.as_str());
                        current = self.nodes[current].parent.ok_or(RoutingError::NoRoute)?;
                    }
                    Some(PathToken::GlobalRoot) => {
                        if self.nodes[current].is_global_root {
                            cursor += 1;
                            upstream = false;
                        } else {
                            prepend_path_segment(source_path, self.nodes[current].name.as_str());
                            current = self.nodes[current].parent.ok_or(RoutingError::NoRoute)?;
                        }
                    }
                    Some(PathToken::LocalRoot) => {
                        if self.nodes[current].is_local_root {
                            cursor += 1;
                            upstream = false;
                        } else {
                            prepend_path_segment(source_path, self.nodes[current].name.as_str());
                            current = self.nodes[current].parent.ok_or(RoutingError::NoRoute)?;
                        }
                    }
                    Some(PathToken::Name(name)) => {
                        current = self.find_subnode_by_name(current, name).ok_or(RoutingError::NoRoute)?;
                        cursor += 1;
                        upstream = false;
                    }
                }
            } else {
                match tokens.get(cursor) {
                    None => return Ok(current),
                    Some(PathToken::Name(name)) => {
                        current = self.find_subnode_by_name(current, name).ok_or(RoutingError::NoRoute)?;
                        cursor += 1;
                    }
                    Some(_) => return Err(RoutingError::NoRoute),
                }
            }
        }
    }

    /// Route and deliver a request from `origin`. If the destination's
    /// method callback returns `true`, the response bytes are returned too
    /// (the caller, typically a transport adapter, is responsible for
    /// wire-encoding and sending the reply upstream), addressed via the
    /// returned `source_path` retraced during routing.
    pub fn dispatch_request(
        &mut self,
        origin: NodeId,
        destination_path: &str,
        method_name: &str,
        params: &[u8],
    ) -> RouteOutcome<PARAMS_CAP> {
        let Some(mut msg) = RpcMessage::<PARAMS_CAP>::request(0, destination_path, method_name, params) else {
            return RouteOutcome::NoRoute;
        };
        let target = match self.route(origin.0, destination_path, &mut msg.source_path) {
            Ok(t) => t,
            Err(_) => return RouteOutcome::NoRoute,
        };
        let Some(callback) = self.find_method(target, method_name) else {
            return RouteOutcome::NoRoute;
        };
        let mut response: Vec<u8, PARAMS_CAP> = Vec::new();
        let wants_response = callback(msg.params.as_slice(), &mut response);
        RouteOutcome::Delivered {
            responder: NodeId(target),
            source_path: msg.source_path,
            response: if wants_response { Some(response) } else { None },
        }
    }

    fn next_id(&mut self, node: usize) -> u16 {
        let n = &mut self.nodes[node];
        loop {
            n.current_id = n.current_id.wrapping_add(1);
            if n.current_id != 0 && !n.inflight.iter().any(|e| e.id == n.current_id) {
                return n.current_id;
            }
        }
    }

    /// Issue a synchronous request: assign a fresh id, dispatch it, and —
    /// if the destination is reachable in this same call — return its
    /// response immediately. Otherwise busy-wait against `clock` until the
    /// response arrives (delivered out-of-band via [`Self::deliver_response`])
    /// or `timeout_ms` elapses.
    pub fn send_request_sync(
        &mut self,
        origin: NodeId,
        destination_path: &str,
        method_name: &str,
        params: &[u8],
        timeout_ms: u32,
        clock: &dyn MonotonicClock,
    ) -> Result<Vec<u8, PARAMS_CAP>, RoutingError> {
        if self.nodes[origin.0].inflight.len() >= MAX_INFLIGHT_REQUESTS {
            return Err(RoutingError::NoFreeRequestId);
        }
        let id = self.next_id(origin.0);
        self.nodes[origin.0]
            .inflight
            .push(InflightEntry { id, response: None })
            .map_err(|_| RoutingError::NoFreeRequestId)?;

        match self.dispatch_request(origin, destination_path, method_name, params) {
            RouteOutcome::Delivered { response: Some(resp), .. } => {
                self.remove_inflight(origin.0, id);
                return Ok(resp);
            }
            RouteOutcome::Delivered { response: None, .. } => {
                self.remove_inflight(origin.0, id);
                return Err(RoutingError::NoRoute);
            }
            RouteOutcome::NoRoute => {}
        }

        let deadline = clock.now_ms().saturating_add(u64::from(timeout_ms));
        loop {
            if let Some(entry) = self.nodes[origin.0].inflight.iter().find(|e| e.id == id) {
                if let Some(resp) = &entry.response {
                    let resp = resp.clone();
                    self.remove_inflight(origin.0, id);
                    return Ok(resp);
                }
            }
            if clock.now_ms() >= deadline {
                self.remove_inflight(origin.0, id);
                return Err(RoutingError::RequestTimedOut);
            }
        }
    }

    /// Deliver a response for a previously-sent synchronous request,
    /// identified by id, to `node`'s inflight table. Called by the
    /// transport layer when a Response message for this node arrives.
    pub fn deliver_response(&mut self, node: NodeId, id: u16, response: Vec<u8, PARAMS_CAP>) -> bool {
        if let Some(entry) = self.nodes[node.0].inflight.iter_mut().find(|e| e.id == id) {
            entry.response = Some(response);
            true
        } else {
            false
        }
    }

    fn remove_inflight(&mut self, node: usize, id: u16) {
        let n = &mut self.nodes[node];
        if let Some(pos) = n.inflight.iter().position(|e| e.id == id) {
            n.inflight.swap_remove(pos);
        }
    }

    pub fn node_name(&self, node: NodeId) -> &str {
        self.nodes[node.0].name.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::sim::SimClock;

    fn echo_callback(params: &[u8], response: &mut Vec<u8, 32>) -> bool {
        let _ = response.extend_from_slice(params);
        true
    }

    fn notify_only(_params: &[u8], _response: &mut Vec<u8, 32>) -> bool {
        false
    }

    #[test]
    fn direct_child_routing_and_dispatch() {
        let mut tree: RpcTree<8, 32> = RpcTree::new();
        let root = tree.add_root("root", true, true).unwrap();
        let leaf = tree.add_subnode(root, "leaf").unwrap();
        tree.add_method(leaf, "echo", echo_callback).unwrap();

        match tree.dispatch_request(root, "leaf", "echo", b"hi") {
            RouteOutcome::Delivered { response, .. } => assert_eq!(response.unwrap(), b"hi"),
            RouteOutcome::NoRoute => panic!("expected route"),
        }
    }

    #[test]
    fn upstream_then_downstream_sibling_routing() {
        let mut tree: RpcTree<8, 32> = RpcTree::new();
        let root = tree.add_root("root", true, true).unwrap();
        let a = tree.add_subnode(root, "a").unwrap();
        let b = tree.add_subnode(root, "b").unwrap();
        tree.add_method(b, "ping", echo_callback).unwrap();

        match tree.dispatch_request(a, "../b", "ping", b"x") {
            RouteOutcome::Delivered { response, .. } => assert_eq!(response.unwrap(), b"x"),
            RouteOutcome::NoRoute => panic!("expected route via parent then sibling"),
        }
    }

    #[test]
    fn global_root_prefix_routes_from_anywhere() {
        let mut tree: RpcTree<8, 32> = RpcTree::new();
        let root = tree.add_root("root", true, true).unwrap();
        let a = tree.add_subnode(root, "a").unwrap();
        let deep = tree.add_subnode(a, "deep").unwrap();
        let b = tree.add_subnode(root, "b").unwrap();
        tree.add_method(b, "ping", echo_callback).unwrap();

        match tree.dispatch_request(deep, "/b", "ping", b"y") {
            RouteOutcome::Delivered { response, .. } => assert_eq!(response.unwrap(), b"y"),
            RouteOutcome::NoRoute => panic!("expected route via global root"),
        }
    }

    #[test]
    fn notification_only_method_yields_no_response() {
        let mut tree: RpcTree<8, 32> = RpcTree::new();
        let root = tree.add_root("root", true, true).unwrap();
        let leaf = tree.add_subnode(root, "leaf").unwrap();
        tree.add_method(leaf, "log", notify_only).unwrap();

        match tree.dispatch_request(root, "leaf", "log", b"evt") {
            RouteOutcome::Delivered { response, .. } => assert!(response.is_none()),
            RouteOutcome::NoRoute => panic!("expected route"),
        }
    }

    #[test]
    fn unknown_route_is_dropped() {
        let mut tree: RpcTree<8, 32> = RpcTree::new();
        let root = tree.add_root("root", true, true).unwrap();
        match tree.dispatch_request(root, "nope", "x", b"") {
            RouteOutcome::NoRoute => {}
            RouteOutcome::Delivered { .. } => panic!("expected no route"),
        }
    }

    #[test]
    fn send_request_sync_resolves_immediately_for_in_process_target() {
        let mut tree: RpcTree<8, 32> = RpcTree::new();
        let root = tree.add_root("root", true, true).unwrap();
        let leaf = tree.add_subnode(root, "leaf").unwrap();
        tree.add_method(leaf, "echo", echo_callback).unwrap();

        let clock = SimClock::new();
        let resp = tree.send_request_sync(root, "leaf", "echo", b"sync", 1_000, &clock).unwrap();
        assert_eq!(resp, b"sync");
    }

    #[test]
    fn send_request_sync_times_out_on_unreachable_destination() {
        let mut tree: RpcTree<8, 32> = RpcTree::new();
        let root = tree.add_root("root", true, true).unwrap();
        let clock = SimClock::new();
        let err = tree.send_request_sync(root, "missing", "x", b"", 10, &clock).unwrap_err();
        assert_eq!(err, RoutingError::NoRoute);
    }

    #[test]
    fn inflight_ids_are_unique_while_concurrently_outstanding() {
        let mut tree: RpcTree<8, 32> = RpcTree::new();
        let root = tree.add_root("root", true, true).unwrap();
        let id1 = tree.next_id(root.0);
        tree.nodes[root.0].inflight.push(InflightEntry { id: id1, response: None }).unwrap();
        let id2 = tree.next_id(root.0);
        assert_ne!(id1, id2);
    }
}
