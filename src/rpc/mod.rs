//! Broker-borne RPC subsystem.
//!
//! ```text
//! ┌──────────────┐ topic, payload ┌──────────┐  RpcRequest  ┌────────────┐
//! │ Session loop │───────────────▶│  Codec   │─────────────▶│ Dispatcher │
//! │  (inbound)   │                │ (JSON)   │              │ (registry) │
//! └──────────────┘                └──────────┘              └─────┬──────┘
//!        ▲                                                        │
//!        └─────────────── RpcReply on .../rpc/response/{id} ──────┘
//! ```

pub mod codec;
pub mod dispatcher;

pub use codec::{Params, RpcErrorKind, RpcRequest};
pub use dispatcher::{DispatchStats, RpcDispatcher, RpcReply};
