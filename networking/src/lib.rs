pub mod error;
pub mod peer;
pub mod seeds;
pub mod sync;
pub mod types;

pub use error::{PeerGroupError, TransportError, ValidationError};
pub use sync::{PeerGroup, PeerGroupConfig, PeerGroupHandle};
pub use types::{
    BloomFilterProvider, ConnectionState, InboundMessage, NetworkReachability, OutboundMessage,
    PeerGroupControl, PeerTransport, SyncStateListener,
};
