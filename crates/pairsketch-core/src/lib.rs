//! PairSketch Core Library
//!
//! Shared-scene synchronization for two peers drawing on the same surface:
//! the scene model, the wire codec, the sync engine and the session that
//! binds it to a peer channel transport.

pub mod codec;
pub mod config;
pub mod decode;
pub mod editor;
pub mod engine;
pub mod render;
pub mod scene;
pub mod session;
pub mod shapes;
pub mod transport;

pub use codec::{Action, CodecError, WireMessage};
pub use config::{Config, ConfigError};
pub use decode::{DecodeError, ImageDecoder, InlineDecoder, ThreadedDecoder};
pub use editor::{EditorContext, Gesture, Modifiers, Tool};
pub use engine::{ChannelRole, ConnectionState, SyncEngine, UploadPolicy};
pub use render::{DisplayList, DrawCommand, GRID_SIZE, RenderSurface};
pub use scene::{HitZone, ImageHit, Origin, Scene, SceneError, StrokeCursor};
pub use session::{SessionError, SessionManager};
pub use transport::{ChannelId, ChannelOptions, MemoryNetwork, MemoryTransport, Transport, TransportError, TransportEvent};
#[cfg(not(target_arch = "wasm32"))]
pub use transport::NativeTransport;
