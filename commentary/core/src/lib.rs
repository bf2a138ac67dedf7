//! Commentary Core - Live Commentary Sync and Compositing for autorec
//!
//! This crate keeps a live comment stream in step with whatever broadcaster
//! the viewer is watching and renders it over the video, either inline or in
//! a detached picture-in-picture view. It has no UI framework dependencies;
//! hosts provide the video, the window and the socket transport.
//!
//! # Architecture
//!
//! ```text
//!  broadcaster name
//!        │ start()
//! ┌──────┴───────────────────────────────────────────────────────────┐
//! │                     ConnectionManager                             │
//! │  watch socket ──seat/room──▶ comment socket ──chat──┐             │
//! │   (keepSeat, pong, retry with generation guard)     │             │
//! └─────────────────────────────────────────────────────┼─────────────┘
//!                                                       ▼
//!                            ┌──────────────────────────────────────┐
//!                            │ SharedCommentBuffer  (LaneScheduler) │
//!                            └───────┬──────────────────────┬───────┘
//!                     CommentaryEvent│                      │ active_snapshot()
//!                                    ▼                      ▼
//!                   ┌───────────────────────────┐  ┌─────────────────┐
//!                   │ SinkRouter                │  │ CompositorPiP   │
//!                   │  OverlaySink │ SidebarSink │  │ video + comments│
//!                   └───────────────────────────┘  └─────────────────┘
//!                         ▲
//!                         │ RenderMode
//!                   PreferenceStore
//! ```
//!
//! # Key Types
//!
//! - [`ConnectionManager`]: Drives the two-socket handshake for one broadcaster
//! - [`SharedCommentBuffer`]: Active comments with their lanes and arrival times
//! - [`SinkRouter`]: Routes new comments to the mounted overlay or sidebar
//! - [`CompositorPiP`]: Composites video and comments into frames for a detached view
//! - [`PreferenceStore`]: Persisted render mode and stream quality
//! - [`Recorder`]: Writes a room's raw comment frames to JSONL
//!
//! # Quick Start
//!
//! ```ignore
//! use commentary_core::sinks::{spawn_router, OverlayLayout, OverlaySink, SidebarSink};
//! use commentary_core::{load_config, ConnectionManager, PreferenceStore, SinkRouter};
//!
//! let config = load_config()?;
//! let preferences = PreferenceStore::load_default();
//! let manager = ConnectionManager::websocket(&config, preferences.clone());
//!
//! let overlay = OverlaySink::new(OverlayLayout::from_display(&config.display, 960.0));
//! let sidebar = SidebarSink::new(config.display.sidebar_cap, 20);
//! let router = Arc::new(Mutex::new(SinkRouter::new(preferences, overlay, sidebar)));
//! spawn_router(router, manager.subscribe());
//!
//! manager.start("NHK総合");
//! ```
//!
//! # Module Overview
//!
//! - [`buffer`]: Comment buffer with expiry
//! - [`catalog`]: Channel and programme lookups over HTTP
//! - [`compositor`]: Raster compositor for detached viewing
//! - [`config`]: TOML and environment configuration, broadcaster→room map
//! - [`connection`]: Connection manager and session tasks
//! - [`events`]: Events broadcast to sinks
//! - [`lanes`]: Lane assignment (first free lane, else the one freeing soonest)
//! - [`preferences`]: Persisted viewer preferences
//! - [`protocol`]: Watch and comment socket messages
//! - [`recorder`]: Standalone comment recorder
//! - [`session`]: Per-broadcaster session state
//! - [`sinks`]: Overlay and sidebar renderers
//! - [`transport`]: Socket transport (WebSocket, in-process)

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod buffer;
pub mod catalog;
#[cfg(feature = "compositor")]
pub mod compositor;
pub mod config;
pub mod connection;
pub mod events;
pub mod lanes;
pub mod preferences;
pub mod protocol;
pub mod recorder;
pub mod session;
pub mod sinks;
pub mod transport;

// Re-exports for convenience
pub use buffer::{Comment, CommentBuffer, SharedCommentBuffer, DEFAULT_COMMENT_LIFETIME};
pub use catalog::{CatalogClient, CatalogError, Channel, Programme};
pub use connection::{ConnectionManager, StartOutcome};
pub use events::CommentaryEvent;
pub use lanes::{LaneScheduler, DEFAULT_LANE_COUNT};
pub use preferences::{PreferenceError, PreferenceStore, RenderMode, StreamQuality};
pub use recorder::{Recorder, RecorderError, RecordingSummary, StopReason};
pub use session::{SessionPhase, SessionSnapshot};
pub use sinks::{CommentSink, OverlaySink, SidebarSink, SinkRouter};
pub use transport::{Connector, TransportError, TransportEvent};

// Compositor exports
#[cfg(feature = "compositor")]
pub use compositor::{CompositorPiP, PipError, PipHost, PipStatus, VideoFrame, VideoSource};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, BroadcasterMap, CommentaryConfig,
    CommentaryToml, CompositorConfig, ConfigError, ConfigSource, ConnectionConfig, DisplayConfig,
};
