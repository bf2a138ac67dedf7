//! Platform seams for the compositor

use async_trait::async_trait;

use super::surface::VideoFrame;
use super::{FrameStream, PipError};

/// Supplies decoded frames of the primary video
pub trait VideoSource: Send + Sync {
    /// The frame to show now, or `None` if no frame is ready yet
    fn current_frame(&self) -> Option<VideoFrame>;
}

/// Element management and the platform's detached-view request
///
/// Implementations must make every method idempotent; `cleanup` may call
/// them in any state.
#[async_trait]
pub trait PipHost: Send + Sync {
    /// Whether the platform can detach a video surface at all
    fn is_supported(&self) -> bool;

    /// Create the secondary muted, autoplaying element fed by `frames`
    fn mount_secondary(&self, frames: FrameStream) -> Result<(), PipError>;

    /// Remove the secondary element, ending any detached view on it
    fn unmount_secondary(&self);

    /// Show or hide the primary video element (it keeps decoding and playing audio)
    fn set_primary_visible(&self, visible: bool);

    /// Show or hide the in-page comment overlay
    fn set_overlay_visible(&self, visible: bool);

    /// Whether the secondary element is currently detached
    fn is_detached(&self) -> bool;

    /// Ask the platform to detach the secondary element
    async fn enter_detached(&self) -> Result<(), PipError>;

    /// Return the secondary element to the page
    async fn exit_detached(&self) -> Result<(), PipError>;
}
