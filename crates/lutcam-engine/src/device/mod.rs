//! Native graphics bring-up.
//!
//! [`GraphicsPlatform`] abstracts the display/config/context/surface layer,
//! [`GraphicsContextSession`] sequences it for one render thread.

mod config;
mod error;
mod platform;
mod session;

pub use config::{ConfigAttribs, ConfigSpec, Renderable};
pub use error::{SessionError, SurfaceError, SwapFailure, SwapStatus};
pub use platform::{GraphicsPlatform, OutputTarget};
pub use session::GraphicsContextSession;
