use thiserror::Error;

/// Failure to bring up or tear down a graphics context.
///
/// Raised on the render thread; the thread stores it, exits, and the owner
/// sees it from `release`.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no graphics display available: {0}")]
    NoDisplay(String),

    #[error("display initialization failed: {0}")]
    Initialize(String),

    #[error("no framebuffer config matches {0}")]
    NoConfig(String),

    #[error("context creation failed: {0}")]
    CreateContext(String),

    #[error("context destruction failed: {0}")]
    DestroyContext(String),
}

/// Failure to create or bind a window surface. Recoverable: the render
/// thread marks the surface bad and waits for a new output target.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("the session has no context")]
    NoContext,

    #[error("output target cannot back a surface")]
    BadNativeWindow,

    #[error("surface creation failed: {0}")]
    Create(String),

    #[error("make-current failed: {0}")]
    MakeCurrent(String),
}

/// Why a swap did not present.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SwapFailure {
    BadSurface,
    BadNativeWindow,
    /// Surface no longer matches its target (resize, reconfigure).
    Outdated,
    Timeout,
    NotCurrent,
    Other,
}

impl SwapFailure {
    pub fn as_str(self) -> &'static str {
        match self {
            SwapFailure::BadSurface => "BAD_SURFACE",
            SwapFailure::BadNativeWindow => "BAD_NATIVE_WINDOW",
            SwapFailure::Outdated => "OUTDATED",
            SwapFailure::Timeout => "TIMEOUT",
            SwapFailure::NotCurrent => "NOT_CURRENT",
            SwapFailure::Other => "OTHER",
        }
    }
}

impl std::fmt::Display for SwapFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of presenting a frame.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SwapStatus {
    Success,
    /// The context and every object in it are gone; recreate both.
    ContextLost,
    /// The surface is unusable; the context survives.
    BadSurface(SwapFailure),
}

impl SwapStatus {
    pub fn is_success(self) -> bool {
        self == SwapStatus::Success
    }
}
