use std::sync::Arc;

use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::device::OutputTarget;

impl OutputTarget for Arc<Window> {
    /// Requests the fixed inner size and stops the user from resizing. The
    /// request may be ignored by the windowing system; surfaces follow the
    /// size the window actually has.
    fn set_fixed_size(&self, width: u32, height: u32) {
        if let Some(applied) = self.request_inner_size(PhysicalSize::new(width, height)) {
            log::debug!("window resized to {}x{}", applied.width, applied.height);
        }
        self.set_resizable(false);
    }

    fn size(&self) -> (u32, u32) {
        let size = self.inner_size();
        (size.width, size.height)
    }
}
