// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// JPEG quality used for the processed image (maximum)
pub const DEFAULT_JPEG_QUALITY: u8 = 100;

/// Fixed rotation applied after cropping, in degrees clockwise
pub const DEFAULT_ROTATION_DEGREES: u32 = 90;

/// File stem of the deterministic output location
pub const DEFAULT_FILE_STEM: &str = "captured_image";

/// Prefix for timestamped output files
pub const TIMESTAMPED_FILE_PREFIX: &str = "IMG";

/// Timestamp format for timestamped output files
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Directory name used under the pictures and config directories
pub const APP_DIR_NAME: &str = "viewfinder";

/// Config file name
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Still-frame sink capacity: one image in flight at a time
pub const STILL_SINK_MAX_IMAGES: usize = 1;

/// Timeouts for the three completion-notified suspension points
pub mod timeouts {
    use super::Duration;

    /// Device open completion
    pub const OPEN: Duration = Duration::from_millis(5000);
    /// Session configure completion
    pub const CONFIGURE: Duration = Duration::from_millis(5000);
    /// Image-available completion
    pub const CAPTURE: Duration = Duration::from_millis(5000);
}

/// Controller channel sizes
pub mod channels {
    /// Pending commands from handles
    pub const COMMAND_CAPACITY: usize = 16;
}

/// Virtual camera defaults
pub mod virtual_camera {
    use super::Duration;

    /// Native still resolution of the synthetic test pattern
    pub const STILL_WIDTH: u32 = 1920;
    pub const STILL_HEIGHT: u32 = 1080;

    /// Interval between preview frames of a repeating request
    pub const PREVIEW_INTERVAL: Duration = Duration::from_millis(33);

    /// Edge length of the checkerboard cells in the test pattern
    pub const PATTERN_CELL: u32 = 64;
}
