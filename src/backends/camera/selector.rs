// SPDX-License-Identifier: GPL-3.0-only

//! Camera selection by facing policy

use super::{CameraBackend, CameraDescriptor, LensFacing};
use tracing::debug;

/// Picks the camera a session should open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceSelector {
    facing: LensFacing,
}

impl DeviceSelector {
    pub fn new(facing: LensFacing) -> Self {
        Self { facing }
    }

    pub fn facing(&self) -> LensFacing {
        self.facing
    }

    /// First descriptor, in enumeration order, with the wanted facing
    pub fn select(&self, cameras: &[CameraDescriptor]) -> Option<CameraDescriptor> {
        let selected = cameras.iter().find(|c| c.facing == self.facing).cloned();
        debug!(
            facing = %self.facing,
            candidates = cameras.len(),
            selected = ?selected.as_ref().map(|c| c.id.as_str()),
            "Camera selection"
        );
        selected
    }

    /// Enumerate the backend's cameras and select one
    pub fn select_from(&self, backend: &dyn CameraBackend) -> Option<CameraDescriptor> {
        self.select(&backend.enumerate_cameras())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cameras() -> Vec<CameraDescriptor> {
        vec![
            CameraDescriptor::new("1", "Selfie", LensFacing::Front),
            CameraDescriptor::new("0", "Main", LensFacing::Back),
            CameraDescriptor::new("2", "Wide", LensFacing::Back),
        ]
    }

    #[test]
    fn test_selects_first_back_camera() {
        let selected = DeviceSelector::new(LensFacing::Back).select(&cameras());
        assert_eq!(selected.map(|c| c.id), Some("0".to_string()));
    }

    #[test]
    fn test_no_matching_camera() {
        let selected = DeviceSelector::new(LensFacing::External).select(&cameras());
        assert!(selected.is_none());
        assert!(DeviceSelector::default().select(&[]).is_none());
    }
}
