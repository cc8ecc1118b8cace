// SPDX-License-Identifier: MPL-2.0

//! Camera backends
//!
//! - [`camera`]: platform-neutral traits and types the session controller drives
//! - [`virtual_camera`]: in-process implementation backed by a still image

pub mod camera;
pub mod virtual_camera;
