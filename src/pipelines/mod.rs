// SPDX-License-Identifier: MPL-2.0

//! Processing pipelines
//!
//! Still captures are processed off the controller task so that the live
//! preview keeps running while a photo is decoded, cropped and written.
//!
//! - [`photo`]: decode, scale, crop, rotate, encode and hand off a still

pub mod photo;
