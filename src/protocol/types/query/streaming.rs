//! Streaming control messages
//!
//! - STT_*: Start streaming at a given resolution
//! - STP_*: Stop streaming

use super::{impl_empty_query, impl_start_stream};

impl_start_stream!(StartTransformMessage, "STT_TRANS");
impl_start_stream!(StartTDataMessage, "STT_TDATA");
impl_start_stream!(StartImageMessage, "STT_IMAGE");
impl_start_stream!(StartStringMessage, "STT_STRING");
impl_start_stream!(StartStatusMessage, "STT_STATUS");

impl_empty_query!(StopTransformMessage, "STP_TRANS");
impl_empty_query!(StopTDataMessage, "STP_TDATA");
impl_empty_query!(StopImageMessage, "STP_IMAGE");
impl_empty_query!(StopStringMessage, "STP_STRING");
impl_empty_query!(StopStatusMessage, "STP_STATUS");
