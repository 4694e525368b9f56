//! RTS_* (ready-to-send) acknowledgements
//!
//! Sent in reply to GET_*, STT_* or STP_*. Body is a u16 status.

use super::impl_rts;

impl_rts!(RtsTransformMessage, "RTS_TRANS");
impl_rts!(RtsTDataMessage, "RTS_TDATA");
impl_rts!(RtsImageMessage, "RTS_IMAGE");
impl_rts!(RtsStringMessage, "RTS_STRING");
impl_rts!(RtsStatusMessage, "RTS_STATUS");
