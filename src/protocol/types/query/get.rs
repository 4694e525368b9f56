//! GET_* request messages
//!
//! Ask the peer for its current value of a base kind. Empty body.

use super::impl_empty_query;

impl_empty_query!(GetTransformMessage, "GET_TRANS");
impl_empty_query!(GetTDataMessage, "GET_TDATA");
impl_empty_query!(GetImageMessage, "GET_IMAGE");
impl_empty_query!(GetStringMessage, "GET_STRING");
impl_empty_query!(GetStatusMessage, "GET_STATUS");

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::Message;

    #[test]
    fn test_get_tags() {
        assert_eq!(GetTransformMessage::message_type(), "GET_TRANS");
        assert_eq!(GetTDataMessage::message_type(), "GET_TDATA");
        assert_eq!(GetImageMessage::message_type(), "GET_IMAGE");
        assert_eq!(GetStringMessage::message_type(), "GET_STRING");
        assert_eq!(GetStatusMessage::message_type(), "GET_STATUS");
    }

    #[test]
    fn test_get_status_empty_body() {
        assert!(GetStatusMessage.encode_content().unwrap().is_empty());
    }
}
