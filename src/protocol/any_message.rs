//! Dynamically typed messages
//!
//! [`AnyMessage`] is a closed enum over every kind the dispatch table can
//! produce. The listener hands received frames to the application in this
//! form; the application matches on it or uses the typed accessors.

use crate::error::Result;
use crate::protocol::dispatch::{BaseKind, ControlVariant};
use crate::protocol::header::Header;
use crate::protocol::message::{IgtlMessage, Message};
use crate::protocol::types::*;

/// Conversion from a typed envelope into [`AnyMessage`]
///
/// Implemented for every registered message kind; used by the dispatch
/// table to build one generic decode function per kind.
pub trait IntoAnyMessage: Message {
    /// Wrap a typed message
    fn into_any(message: IgtlMessage<Self>) -> AnyMessage;
}

macro_rules! any_message {
    ($( $(#[$doc:meta])* $variant:ident($ty:ty) => ($kind:ident, $control:ident), )+) => {
        /// Any message kind known to the dispatch table
        ///
        /// # Examples
        ///
        /// ```
        /// use openigtlink_transport::protocol::{AnyMessage, IgtlMessage};
        /// use openigtlink_transport::protocol::types::StatusMessage;
        ///
        /// let msg: AnyMessage = IgtlMessage::new(StatusMessage::ok("ready"), "Dev")
        ///     .unwrap()
        ///     .into();
        /// match &msg {
        ///     AnyMessage::Status(status) => assert!(status.content.is_ok()),
        ///     _ => unreachable!(),
        /// }
        /// assert_eq!(msg.message_type(), "STATUS");
        /// ```
        #[derive(Debug, Clone, PartialEq)]
        pub enum AnyMessage {
            $( $(#[$doc])* $variant(IgtlMessage<$ty>), )+
        }

        impl AnyMessage {
            /// Wire type tag of the contained message
            pub fn message_type(&self) -> &'static str {
                match self {
                    $( AnyMessage::$variant(_) => <$ty as Message>::message_type(), )+
                }
            }

            /// Generic header of the contained message
            pub fn header(&self) -> &Header {
                match self {
                    $( AnyMessage::$variant(m) => &m.header, )+
                }
            }

            /// Base kind (TRANSFORM, TDATA, ...)
            pub fn kind(&self) -> BaseKind {
                match self {
                    $( AnyMessage::$variant(_) => BaseKind::$kind, )+
                }
            }

            /// Control variant (plain, GET_, STT_, STP_, RTS_)
            pub fn variant(&self) -> ControlVariant {
                match self {
                    $( AnyMessage::$variant(_) => ControlVariant::$control, )+
                }
            }

            /// Encode the complete frame (header + body)
            pub fn encode(&self) -> Result<Vec<u8>> {
                match self {
                    $( AnyMessage::$variant(m) => m.encode(), )+
                }
            }

            /// Human-readable summary of the content
            pub fn describe(&self) -> String {
                match self {
                    $( AnyMessage::$variant(m) => m.content.describe(), )+
                }
            }
        }

        $(
            impl IntoAnyMessage for $ty {
                fn into_any(message: IgtlMessage<Self>) -> AnyMessage {
                    AnyMessage::$variant(message)
                }
            }

            impl From<IgtlMessage<$ty>> for AnyMessage {
                fn from(message: IgtlMessage<$ty>) -> Self {
                    AnyMessage::$variant(message)
                }
            }
        )+
    };
}

any_message! {
    /// TRANSFORM
    Transform(TransformMessage) => (Transform, Plain),
    /// GET_TRANS
    GetTransform(GetTransformMessage) => (Transform, Get),
    /// STT_TRANS
    StartTransform(StartTransformMessage) => (Transform, StartStream),
    /// STP_TRANS
    StopTransform(StopTransformMessage) => (Transform, StopStream),
    /// RTS_TRANS
    RtsTransform(RtsTransformMessage) => (Transform, ReadyToSend),

    /// TDATA
    TData(TDataMessage) => (TData, Plain),
    /// GET_TDATA
    GetTData(GetTDataMessage) => (TData, Get),
    /// STT_TDATA
    StartTData(StartTDataMessage) => (TData, StartStream),
    /// STP_TDATA
    StopTData(StopTDataMessage) => (TData, StopStream),
    /// RTS_TDATA
    RtsTData(RtsTDataMessage) => (TData, ReadyToSend),

    /// IMAGE
    Image(ImageMessage) => (Image, Plain),
    /// GET_IMAGE
    GetImage(GetImageMessage) => (Image, Get),
    /// STT_IMAGE
    StartImage(StartImageMessage) => (Image, StartStream),
    /// STP_IMAGE
    StopImage(StopImageMessage) => (Image, StopStream),
    /// RTS_IMAGE
    RtsImage(RtsImageMessage) => (Image, ReadyToSend),

    /// STRING
    String(StringMessage) => (String, Plain),
    /// GET_STRING
    GetString(GetStringMessage) => (String, Get),
    /// STT_STRING
    StartString(StartStringMessage) => (String, StartStream),
    /// STP_STRING
    StopString(StopStringMessage) => (String, StopStream),
    /// RTS_STRING
    RtsString(RtsStringMessage) => (String, ReadyToSend),

    /// STATUS
    Status(StatusMessage) => (Status, Plain),
    /// GET_STATUS
    GetStatus(GetStatusMessage) => (Status, Get),
    /// STT_STATUS
    StartStatus(StartStatusMessage) => (Status, StartStream),
    /// STP_STATUS
    StopStatus(StopStatusMessage) => (Status, StopStream),
    /// RTS_STATUS
    RtsStatus(RtsStatusMessage) => (Status, ReadyToSend),
}

impl AnyMessage {
    /// Device name from the header, lossy
    pub fn device_name(&self) -> String {
        self.header().device_name.to_string_lossy()
    }

    /// Streaming resolution in milliseconds, for STT_* messages only
    pub fn resolution(&self) -> Option<u32> {
        match self {
            AnyMessage::StartTransform(m) => Some(m.content.resolution),
            AnyMessage::StartTData(m) => Some(m.content.resolution),
            AnyMessage::StartImage(m) => Some(m.content.resolution),
            AnyMessage::StartString(m) => Some(m.content.resolution),
            AnyMessage::StartStatus(m) => Some(m.content.resolution),
            _ => None,
        }
    }

    /// Try to get as TRANSFORM
    pub fn as_transform(&self) -> Option<&IgtlMessage<TransformMessage>> {
        match self {
            AnyMessage::Transform(m) => Some(m),
            _ => None,
        }
    }

    /// Try to get as TDATA
    pub fn as_tdata(&self) -> Option<&IgtlMessage<TDataMessage>> {
        match self {
            AnyMessage::TData(m) => Some(m),
            _ => None,
        }
    }

    /// Try to get as IMAGE
    pub fn as_image(&self) -> Option<&IgtlMessage<ImageMessage>> {
        match self {
            AnyMessage::Image(m) => Some(m),
            _ => None,
        }
    }

    /// Try to get as STRING
    pub fn as_string(&self) -> Option<&IgtlMessage<StringMessage>> {
        match self {
            AnyMessage::String(m) => Some(m),
            _ => None,
        }
    }

    /// Try to get as STATUS
    pub fn as_status(&self) -> Option<&IgtlMessage<StatusMessage>> {
        match self {
            AnyMessage::Status(m) => Some(m),
            _ => None,
        }
    }
}
