//! Wire type-tag dispatch table
//!
//! Maps the exact, case-sensitive type tag of an incoming header to the
//! function that decodes its body into an [`AnyMessage`]. The table is
//! built once on first use and never mutated afterwards, so workers on any
//! thread can share it without locking.
//!
//! A tag with no entry is not an error for the transport: the listener
//! skips the declared body length and keeps reading.

use crate::error::{IgtlError, Result};
use crate::protocol::any_message::{AnyMessage, IntoAnyMessage};
use crate::protocol::header::Header;
use crate::protocol::message::IgtlMessage;
use crate::protocol::types::*;
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

/// Base message kinds carried by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseKind {
    Transform,
    TData,
    Image,
    String,
    Status,
}

impl BaseKind {
    /// Every base kind, in registration order
    pub const ALL: [BaseKind; 5] = [
        BaseKind::Transform,
        BaseKind::TData,
        BaseKind::Image,
        BaseKind::String,
        BaseKind::Status,
    ];

    /// Canonical OpenIGTLink name
    pub fn name(self) -> &'static str {
        match self {
            BaseKind::Transform => "TRANSFORM",
            BaseKind::TData => "TDATA",
            BaseKind::Image => "IMAGE",
            BaseKind::String => "STRING",
            BaseKind::Status => "STATUS",
        }
    }
}

impl fmt::Display for BaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Control variant of a base kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlVariant {
    /// The data message itself
    Plain,
    /// GET_: request the current value
    Get,
    /// STT_: start streaming, carries a resolution
    StartStream,
    /// STP_: stop streaming
    StopStream,
    /// RTS_: acknowledgement of GET/STT/STP
    ReadyToSend,
}

impl ControlVariant {
    /// Every variant, in registration order
    pub const ALL: [ControlVariant; 5] = [
        ControlVariant::Plain,
        ControlVariant::Get,
        ControlVariant::StartStream,
        ControlVariant::StopStream,
        ControlVariant::ReadyToSend,
    ];

    /// Wire prefix ("" for plain messages)
    pub fn prefix(self) -> &'static str {
        match self {
            ControlVariant::Plain => "",
            ControlVariant::Get => "GET_",
            ControlVariant::StartStream => "STT_",
            ControlVariant::StopStream => "STP_",
            ControlVariant::ReadyToSend => "RTS_",
        }
    }
}

/// Body decoder: header, raw body, CRC verification flag
pub type DecodeFn = fn(&Header, &[u8], bool) -> Result<AnyMessage>;

/// One row of the dispatch table
#[derive(Clone, Copy)]
pub struct DispatchEntry {
    /// Exact wire tag
    pub tag: &'static str,
    /// Base kind
    pub kind: BaseKind,
    /// Control variant
    pub variant: ControlVariant,
    decode: DecodeFn,
}

impl DispatchEntry {
    /// Decode a body read for this entry's tag
    ///
    /// # Errors
    /// - [`IgtlError::CrcMismatch`](crate::error::IgtlError::CrcMismatch) when `verify_crc` is set and the body is corrupt
    /// - Any codec error raised by the message kind
    pub fn decode(&self, header: &Header, body: &[u8], verify_crc: bool) -> Result<AnyMessage> {
        (self.decode)(header, body, verify_crc)
    }

    /// Short description for logs
    pub fn describe(&self) -> String {
        format!("{} ({} {:?})", self.tag, self.kind, self.variant)
    }
}

impl fmt::Debug for DispatchEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchEntry")
            .field("tag", &self.tag)
            .field("kind", &self.kind)
            .field("variant", &self.variant)
            .finish()
    }
}

fn decode_entry<T: IntoAnyMessage>(header: &Header, body: &[u8], verify_crc: bool) -> Result<AnyMessage> {
    let message = IgtlMessage::<T>::from_parts(header.clone(), body, verify_crc)?;
    Ok(T::into_any(message))
}

/// Immutable map from wire tag to decoder
///
/// # Examples
///
/// ```
/// use openigtlink_transport::protocol::dispatch::{BaseKind, ControlVariant, DispatchTable};
///
/// let table = DispatchTable::global();
/// let entry = table.resolve("STT_TRANS").unwrap();
/// assert_eq!(entry.kind, BaseKind::Transform);
/// assert_eq!(entry.variant, ControlVariant::StartStream);
/// assert!(table.resolve("stt_trans").is_none());
/// ```
#[derive(Debug)]
pub struct DispatchTable {
    by_tag: HashMap<&'static str, DispatchEntry>,
    by_kind: HashMap<(BaseKind, ControlVariant), &'static str>,
}

impl DispatchTable {
    /// Shared table, built on first use
    pub fn global() -> &'static DispatchTable {
        static TABLE: OnceLock<DispatchTable> = OnceLock::new();
        TABLE.get_or_init(DispatchTable::build)
    }

    fn build() -> Self {
        use BaseKind as K;
        use ControlVariant as V;

        let mut table = DispatchTable {
            by_tag: HashMap::new(),
            by_kind: HashMap::new(),
        };

        table.register::<TransformMessage>(K::Transform, V::Plain);
        table.register::<GetTransformMessage>(K::Transform, V::Get);
        table.register::<StartTransformMessage>(K::Transform, V::StartStream);
        table.register::<StopTransformMessage>(K::Transform, V::StopStream);
        table.register::<RtsTransformMessage>(K::Transform, V::ReadyToSend);

        table.register::<TDataMessage>(K::TData, V::Plain);
        table.register::<GetTDataMessage>(K::TData, V::Get);
        table.register::<StartTDataMessage>(K::TData, V::StartStream);
        table.register::<StopTDataMessage>(K::TData, V::StopStream);
        table.register::<RtsTDataMessage>(K::TData, V::ReadyToSend);

        table.register::<ImageMessage>(K::Image, V::Plain);
        table.register::<GetImageMessage>(K::Image, V::Get);
        table.register::<StartImageMessage>(K::Image, V::StartStream);
        table.register::<StopImageMessage>(K::Image, V::StopStream);
        table.register::<RtsImageMessage>(K::Image, V::ReadyToSend);

        table.register::<StringMessage>(K::String, V::Plain);
        table.register::<GetStringMessage>(K::String, V::Get);
        table.register::<StartStringMessage>(K::String, V::StartStream);
        table.register::<StopStringMessage>(K::String, V::StopStream);
        table.register::<RtsStringMessage>(K::String, V::ReadyToSend);

        table.register::<StatusMessage>(K::Status, V::Plain);
        table.register::<GetStatusMessage>(K::Status, V::Get);
        table.register::<StartStatusMessage>(K::Status, V::StartStream);
        table.register::<StopStatusMessage>(K::Status, V::StopStream);
        table.register::<RtsStatusMessage>(K::Status, V::ReadyToSend);

        table
    }

    fn register<T: IntoAnyMessage>(&mut self, kind: BaseKind, variant: ControlVariant) {
        let tag = T::message_type();
        debug_assert!(tag.len() <= 12, "type tag {} exceeds 12 bytes", tag);
        let previous = self.by_tag.insert(
            tag,
            DispatchEntry {
                tag,
                kind,
                variant,
                decode: decode_entry::<T>,
            },
        );
        debug_assert!(previous.is_none(), "duplicate type tag {}", tag);
        self.by_kind.insert((kind, variant), tag);
    }

    /// Look up the entry for an exact wire tag
    pub fn resolve(&self, tag: &str) -> Option<&DispatchEntry> {
        self.by_tag.get(tag)
    }

    /// Decode a frame whose header has already been read
    ///
    /// # Errors
    /// - [`IgtlError::UnknownMessageType`] when the header's tag has no entry
    /// - Any error from [`DispatchEntry::decode`]
    pub fn decode(&self, header: &Header, body: &[u8], verify_crc: bool) -> Result<AnyMessage> {
        let tag = header.type_name.as_str()?;
        let entry = self
            .resolve(tag)
            .ok_or_else(|| IgtlError::UnknownMessageType(tag.to_string()))?;
        entry.decode(header, body, verify_crc)
    }

    /// Wire tag registered for a kind/variant pair
    pub fn tag_for(&self, kind: BaseKind, variant: ControlVariant) -> Option<&'static str> {
        self.by_kind.get(&(kind, variant)).copied()
    }

    /// Whether a wire tag is registered
    pub fn contains(&self, tag: &str) -> bool {
        self.by_tag.contains_key(tag)
    }

    /// Number of registered tags
    pub fn len(&self) -> usize {
        self.by_tag.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.by_tag.is_empty()
    }

    /// Iterate over all entries (unordered)
    pub fn iter(&self) -> impl Iterator<Item = &DispatchEntry> {
        self.by_tag.values()
    }
}
