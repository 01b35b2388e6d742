//! Streams and stream tags.
//!
//! Every device has an implicit default stream. Host-synchronous devices
//! expose only that stream; devices with real queues keep a table of them.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use crate::error::DeviceError;
use crate::identity::DeviceId;

/// Identifies a stream within its device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(u64);

impl StreamId {
    /// The implicit stream every device starts with.
    pub const DEFAULT: StreamId = StreamId(0);

    /// The raw id value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A handle to an ordered execution context on one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stream {
    device: DeviceId,
    id: StreamId,
}

impl Stream {
    /// The device that owns this stream.
    pub fn device(&self) -> DeviceId {
        self.device
    }

    /// The stream's id within its device.
    pub fn id(&self) -> StreamId {
        self.id
    }
}

/// A point in a stream's execution, used for timing and waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamTag {
    device: DeviceId,
    stream: StreamId,
    at: Instant,
}

impl StreamTag {
    /// The stream that was tagged.
    pub fn stream(&self) -> StreamId {
        self.stream
    }

    /// When the tag was recorded.
    pub fn at(&self) -> Instant {
        self.at
    }
}

#[derive(Debug, Default)]
struct StreamState {
    last_tag: Option<Instant>,
}

/// Per-device stream bookkeeping.
#[derive(Debug)]
pub(crate) struct StreamTable {
    device: DeviceId,
    multi: bool,
    next_id: u64,
    current: StreamId,
    streams: BTreeMap<StreamId, StreamState>,
}

impl StreamTable {
    /// A table holding only the implicit stream; `create` hands it back.
    pub(crate) fn single(device: DeviceId) -> Self {
        Self::with_mode(device, false)
    }

    /// A table that creates a distinct stream per `create`.
    pub(crate) fn multi(device: DeviceId) -> Self {
        Self::with_mode(device, true)
    }

    fn with_mode(device: DeviceId, multi: bool) -> Self {
        let mut streams = BTreeMap::new();
        streams.insert(StreamId::DEFAULT, StreamState::default());
        Self {
            device,
            multi,
            next_id: 1,
            current: StreamId::DEFAULT,
            streams,
        }
    }

    fn handle(&self, id: StreamId) -> Stream {
        Stream {
            device: self.device,
            id,
        }
    }

    fn check(&self, stream: StreamId, device: DeviceId) -> Result<(), DeviceError> {
        if device != self.device {
            return Err(DeviceError::ForeignObject("stream"));
        }
        if !self.streams.contains_key(&stream) {
            return Err(DeviceError::UnknownStream(stream));
        }
        Ok(())
    }

    pub(crate) fn create(&mut self) -> Stream {
        if !self.multi {
            return self.handle(StreamId::DEFAULT);
        }
        let id = StreamId(self.next_id);
        self.next_id += 1;
        self.streams.insert(id, StreamState::default());
        self.handle(id)
    }

    /// Frees a stream. The implicit stream is never removed; freeing the
    /// current stream makes the implicit one current again.
    pub(crate) fn free(&mut self, stream: Stream) -> Result<(), DeviceError> {
        self.check(stream.id, stream.device)?;
        if stream.id == StreamId::DEFAULT {
            return Ok(());
        }
        self.streams.remove(&stream.id);
        if self.current == stream.id {
            self.current = StreamId::DEFAULT;
        }
        Ok(())
    }

    pub(crate) fn current(&self) -> Stream {
        self.handle(self.current)
    }

    pub(crate) fn set_current(&mut self, stream: &Stream) -> Result<(), DeviceError> {
        self.check(stream.id, stream.device)?;
        self.current = stream.id;
        Ok(())
    }

    pub(crate) fn tag(&mut self) -> StreamTag {
        let at = Instant::now();
        if let Some(state) = self.streams.get_mut(&self.current) {
            state.last_tag = Some(at);
        }
        StreamTag {
            device: self.device,
            stream: self.current,
            at,
        }
    }

    /// Waits for a tag. Work is executed synchronously, so this only
    /// validates the tag.
    pub(crate) fn wait_for(&self, tag: &StreamTag) -> Result<(), DeviceError> {
        if tag.device != self.device {
            return Err(DeviceError::ForeignObject("stream tag"));
        }
        Ok(())
    }

    pub(crate) fn time_between(
        &self,
        start: &StreamTag,
        end: &StreamTag,
    ) -> Result<Duration, DeviceError> {
        if start.device != self.device || end.device != self.device {
            return Err(DeviceError::ForeignObject("stream tag"));
        }
        Ok(end.at.saturating_duration_since(start.at))
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.streams.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_table_hands_back_default() {
        let mut table = StreamTable::single(DeviceId::next());
        let a = table.create();
        let b = table.create();
        assert_eq!(a.id(), StreamId::DEFAULT);
        assert_eq!(a, b);
        table.free(a).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn multi_table_tracks_streams() {
        let mut table = StreamTable::multi(DeviceId::next());
        let a = table.create();
        let b = table.create();
        assert_ne!(a.id(), b.id());
        assert_eq!(table.len(), 3);

        table.set_current(&b).unwrap();
        assert_eq!(table.current().id(), b.id());

        table.free(b).unwrap();
        assert_eq!(table.current().id(), StreamId::DEFAULT);
        assert!(matches!(table.set_current(&b), Err(DeviceError::UnknownStream(_))));
        assert!(matches!(table.free(b), Err(DeviceError::UnknownStream(_))));
        table.free(a).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn foreign_streams_rejected() {
        let mut mine = StreamTable::multi(DeviceId::next());
        let mut other = StreamTable::multi(DeviceId::next());
        let theirs = other.create();
        assert!(matches!(mine.set_current(&theirs), Err(DeviceError::ForeignObject(_))));
        let tag = other.tag();
        assert!(mine.wait_for(&tag).is_err());
    }

    #[test]
    fn tags_are_ordered() {
        let mut table = StreamTable::single(DeviceId::next());
        let start = table.tag();
        std::thread::sleep(Duration::from_millis(2));
        let end = table.tag();
        let elapsed = table.time_between(&start, &end).unwrap();
        assert!(elapsed >= Duration::from_millis(2));
        assert_eq!(table.time_between(&end, &start).unwrap(), Duration::ZERO);
        assert_eq!(start.stream(), StreamId::DEFAULT);
    }

    #[test]
    fn stream_id_display() {
        assert_eq!(StreamId::DEFAULT.to_string(), "#0");
    }
}
