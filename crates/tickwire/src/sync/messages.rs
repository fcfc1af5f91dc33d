use crate::codec::{ByteReader, ByteWriter, DecodeError, Wire, WireType};
use crate::message::{Event, Request};

use super::snapshot::SimulationTickSnapshot;
use super::tick::TickTime;

/// Sent once per peer: tick rate and the baseline the client starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationInitEvent {
    pub tick_rate: u16,
    pub snapshot: SimulationTickSnapshot,
}

impl WireType for SimulationInitEvent {
    const TYPE_NAME: &'static str = "tickwire::SimulationInitEvent";
}

impl Event for SimulationInitEvent {}

impl Wire for SimulationInitEvent {
    fn encode(&self, writer: &mut ByteWriter) {
        writer.write_u16(self.tick_rate);
        writer.write(&self.snapshot);
    }

    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            tick_rate: reader.read_u16()?,
            snapshot: reader.read()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BatchError {
    #[error("a batch holds at most {} snapshots", SimulationTickSnapshotEvent::MAX_LEN)]
    Full,
    #[error("snapshots in a batch must have strictly increasing ticks")]
    OutOfOrder,
}

/// Consecutive snapshots in tick order. The count is one byte on the wire,
/// so a batch can never hold more than 255 entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationTickSnapshotEvent {
    snapshots: Vec<SimulationTickSnapshot>,
}

impl SimulationTickSnapshotEvent {
    pub const MAX_LEN: usize = u8::MAX as usize;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, snapshot: SimulationTickSnapshot) -> Result<(), BatchError> {
        if self.snapshots.len() >= Self::MAX_LEN {
            return Err(BatchError::Full);
        }
        if self
            .snapshots
            .last()
            .is_some_and(|last| last.tick >= snapshot.tick)
        {
            return Err(BatchError::OutOfOrder);
        }
        self.snapshots.push(snapshot);
        Ok(())
    }

    pub fn try_from_vec(snapshots: Vec<SimulationTickSnapshot>) -> Result<Self, BatchError> {
        if snapshots.len() > Self::MAX_LEN {
            return Err(BatchError::Full);
        }
        if snapshots.windows(2).any(|pair| pair[0].tick >= pair[1].tick) {
            return Err(BatchError::OutOfOrder);
        }
        Ok(Self { snapshots })
    }

    /// Splits tick-ordered snapshots into batches of at most `max_len` entries
    /// whose encoding fits in `max_bytes`. A snapshot too large for any batch
    /// travels alone.
    pub fn split(
        snapshots: Vec<SimulationTickSnapshot>,
        max_len: usize,
        max_bytes: usize,
    ) -> Result<Vec<Self>, BatchError> {
        let max_len = max_len.clamp(1, Self::MAX_LEN);
        let mut batches = Vec::with_capacity(snapshots.len().div_ceil(max_len));
        let mut current = Self::new();
        // The count byte.
        let mut current_bytes = 1;

        for snapshot in snapshots {
            if current
                .snapshots
                .last()
                .or_else(|| batches.last().and_then(|b: &Self| b.snapshots.last()))
                .is_some_and(|last| last.tick >= snapshot.tick)
            {
                return Err(BatchError::OutOfOrder);
            }
            let size = snapshot.to_bytes().len();
            if !current.is_empty() && (current.len() == max_len || current_bytes + size > max_bytes)
            {
                batches.push(std::mem::take(&mut current));
                current_bytes = 1;
            }
            current_bytes += size;
            current.snapshots.push(snapshot);
        }
        if !current.is_empty() {
            batches.push(current);
        }
        Ok(batches)
    }

    pub fn snapshots(&self) -> &[SimulationTickSnapshot] {
        &self.snapshots
    }

    pub fn into_snapshots(self) -> Vec<SimulationTickSnapshot> {
        self.snapshots
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

impl WireType for SimulationTickSnapshotEvent {
    const TYPE_NAME: &'static str = "tickwire::SimulationTickSnapshotEvent";
}

impl Event for SimulationTickSnapshotEvent {}

impl Wire for SimulationTickSnapshotEvent {
    fn encode(&self, writer: &mut ByteWriter) {
        writer.write_u8(self.snapshots.len() as u8);
        for snapshot in &self.snapshots {
            writer.write(snapshot);
        }
    }

    // Ordering is checked by the receiver, which reports gaps and duplicates itself.
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        let count = reader.read_u8()? as usize;
        let mut snapshots = Vec::with_capacity(count);
        for _ in 0..count {
            snapshots.push(reader.read()?);
        }
        Ok(Self { snapshots })
    }
}

/// Tells the host the capture time of the latest snapshot the sender fully applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationTickSnapshotAckRequest {
    pub tick_time: TickTime,
}

impl WireType for SimulationTickSnapshotAckRequest {
    const TYPE_NAME: &'static str = "tickwire::SimulationTickSnapshotAckRequest";
}

impl Request for SimulationTickSnapshotAckRequest {
    type Response = SimulationTickSnapshotAckResponse;
}

impl Wire for SimulationTickSnapshotAckRequest {
    fn encode(&self, writer: &mut ByteWriter) {
        writer.write(&self.tick_time);
    }

    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            tick_time: reader.read()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationTickSnapshotAckResponse {
    pub acknowledged: TickTime,
    /// Snapshots the host still retains for any peer after processing the ack.
    pub retained: u32,
}

impl WireType for SimulationTickSnapshotAckResponse {
    const TYPE_NAME: &'static str = "tickwire::SimulationTickSnapshotAckResponse";
}

impl Wire for SimulationTickSnapshotAckResponse {
    fn encode(&self, writer: &mut ByteWriter) {
        writer.write(&self.acknowledged);
        writer.write_u32(self.retained);
    }

    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            acknowledged: reader.read()?,
            retained: reader.read_u32()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::Tick;

    fn snapshots(count: u32) -> Vec<SimulationTickSnapshot> {
        (1..=count)
            .map(|tick| SimulationTickSnapshot::empty(Tick(tick), TickTime(tick as u64)))
            .collect()
    }

    #[test]
    fn full_batch_count_byte_is_255() {
        let batch = SimulationTickSnapshotEvent::try_from_vec(snapshots(255)).unwrap();
        let bytes = batch.to_bytes();
        assert_eq!(bytes[0], 255);
        assert_eq!(
            SimulationTickSnapshotEvent::from_bytes(&bytes).unwrap().len(),
            255
        );
    }

    #[test]
    fn entry_256_is_rejected() {
        let mut batch = SimulationTickSnapshotEvent::try_from_vec(snapshots(255)).unwrap();
        let extra = SimulationTickSnapshot::empty(Tick(256), TickTime(256));
        assert_eq!(batch.push(extra), Err(BatchError::Full));
        assert_eq!(
            SimulationTickSnapshotEvent::try_from_vec(snapshots(256)),
            Err(BatchError::Full)
        );
    }

    #[test]
    fn empty_batch_is_one_byte() {
        assert_eq!(SimulationTickSnapshotEvent::new().to_bytes(), vec![0]);
    }

    #[test]
    fn split_respects_limit() {
        let batches = SimulationTickSnapshotEvent::split(snapshots(600), 255, usize::MAX).unwrap();
        let sizes: Vec<usize> = batches.iter().map(SimulationTickSnapshotEvent::len).collect();
        assert_eq!(sizes, vec![255, 255, 90]);

        let batches = SimulationTickSnapshotEvent::split(snapshots(5), 2, usize::MAX).unwrap();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[2].snapshots()[0].tick, Tick(5));
    }

    #[test]
    fn split_respects_byte_budget() {
        let each = snapshots(1)[0].to_bytes().len();
        let budget = 1 + 3 * each;
        let batches = SimulationTickSnapshotEvent::split(snapshots(10), 255, budget).unwrap();
        let sizes: Vec<usize> = batches.iter().map(SimulationTickSnapshotEvent::len).collect();
        assert_eq!(sizes, vec![3, 3, 3, 1]);
        assert!(batches.iter().all(|batch| batch.to_bytes().len() <= budget));

        // Nothing fits in two bytes, so every snapshot is sent on its own.
        let batches = SimulationTickSnapshotEvent::split(snapshots(4), 255, 2).unwrap();
        assert_eq!(batches.len(), 4);
    }

    #[test]
    fn split_rejects_unordered_input() {
        let mut unordered = snapshots(3);
        unordered.swap(0, 2);
        assert_eq!(
            SimulationTickSnapshotEvent::split(unordered, 2, usize::MAX),
            Err(BatchError::OutOfOrder)
        );
    }

    #[test]
    fn init_event_layout() {
        let init = SimulationInitEvent {
            tick_rate: 20,
            snapshot: SimulationTickSnapshot::empty(Tick::BASELINE, TickTime(0)),
        };
        let bytes = init.to_bytes();
        assert_eq!(&bytes[..2], &20u16.to_le_bytes());

        let decoded = SimulationInitEvent::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.tick_rate, 20);
        assert!(decoded.snapshot.commands.is_empty());
    }

    #[test]
    fn ack_request_is_eight_bytes() {
        let ack = SimulationTickSnapshotAckRequest {
            tick_time: TickTime(0x0102_0304),
        };
        assert_eq!(ack.to_bytes(), 0x0102_0304u64.to_le_bytes().to_vec());
    }
}
