//! Pending pieces and the slot table
//!
//! A [`PendingPiece`] is one piece in flight: the block requests not yet
//! sent, the timed in-flight requests, and the payloads received so far,
//! all behind one mutex. The [`SlotTable`] bounds how many pieces are in
//! flight at once and is the only coordination point between the scheduler
//! loop and the verification path; slots change hands exclusively through
//! compare-and-swap style transitions.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};

use crate::peer::REQUEST_SIZE;

/// A block request on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRequest {
    /// Piece index
    pub index: u32,
    /// Byte offset within the piece
    pub begin: u32,
    /// Block length
    pub length: u32,
}

/// A received block payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Piece index
    pub index: u32,
    /// Byte offset within the piece
    pub begin: u32,
    /// Payload
    pub data: Vec<u8>,
}

/// An in-flight request with its dispatch time.
#[derive(Debug, Clone)]
pub struct TimedRequest {
    /// The dispatched request
    pub request: BlockRequest,
    /// When it was handed to a session
    pub sent_at: Instant,
    /// Set once the matching block arrived; received requests are never
    /// reaped by the timeout pass.
    pub received: bool,
}

/// Mutable state of a pending piece. `pending` and `inflight` are disjoint
/// at all times.
#[derive(Debug, Default)]
pub struct PieceState {
    /// Requests not yet dispatched
    pub pending: Vec<BlockRequest>,
    /// Requests dispatched and awaiting a block
    pub inflight: Vec<TimedRequest>,
    /// Blocks received so far
    pub received: Vec<Block>,
    /// Sum of received block lengths
    pub downloaded: u64,
}

/// Outcome of offering a received block to a pending piece.
#[derive(Debug, PartialEq, Eq)]
pub enum BlockOutcome {
    /// Not matching any in-flight request, or a duplicate; dropped.
    Discarded,
    /// Accepted; `complete` is set when the piece is fully downloaded.
    Accepted { complete: bool },
}

/// A single piece occupying one scheduler slot.
#[derive(Debug)]
pub struct PendingPiece {
    /// Piece index
    pub index: u32,
    /// Piece size in bytes (the last piece may be shorter)
    pub size: u64,
    state: Mutex<PieceState>,
}

impl PendingPiece {
    /// Create a pending piece with every block queued for dispatch.
    /// Blocks are `REQUEST_SIZE` long except possibly the last.
    pub fn new(index: u32, size: u64) -> Self {
        let mut pending = Vec::with_capacity(size.div_ceil(REQUEST_SIZE as u64) as usize);
        let mut offset = 0u64;
        while offset < size {
            let length = (size - offset).min(REQUEST_SIZE as u64) as u32;
            pending.push(BlockRequest {
                index,
                begin: offset as u32,
                length,
            });
            offset += length as u64;
        }

        Self {
            index,
            size,
            state: Mutex::new(PieceState {
                pending,
                ..PieceState::default()
            }),
        }
    }

    /// Lock the piece state. Callers only do in-memory list manipulation
    /// under this lock, never I/O.
    pub fn lock(&self) -> MutexGuard<'_, PieceState> {
        self.state.lock()
    }

    /// Offer a received block. Blocks without a matching in-flight request
    /// and duplicates are discarded; accepted blocks advance `downloaded`.
    ///
    /// Panics if accounting ever exceeds the piece size; that cannot happen
    /// unless the scheduler state is corrupt.
    pub fn accept(&self, block: Block) -> BlockOutcome {
        let mut state = self.state.lock();

        let matching = state.inflight.iter().position(|t| {
            t.request
                == BlockRequest {
                    index: block.index,
                    begin: block.begin,
                    length: block.data.len() as u32,
                }
        });
        let Some(slot) = matching else {
            return BlockOutcome::Discarded;
        };

        let duplicate = state.received.iter().any(|other| {
            other.index == block.index
                && other.begin == block.begin
                && other.data.len() == block.data.len()
        });
        if duplicate {
            return BlockOutcome::Discarded;
        }

        state.downloaded += block.data.len() as u64;
        if state.downloaded > self.size {
            panic!(
                "received more data than expected for piece {}: {} > {}",
                self.index, state.downloaded, self.size
            );
        }

        state.received.push(block);
        state.inflight[slot].received = true;

        BlockOutcome::Accepted {
            complete: state.downloaded == self.size,
        }
    }

    /// Assemble the piece payload from the received blocks, ordered by
    /// offset. Only meaningful once `accept` reported completion.
    pub fn assemble(&self) -> Vec<u8> {
        let mut state = self.state.lock();
        state.received.sort_by_key(|b| b.begin);

        let mut data = Vec::with_capacity(self.size as usize);
        for block in &state.received {
            data.extend_from_slice(&block.data);
        }
        data
    }

    /// Throw away every received block and requeue all in-flight requests
    /// for a fresh download attempt (hash mismatch or flush failure).
    ///
    /// Panics if any request is still pending; a full piece cannot have
    /// undispatched blocks.
    pub fn requeue_for_retry(&self) {
        let mut state = self.state.lock();
        if !state.pending.is_empty() {
            panic!(
                "malformed state: piece {} has pending requests while rescheduling for retry",
                self.index
            );
        }

        let requeued: Vec<BlockRequest> =
            state.inflight.drain(..).map(|t| t.request).collect();
        state.pending = requeued;
        state.received.clear();
        state.downloaded = 0;
    }

    /// Move every unanswered request older than `timeout` back to the
    /// pending queue and return them so the caller can broadcast cancels.
    pub fn reap_expired(&self, timeout: Duration) -> Vec<BlockRequest> {
        let mut state = self.state.lock();
        let now = Instant::now();

        let mut expired = Vec::new();
        state.inflight.retain(|t| {
            if !t.received && now.duration_since(t.sent_at) > timeout {
                expired.push(t.request);
                false
            } else {
                true
            }
        });

        state.pending.extend(expired.iter().copied());
        expired
    }
}

/// Fixed table of piece slots. A free slot holds `None`; transitions are
/// compare-and-swap shaped (claim only succeeds on a free slot, release
/// only on the identical piece).
pub struct SlotTable {
    slots: Vec<Mutex<Option<Arc<PendingPiece>>>>,
}

impl SlotTable {
    /// Create a table with `capacity` slots, all free.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| Mutex::new(None)).collect(),
        }
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True if the table has no slots (never the case in practice).
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Index of some free slot, if any.
    pub fn free_slot(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.lock().is_none())
    }

    /// Claim a free slot for `piece`. Fails when the slot was taken in the
    /// meantime; the caller retries on its next iteration.
    pub fn claim(&self, slot: usize, piece: Arc<PendingPiece>) -> bool {
        let mut guard = self.slots[slot].lock();
        if guard.is_some() {
            return false;
        }
        *guard = Some(piece);
        true
    }

    /// Release `slot` if it still holds exactly `piece`. A failure means
    /// another worker already released it, which is benign but logged by
    /// the caller.
    pub fn release(&self, slot: usize, piece: &Arc<PendingPiece>) -> bool {
        let mut guard = self.slots[slot].lock();
        match guard.as_ref() {
            Some(current) if Arc::ptr_eq(current, piece) => {
                *guard = None;
                true
            }
            _ => false,
        }
    }

    /// Snapshot of the piece occupying `slot`.
    pub fn get(&self, slot: usize) -> Option<Arc<PendingPiece>> {
        self.slots[slot].lock().clone()
    }

    /// Find the slot currently downloading `index`.
    pub fn find(&self, index: u32) -> Option<(usize, Arc<PendingPiece>)> {
        for (i, slot) in self.slots.iter().enumerate() {
            if let Some(piece) = slot.lock().as_ref() {
                if piece.index == index {
                    return Some((i, Arc::clone(piece)));
                }
            }
        }
        None
    }

    /// Snapshot of every occupied slot.
    pub fn occupied(&self) -> Vec<(usize, Arc<PendingPiece>)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.lock().clone().map(|p| (i, p)))
            .collect()
    }

    /// True when every slot is free.
    pub fn all_free(&self) -> bool {
        self.slots.iter().all(|s| s.lock().is_none())
    }
}
