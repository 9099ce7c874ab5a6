use std::collections::HashMap;

use webrtc::rtp::packet::Packet;
use webrtc::rtp::packetizer::Depacketizer;

/// Forward distance between two sequence numbers, accounting for wraparound.
fn seq_distance(from: u16, to: u16) -> u16 {
    to.wrapping_sub(from)
}

/// Whether `seq` sits behind `cursor` in sequence order.
fn is_behind(cursor: u16, seq: u16) -> bool {
    let d = cursor.wrapping_sub(seq);
    d != 0 && d < (1 << 15)
}

/// A bounded-lateness reorder buffer that turns an out-of-order RTP packet
/// stream back into a contiguous one.
///
/// Packets within `max_late` sequence units of the newest packet are held
/// until the stream is contiguous again; anything older is dropped. When a
/// gap is abandoned the optional drop callback fires so the owner can ask
/// the sender for a fresh keyframe.
///
/// Not thread-safe; a reconstructor has exactly one owner.
pub struct SampleReconstructor {
    max_late: u16,
    depacketizer: Box<dyn Depacketizer + Send + Sync>,
    pending: HashMap<u16, Packet>,
    next_seq: Option<u16>,
    on_packet_dropped: Option<Box<dyn Fn() + Send + Sync>>,
}

impl SampleReconstructor {
    pub fn new(max_late: u16, depacketizer: Box<dyn Depacketizer + Send + Sync>) -> Self {
        Self {
            max_late: max_late.max(1),
            depacketizer,
            pending: HashMap::new(),
            next_seq: None,
            on_packet_dropped: None,
        }
    }

    /// Installs a callback invoked whenever packets are abandoned because
    /// they fell out of the reorder window.
    pub fn with_packet_dropped(mut self, f: Box<dyn Fn() + Send + Sync>) -> Self {
        self.on_packet_dropped = Some(f);
        self
    }

    pub fn push(&mut self, packet: Packet) {
        let seq = packet.header.sequence_number;
        let next = *self.next_seq.get_or_insert(seq);

        // Behind the emit cursor: too late to reorder.
        if is_behind(next, seq) {
            return;
        }

        self.pending.insert(seq, packet);
        self.enforce_window();
    }

    /// Returns the packets that are ready to be emitted, in sequence order.
    pub fn pop_ready(&mut self) -> Vec<Packet> {
        let Some(mut next) = self.next_seq else {
            return Vec::new();
        };

        let mut out = Vec::new();
        while let Some(packet) = self.pending.remove(&next) {
            out.push(packet);
            next = next.wrapping_add(1);
        }
        self.next_seq = Some(next);
        out
    }

    fn enforce_window(&mut self) {
        let Some(next) = self.next_seq else { return };
        let Some(newest) = self
            .pending
            .keys()
            .copied()
            .max_by_key(|s| seq_distance(next, *s))
        else {
            return;
        };

        if seq_distance(next, newest) < self.max_late {
            return;
        }

        // The gap at the cursor is now older than the window allows. Discard
        // everything that fell out of the window and resume at the oldest
        // packet still inside it, preferring a frame boundary so the writer
        // never sees a torn frame.
        let floor = newest.wrapping_sub(self.max_late - 1);
        self.pending
            .retain(|s, _| seq_distance(floor, *s) < self.max_late);

        let mut kept: Vec<u16> = self.pending.keys().copied().collect();
        kept.sort_by_key(|s| seq_distance(floor, *s));

        let resume = kept
            .iter()
            .copied()
            .find(|s| {
                self.pending
                    .get(s)
                    .map(|p| self.depacketizer.is_partition_head(&p.payload))
                    .unwrap_or(false)
            })
            .or(kept.first().copied());

        if let Some(resume) = resume {
            self.pending.retain(|s, _| !is_behind(resume, *s));
            self.next_seq = Some(resume);
        } else {
            self.next_seq = Some(floor);
        }

        if let Some(on_dropped) = &self.on_packet_dropped {
            on_dropped();
        }
    }
}
