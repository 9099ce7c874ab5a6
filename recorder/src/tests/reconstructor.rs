use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use webrtc::rtp::codecs::vp8::Vp8Packet;

use crate::media::reconstructor::SampleReconstructor;

use super::fake::vp8_packet;

fn reconstructor(max_late: u16) -> SampleReconstructor {
    SampleReconstructor::new(max_late, Box::<Vp8Packet>::default())
}

fn seqs(packets: &[webrtc::rtp::packet::Packet]) -> Vec<u16> {
    packets.iter().map(|p| p.header.sequence_number).collect()
}

#[test]
fn test_in_order_passthrough() {
    let mut rec = reconstructor(200);

    for seq in 0..10u16 {
        rec.push(vp8_packet(seq));
    }

    assert_eq!(seqs(&rec.pop_ready()), (0..10).collect::<Vec<_>>());
    assert!(rec.pop_ready().is_empty());
}

#[test]
fn test_reorders_within_window() {
    let mut rec = reconstructor(200);

    rec.push(vp8_packet(0));
    assert_eq!(seqs(&rec.pop_ready()), vec![0]);

    // 2 arrives before 1; nothing is ready until the gap fills.
    rec.push(vp8_packet(2));
    assert!(rec.pop_ready().is_empty());

    rec.push(vp8_packet(1));
    assert_eq!(seqs(&rec.pop_ready()), vec![1, 2]);
}

#[test]
fn test_sequence_wraparound() {
    let mut rec = reconstructor(200);

    for seq in [65_534u16, 65_535, 0, 1] {
        rec.push(vp8_packet(seq));
    }

    assert_eq!(seqs(&rec.pop_ready()), vec![65_534, 65_535, 0, 1]);
}

#[test]
fn test_late_packet_is_dropped() {
    let mut rec = reconstructor(200);

    rec.push(vp8_packet(5));
    rec.push(vp8_packet(6));
    assert_eq!(seqs(&rec.pop_ready()), vec![5, 6]);

    // Already emitted; arriving again must not resurface.
    rec.push(vp8_packet(5));
    assert!(rec.pop_ready().is_empty());
}

#[test]
fn test_forced_advance_fires_drop_callback() {
    let drops = Arc::new(AtomicUsize::new(0));
    let counter = drops.clone();
    let mut rec = SampleReconstructor::new(200, Box::<Vp8Packet>::default())
        .with_packet_dropped(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

    rec.push(vp8_packet(0));
    assert_eq!(seqs(&rec.pop_ready()), vec![0]);

    // Sequence 1 never arrives. Once the buffered span reaches the window
    // bound, the gap is abandoned and the callback fires.
    for seq in 2..=201u16 {
        rec.push(vp8_packet(seq));
    }

    assert_eq!(drops.load(Ordering::SeqCst), 1);
    assert_eq!(seqs(&rec.pop_ready()), (2..=201).collect::<Vec<_>>());
}

#[test]
fn test_no_drop_callback_within_window() {
    let drops = Arc::new(AtomicUsize::new(0));
    let counter = drops.clone();
    let mut rec = SampleReconstructor::new(200, Box::<Vp8Packet>::default())
        .with_packet_dropped(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

    rec.push(vp8_packet(0));
    let _ = rec.pop_ready();
    for seq in 2..100u16 {
        rec.push(vp8_packet(seq));
    }

    assert_eq!(drops.load(Ordering::SeqCst), 0);
    assert!(rec.pop_ready().is_empty());
}
