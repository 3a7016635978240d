//! Basic usage example for the UBX assistance wire format.

use agnss_wire::{
    build_frame, frames, header::class, header::mga, AllowList, Chunker, FrameDecoder, MsgId,
    FLASH_BLOCK_SIZE,
};
use bytes::BytesMut;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== UBX Assistance Wire Example ===\n");

    // 1. Build a couple of assistance frames
    println!("1. Building MGA-GPS frames...");
    let eph = build_frame(class::MGA, mga::GPS, &[&[0x01, 0x00, 0x07, 0x00], &[0u8; 64]])?;
    let alm = build_frame(class::MGA, mga::GPS, &[&[0x02, 0x00, 0x07, 0x00], &[0u8; 32]])?;
    let mut blob = Vec::new();
    blob.extend_from_slice(&eph);
    blob.extend_from_slice(&alm);
    println!("   Blob size: {} bytes", blob.len());

    // 2. Walk the blob and filter
    println!("\n2. Walking frames...");
    let allow = AllowList::assistance();
    for item in frames(&blob) {
        let (offset, frame) = item?;
        println!(
            "   @{:>5} {} len={} checksum_ok={} allowed={}",
            offset,
            frame.msg_id(),
            frame.len(),
            frame.checksum_ok(),
            allow.contains(frame.msg_id())
        );
    }

    // 3. Decode from a noisy stream
    println!("\n3. Decoding a stream with leading noise...");
    let mut decoder = FrameDecoder::new();
    let mut buf = BytesMut::from(&b"\x00\x11\x22"[..]);
    buf.extend_from_slice(&eph);
    while let Some(frame) = decoder.decode(&mut buf) {
        println!("   Decoded {} bytes", frame.len());
    }

    // 4. Chunk a flash payload
    println!("\n4. Chunking a flash payload...");
    let chunker = Chunker::new();
    let payload_len = 3 * FLASH_BLOCK_SIZE + 17;
    for span in chunker.split(payload_len) {
        println!(
            "   block {} at {}..{} ({} bytes)",
            span.index,
            span.range.start,
            span.range.end,
            span.len()
        );
    }

    let gps = MsgId::new(class::MGA, mga::GPS);
    println!(
        "\nAllow-list holds {} ids, {} allowed: {}",
        allow.entries().len(),
        gps,
        allow.contains(gps)
    );
    Ok(())
}
