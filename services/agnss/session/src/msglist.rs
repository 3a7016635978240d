//! Message list construction from a blob of concatenated frames.
//!
//! Both passes walk the whole buffer. A region that does not parse as a
//! frame fails the operation; frames outside the allow-list or with a bad
//! checksum are skipped but still consume their bytes.

use crate::error::MgaError;
use crate::event::MsgState;
use crate::message::{EchoFingerprint, MessageDescriptor};
use agnss_wire::{frames, AllowList, Frame};
use tracing::debug;

fn for_each_match<F>(buf: &[u8], allow: &AllowList, mut f: F) -> Result<(), MgaError>
where
    F: FnMut(usize, Frame<'_>) -> Result<(), MgaError>,
{
    for item in frames(buf) {
        let (offset, frame) = item?;
        if !allow.contains(frame.msg_id()) {
            continue;
        }
        if !frame.checksum_ok() {
            debug!(
                "Skipping frame {} at offset {} with bad checksum",
                frame.msg_id(),
                offset
            );
            continue;
        }
        f(offset, frame)?;
    }
    Ok(())
}

/// Count the messages of interest in `buf`
pub fn count_matching(buf: &[u8], allow: &AllowList) -> Result<usize, MgaError> {
    let mut count = 0;
    for_each_match(buf, allow, |_, _| {
        count += 1;
        Ok(())
    })?;
    Ok(count)
}

/// Build descriptors for the `count` messages of interest in `buf`
pub fn build_list(
    buf: &[u8],
    count: usize,
    allow: &AllowList,
) -> Result<Vec<MessageDescriptor>, MgaError> {
    let mut list = Vec::new();
    list.try_reserve_exact(count)?;

    for_each_match(buf, allow, |offset, frame| {
        if list.len() == count {
            return Ok(());
        }
        list.push(MessageDescriptor {
            span: offset..offset + frame.len(),
            sequence: list.len(),
            state: MsgState::WaitingToSend,
            retry_count: 0,
            deadline: None,
            failure: None,
            echo: EchoFingerprint::of(&frame),
        });
        Ok(())
    })?;

    Ok(list)
}
