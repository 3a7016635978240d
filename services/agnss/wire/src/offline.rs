//! Selection of subsets of an AssistNow Offline blob.

use crate::frame::frames;
use crate::header::{class, mga, MsgId};
use crate::WireError;
use chrono::{Datelike, NaiveDate};

/// Whether a frame is MGA-ANO data for `date`
fn is_ano_for(msg: MsgId, payload: &[u8], date: NaiveDate) -> bool {
    if msg != MsgId::new(class::MGA, mga::ANO) || payload.len() < 7 {
        return false;
    }
    i32::from(payload[4]) + 2000 == date.year()
        && u32::from(payload[5]) == date.month()
        && u32::from(payload[6]) == date.day()
}

fn select<F>(blob: &[u8], mut keep: F) -> Result<Vec<u8>, WireError>
where
    F: FnMut(MsgId, &[u8]) -> bool,
{
    let mut out = Vec::new();
    for item in frames(blob) {
        let (_, frame) = item?;
        if keep(frame.msg_id(), frame.payload()) {
            out.extend_from_slice(frame.as_bytes());
        }
    }
    Ok(out)
}

/// MGA-ANO frames for `date` plus all almanac frames, in blob order
pub fn todays_subset(blob: &[u8], date: NaiveDate) -> Result<Vec<u8>, WireError> {
    select(blob, |msg, payload| {
        is_ano_for(msg, payload, date) || msg.is_mga_almanac()
    })
}

/// Almanac frames only, in blob order
pub fn almanac_subset(blob: &[u8]) -> Result<Vec<u8>, WireError> {
    select(blob, |msg, _| msg.is_mga_almanac())
}

/// Length of the run of almanac frames at the start of `blob`
pub fn almanac_prefix_len(blob: &[u8]) -> usize {
    let mut len = 0;
    for item in frames(blob) {
        match item {
            Ok((offset, frame)) if frame.msg_id().is_mga_almanac() => {
                len = offset + frame.len();
            }
            _ => break,
        }
    }
    len
}
