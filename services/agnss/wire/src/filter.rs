//! Class/id allow-lists for selecting assistance messages out of a blob.

use crate::header::{aid, class, mga, MsgId, WILDCARD};
use serde::{Deserialize, Serialize};

/// Ordered set of message ids accepted for transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowList {
    entries: Vec<MsgId>,
    wildcard: bool,
}

impl AllowList {
    /// Create an allow-list from explicit entries, wildcards disabled
    pub fn new(entries: Vec<MsgId>) -> Self {
        Self {
            entries,
            wildcard: false,
        }
    }

    /// Treat `0xFF` in an entry's class or id as "any"
    pub fn with_wildcard(mut self) -> Self {
        self.wildcard = true;
        self
    }

    /// Messages the engine transfers as assistance data
    pub fn assistance() -> Self {
        Self::new(vec![
            MsgId::new(class::MGA, mga::GPS),
            MsgId::new(class::MGA, mga::GAL),
            MsgId::new(class::MGA, mga::BDS),
            MsgId::new(class::MGA, mga::QZSS),
            MsgId::new(class::MGA, mga::GLO),
            MsgId::new(class::MGA, mga::ANO),
            MsgId::new(class::MGA, mga::INI),
            MsgId::new(class::AID, aid::INI),
            MsgId::new(class::AID, aid::HUI),
            MsgId::new(class::AID, aid::ALM),
            MsgId::new(class::AID, aid::EPH),
        ])
    }

    /// MGA per-constellation almanac/ephemeris messages only
    pub fn almanac() -> Self {
        Self::new(vec![
            MsgId::new(class::MGA, mga::GPS),
            MsgId::new(class::MGA, mga::GAL),
            MsgId::new(class::MGA, mga::BDS),
            MsgId::new(class::MGA, mga::QZSS),
            MsgId::new(class::MGA, mga::GLO),
        ])
    }

    /// Whether `msg` is accepted
    pub fn contains(&self, msg: MsgId) -> bool {
        self.entries.iter().any(|e| {
            if self.wildcard {
                (e.class == WILDCARD || e.class == msg.class)
                    && (e.id == WILDCARD || e.id == msg.id)
            } else {
                *e == msg
            }
        })
    }

    /// Entries in insertion order
    pub fn entries(&self) -> &[MsgId] {
        &self.entries
    }
}

impl Default for AllowList {
    fn default() -> Self {
        Self::assistance()
    }
}
