//! Small, dependency-light helpers shared by the chunkers: UTF-8 edge
//! repair (C1), line/offset tracking (C2), tolerant JSON decoding (C6),
//! and content-type sniffing.

pub mod lines;
pub mod sniff;
pub mod tolerant_json;
pub mod utf8;
