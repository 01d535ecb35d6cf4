// file: src/archive/mod.rs
// description: archive reading module exports
// reference: Internal module structure

pub mod streamer;

pub use streamer::{
    ArchiveMember, ArchiveMembers, ArchiveMetadata, ArchiveStreamer, InspectionResult,
    MemberMetadata, MemberStream,
};
