//! The SFTP v3 subsystem: a binary sub-protocol (component H) layered over
//! a `session` channel's `sftp` subsystem, driven by a pipelined,
//! request-id-keyed job engine (component I). See draft-ietf-secsh-filexfer-02.

pub mod attrs;
pub mod engine;
pub mod packet;

pub use attrs::{Attrs, FileType};
pub use engine::{Engine, FileInfo, OverwriteMode};
