//! kpx-dom: the in-memory password database
//!
//! | module        | contents                                              |
//! |---------------|-------------------------------------------------------|
//! | `tree`        | arena of groups and entries addressed by `NodeId`     |
//! | `entry`       | entry fields, attachments, history snapshots          |
//! | `group`       | group fields                                          |
//! | `meta`        | database metadata, memory protection, V3 binaries     |
//! | `protected`   | obfuscated strings and the binary pool                |
//! | `document`    | XML payload (de)serialization, search, sync           |
//! | `placeholder` | `{TITLE}`-style expansion and URL components          |
//! | `xml`         | minimal element tree over quick-xml                   |
//! | `values`      | timestamp, UUID, bool and color encodings             |

mod context;
pub mod custom_data;
pub mod document;
pub mod entry;
pub mod group;
pub mod meta;
pub mod placeholder;
pub mod protected;
pub mod times;
pub mod tree;
pub mod values;
pub mod xml;

pub use custom_data::CustomData;
pub use document::{DeletedObject, Document};
pub use entry::{BinaryRef, Entry, STANDARD_FIELDS};
pub use group::Group;
pub use meta::{MemoryProtection, Metadata};
pub use protected::{BinaryPool, ProtectedBinary, ProtectedString};
pub use times::Times;
pub use tree::{Node, NodeId, Tree};
