//! Replication-side plumbing: slots, publications and the raw
//! replication-protocol session used to create slots.

pub mod lsn;
pub mod publication;
pub mod session;
pub mod slot;
pub mod validation;

pub use lsn::parse_lsn;
pub use publication::{
    drop_publication, existing_publications, missing_publications, publication_exists,
    quote_table_name,
};
pub use session::{ReplicationSession, SimpleRow, StartupParams};
pub use slot::{
    create_replication_slot, drop_inactive_slots, drop_replication_slot, grant_replication_role,
    shard_slots, slot_exists, CreatedSlot, SlotInfo,
};
pub use validation::{upstream_settings, UpstreamSettings, MIN_SERVER_VERSION_NUM};
