//! Outbound services behind traits: blob storage and note drafting

pub mod blob_store;
pub mod note_drafter;

pub use blob_store::{BlobStore, LocalBlobStore};
pub use note_drafter::{DraftError, DraftRequest, EchoDrafter, NoteDrafter, OpenAiCompatibleDrafter};
