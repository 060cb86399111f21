//! Timestamp-sortable identifiers.
//!
//! Every primary key is a UUIDv7 generated app-side so rows created together
//! sort together without a separate `created_at` index.

use uuid::Uuid;

/// Generate a new UUIDv7.
pub fn uuidv7() -> Uuid {
    Uuid::now_v7()
}
